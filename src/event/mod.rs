//! Event module for intercepting storage operations
//!
//! This module provides the publish/subscribe substrate the storage pipeline
//! is built on:
//! - **Operations and phases** - the published event names, `<op>.pre`,
//!   `<op>.post` and `<op>.exception`
//! - **Event manager** - named subscriptions ordered by priority
//! - **Short-circuiting** - a listener returns [`Outcome::StopWith`] to end
//!   dispatch and supply the result
//!
//! Dispatch is synchronous: every listener of an event runs on the calling
//! thread before `trigger` returns.
//!
//! # Examples
//!
//! ```rust
//! use pluggable_cache::event::{Operation, Outcome, Response};
//! use pluggable_cache::storage::{CacheStorage, MemoryAdapter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut storage = CacheStorage::new(MemoryAdapter::new())?;
//!
//! // Pretend every key is present
//! storage.subscribe(Operation::HasItem.pre(), 1, |_event| {
//!     Ok(Outcome::StopWith(Response::Flag(true)))
//! });
//!
//! assert!(storage.has_item("anything")?);
//! # Ok(())
//! # }
//! ```

pub mod storage_event;

pub use storage_event::{
    param_names, Event, EventParams, ExceptionEvent, Param, PostEvent, Response, StorageEvent,
};

use crate::error::StorageResult;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Event constants
pub mod constants {
    //! Constants used by the event module

    /// Priority used when none is given
    pub const DEFAULT_PRIORITY: i32 = 1;

    /// Event published when the adapter options are replaced
    pub const OPTION_EVENT: &str = "option";
}

/// Public storage operations, each publishing its own events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `getItem`
    GetItem,
    /// `getItems`
    GetItems,
    /// `hasItem`
    HasItem,
    /// `hasItems`
    HasItems,
    /// `setItem`
    SetItem,
    /// `setItems`
    SetItems,
    /// `addItem`
    AddItem,
    /// `addItems`
    AddItems,
    /// `replaceItem`
    ReplaceItem,
    /// `replaceItems`
    ReplaceItems,
    /// `checkAndSetItem`
    CheckAndSetItem,
    /// `touchItem`
    TouchItem,
    /// `touchItems`
    TouchItems,
    /// `removeItem`
    RemoveItem,
    /// `removeItems`
    RemoveItems,
    /// `getCapabilities`
    GetCapabilities,
    /// `clearExpired`
    ClearExpired,
    /// `optimize`
    Optimize,
}

impl Operation {
    /// Every operation
    pub const ALL: [Operation; 18] = [
        Operation::GetItem,
        Operation::GetItems,
        Operation::HasItem,
        Operation::HasItems,
        Operation::SetItem,
        Operation::SetItems,
        Operation::AddItem,
        Operation::AddItems,
        Operation::ReplaceItem,
        Operation::ReplaceItems,
        Operation::CheckAndSetItem,
        Operation::TouchItem,
        Operation::TouchItems,
        Operation::RemoveItem,
        Operation::RemoveItems,
        Operation::GetCapabilities,
        Operation::ClearExpired,
        Operation::Optimize,
    ];

    /// Operation name used as event prefix
    pub fn name(self) -> &'static str {
        match self {
            Operation::GetItem => "getItem",
            Operation::GetItems => "getItems",
            Operation::HasItem => "hasItem",
            Operation::HasItems => "hasItems",
            Operation::SetItem => "setItem",
            Operation::SetItems => "setItems",
            Operation::AddItem => "addItem",
            Operation::AddItems => "addItems",
            Operation::ReplaceItem => "replaceItem",
            Operation::ReplaceItems => "replaceItems",
            Operation::CheckAndSetItem => "checkAndSetItem",
            Operation::TouchItem => "touchItem",
            Operation::TouchItems => "touchItems",
            Operation::RemoveItem => "removeItem",
            Operation::RemoveItems => "removeItems",
            Operation::GetCapabilities => "getCapabilities",
            Operation::ClearExpired => "clearExpired",
            Operation::Optimize => "optimize",
        }
    }

    /// Full event name for a phase
    pub fn event_name(self, phase: Phase) -> String {
        format!("{}.{}", self.name(), phase.suffix())
    }

    /// `<op>.pre`
    pub fn pre(self) -> String {
        self.event_name(Phase::Pre)
    }

    /// `<op>.post`
    pub fn post(self) -> String {
        self.event_name(Phase::Post)
    }

    /// `<op>.exception`
    pub fn exception(self) -> String {
        self.event_name(Phase::Exception)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Interception point of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before the backend call
    Pre,
    /// After the backend call
    Post,
    /// After a fault
    Exception,
}

impl Phase {
    /// Event name suffix
    pub fn suffix(self) -> &'static str {
        match self {
            Phase::Pre => "pre",
            Phase::Post => "post",
            Phase::Exception => "exception",
        }
    }
}

/// What a listener asks the dispatcher to do next
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Run the remaining listeners
    Continue,
    /// Skip the remaining listeners and use this response
    StopWith(Response),
}

/// Listener callback
pub type Listener = Arc<dyn Fn(&mut StorageEvent<'_, '_>) -> StorageResult<Outcome> + Send + Sync>;

/// Handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    /// Raw identifier
    pub fn id(self) -> u64 {
        self.0
    }
}

struct Subscription {
    handle: ListenerHandle,
    event: String,
    priority: i32,
    listener: Listener,
}

/// Result of dispatching one event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseCollection {
    invoked: usize,
    stopped_with: Option<Response>,
}

impl ResponseCollection {
    /// Whether a listener stopped propagation
    pub fn stopped(&self) -> bool {
        self.stopped_with.is_some()
    }

    /// Response of the listener that stopped propagation
    pub fn last(&self) -> Option<&Response> {
        self.stopped_with.as_ref()
    }

    /// Take the stopping response
    pub fn into_last(self) -> Option<Response> {
        self.stopped_with
    }

    /// Number of listeners that ran
    pub fn invoked(&self) -> usize {
        self.invoked
    }
}

/// Named-event publish/subscribe with priorities
///
/// Listeners with a higher priority run first; listeners sharing a priority
/// run in subscription order.
#[derive(Default)]
pub struct EventManager {
    subscriptions: Vec<Subscription>,
    next_handle: u64,
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventManager")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl EventManager {
    /// Create an event manager without subscriptions
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a listener to an event
    pub fn subscribe<F>(&mut self, event: impl Into<String>, priority: i32, listener: F) -> ListenerHandle
    where
        F: Fn(&mut StorageEvent<'_, '_>) -> StorageResult<Outcome> + Send + Sync + 'static,
    {
        self.subscribe_listener(event, priority, Arc::new(listener))
    }

    /// Subscribe an already shared listener to an event
    pub fn subscribe_listener(&mut self, event: impl Into<String>, priority: i32, listener: Listener) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle);
        self.next_handle += 1;

        let position = self
            .subscriptions
            .iter()
            .position(|subscription| subscription.priority < priority)
            .unwrap_or(self.subscriptions.len());

        self.subscriptions.insert(
            position,
            Subscription {
                handle,
                event: event.into(),
                priority,
                listener,
            },
        );

        handle
    }

    /// Remove a subscription; returns false if the handle is unknown
    pub fn unsubscribe(&mut self, handle: ListenerHandle) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|subscription| subscription.handle != handle);
        self.subscriptions.len() != before
    }

    /// Whether a handle is still subscribed
    pub fn is_subscribed(&self, handle: ListenerHandle) -> bool {
        self.subscriptions.iter().any(|subscription| subscription.handle == handle)
    }

    /// Number of listeners subscribed to an event
    pub fn listener_count(&self, event: &str) -> usize {
        self.subscriptions
            .iter()
            .filter(|subscription| subscription.event == event)
            .count()
    }

    /// Total number of subscriptions
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether there are no subscriptions
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Dispatch an event to its listeners
    ///
    /// Stops at the first listener that returns [`Outcome::StopWith`] or an error.
    pub fn trigger(&self, event: &mut StorageEvent<'_, '_>) -> StorageResult<ResponseCollection> {
        let name = event.name().to_string();
        let mut responses = ResponseCollection::default();

        for subscription in self.subscriptions.iter().filter(|subscription| subscription.event == name) {
            responses.invoked += 1;
            match (subscription.listener)(event)? {
                Outcome::Continue => {}
                Outcome::StopWith(response) => {
                    trace!(event = %name, handle = subscription.handle.id(), "propagation stopped");
                    responses.stopped_with = Some(response);
                    break;
                }
            }
        }

        trace!(event = %name, invoked = responses.invoked, "event dispatched");
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CacheStorage, MemoryAdapter};
    use parking_lot::Mutex;

    fn recording_listener(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> Listener {
        let log = Arc::clone(log);
        Arc::new(move |_event: &mut StorageEvent<'_, '_>| {
            log.lock().push(label);
            Ok(Outcome::Continue)
        })
    }

    #[test]
    fn test_operation_event_names() {
        assert_eq!(Operation::SetItem.pre(), "setItem.pre");
        assert_eq!(Operation::CheckAndSetItem.post(), "checkAndSetItem.post");
        assert_eq!(Operation::GetCapabilities.exception(), "getCapabilities.exception");
        assert_eq!(Operation::ALL.len(), 18);
    }

    #[test]
    fn test_priority_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut storage = CacheStorage::new(MemoryAdapter::new()).unwrap();

        storage.subscribe_listener(Operation::HasItem.pre(), 1, recording_listener(&log, "low-first"));
        storage.subscribe_listener(Operation::HasItem.pre(), 10, recording_listener(&log, "high"));
        storage.subscribe_listener(Operation::HasItem.pre(), 1, recording_listener(&log, "low-second"));

        storage.has_item("key").unwrap();
        assert_eq!(*log.lock(), vec!["high", "low-first", "low-second"]);
    }

    #[test]
    fn test_stop_propagation_skips_later_listeners() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut storage = CacheStorage::new(MemoryAdapter::new()).unwrap();

        storage.subscribe(Operation::HasItem.pre(), 2, |_event| {
            Ok(Outcome::StopWith(Response::Flag(true)))
        });
        storage.subscribe_listener(Operation::HasItem.pre(), 1, recording_listener(&log, "skipped"));

        assert!(storage.has_item("key").unwrap());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_unsubscribe() {
        let mut manager = EventManager::new();
        let handle = manager.subscribe("setItem.post", 1, |_event| Ok(Outcome::Continue));

        assert!(manager.is_subscribed(handle));
        assert_eq!(manager.listener_count("setItem.post"), 1);
        assert!(manager.unsubscribe(handle));
        assert!(!manager.unsubscribe(handle));
        assert!(manager.is_empty());
    }
}
