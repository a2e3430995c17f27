//! Plugin module for cross-cutting storage behavior
//!
//! A plugin is a bundle of event listeners attached to one
//! [`CacheStorage`](crate::storage::CacheStorage) as a unit:
//! - **ClearExpiredByFactor** - sweeps expired items after some writes
//! - **OptimizeByFactor** - compacts the backend after some removals
//! - **ExceptionHandler** - decides whether storage faults reach the caller
//!
//! The registry remembers which plugin instances are attached and which
//! subscriptions each one created, so detaching leaves nothing behind.
//!
//! # Examples
//!
//! ```rust
//! use pluggable_cache::plugin::{ExceptionHandler, PluginOptions};
//! use pluggable_cache::storage::{CacheStorage, MemoryAdapter};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut storage = CacheStorage::new(MemoryAdapter::new())?;
//! let handler = Arc::new(ExceptionHandler::new(
//!     PluginOptions::default().with_throw_exceptions(false),
//! ));
//!
//! storage.add_plugin(handler.clone())?;
//! assert!(storage.has_plugin(&handler));
//!
//! // Attaching the same instance twice is refused
//! assert!(storage.add_plugin(handler.clone()).is_err());
//!
//! storage.remove_plugin(&handler);
//! assert!(!storage.has_plugin(&handler));
//! # Ok(())
//! # }
//! ```

pub mod clear_expired_by_factor;
pub mod exception_handler;
pub mod optimize_by_factor;

pub use clear_expired_by_factor::ClearExpiredByFactor;
pub use exception_handler::ExceptionHandler;
pub use optimize_by_factor::OptimizeByFactor;

use crate::error::{Error, Result, StorageError};
use crate::event::{EventManager, ListenerHandle};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Callback observing storage faults
pub type ExceptionCallback = Arc<dyn Fn(&StorageError) + Send + Sync>;

/// A set of listeners attached to a storage as a unit
pub trait Plugin: Send + Sync {
    /// Plugin name used in logs and errors
    fn name(&self) -> &str;

    /// Current options
    fn options(&self) -> &PluginOptions;

    /// Subscribe the plugin's listeners and return their handles
    fn attach(&self, events: &mut EventManager, priority: i32) -> Vec<ListenerHandle>;
}

/// Options shared by the bundled plugins
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOptions {
    /// Reciprocal of the sweep probability per write, 0 disables
    pub clearing_factor: u32,
    /// Reciprocal of the compaction probability per removal, 0 disables
    pub optimizing_factor: u32,
    /// Whether handled faults are still raised to the caller
    pub throw_exceptions: bool,
    /// Called with every handled fault
    #[serde(skip)]
    pub exception_callback: Option<ExceptionCallback>,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            clearing_factor: 0,
            optimizing_factor: 0,
            throw_exceptions: true,
            exception_callback: None,
        }
    }
}

impl fmt::Debug for PluginOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginOptions")
            .field("clearing_factor", &self.clearing_factor)
            .field("optimizing_factor", &self.optimizing_factor)
            .field("throw_exceptions", &self.throw_exceptions)
            .field("exception_callback", &self.exception_callback.is_some())
            .finish()
    }
}

impl PluginOptions {
    /// Parse options from JSON, missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Configuration {
            message: format!("Invalid plugin options: {}", e),
        })
    }

    /// Set the clearing factor
    pub fn with_clearing_factor(mut self, factor: u32) -> Self {
        self.clearing_factor = factor;
        self
    }

    /// Set the optimizing factor
    pub fn with_optimizing_factor(mut self, factor: u32) -> Self {
        self.optimizing_factor = factor;
        self
    }

    /// Set whether handled faults are raised
    pub fn with_throw_exceptions(mut self, flag: bool) -> Self {
        self.throw_exceptions = flag;
        self
    }

    /// Set the fault callback
    pub fn with_exception_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&StorageError) + Send + Sync + 'static,
    {
        self.exception_callback = Some(Arc::new(callback));
        self
    }
}

struct Registration {
    plugin: Arc<dyn Plugin>,
    handles: Vec<ListenerHandle>,
}

/// Plugins attached to one storage
#[derive(Default)]
pub struct PluginRegistry {
    registrations: Vec<Registration>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.registrations.iter().map(|registration| registration.plugin.name()))
            .finish()
    }
}

/// Draw in `[1, factor]` and report whether the draw hit 1; a zero factor never hits
pub(crate) fn triggered(factor: u32) -> bool {
    factor != 0 && rand::rng().random_range(1..=factor) == 1
}

fn identity<P: ?Sized>(plugin: &Arc<P>) -> *const () {
    Arc::as_ptr(plugin).cast::<()>()
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a plugin; fails if this instance is already attached
    pub fn register(&mut self, plugin: Arc<dyn Plugin>, priority: i32, events: &mut EventManager) -> Result<()> {
        if self.contains(&plugin) {
            return Err(Error::logic(format!(
                "Plugin of type '{}' already registered",
                plugin.name()
            )));
        }

        let handles = plugin.attach(events, priority);
        debug!(plugin = plugin.name(), priority, listeners = handles.len(), "plugin attached");
        self.registrations.push(Registration { plugin, handles });
        Ok(())
    }

    /// Detach a plugin; returns false when it was not attached
    pub fn unregister<P: ?Sized>(&mut self, plugin: &Arc<P>, events: &mut EventManager) -> bool {
        let target = identity(plugin);
        let Some(position) = self
            .registrations
            .iter()
            .position(|registration| identity(&registration.plugin) == target)
        else {
            return false;
        };

        let registration = self.registrations.remove(position);
        detach(registration, events);
        true
    }

    /// Detach every plugin
    pub fn detach_all(&mut self, events: &mut EventManager) {
        for registration in self.registrations.drain(..) {
            detach(registration, events);
        }
    }

    /// Whether this plugin instance is attached
    pub fn contains<P: ?Sized>(&self, plugin: &Arc<P>) -> bool {
        let target = identity(plugin);
        self.registrations
            .iter()
            .any(|registration| identity(&registration.plugin) == target)
    }

    /// Number of attached plugins
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether no plugin is attached
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

fn detach(registration: Registration, events: &mut EventManager) {
    for handle in &registration.handles {
        events.unsubscribe(*handle);
    }
    debug!(
        plugin = registration.plugin.name(),
        listeners = registration.handles.len(),
        "plugin detached"
    );
}
