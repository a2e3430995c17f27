//! Storage front end with event interception
//!
//! [`CacheStorage`] wraps a [`StorageAdapter`] and runs every public
//! operation through the same pipeline:
//! - **Permission gate** - `readable` gates reads, `writable` gates writes; a
//!   closed gate returns the neutral result and publishes nothing
//! - **Validation** - keys are validated and normalized before any event
//! - **`<op>.pre`** - listeners may rewrite parameters or stop with a result
//! - **Backend call** - skipped when the pre event was stopped; rewritten keys
//!   are validated again first
//! - **`<op>.post`** - listeners may replace the result
//! - **`<op>.exception`** - storage faults are offered to listeners, which may
//!   suppress them and supply a fallback result
//!
//! Plugins attach through [`CacheStorage::add_plugin`] and are detached by
//! [`CacheStorage::close`], which also runs on drop.

use crate::error::{Error, Result, StorageError, StorageResult};
use crate::event::constants::OPTION_EVENT;
use crate::event::{
    param_names, Event, EventManager, EventParams, ExceptionEvent, Listener, ListenerHandle,
    Operation, Outcome, Param, PostEvent, Response, StorageEvent,
};
use crate::plugin::{Plugin, PluginRegistry};
use crate::storage::adapter::{BackendFeatures, CasToken, StorageAdapter, Value};
use crate::storage::capabilities::Capabilities;
use crate::storage::constants::DEFAULT_PLUGIN_PRIORITY;
use crate::storage::storage_keys::{Key, KeyValidator, KeyValuePairs};
use crate::storage::storage_options::AdapterOptions;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// The storage as seen by event listeners
///
/// Listeners only get shared access, so they can run further operations
/// (maintenance, capability lookups) but can never attach or detach plugins
/// while an event is being dispatched.
pub trait StorageTarget {
    /// Backend name
    fn name(&self) -> &str;

    /// Current adapter options
    fn options(&self) -> &AdapterOptions;

    /// Whether the backend can sweep expired items
    fn supports_clear_expired(&self) -> bool;

    /// Whether the backend can compact its storage
    fn supports_optimize(&self) -> bool;

    /// Sweep expired items through the `clearExpired` pipeline
    fn clear_expired(&self) -> Result<bool>;

    /// Compact the backend through the `optimize` pipeline
    fn optimize(&self) -> Result<bool>;

    /// Capability descriptor through the `getCapabilities` pipeline
    fn capabilities(&self) -> Result<Arc<Capabilities>>;
}

/// Result of [`CacheStorage::get_item_with_token`]
#[derive(Debug, Clone, PartialEq)]
pub struct ItemLookup {
    /// The value, `None` when not found
    pub value: Option<Value>,
    /// Whether the item was found
    pub success: bool,
    /// Token to pass to [`CacheStorage::check_and_set_item`]
    pub cas_token: Option<CasToken>,
}

/// Key/value storage with an interception pipeline around a backend
pub struct CacheStorage<A: StorageAdapter> {
    adapter: A,
    options: AdapterOptions,
    validator: KeyValidator,
    features: BackendFeatures,
    capabilities: OnceLock<Arc<Capabilities>>,
    events: EventManager,
    registry: PluginRegistry,
    event_handles: Vec<ListenerHandle>,
}

impl<A: StorageAdapter> fmt::Debug for CacheStorage<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStorage")
            .field("adapter", &self.adapter.name())
            .field("options", &self.options)
            .field("features", &self.features)
            .field("plugins", &self.registry.len())
            .field("subscriptions", &self.events.len())
            .finish()
    }
}

impl<A: StorageAdapter> CacheStorage<A> {
    /// Wrap a backend with default options
    pub fn new(adapter: A) -> Result<Self> {
        Self::with_options(adapter, AdapterOptions::default())
    }

    /// Wrap a backend with the given options
    pub fn with_options(adapter: A, options: AdapterOptions) -> Result<Self> {
        let validator = options.key_validator()?;
        let features = BackendFeatures::detect(&adapter);

        debug!(
            adapter = adapter.name(),
            clear_expired = features.clear_expired,
            optimize = features.optimize,
            "storage created"
        );

        Ok(Self {
            adapter,
            options,
            validator,
            features,
            capabilities: OnceLock::new(),
            events: EventManager::new(),
            registry: PluginRegistry::new(),
            event_handles: Vec::new(),
        })
    }

    /// The wrapped backend
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Current options
    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    /// Replace the options, recompiling the key pattern
    ///
    /// When the options differ from the current ones, the `option` event is
    /// published with the new options serialized under `options`. The options
    /// are in effect before listeners run; a listener error is returned to
    /// the caller.
    pub fn set_options(&mut self, options: AdapterOptions) -> Result<()> {
        if options == self.options {
            return Ok(());
        }

        self.validator = options.key_validator()?;
        self.options = options;

        let snapshot = serde_json::to_value(&self.options).map_err(|e| Error::Configuration {
            message: format!("Cannot serialize adapter options: {}", e),
        })?;
        let mut params = EventParams::new().with(param_names::OPTIONS, Param::Value(snapshot));
        let mut event = Event::new(OPTION_EVENT, &*self, &mut params);
        self.events.trigger(&mut StorageEvent::Options(&mut event))?;

        debug!(adapter = self.adapter.name(), options = ?self.options, "options replaced");
        Ok(())
    }

    /// Enable or disable reads
    pub fn set_readable(&mut self, readable: bool) {
        self.options.readable = readable;
    }

    /// Enable or disable writes
    pub fn set_writable(&mut self, writable: bool) {
        self.options.writable = writable;
    }

    /// Enable or disable both reads and writes
    pub fn set_caching(&mut self, flag: bool) {
        self.options.set_caching(flag);
    }

    /// Reads and writes are both enabled
    pub fn caching(&self) -> bool {
        self.options.caching()
    }

    /// The event manager the pipeline publishes to
    pub fn event_manager(&self) -> &EventManager {
        &self.events
    }

    /// Subscribe a listener owned by this storage
    ///
    /// The subscription is removed by [`CacheStorage::close`].
    pub fn subscribe<F>(&mut self, event: impl Into<String>, priority: i32, listener: F) -> ListenerHandle
    where
        F: Fn(&mut StorageEvent<'_, '_>) -> StorageResult<Outcome> + Send + Sync + 'static,
    {
        self.subscribe_listener(event, priority, Arc::new(listener))
    }

    /// Subscribe a shared listener owned by this storage
    pub fn subscribe_listener(&mut self, event: impl Into<String>, priority: i32, listener: Listener) -> ListenerHandle {
        let event = event.into();
        let handle = self.events.subscribe_listener(event.clone(), priority, listener);
        self.event_handles.push(handle);
        debug!(event = %event, priority, handle = handle.id(), "listener subscribed");
        handle
    }

    /// Remove a listener added with [`CacheStorage::subscribe`]
    pub fn unsubscribe(&mut self, handle: ListenerHandle) -> bool {
        self.event_handles.retain(|existing| *existing != handle);
        self.events.unsubscribe(handle)
    }

    /// Attach a plugin with the default priority
    pub fn add_plugin(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        self.add_plugin_with_priority(plugin, DEFAULT_PLUGIN_PRIORITY)
    }

    /// Attach a plugin; fails if this instance is already attached
    pub fn add_plugin_with_priority(&mut self, plugin: Arc<dyn Plugin>, priority: i32) -> Result<()> {
        self.registry.register(plugin, priority, &mut self.events)
    }

    /// Detach a plugin; does nothing when it is not attached
    pub fn remove_plugin<P: Plugin + ?Sized>(&mut self, plugin: &Arc<P>) {
        self.registry.unregister(plugin, &mut self.events);
    }

    /// Whether this plugin instance is attached
    pub fn has_plugin<P: Plugin + ?Sized>(&self, plugin: &Arc<P>) -> bool {
        self.registry.contains(plugin)
    }

    /// Number of attached plugins
    pub fn plugin_count(&self) -> usize {
        self.registry.len()
    }

    /// Detach every plugin and remove every listener this storage subscribed
    ///
    /// Safe to call more than once; also runs on drop.
    pub fn close(&mut self) {
        let plugins = self.registry.len();
        self.registry.detach_all(&mut self.events);

        let handles = std::mem::take(&mut self.event_handles);
        for handle in &handles {
            self.events.unsubscribe(*handle);
        }

        if plugins > 0 || !handles.is_empty() {
            debug!(
                adapter = self.adapter.name(),
                plugins,
                listeners = handles.len(),
                "storage closed"
            );
        }
    }

    /// Read an item
    pub fn get_item(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        if !self.options.readable {
            return Ok(None);
        }

        let key = self.validator.validate(&key.into())?;
        let mut params = EventParams::new().with(param_names::KEY, Param::Key(key));

        self.intercept(Operation::GetItem, &mut params, Response::Value(None), |params| {
            let key = self.param_key(Operation::GetItem, params)?;
            Ok(Response::Value(self.adapter.get_item(&key)?.map(|item| item.value)))
        })?
        .into_value(Operation::GetItem.name())
    }

    /// Read an item together with its found flag and CAS token
    ///
    /// `cas_token` seeds the `casToken` parameter seen by listeners.
    pub fn get_item_with_token(&self, key: impl Into<Key>, cas_token: Option<CasToken>) -> Result<ItemLookup> {
        if !self.options.readable {
            return Ok(ItemLookup {
                value: None,
                success: false,
                cas_token,
            });
        }

        let key = self.validator.validate(&key.into())?;
        let mut params = EventParams::new()
            .with(param_names::KEY, Param::Key(key))
            .with(param_names::SUCCESS, Param::Flag(None))
            .with(param_names::CAS_TOKEN, Param::Token(cas_token));

        let value = self
            .intercept(Operation::GetItem, &mut params, Response::Value(None), |params| {
                let key = self.param_key(Operation::GetItem, params)?;
                let item = self.adapter.get_item(&key)?;

                params.insert(param_names::SUCCESS, Param::Flag(Some(item.is_some())));
                if let Some(item) = &item {
                    params.insert(param_names::CAS_TOKEN, Param::Token(Some(item.cas_token.clone())));
                }

                Ok(Response::Value(item.map(|item| item.value)))
            })?
            .into_value(Operation::GetItem.name())?;

        Ok(ItemLookup {
            success: params.success().unwrap_or(value.is_some()),
            cas_token: params.cas_token().cloned(),
            value,
        })
    }

    /// Read multiple items, returning the found ones
    pub fn get_items<I>(&self, keys: I) -> Result<HashMap<String, Value>>
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        if !self.options.readable {
            return Ok(HashMap::new());
        }

        let keys = self.validator.normalize_keys(keys)?;
        let mut params = EventParams::new().with(param_names::KEYS, Param::Keys(keys));

        self.intercept(Operation::GetItems, &mut params, Response::Items(HashMap::new()), |params| {
            let keys = self.param_keys(Operation::GetItems, params)?;
            Ok(Response::Items(self.adapter.get_items(&keys)?))
        })?
        .into_items(Operation::GetItems.name())
    }

    /// Test if an item exists
    pub fn has_item(&self, key: impl Into<Key>) -> Result<bool> {
        if !self.options.readable {
            return Ok(false);
        }

        let key = self.validator.validate(&key.into())?;
        let mut params = EventParams::new().with(param_names::KEY, Param::Key(key));

        self.intercept(Operation::HasItem, &mut params, Response::Flag(false), |params| {
            let key = self.param_key(Operation::HasItem, params)?;
            Ok(Response::Flag(self.adapter.has_item(&key)?))
        })?
        .into_flag(Operation::HasItem.name())
    }

    /// Test multiple items, returning the found keys
    pub fn has_items<I>(&self, keys: I) -> Result<Vec<String>>
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        if !self.options.readable {
            return Ok(Vec::new());
        }

        let keys = self.validator.normalize_keys(keys)?;
        let mut params = EventParams::new().with(param_names::KEYS, Param::Keys(keys));

        self.intercept(Operation::HasItems, &mut params, Response::Keys(Vec::new()), |params| {
            let keys = self.param_keys(Operation::HasItems, params)?;
            Ok(Response::Keys(self.adapter.has_items(&keys)?))
        })?
        .into_keys(Operation::HasItems.name())
    }

    /// Store an item
    pub fn set_item(&self, key: impl Into<Key>, value: Value) -> Result<bool> {
        self.write_item(Operation::SetItem, key.into(), value, |adapter, key, value| {
            adapter.set_item(key, value)
        })
    }

    /// Store multiple items, returning the keys that were not stored
    pub fn set_items<I, K>(&self, pairs: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Key>,
    {
        self.write_items(Operation::SetItems, pairs, |adapter, pairs| adapter.set_items(pairs))
    }

    /// Store an item only if the key is not present
    pub fn add_item(&self, key: impl Into<Key>, value: Value) -> Result<bool> {
        self.write_item(Operation::AddItem, key.into(), value, |adapter, key, value| {
            adapter.add_item(key, value)
        })
    }

    /// Add multiple items, returning the keys that were not stored
    pub fn add_items<I, K>(&self, pairs: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Key>,
    {
        self.write_items(Operation::AddItems, pairs, |adapter, pairs| adapter.add_items(pairs))
    }

    /// Store an item only if the key is present
    pub fn replace_item(&self, key: impl Into<Key>, value: Value) -> Result<bool> {
        self.write_item(Operation::ReplaceItem, key.into(), value, |adapter, key, value| {
            adapter.replace_item(key, value)
        })
    }

    /// Replace multiple items, returning the keys that were not stored
    pub fn replace_items<I, K>(&self, pairs: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Key>,
    {
        self.write_items(Operation::ReplaceItems, pairs, |adapter, pairs| {
            adapter.replace_items(pairs)
        })
    }

    /// Store an item only if its current value equals `token`
    ///
    /// Unless the backend overrides [`StorageAdapter::check_and_set_item`],
    /// this is a read followed by a write and is not atomic under concurrent
    /// writers to the same key.
    pub fn check_and_set_item(&self, token: CasToken, key: impl Into<Key>, value: Value) -> Result<bool> {
        if !self.options.writable {
            return Ok(false);
        }

        let key = self.validator.validate(&key.into())?;
        let mut params = EventParams::new()
            .with(param_names::TOKEN, Param::Token(Some(token)))
            .with(param_names::KEY, Param::Key(key))
            .with(param_names::VALUE, Param::Value(value));

        self.intercept(Operation::CheckAndSetItem, &mut params, Response::Flag(false), |params| {
            let key = self.param_key(Operation::CheckAndSetItem, params)?;
            let value = self.param_value(Operation::CheckAndSetItem, params)?;
            let token = params
                .token()
                .cloned()
                .ok_or_else(|| missing_param(Operation::CheckAndSetItem, param_names::TOKEN))?;
            Ok(Response::Flag(self.adapter.check_and_set_item(&token, &key, value)?))
        })?
        .into_flag(Operation::CheckAndSetItem.name())
    }

    /// Reset the lifetime of an item
    pub fn touch_item(&self, key: impl Into<Key>) -> Result<bool> {
        self.remove_or_touch_item(Operation::TouchItem, key.into(), |adapter, key| adapter.touch_item(key))
    }

    /// Touch multiple items, returning the keys that were not touched
    pub fn touch_items<I>(&self, keys: I) -> Result<Vec<String>>
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        self.remove_or_touch_items(Operation::TouchItems, keys, |adapter, keys| adapter.touch_items(keys))
    }

    /// Remove an item
    pub fn remove_item(&self, key: impl Into<Key>) -> Result<bool> {
        self.remove_or_touch_item(Operation::RemoveItem, key.into(), |adapter, key| adapter.remove_item(key))
    }

    /// Remove multiple items, returning the keys that were not removed
    pub fn remove_items<I>(&self, keys: I) -> Result<Vec<String>>
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        self.remove_or_touch_items(Operation::RemoveItems, keys, |adapter, keys| adapter.remove_items(keys))
    }

    /// Capability descriptor of the backend
    ///
    /// A listener stopping `getCapabilities.pre` may hand out another one.
    pub fn get_capabilities(&self) -> Result<Arc<Capabilities>> {
        let mut params = EventParams::new();
        let fallback = Response::Capabilities(Arc::new(Capabilities::default()));

        self.intercept(Operation::GetCapabilities, &mut params, fallback, |_params| {
            Ok(Response::Capabilities(self.describe()))
        })?
        .into_capabilities(Operation::GetCapabilities.name())
    }

    /// Remove expired items
    ///
    /// Fails with [`Error::Logic`] when the backend cannot sweep.
    pub fn clear_expired(&self) -> Result<bool> {
        if !self.features.clear_expired {
            return Err(Error::logic(format!(
                "Backend '{}' doesn't support clearing expired items",
                self.adapter.name()
            )));
        }

        let mut params = EventParams::new();
        self.intercept(Operation::ClearExpired, &mut params, Response::Flag(false), |_params| {
            let storage = self
                .adapter
                .as_clear_expired()
                .ok_or_else(|| Error::logic("Expiry sweep support disappeared"))?;
            Ok(Response::Flag(storage.clear_expired()?))
        })?
        .into_flag(Operation::ClearExpired.name())
    }

    /// Compact the backend storage
    ///
    /// Fails with [`Error::Logic`] when the backend cannot compact.
    pub fn optimize(&self) -> Result<bool> {
        if !self.features.optimize {
            return Err(Error::logic(format!(
                "Backend '{}' doesn't support optimizing",
                self.adapter.name()
            )));
        }

        let mut params = EventParams::new();
        self.intercept(Operation::Optimize, &mut params, Response::Flag(false), |_params| {
            let storage = self
                .adapter
                .as_optimizable()
                .ok_or_else(|| Error::logic("Compaction support disappeared"))?;
            Ok(Response::Flag(storage.optimize()?))
        })?
        .into_flag(Operation::Optimize.name())
    }

    fn describe(&self) -> Arc<Capabilities> {
        let capabilities = self.capabilities.get_or_init(|| {
            let mut capabilities = self.adapter.capabilities();
            capabilities.clear_expired = self.features.clear_expired;
            capabilities.optimize = self.features.optimize;
            Arc::new(capabilities)
        });
        Arc::clone(capabilities)
    }

    fn write_item<F>(&self, operation: Operation, key: Key, value: Value, write: F) -> Result<bool>
    where
        F: FnOnce(&A, &str, Value) -> StorageResult<bool>,
    {
        if !self.options.writable {
            return Ok(false);
        }

        let key = self.validator.validate(&key)?;
        let mut params = EventParams::new()
            .with(param_names::KEY, Param::Key(key))
            .with(param_names::VALUE, Param::Value(value));

        self.intercept(operation, &mut params, Response::Flag(false), |params| {
            let key = self.param_key(operation, params)?;
            let value = self.param_value(operation, params)?;
            Ok(Response::Flag(write(&self.adapter, &key, value)?))
        })?
        .into_flag(operation.name())
    }

    fn write_items<I, K, F>(&self, operation: Operation, pairs: I, write: F) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Key>,
        F: FnOnce(&A, KeyValuePairs) -> StorageResult<Vec<String>>,
    {
        if !self.options.writable {
            return Ok(pairs
                .into_iter()
                .map(|(key, _)| key.into().normalized())
                .collect());
        }

        let pairs = self.validator.validate_pairs(pairs)?;
        let fallback = Response::Keys(pairs.keys());
        let mut params = EventParams::new().with(param_names::KEY_VALUE_PAIRS, Param::Pairs(pairs));

        self.intercept(operation, &mut params, fallback, |params| {
            let pairs = self.param_pairs(operation, params)?;
            Ok(Response::Keys(write(&self.adapter, pairs)?))
        })?
        .into_keys(operation.name())
    }

    fn remove_or_touch_item<F>(&self, operation: Operation, key: Key, write: F) -> Result<bool>
    where
        F: FnOnce(&A, &str) -> StorageResult<bool>,
    {
        if !self.options.writable {
            return Ok(false);
        }

        let key = self.validator.validate(&key)?;
        let mut params = EventParams::new().with(param_names::KEY, Param::Key(key));

        self.intercept(operation, &mut params, Response::Flag(false), |params| {
            let key = self.param_key(operation, params)?;
            Ok(Response::Flag(write(&self.adapter, &key)?))
        })?
        .into_flag(operation.name())
    }

    fn remove_or_touch_items<I, F>(&self, operation: Operation, keys: I, write: F) -> Result<Vec<String>>
    where
        I: IntoIterator,
        I::Item: Into<Key>,
        F: FnOnce(&A, &[String]) -> StorageResult<Vec<String>>,
    {
        if !self.options.writable {
            return Ok(keys.into_iter().map(|key| key.into().normalized()).collect());
        }

        let keys = self.validator.normalize_keys(keys)?;
        let fallback = Response::Keys(keys.clone());
        let mut params = EventParams::new().with(param_names::KEYS, Param::Keys(keys));

        self.intercept(operation, &mut params, fallback, |params| {
            let keys = self.param_keys(operation, params)?;
            Ok(Response::Keys(write(&self.adapter, &keys)?))
        })?
        .into_keys(operation.name())
    }

    /// Run one operation through the pre, post and exception events
    fn intercept<F>(
        &self,
        operation: Operation,
        params: &mut EventParams,
        fallback: Response,
        invoke: F,
    ) -> Result<Response>
    where
        F: FnOnce(&mut EventParams) -> Result<Response>,
    {
        match self.dispatch(operation, params, invoke) {
            Err(Error::Storage(fault)) => self.recover(operation, params, fallback, fault),
            other => other,
        }
    }

    fn dispatch<F>(&self, operation: Operation, params: &mut EventParams, invoke: F) -> Result<Response>
    where
        F: FnOnce(&mut EventParams) -> Result<Response>,
    {
        let stopped = {
            let mut event = Event::new(operation.pre(), self, &mut *params);
            self.events.trigger(&mut StorageEvent::Pre(&mut event))?.into_last()
        };

        let result = match stopped {
            Some(response) => response,
            None => invoke(&mut *params)?,
        };

        let mut event = PostEvent::new(Event::new(operation.post(), self, &mut *params), result);
        let responses = self.events.trigger(&mut StorageEvent::Post(&mut event))?;

        Ok(match responses.into_last() {
            Some(response) => response,
            None => event.into_result(),
        })
    }

    fn recover(
        &self,
        operation: Operation,
        params: &mut EventParams,
        fallback: Response,
        fault: StorageError,
    ) -> Result<Response> {
        let mut event = ExceptionEvent::new(Event::new(operation.exception(), self, params), fallback, fault);
        let responses = self.events.trigger(&mut StorageEvent::Exception(&mut event))?;
        let (result, fault, throw_exception) = event.into_parts();

        if throw_exception {
            return Err(Error::Storage(fault));
        }

        warn!(operation = %operation, error = %fault, "storage fault suppressed");
        Ok(responses.into_last().unwrap_or(result))
    }

    fn param_key(&self, operation: Operation, params: &EventParams) -> Result<String> {
        let key = params
            .key()
            .ok_or_else(|| missing_param(operation, param_names::KEY))?;
        self.validator.validate_str(key)?;
        Ok(key.to_string())
    }

    fn param_keys(&self, operation: Operation, params: &EventParams) -> Result<Vec<String>> {
        let keys = params
            .keys()
            .ok_or_else(|| missing_param(operation, param_names::KEYS))?;
        self.validator.normalize_keys(keys)
    }

    fn param_pairs(&self, operation: Operation, params: &EventParams) -> Result<KeyValuePairs> {
        let pairs = params
            .key_value_pairs()
            .ok_or_else(|| missing_param(operation, param_names::KEY_VALUE_PAIRS))?;
        self.validator.check_pairs(pairs)?;
        Ok(pairs.clone())
    }

    fn param_value(&self, operation: Operation, params: &EventParams) -> Result<Value> {
        params
            .value()
            .cloned()
            .ok_or_else(|| missing_param(operation, param_names::VALUE))
    }
}

impl<A: StorageAdapter> StorageTarget for CacheStorage<A> {
    fn name(&self) -> &str {
        self.adapter.name()
    }

    fn options(&self) -> &AdapterOptions {
        &self.options
    }

    fn supports_clear_expired(&self) -> bool {
        self.features.clear_expired
    }

    fn supports_optimize(&self) -> bool {
        self.features.optimize
    }

    fn clear_expired(&self) -> Result<bool> {
        CacheStorage::clear_expired(self)
    }

    fn optimize(&self) -> Result<bool> {
        CacheStorage::optimize(self)
    }

    fn capabilities(&self) -> Result<Arc<Capabilities>> {
        self.get_capabilities()
    }
}

impl<A: StorageAdapter> Drop for CacheStorage<A> {
    fn drop(&mut self) {
        self.close();
    }
}

fn missing_param(operation: Operation, name: &str) -> Error {
    Error::logic(format!("{} requires the '{}' parameter", operation, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_adapter::MemoryAdapter;
    use parking_lot::Mutex;
    use serde_json::json;

    fn storage() -> CacheStorage<MemoryAdapter> {
        CacheStorage::new(MemoryAdapter::new()).unwrap()
    }

    fn record(log: &Arc<Mutex<Vec<String>>>) -> Listener {
        let log = Arc::clone(log);
        Arc::new(move |event: &mut StorageEvent<'_, '_>| {
            log.lock().push(event.name().to_string());
            Ok(Outcome::Continue)
        })
    }

    #[test]
    fn test_set_and_get() {
        let storage = storage();
        assert!(storage.set_item("key", json!("value")).unwrap());
        assert_eq!(storage.get_item("key").unwrap(), Some(json!("value")));
        assert!(storage.has_item("key").unwrap());
        assert_eq!(storage.get_item("missing").unwrap(), None);
    }

    #[test]
    fn test_int_keys_are_normalized() {
        let storage = storage();
        storage.set_item(42, json!(1)).unwrap();
        assert_eq!(storage.get_item("42").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_events_fire_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut storage = storage();
        storage.subscribe_listener(Operation::SetItem.pre(), 1, record(&log));
        storage.subscribe_listener(Operation::SetItem.post(), 1, record(&log));

        storage.set_item("key", json!(1)).unwrap();
        assert_eq!(*log.lock(), vec!["setItem.pre".to_string(), "setItem.post".to_string()]);
    }

    #[test]
    fn test_pre_listener_rewrites_key() {
        let mut storage = storage();
        storage.subscribe(Operation::SetItem.pre(), 1, |event| {
            event.params_mut().set_key("rewritten");
            Ok(Outcome::Continue)
        });

        storage.set_item("original", json!(1)).unwrap();
        assert!(!storage.has_item("original").unwrap());
        assert!(storage.has_item("rewritten").unwrap());
    }

    #[test]
    fn test_rewritten_invalid_key_is_rejected() {
        let mut storage = storage();
        storage.subscribe(Operation::SetItem.pre(), 1, |event| {
            event.params_mut().set_key("");
            Ok(Outcome::Continue)
        });

        let error = storage.set_item("key", json!(1)).unwrap_err();
        assert!(matches!(error, Error::InvalidKey { .. }));
    }

    #[test]
    fn test_post_listener_replaces_result() {
        let mut storage = storage();
        storage.subscribe(Operation::GetItem.post(), 1, |event| {
            if let Some(post) = event.as_post_mut() {
                post.set_result(Response::Value(Some(json!("from listener"))));
            }
            Ok(Outcome::Continue)
        });

        assert_eq!(storage.get_item("missing").unwrap(), Some(json!("from listener")));
    }

    #[test]
    fn test_post_stop_wins_over_result() {
        let mut storage = storage();
        storage.subscribe(Operation::HasItem.post(), 1, |event| {
            if let Some(post) = event.as_post_mut() {
                post.set_result(Response::Flag(false));
            }
            Ok(Outcome::StopWith(Response::Flag(true)))
        });

        assert!(storage.has_item("missing").unwrap());
    }

    #[test]
    fn test_wrong_response_shape_is_logic_error() {
        let mut storage = storage();
        storage.subscribe(Operation::HasItem.pre(), 1, |_event| {
            Ok(Outcome::StopWith(Response::Keys(Vec::new())))
        });

        let error = storage.has_item("key").unwrap_err();
        assert!(matches!(error, Error::Logic { .. }));
    }

    #[test]
    fn test_listener_fault_goes_through_exception() {
        let mut storage = storage();
        storage.subscribe(Operation::SetItem.post(), 1, |event| {
            Err(StorageError::ListenerFailed {
                event: event.name().to_string(),
                reason: "boom".to_string(),
            })
        });
        storage.subscribe(Operation::SetItem.exception(), 1, |event| {
            if let Some(exception) = event.as_exception_mut() {
                exception.set_throw_exception(false);
                exception.set_result(Response::Flag(true));
            }
            Ok(Outcome::Continue)
        });

        assert!(storage.set_item("key", json!(1)).unwrap());
    }

    #[test]
    fn test_get_item_with_token() {
        let storage = storage();
        storage.set_item("key", json!("v1")).unwrap();

        let lookup = storage.get_item_with_token("key", None).unwrap();
        assert!(lookup.success);
        assert_eq!(lookup.value, Some(json!("v1")));

        let token = lookup.cas_token.unwrap();
        assert!(storage.check_and_set_item(token.clone(), "key", json!("v2")).unwrap());
        assert!(!storage.check_and_set_item(token, "key", json!("v3")).unwrap());
        assert_eq!(storage.get_item("key").unwrap(), Some(json!("v2")));

        let missing = storage.get_item_with_token("missing", Some(json!("seed"))).unwrap();
        assert!(!missing.success);
        assert_eq!(missing.cas_token, Some(json!("seed")));
    }

    #[test]
    fn test_capabilities_are_cached() {
        let storage = storage();
        let first = storage.get_capabilities().unwrap();
        let second = storage.get_capabilities().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.clear_expired);
        assert!(first.optimize);
    }

    #[test]
    fn test_close_removes_own_listeners() {
        let mut storage = storage();
        storage.subscribe(Operation::GetItem.pre(), 1, |_event| Ok(Outcome::Continue));
        storage.subscribe(Operation::GetItem.post(), 1, |_event| Ok(Outcome::Continue));
        assert_eq!(storage.event_manager().len(), 2);

        storage.close();
        assert!(storage.event_manager().is_empty());
        storage.close();
        assert!(storage.event_manager().is_empty());
    }

    #[test]
    fn test_set_options_rejects_bad_pattern() {
        let mut storage = storage();
        let result = storage.set_options(AdapterOptions::default().with_key_pattern("(["));
        assert!(matches!(result, Err(Error::Configuration { .. })));
        assert!(storage.options().key_pattern.is_empty());
    }

    #[test]
    fn test_set_options_publishes_option_event() {
        let mut storage = storage();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        storage.subscribe(OPTION_EVENT, 1, move |event| {
            recorder.lock().push((event.name().to_string(), event.params().options().cloned()));
            Ok(Outcome::Continue)
        });

        storage
            .set_options(AdapterOptions::default().with_key_pattern("^[a-z]+$"))
            .unwrap();
        assert!(storage.set_item("Upper", json!(1)).is_err());

        // Unchanged options publish nothing
        storage
            .set_options(AdapterOptions::default().with_key_pattern("^[a-z]+$"))
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "option");
        assert_eq!(
            seen[0].1,
            Some(json!({"readable": true, "writable": true, "key_pattern": "^[a-z]+$"}))
        );
    }

    #[test]
    fn test_option_listener_error_is_returned() {
        let mut storage = storage();
        storage.subscribe(OPTION_EVENT, 1, |event| {
            Err(StorageError::ListenerFailed {
                event: event.name().to_string(),
                reason: "read only".to_string(),
            })
        });

        let result = storage.set_options(AdapterOptions::default().with_writable(false));
        assert!(matches!(result, Err(Error::Storage(StorageError::ListenerFailed { .. }))));
        assert!(!storage.options().writable);
    }
}
