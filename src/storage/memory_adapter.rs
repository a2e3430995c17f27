//! Memory storage adapter

use crate::error::StorageResult;
use crate::storage::adapter::{ClearExpiredStorage, OptimizableStorage, StorageAdapter, StoredItem, Value};
use crate::storage::capabilities::Capabilities;
use crate::storage::constants::MEMORY_BACKEND;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// Configuration of the in-memory backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Lifetime of every written item, `None` for no expiry
    ///
    /// A lifetime too large to add to the current instant means no expiry.
    pub ttl: Option<Duration>,
    /// Maximum number of items, `None` for no limit
    pub max_items: Option<usize>,
}

impl MemoryConfig {
    /// Set the item lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the item limit
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// In-memory storage adapter
///
/// Expired items read as missing until [`ClearExpiredStorage::clear_expired`]
/// drops them. A write that would add a key past `max_items` is refused.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    config: MemoryConfig,
    data: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryAdapter {
    /// Create a new memory adapter without expiry or size limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory adapter with the given configuration
    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            config,
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Current configuration
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Deadline for an item written at `now`; a TTL past the clock's range never expires
    fn expiry(&self, now: Instant) -> Option<Instant> {
        self.config.ttl.and_then(|ttl| now.checked_add(ttl))
    }
}

impl StorageAdapter for MemoryAdapter {
    fn name(&self) -> &str {
        MEMORY_BACKEND
    }

    fn get_item(&self, key: &str) -> StorageResult<Option<StoredItem>> {
        let data = self.data.read();
        let now = Instant::now();
        Ok(data
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| StoredItem::new(entry.value.clone())))
    }

    fn set_item(&self, key: &str, value: Value) -> StorageResult<bool> {
        let mut data = self.data.write();
        let now = Instant::now();

        if let Some(max_items) = self.config.max_items {
            if !data.contains_key(key) && data.len() >= max_items {
                trace!(key, max_items, "memory adapter full");
                return Ok(false);
            }
        }

        let expires_at = self.expiry(now);
        data.insert(key.to_string(), MemoryEntry { value, expires_at });
        Ok(true)
    }

    fn remove_item(&self, key: &str) -> StorageResult<bool> {
        let mut data = self.data.write();
        let now = Instant::now();
        Ok(data.remove(key).is_some_and(|entry| !entry.is_expired(now)))
    }

    fn touch_item(&self, key: &str) -> StorageResult<bool> {
        let mut data = self.data.write();
        let now = Instant::now();
        let expires_at = self.expiry(now);

        match data.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn capabilities(&self) -> Capabilities {
        let mut capabilities = Capabilities::default().with_ttl(Duration::from_millis(1));
        capabilities.static_ttl = false;
        capabilities
    }

    fn as_clear_expired(&self) -> Option<&dyn ClearExpiredStorage> {
        Some(self)
    }

    fn as_optimizable(&self) -> Option<&dyn OptimizableStorage> {
        Some(self)
    }
}

impl ClearExpiredStorage for MemoryAdapter {
    fn clear_expired(&self) -> StorageResult<bool> {
        let mut data = self.data.write();
        let now = Instant::now();
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired(now));
        trace!(removed = before - data.len(), "memory adapter swept");
        Ok(true)
    }
}

impl OptimizableStorage for MemoryAdapter {
    fn optimize(&self) -> StorageResult<bool> {
        self.data.write().shrink_to_fit();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_adapter_basic() {
        let adapter = MemoryAdapter::new();
        assert!(adapter.set_item("key", json!({"a": 1})).unwrap());
        assert_eq!(adapter.get_item("key").unwrap().unwrap().value, json!({"a": 1}));
        assert!(adapter.remove_item("key").unwrap());
        assert!(!adapter.remove_item("key").unwrap());
        assert!(adapter.get_item("key").unwrap().is_none());
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let adapter = MemoryAdapter::with_config(MemoryConfig::default().with_ttl(Duration::ZERO));
        assert!(adapter.set_item("key", json!(1)).unwrap());
        assert!(!adapter.has_item("key").unwrap());
        assert!(!adapter.touch_item("key").unwrap());
        assert_eq!(adapter.len(), 1);

        assert!(adapter.clear_expired().unwrap());
        assert!(adapter.is_empty());
    }

    #[test]
    fn test_long_ttl_survives_sweep() {
        let adapter = MemoryAdapter::with_config(MemoryConfig::default().with_ttl(Duration::from_secs(3600)));
        adapter.set_item("key", json!(1)).unwrap();
        adapter.clear_expired().unwrap();
        assert!(adapter.has_item("key").unwrap());
        assert!(adapter.touch_item("key").unwrap());
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let adapter = MemoryAdapter::with_config(MemoryConfig::default().with_ttl(Duration::MAX));
        assert!(adapter.set_item("key", json!(1)).unwrap());
        assert!(adapter.touch_item("key").unwrap());
        adapter.clear_expired().unwrap();
        assert!(adapter.has_item("key").unwrap());

        let config: MemoryConfig =
            serde_json::from_str(&format!(r#"{{"ttl": {{"secs": {}, "nanos": 0}}}}"#, u64::MAX)).unwrap();
        let adapter = MemoryAdapter::with_config(config);
        assert!(adapter.set_item("key", json!(2)).unwrap());
        assert_eq!(adapter.get_item("key").unwrap().unwrap().value, json!(2));
    }

    #[test]
    fn test_max_items_refuses_new_keys() {
        let adapter = MemoryAdapter::with_config(MemoryConfig::default().with_max_items(1));
        assert!(adapter.set_item("a", json!(1)).unwrap());
        assert!(!adapter.set_item("b", json!(2)).unwrap());
        assert!(adapter.set_item("a", json!(3)).unwrap());
        assert_eq!(adapter.get_item("a").unwrap().unwrap().value, json!(3));
    }

    #[test]
    fn test_cas_token_is_value() {
        let adapter = MemoryAdapter::new();
        adapter.set_item("key", json!("v")).unwrap();
        assert_eq!(adapter.get_item("key").unwrap().unwrap().cas_token, json!("v"));
    }

    #[test]
    fn test_capabilities_detected() {
        let adapter = MemoryAdapter::new();
        assert!(adapter.as_clear_expired().is_some());
        assert!(adapter.as_optimizable().is_some());
        assert!(adapter.capabilities().ttl_supported);
        assert!(adapter.optimize().unwrap());
    }

    #[test]
    fn test_config_from_json() {
        let config: MemoryConfig = serde_json::from_str(r#"{"max_items": 10}"#).unwrap();
        assert_eq!(config.max_items, Some(10));
        assert_eq!(config.ttl, None);
    }
}
