//! Storage adapter trait and types
//!
//! A backend only has to supply [`StorageAdapter::get_item`],
//! [`StorageAdapter::set_item`] and [`StorageAdapter::remove_item`]. Every
//! other single-item and batch primitive has a default built on those three,
//! which backends override when they have something better.

use crate::error::StorageResult;
use crate::storage::capabilities::Capabilities;
use crate::storage::storage_keys::KeyValuePairs;
use std::collections::HashMap;

/// Opaque value stored in a cache
pub type Value = serde_json::Value;

/// Token used by check-and-set writes
pub type CasToken = Value;

/// A value read from a backend together with its CAS token
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    /// The stored value
    pub value: Value,
    /// Token identifying the stored revision
    pub cas_token: CasToken,
}

impl StoredItem {
    /// Item whose CAS token is the value itself
    pub fn new(value: Value) -> Self {
        Self {
            cas_token: value.clone(),
            value,
        }
    }
}

/// Backend able to sweep expired items
pub trait ClearExpiredStorage {
    /// Remove expired items
    fn clear_expired(&self) -> StorageResult<bool>;
}

/// Backend able to compact its storage
pub trait OptimizableStorage {
    /// Optimize the underlying storage
    fn optimize(&self) -> StorageResult<bool>;
}

/// Optional backend features, detected once when a storage is built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendFeatures {
    /// Backend implements [`ClearExpiredStorage`]
    pub clear_expired: bool,
    /// Backend implements [`OptimizableStorage`]
    pub optimize: bool,
}

impl BackendFeatures {
    /// Query the optional capability accessors of an adapter
    pub fn detect<A: StorageAdapter + ?Sized>(adapter: &A) -> Self {
        Self {
            clear_expired: adapter.as_clear_expired().is_some(),
            optimize: adapter.as_optimizable().is_some(),
        }
    }
}

/// Storage adapter trait for different storage backends
///
/// Keys passed to every method are already validated and normalized.
pub trait StorageAdapter: Send + Sync {
    /// Short backend name used in logs and errors
    fn name(&self) -> &str;

    /// Read an item; `None` when the key is not present
    fn get_item(&self, key: &str) -> StorageResult<Option<StoredItem>>;

    /// Store an item
    fn set_item(&self, key: &str, value: Value) -> StorageResult<bool>;

    /// Remove an item
    fn remove_item(&self, key: &str) -> StorageResult<bool>;

    /// Test if an item exists
    fn has_item(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get_item(key)?.is_some())
    }

    /// Store an item only if the key is not present
    fn add_item(&self, key: &str, value: Value) -> StorageResult<bool> {
        if self.has_item(key)? {
            return Ok(false);
        }
        self.set_item(key, value)
    }

    /// Store an item only if the key is present
    fn replace_item(&self, key: &str, value: Value) -> StorageResult<bool> {
        if !self.has_item(key)? {
            return Ok(false);
        }
        self.set_item(key, value)
    }

    /// Store an item only if the current value still equals `token`
    ///
    /// The default reads and then writes. It is not atomic: a concurrent
    /// writer can change the item between the two calls. Backends that offer
    /// a real compare-and-swap should override this.
    fn check_and_set_item(&self, token: &CasToken, key: &str, value: Value) -> StorageResult<bool> {
        match self.get_item(key)? {
            Some(current) if current.value == *token => self.set_item(key, value),
            _ => Ok(false),
        }
    }

    /// Reset the lifetime of an item
    fn touch_item(&self, key: &str) -> StorageResult<bool> {
        match self.get_item(key)? {
            Some(current) => self.replace_item(key, current.value),
            None => Ok(false),
        }
    }

    /// Read multiple items, returning the found ones
    fn get_items(&self, keys: &[String]) -> StorageResult<HashMap<String, Value>> {
        let mut found = HashMap::new();
        for key in keys {
            if let Some(item) = self.get_item(key)? {
                found.insert(key.clone(), item.value);
            }
        }
        Ok(found)
    }

    /// Test multiple items, returning the found keys
    fn has_items(&self, keys: &[String]) -> StorageResult<Vec<String>> {
        let mut found = Vec::new();
        for key in keys {
            if self.has_item(key)? {
                found.push(key.clone());
            }
        }
        Ok(found)
    }

    /// Store multiple items, returning the keys that were not stored
    fn set_items(&self, pairs: KeyValuePairs) -> StorageResult<Vec<String>> {
        collect_failed(pairs, |key, value| self.set_item(key, value))
    }

    /// Add multiple items, returning the keys that were not stored
    fn add_items(&self, pairs: KeyValuePairs) -> StorageResult<Vec<String>> {
        collect_failed(pairs, |key, value| self.add_item(key, value))
    }

    /// Replace multiple items, returning the keys that were not stored
    fn replace_items(&self, pairs: KeyValuePairs) -> StorageResult<Vec<String>> {
        collect_failed(pairs, |key, value| self.replace_item(key, value))
    }

    /// Touch multiple items, returning the keys that were not touched
    fn touch_items(&self, keys: &[String]) -> StorageResult<Vec<String>> {
        let mut failed = Vec::new();
        for key in keys {
            if !self.touch_item(key)? {
                failed.push(key.clone());
            }
        }
        Ok(failed)
    }

    /// Remove multiple items, returning the keys that were not removed
    fn remove_items(&self, keys: &[String]) -> StorageResult<Vec<String>> {
        let mut failed = Vec::new();
        for key in keys {
            if !self.remove_item(key)? {
                failed.push(key.clone());
            }
        }
        Ok(failed)
    }

    /// Static description of the backend
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Expiry sweep support, if any
    fn as_clear_expired(&self) -> Option<&dyn ClearExpiredStorage> {
        None
    }

    /// Compaction support, if any
    fn as_optimizable(&self) -> Option<&dyn OptimizableStorage> {
        None
    }
}

fn collect_failed<F>(pairs: KeyValuePairs, mut write: F) -> StorageResult<Vec<String>>
where
    F: FnMut(&str, Value) -> StorageResult<bool>,
{
    let mut failed = Vec::new();
    for (key, value) in pairs {
        if !write(&key, value)? {
            failed.push(key);
        }
    }
    Ok(failed)
}
