//! Storage module for key/value caching
//!
//! This module provides a backend-agnostic key/value contract and the
//! pipeline that wraps it:
//! - **Adapter trait** - three required primitives, everything else derived
//! - **Key handling** - validation against an optional pattern and
//!   normalization of string and integer keys
//! - **Cache storage** - the public operations, permission gates and the
//!   pre/post/exception events around every backend call
//! - **Memory backend** - an in-process reference implementation
//!
//! # Examples
//!
//! ```rust
//! use pluggable_cache::storage::{AdapterOptions, CacheStorage, MemoryAdapter};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = AdapterOptions::default().with_key_pattern("^[a-z0-9_]+$");
//! let storage = CacheStorage::with_options(MemoryAdapter::new(), options)?;
//!
//! // Store and read back
//! assert!(storage.set_item("user_1", json!({"name": "Ada"}))?);
//! assert_eq!(storage.get_item("user_1")?, Some(json!({"name": "Ada"})));
//!
//! // Batch writes report the keys that were not written
//! let not_added = storage.add_items(vec![("user_1", json!(1)), ("user_2", json!(2))])?;
//! assert_eq!(not_added, vec!["user_1".to_string()]);
//!
//! // Keys failing the pattern never reach the backend
//! assert!(storage.get_item("User 1").is_err());
//! # Ok(())
//! # }
//! ```

// Backend contract and the in-memory backend
pub mod adapter;
pub mod capabilities;
pub mod memory_adapter;

// Front end
pub mod storage_api;
pub mod storage_keys;
pub mod storage_options;

// Re-export main types for convenience
pub use adapter::{
    BackendFeatures, CasToken, ClearExpiredStorage, OptimizableStorage, StorageAdapter, StoredItem, Value,
};
pub use capabilities::Capabilities;
pub use memory_adapter::{MemoryAdapter, MemoryConfig};
pub use storage_api::{CacheStorage, ItemLookup, StorageTarget};
pub use storage_keys::{Key, KeyValidator, KeyValuePairs};
pub use storage_options::AdapterOptions;

/// Storage constants
pub mod constants {
    //! Constants used throughout the storage module

    /// Priority plugins are attached with when none is given
    pub const DEFAULT_PLUGIN_PRIORITY: i32 = crate::event::constants::DEFAULT_PRIORITY;

    /// Name of the in-memory backend
    pub const MEMORY_BACKEND: &str = "memory";
}
