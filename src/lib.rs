//! # Pluggable Cache
//!
//! A backend-agnostic key/value cache contract wrapped in an event
//! interception pipeline, so cross-cutting behavior attaches as plugins
//! instead of living in every backend or call site.
//!
//! ## Features
//!
//! - **Storage Module**: The adapter trait, key validation, the in-memory
//!   backend and [`CacheStorage`](storage::CacheStorage), which runs every
//!   operation through pre, post and exception events
//! - **Event Module**: Priority-ordered listeners that can rewrite
//!   parameters, replace results or stop propagation
//! - **Plugin Module**: Attach/detach registry plus the bundled
//!   `ClearExpiredByFactor`, `OptimizeByFactor` and `ExceptionHandler` plugins
//!
//! ## Example
//!
//! ```rust
//! use pluggable_cache::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let mut storage = CacheStorage::new(MemoryAdapter::new())?;
//! storage.add_plugin(Arc::new(ClearExpiredByFactor::with_factor(100)))?;
//!
//! storage.set_item("greeting", json!("hello"))?;
//! assert_eq!(storage.get_item("greeting")?, Some(json!("hello")));
//!
//! storage.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core error types
pub use error::{Error, Result};

// Core modules
pub mod error;
pub mod event;
pub mod plugin;
pub mod storage;

// Re-export commonly used types
pub mod prelude {
    //! Common types and traits for convenient importing

    pub use crate::error::{Error, Result, StorageError, StorageResult};
    pub use crate::event::{Operation, Outcome, Response, StorageEvent};
    pub use crate::plugin::{ClearExpiredByFactor, ExceptionHandler, OptimizeByFactor, Plugin, PluginOptions};
    pub use crate::storage::{
        AdapterOptions, CacheStorage, Key, KeyValuePairs, MemoryAdapter, MemoryConfig, StorageAdapter,
        StorageTarget, Value,
    };
}

// Version information
/// The version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
