//! Shared backends and helpers for the integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use pluggable_cache::error::{StorageError, StorageResult};
use pluggable_cache::storage::{
    ClearExpiredStorage, MemoryAdapter, OptimizableStorage, StorageAdapter, StoredItem, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Call counters of a [`TestAdapter`]
#[derive(Debug, Default)]
pub struct Calls {
    pub get: AtomicUsize,
    pub set: AtomicUsize,
    pub remove: AtomicUsize,
    pub clear_expired: AtomicUsize,
    pub optimize: AtomicUsize,
}

impl Calls {
    pub fn get(&self) -> usize {
        self.get.load(Ordering::SeqCst)
    }

    pub fn set(&self) -> usize {
        self.set.load(Ordering::SeqCst)
    }

    pub fn remove(&self) -> usize {
        self.remove.load(Ordering::SeqCst)
    }

    pub fn clear_expired(&self) -> usize {
        self.clear_expired.load(Ordering::SeqCst)
    }

    pub fn optimize(&self) -> usize {
        self.optimize.load(Ordering::SeqCst)
    }
}

/// Memory-backed adapter that counts calls and can refuse or fail keys
pub struct TestAdapter {
    inner: MemoryAdapter,
    calls: Arc<Calls>,
    rejected: Mutex<Vec<String>>,
    failing: Mutex<Vec<String>>,
    maintenance: bool,
}

impl TestAdapter {
    /// Adapter exposing the expiry sweep and compaction capabilities
    pub fn new() -> Self {
        Self {
            inner: MemoryAdapter::new(),
            calls: Arc::new(Calls::default()),
            rejected: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
            maintenance: true,
        }
    }

    /// Adapter without optional capabilities
    pub fn without_maintenance() -> Self {
        Self {
            maintenance: false,
            ..Self::new()
        }
    }

    /// Writes of this key report "not written"
    pub fn reject(self, key: &str) -> Self {
        self.rejected.lock().push(key.to_string());
        self
    }

    /// Every primitive touching this key fails
    pub fn fail(self, key: &str) -> Self {
        self.failing.lock().push(key.to_string());
        self
    }

    /// Shared call counters
    pub fn calls(&self) -> Arc<Calls> {
        Arc::clone(&self.calls)
    }

    fn check(&self, operation: &str, key: &str) -> StorageResult<()> {
        if self.failing.lock().iter().any(|failing| failing == key) {
            return Err(StorageError::operation_failed(operation, format!("key '{}' is broken", key)));
        }
        Ok(())
    }
}

impl StorageAdapter for TestAdapter {
    fn name(&self) -> &str {
        "test"
    }

    fn get_item(&self, key: &str) -> StorageResult<Option<StoredItem>> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        self.check("get_item", key)?;
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: Value) -> StorageResult<bool> {
        self.calls.set.fetch_add(1, Ordering::SeqCst);
        self.check("set_item", key)?;
        if self.rejected.lock().iter().any(|rejected| rejected == key) {
            return Ok(false);
        }
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> StorageResult<bool> {
        self.calls.remove.fetch_add(1, Ordering::SeqCst);
        self.check("remove_item", key)?;
        self.inner.remove_item(key)
    }

    fn as_clear_expired(&self) -> Option<&dyn ClearExpiredStorage> {
        if self.maintenance {
            Some(self)
        } else {
            None
        }
    }

    fn as_optimizable(&self) -> Option<&dyn OptimizableStorage> {
        if self.maintenance {
            Some(self)
        } else {
            None
        }
    }
}

impl ClearExpiredStorage for TestAdapter {
    fn clear_expired(&self) -> StorageResult<bool> {
        self.calls.clear_expired.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

impl OptimizableStorage for TestAdapter {
    fn optimize(&self) -> StorageResult<bool> {
        self.calls.optimize.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

/// Print pipeline logs when `RUST_LOG` is set
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
