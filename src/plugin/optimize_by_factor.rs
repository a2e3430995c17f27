//! Probabilistic backend compaction after removals

use crate::error::StorageResult;
use crate::event::{EventManager, ListenerHandle, Operation, Outcome, StorageEvent};
use crate::plugin::{triggered, Plugin, PluginOptions};
use tracing::info;

/// Operations whose `.post` event may trigger a compaction
pub const OPTIMIZING_OPERATIONS: [Operation; 2] = [Operation::RemoveItem, Operation::RemoveItems];

/// Optimizes the backend with probability `1 / optimizing_factor` per removal
#[derive(Debug, Default)]
pub struct OptimizeByFactor {
    options: PluginOptions,
}

impl OptimizeByFactor {
    /// Create the plugin
    pub fn new(options: PluginOptions) -> Self {
        Self { options }
    }

    /// Create the plugin with only an optimizing factor
    pub fn with_factor(factor: u32) -> Self {
        Self::new(PluginOptions::default().with_optimizing_factor(factor))
    }
}

impl Plugin for OptimizeByFactor {
    fn name(&self) -> &str {
        "OptimizeByFactor"
    }

    fn options(&self) -> &PluginOptions {
        &self.options
    }

    fn attach(&self, events: &mut EventManager, priority: i32) -> Vec<ListenerHandle> {
        let factor = self.options.optimizing_factor;
        OPTIMIZING_OPERATIONS
            .iter()
            .map(|operation| {
                events.subscribe(operation.post(), priority, move |event| {
                    optimize_by_factor(event, factor)
                })
            })
            .collect()
    }
}

fn optimize_by_factor(event: &mut StorageEvent<'_, '_>, factor: u32) -> StorageResult<Outcome> {
    let storage = event.storage();
    if !storage.supports_optimize() || !triggered(factor) {
        return Ok(Outcome::Continue);
    }

    storage
        .optimize()
        .map_err(|error| error.into_storage_error(event.name()))?;
    info!(event = event.name(), backend = storage.name(), factor, "storage optimized");
    Ok(Outcome::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CacheStorage, MemoryAdapter, OptimizableStorage, StorageAdapter, StoredItem, Value};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingAdapter {
        inner: MemoryAdapter,
        optimized: AtomicUsize,
    }

    impl StorageAdapter for CountingAdapter {
        fn name(&self) -> &str {
            "counting"
        }

        fn get_item(&self, key: &str) -> StorageResult<Option<StoredItem>> {
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: Value) -> StorageResult<bool> {
            self.inner.set_item(key, value)
        }

        fn remove_item(&self, key: &str) -> StorageResult<bool> {
            self.inner.remove_item(key)
        }

        fn as_optimizable(&self) -> Option<&dyn OptimizableStorage> {
            Some(self)
        }
    }

    impl OptimizableStorage for CountingAdapter {
        fn optimize(&self) -> StorageResult<bool> {
            self.optimized.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[test]
    fn test_factor_one_optimizes_after_every_removal() {
        let mut storage = CacheStorage::new(CountingAdapter::default()).unwrap();
        storage.add_plugin(Arc::new(OptimizeByFactor::with_factor(1))).unwrap();

        storage.set_item("a", json!(1)).unwrap();
        storage.remove_item("a").unwrap();
        storage.remove_items(["b", "c"]).unwrap();
        assert_eq!(storage.adapter().optimized.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_writes_do_not_optimize() {
        let mut storage = CacheStorage::new(CountingAdapter::default()).unwrap();
        storage.add_plugin(Arc::new(OptimizeByFactor::with_factor(1))).unwrap();

        storage.set_item("a", json!(1)).unwrap();
        storage.touch_item("a").unwrap();
        assert_eq!(storage.adapter().optimized.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_detached_plugin_stops_optimizing() {
        let mut storage = CacheStorage::new(CountingAdapter::default()).unwrap();
        let plugin = Arc::new(OptimizeByFactor::with_factor(1));
        storage.add_plugin(plugin.clone()).unwrap();
        storage.remove_plugin(&plugin);

        storage.remove_item("a").unwrap();
        assert_eq!(storage.adapter().optimized.load(Ordering::SeqCst), 0);
    }
}
