//! Probabilistic expiry sweep after writes

use crate::error::StorageResult;
use crate::event::{EventManager, ListenerHandle, Operation, Outcome, StorageEvent};
use crate::plugin::{triggered, Plugin, PluginOptions};
use tracing::info;

/// Operations whose `.post` event may trigger a sweep
pub const CLEARING_OPERATIONS: [Operation; 4] = [
    Operation::SetItem,
    Operation::SetItems,
    Operation::AddItem,
    Operation::AddItems,
];

/// Sweeps expired items with probability `1 / clearing_factor` per write
///
/// Does nothing when the factor is 0 or the backend cannot sweep.
#[derive(Debug, Default)]
pub struct ClearExpiredByFactor {
    options: PluginOptions,
}

impl ClearExpiredByFactor {
    /// Create the plugin
    pub fn new(options: PluginOptions) -> Self {
        Self { options }
    }

    /// Create the plugin with only a clearing factor
    pub fn with_factor(factor: u32) -> Self {
        Self::new(PluginOptions::default().with_clearing_factor(factor))
    }
}

impl Plugin for ClearExpiredByFactor {
    fn name(&self) -> &str {
        "ClearExpiredByFactor"
    }

    fn options(&self) -> &PluginOptions {
        &self.options
    }

    fn attach(&self, events: &mut EventManager, priority: i32) -> Vec<ListenerHandle> {
        let factor = self.options.clearing_factor;
        CLEARING_OPERATIONS
            .iter()
            .map(|operation| {
                events.subscribe(operation.post(), priority, move |event| {
                    clear_expired_by_factor(event, factor)
                })
            })
            .collect()
    }
}

fn clear_expired_by_factor(event: &mut StorageEvent<'_, '_>, factor: u32) -> StorageResult<Outcome> {
    let storage = event.storage();
    if !storage.supports_clear_expired() || !triggered(factor) {
        return Ok(Outcome::Continue);
    }

    storage
        .clear_expired()
        .map_err(|error| error.into_storage_error(event.name()))?;
    info!(event = event.name(), backend = storage.name(), factor, "expired items cleared");
    Ok(Outcome::Continue)
}
