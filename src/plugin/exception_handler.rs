//! Central policy for storage faults

use crate::error::StorageResult;
use crate::event::{EventManager, ListenerHandle, Operation, Outcome, StorageEvent};
use crate::plugin::{Plugin, PluginOptions};
use tracing::debug;

/// Handles the `.exception` event of every read, write and utility operation
///
/// Calls the configured callback with the fault, then sets whether the fault
/// is raised from `throw_exceptions`. `getCapabilities` is left alone.
#[derive(Debug, Default)]
pub struct ExceptionHandler {
    options: PluginOptions,
}

impl ExceptionHandler {
    /// Create the plugin
    pub fn new(options: PluginOptions) -> Self {
        Self { options }
    }

    /// Operations whose `.exception` event is handled
    pub fn operations() -> impl Iterator<Item = Operation> {
        Operation::ALL
            .into_iter()
            .filter(|operation| *operation != Operation::GetCapabilities)
    }
}

impl Plugin for ExceptionHandler {
    fn name(&self) -> &str {
        "ExceptionHandler"
    }

    fn options(&self) -> &PluginOptions {
        &self.options
    }

    fn attach(&self, events: &mut EventManager, priority: i32) -> Vec<ListenerHandle> {
        Self::operations()
            .map(|operation| {
                let options = self.options.clone();
                events.subscribe(operation.exception(), priority, move |event| {
                    on_exception(event, &options)
                })
            })
            .collect()
    }
}

fn on_exception(event: &mut StorageEvent<'_, '_>, options: &PluginOptions) -> StorageResult<Outcome> {
    let Some(exception) = event.as_exception_mut() else {
        return Ok(Outcome::Continue);
    };

    if let Some(callback) = &options.exception_callback {
        callback(exception.error());
    }

    exception.set_throw_exception(options.throw_exceptions);
    debug!(
        event = exception.event().name(),
        throw = options.throw_exceptions,
        "storage fault handled"
    );
    Ok(Outcome::Continue)
}
