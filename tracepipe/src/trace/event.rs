//! The per-chunk handle tying one host chunk to its trace context (spec §3
//! `TraceEvent`).

use std::sync::Arc;

use crate::engine::EmitterInput;
use crate::trace::registry::TraceRegistry;

/// Created at first stage-hook touch per chunk; lives until the chunk
/// completes the pre-output stage or the context is torn down. Dropping a
/// `TraceEvent` is how `end_event` (spec §4.1) gets called — creation
/// increments `live_handles` (in `TraceRegistry::try_begin_event`),
/// destruction decrements it and, if the owning context is marked for
/// destroy and no handles remain, triggers teardown.
pub struct TraceEvent {
    registry: Arc<TraceRegistry>,
    host_input: String,
    /// The host input's alias, captured at creation time so `on_pre_output`
    /// can still produce a 7-entry envelope for an aliased input even though
    /// by then it no longer has access to the `PluginIdentity` itself.
    plugin_alias: Option<String>,
    trace_id: String,
    emitter: Arc<EmitterInput>,
}

impl TraceEvent {
    pub(crate) fn new(
        registry: Arc<TraceRegistry>,
        host_input: String,
        plugin_alias: Option<String>,
        trace_id: String,
        emitter: Arc<EmitterInput>,
    ) -> Self {
        Self {
            registry,
            host_input,
            plugin_alias,
            trace_id,
            emitter,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn plugin_instance(&self) -> &str {
        &self.host_input
    }

    pub fn plugin_alias(&self) -> Option<&str> {
        self.plugin_alias.as_deref()
    }

    pub(crate) fn emitter(&self) -> &Arc<EmitterInput> {
        &self.emitter
    }
}

impl Drop for TraceEvent {
    fn drop(&mut self) {
        self.registry.end_event(&self.host_input);
    }
}
