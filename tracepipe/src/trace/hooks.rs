//! The three stage hooks the host engine invokes (spec §4.2 / §6). Every
//! return path here is infallible from the host data path's point of view:
//! a failed trace emission logs and moves on, it never propagates an error
//! up through these functions (spec §7 propagation policy).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::engine::{Chunk, PluginIdentity};
use crate::metrics::Metrics;
use crate::trace::encoder::{encode_envelope, EnvelopeFields, EnvelopeKind};
use crate::trace::event::TraceEvent;
use crate::trace::registry::TraceRegistry;

/// Literal tag every trace envelope is emitted under (spec §6, length 5).
pub const TRACE_TAG: &str = "trace";

fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn submit(
    metrics: &Metrics,
    event: &TraceEvent,
    fields: &EnvelopeFields<'_>,
    packed: &crate::engine::PackedRecords,
    now: f64,
) -> bool {
    match encode_envelope(fields, packed, now) {
        Ok(envelope) => {
            let chunk = Chunk::new(event.emitter().name().to_string(), TRACE_TAG, envelope);
            event.emitter().add_record(chunk)
        }
        Err(err) => {
            log::warn!("trace envelope discarded, malformed records buffer: {err}");
            metrics.record_decode_failure();
            false
        }
    }
}

/// spec §4.2 `on_input`. `slot` carries the chunk's attached `TraceEvent`
/// across stages — the host engine is expected to thread the same slot
/// through `on_filter` and `on_pre_output` for this chunk.
pub fn on_input(
    registry: &Arc<TraceRegistry>,
    host_input: &dyn PluginIdentity,
    chunk: &Chunk,
    slot: &mut Option<TraceEvent>,
    metrics: &Metrics,
) {
    if slot.is_none() {
        if !registry.has_live_context(host_input.name()) {
            return;
        }
        *slot = registry.try_begin_event(host_input.name(), host_input.alias());
    }
    let Some(event) = slot.as_ref() else {
        return;
    };

    let now = now_seconds();
    let fields = EnvelopeFields {
        kind: EnvelopeKind::Input,
        trace_id: event.trace_id(),
        plugin_instance: host_input.name(),
        plugin_alias: host_input.alias(),
        start_time: now,
        end_time: now,
    };
    submit(metrics, event, &fields, &chunk.data, now);

    if registry.limit_hit(host_input.name()) {
        registry.request_destroy(host_input.name());
    }
}

/// spec §4.2 `on_pre_output`. Ends the chunk's trace event: this is the
/// last stage per spec §3's `TraceEvent` lifecycle, so `slot` is cleared
/// (dropping the handle, which runs `end_event`) after submission.
pub fn on_pre_output(chunk: &Chunk, slot: &mut Option<TraceEvent>, metrics: &Metrics) -> bool {
    let Some(event) = slot.as_ref() else {
        return false;
    };
    let now = now_seconds();
    let fields = EnvelopeFields {
        kind: EnvelopeKind::PreOutput,
        trace_id: event.trace_id(),
        // plugin_instance/alias for INPUT and PRE_OUTPUT both name the host
        // input (spec §4.4 table); both come from the event itself, which
        // captured them at `on_input` time, since `host_input` is no longer
        // in scope for the caller at this stage.
        plugin_instance: event.plugin_instance(),
        plugin_alias: event.plugin_alias(),
        start_time: now,
        end_time: now,
    };
    let ok = submit(metrics, event, &fields, &chunk.data, now);
    *slot = None;
    ok
}

/// spec §4.2 `on_filter`. Unlike the other two hooks, the envelope carries
/// the filter's identity and a caller-supplied time window rather than the
/// chunk's current content.
pub fn on_filter(
    filter: &dyn PluginIdentity,
    slot: &Option<TraceEvent>,
    tm_start: f64,
    tm_end: f64,
    buf: &crate::engine::PackedRecords,
    metrics: &Metrics,
) -> bool {
    let Some(event) = slot.as_ref() else {
        return false;
    };
    let fields = EnvelopeFields {
        kind: EnvelopeKind::Filter,
        trace_id: event.trace_id(),
        plugin_instance: filter.name(),
        plugin_alias: filter.alias(),
        start_time: tm_start,
        end_time: tm_end,
    };
    submit(metrics, event, &fields, buf, now_seconds())
}
