//! The lifecycle & concurrency gate (spec §4.1), kept in a concurrent map
//! keyed by host input name. A real Fluent Bit process has one global
//! `struct flb_config` and bolts a single trace-context pointer onto it;
//! this crate serves many named host inputs at once, so the gate/context
//! pair for each one lives in a `DashMap` slot instead — grounded on the
//! same `Arc<DashMap<_, _>>`-per-key pattern cognitod's handlers use for
//! per-subject state (e.g. `handler::ddos`'s request tracker map).

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::engine::Engine;
use crate::trace::error::TraceError;
use crate::trace::event::TraceEvent;

fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A context's self-destruct policy (spec §3 `limit`).
#[derive(Debug, Clone, Copy)]
pub enum Limit {
    None,
    Time { started_at: u64, window_seconds: u64 },
    Count { max_count: u64 },
}

/// What the control surface passes to `set_limit`; `Limit::Time`'s
/// `started_at` is stamped by the registry, not the caller.
#[derive(Debug, Clone, Copy)]
pub enum LimitKind {
    Time(u64),
    Count(u64),
}

/// The per-host-input embedded sub-pipeline (spec §3 `TraceContext`), minus
/// the handle-count/destroy-flag bookkeeping the registry owns directly so
/// it can read and mutate them under the same lock that guards everything
/// else.
pub(crate) struct TraceContextInner {
    pub(crate) engine: Arc<Engine>,
    trace_prefix: String,
    trace_count: u64,
    limit: Limit,
    live_handles: u64,
    to_destroy: bool,
}

impl TraceContextInner {
    pub(crate) fn new(engine: Arc<Engine>, trace_prefix: String) -> Self {
        Self {
            engine,
            trace_prefix,
            trace_count: 0,
            limit: Limit::None,
            live_handles: 0,
            to_destroy: false,
        }
    }
}

#[derive(Default)]
struct HostInputSlot {
    ctx: Option<TraceContextInner>,
}

/// The gate: one `Mutex<HostInputSlot>` per host input name, and the
/// registry-level API every stage hook and control entry point goes
/// through. Held as `Arc<TraceRegistry>` so `TraceEvent` can carry a handle
/// back to it for its `Drop`-triggered `end_event` call.
#[derive(Default)]
pub struct TraceRegistry {
    slots: dashmap::DashMap<String, Mutex<HostInputSlot>>,
}

impl TraceRegistry {
    pub fn new() -> Self {
        Self {
            slots: dashmap::DashMap::new(),
        }
    }

    /// spec §4.1 `install`. Precondition: no context yet installed for this
    /// host input.
    #[cfg(test)]
    pub(crate) fn install(
        &self,
        host_input: &str,
        ctx: TraceContextInner,
    ) -> Result<(), TraceError> {
        self.install_with(host_input, move || Ok(ctx))
    }

    /// spec §4.1 `install`, generalized so the slot is reserved *before*
    /// `build` runs rather than after. `build` constructs (and, per spec
    /// §4.3, starts) the embedded engine; it only runs once this host
    /// input's gate is confirmed empty, and the gate stays held for the
    /// whole call, so two racing `new_context` calls for the same host
    /// input can never both build and start an engine — the loser returns
    /// `ResourceExhaustion` before allocating anything.
    pub(crate) fn install_with<F>(&self, host_input: &str, build: F) -> Result<(), TraceError>
    where
        F: FnOnce() -> Result<TraceContextInner, TraceError>,
    {
        let entry = self
            .slots
            .entry(host_input.to_string())
            .or_insert_with(|| Mutex::new(HostInputSlot::default()));
        let mut guard = entry.lock().unwrap();
        if guard.ctx.is_some() {
            return Err(TraceError::ResourceExhaustion(format!(
                "a trace context is already installed on {host_input}"
            )));
        }
        let ctx = build()?;
        guard.ctx = Some(ctx);
        Ok(())
    }

    /// `true` iff a live (not marked for destroy) context exists.
    pub fn has_live_context(&self, host_input: &str) -> bool {
        let Some(entry) = self.slots.get(host_input) else {
            return false;
        };
        let guard = entry.lock().unwrap();
        matches!(&guard.ctx, Some(ctx) if !ctx.to_destroy)
    }

    /// spec §4.1 `try_begin_event`. Returns `None` if there is no context,
    /// or it is marked for destroy. `plugin_alias` is captured here (rather
    /// than re-read from the host input at `on_pre_output` time, when the
    /// caller may no longer have it in scope) so later stages can still
    /// produce a 7-entry envelope for an aliased host input.
    pub(crate) fn try_begin_event(
        self: &Arc<Self>,
        host_input: &str,
        plugin_alias: Option<&str>,
    ) -> Option<TraceEvent> {
        let entry = self.slots.get(host_input)?;
        let mut guard = entry.lock().unwrap();
        let ctx = guard.ctx.as_mut()?;
        if ctx.to_destroy {
            return None;
        }
        let n = ctx.trace_count;
        ctx.trace_count += 1;
        ctx.live_handles += 1;
        let trace_id = format!("{}{n}", ctx.trace_prefix);
        let emitter = ctx.engine.emitter_input()?;
        Some(TraceEvent::new(
            self.clone(),
            host_input.to_string(),
            plugin_alias.map(|a| a.to_string()),
            trace_id,
            emitter,
        ))
    }

    /// spec §4.1 `end_event`, invoked from `TraceEvent::drop`. Decrements
    /// `live_handles`; if the context was marked for destroy and this was
    /// the last handle, tears it down. The "decide to free" step runs
    /// under the gate; the actual teardown (`Engine::stop`) runs after the
    /// guard is dropped, per §9's reentrant-gate guidance.
    pub(crate) fn end_event(&self, host_input: &str) {
        let Some(entry) = self.slots.get(host_input) else {
            return;
        };
        let finished = {
            let mut guard = entry.lock().unwrap();
            let Some(ctx) = guard.ctx.as_mut() else {
                return;
            };
            ctx.live_handles = ctx.live_handles.saturating_sub(1);
            if ctx.to_destroy && ctx.live_handles == 0 {
                guard.ctx.take()
            } else {
                None
            }
        };
        if let Some(ctx) = finished {
            teardown(ctx);
        }
    }

    /// spec §4.1 `set_limit`.
    pub fn set_limit(&self, host_input: &str, kind: LimitKind) -> Result<(), TraceError> {
        let entry = self.slots.get(host_input).ok_or_else(|| {
            TraceError::ConfigurationMissing(format!("no trace context on {host_input}"))
        })?;
        let mut guard = entry.lock().unwrap();
        let ctx = guard.ctx.as_mut().ok_or_else(|| {
            TraceError::ConfigurationMissing(format!("no trace context on {host_input}"))
        })?;
        ctx.limit = match kind {
            LimitKind::Time(window_seconds) => Limit::Time {
                started_at: now_seconds(),
                window_seconds,
            },
            LimitKind::Count(max_count) => Limit::Count { max_count },
        };
        Ok(())
    }

    /// spec §4.1 `limit_hit`. Every return path releases the slot's
    /// `MutexGuard` identically (it is scope-guarded), so the original's
    /// unlock-imbalance bug on the TIME branch (§9 Open Question b) cannot
    /// reoccur here.
    pub fn limit_hit(&self, host_input: &str) -> bool {
        let Some(entry) = self.slots.get(host_input) else {
            return false;
        };
        let guard = entry.lock().unwrap();
        match &guard.ctx {
            None => false,
            Some(ctx) => match ctx.limit {
                Limit::None => false,
                Limit::Count { max_count } => max_count <= ctx.trace_count,
                Limit::Time {
                    started_at,
                    window_seconds,
                } => now_seconds().saturating_sub(started_at) > window_seconds,
            },
        }
    }

    /// spec §4.1 `request_destroy` / §4.3 `destroy` — the two are the same
    /// operation: if handles are still outstanding, mark-and-pause; else
    /// tear down immediately. The control surface's `context_destroy` and
    /// a self-triggered limit hit both call this.
    pub fn request_destroy(&self, host_input: &str) {
        let Some(entry) = self.slots.get(host_input) else {
            return;
        };
        let finished = {
            let mut guard = entry.lock().unwrap();
            match guard.ctx.as_mut() {
                None => None,
                Some(ctx) => {
                    if ctx.live_handles > 0 {
                        ctx.to_destroy = true;
                        ctx.engine.pause_emitter();
                        None
                    } else {
                        guard.ctx.take()
                    }
                }
            }
        };
        if let Some(ctx) = finished {
            teardown(ctx);
        }
    }

    pub fn context_hit_limit(&self, host_input: &str) -> bool {
        self.limit_hit(host_input)
    }
}

/// The "do the free" step, factored out of "decide to free" (spec §9) so it
/// never runs while a slot's `MutexGuard` is held.
fn teardown(ctx: TraceContextInner) {
    ctx.engine.stop();
    log::debug!("trace context for engine {} torn down", ctx.engine.name());
}
