use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Process-wide counters for the trace subsystem. Counters are updated from
/// the hot (stage-hook) path, so every field is atomic rather than guarded
/// by a lock — the same shape `cognitod::metrics::Metrics` uses for its
/// event counters.
pub struct Metrics {
    pub start_time: SystemTime,
    pub envelopes_input_total: AtomicU64,
    pub envelopes_filter_total: AtomicU64,
    pub envelopes_pre_output_total: AtomicU64,
    pub decode_failures_total: AtomicU64,
    pub contexts_created_total: AtomicU64,
    pub contexts_destroyed_total: AtomicU64,
    pub limit_hits_total: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: SystemTime::now(),
            envelopes_input_total: AtomicU64::new(0),
            envelopes_filter_total: AtomicU64::new(0),
            envelopes_pre_output_total: AtomicU64::new(0),
            decode_failures_total: AtomicU64::new(0),
            contexts_created_total: AtomicU64::new(0),
            contexts_destroyed_total: AtomicU64::new(0),
            limit_hits_total: AtomicU64::new(0),
        }
    }

    pub fn record_envelope(&self, kind: crate::trace::EnvelopeKind) {
        use crate::trace::EnvelopeKind::*;
        let counter = match kind {
            Input => &self.envelopes_input_total,
            Filter => &self.envelopes_filter_total,
            PreOutput => &self.envelopes_pre_output_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_context_created(&self) {
        self.contexts_created_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_context_destroyed(&self) {
        self.contexts_destroyed_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_limit_hit(&self) {
        self.limit_hits_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "envelopes_input_total": self.envelopes_input_total.load(Ordering::Relaxed),
            "envelopes_filter_total": self.envelopes_filter_total.load(Ordering::Relaxed),
            "envelopes_pre_output_total": self.envelopes_pre_output_total.load(Ordering::Relaxed),
            "decode_failures_total": self.decode_failures_total.load(Ordering::Relaxed),
            "contexts_created_total": self.contexts_created_total.load(Ordering::Relaxed),
            "contexts_destroyed_total": self.contexts_destroyed_total.load(Ordering::Relaxed),
            "limit_hits_total": self.limit_hits_total.load(Ordering::Relaxed),
        })
    }
}
