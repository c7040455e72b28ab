use std::sync::atomic::{AtomicU64, Ordering};

/// Stand-in for the host engine's chunk-storage backend (an external
/// collaborator per the spec's §1 scope — "the storage chunk library").
/// Each [`Engine`](super::Engine) owns one, created independently of any
/// other engine's storage so trace chunks never mingle with the host's own
/// buffered chunks. This crate does not implement spill-to-disk or memory
/// accounting; it exists so `TraceContext` has something concrete to bind
/// its emitter input to, as §4.3 step 3 requires.
pub struct StorageContext {
    name: String,
    chunks_seen: AtomicU64,
}

impl StorageContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chunks_seen: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_chunk(&self) {
        self.chunks_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunks_seen(&self) -> u64 {
        self.chunks_seen.load(Ordering::Relaxed)
    }
}
