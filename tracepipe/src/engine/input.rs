use tokio::sync::mpsc;

use super::model::Chunk;

/// Anything with a stable name and an optional operator-assigned alias.
/// Host inputs and filters both implement this, since the trace envelope
/// only ever needs to know a plugin's identity, never its full behavior.
pub trait PluginIdentity: Send + Sync {
    fn name(&self) -> &str;
    fn alias(&self) -> Option<&str>;
}

/// An input plugin instance registered on an [`Engine`](super::Engine).
///
/// Most inputs in a real pipeline poll an external source on a timer. The
/// only kind this crate implements is the *emitter* input: a passive input
/// whose records arrive via [`EmitterInput::add_record`] rather than being
/// pulled from anywhere.
pub trait Input: PluginIdentity {
    /// Pausing an input stops it from accepting new chunks without tearing
    /// it down; a context nearing destroy pauses its emitter this way.
    fn pause(&self);
    fn is_paused(&self) -> bool;
}

/// A named, aliasable filter instance, as passed by the host engine into
/// `on_filter`. This crate does not implement filter behavior (filters are
/// an external collaborator per the spec's §1 scope) — only the identity a
/// filter needs to carry into a FILTER envelope.
pub struct FilterIdentity {
    name: String,
    alias: Option<String>,
}

impl FilterIdentity {
    pub fn new(name: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            name: name.into(),
            alias,
        }
    }
}

impl PluginIdentity for FilterIdentity {
    fn name(&self) -> &str {
        &self.name
    }

    fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
}

/// A passive input that accepts records pushed directly from the trace
/// stage hooks, bypassing tag-based source discovery entirely.
pub struct EmitterInput {
    name: String,
    alias: Option<String>,
    paused: std::sync::atomic::AtomicBool,
    sender: mpsc::UnboundedSender<Chunk>,
}

impl EmitterInput {
    pub fn new(name: impl Into<String>, alias: Option<String>) -> (Self, mpsc::UnboundedReceiver<Chunk>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                alias,
                paused: std::sync::atomic::AtomicBool::new(false),
                sender,
            },
            receiver,
        )
    }

    /// Enqueue a chunk for delivery to whatever this input is routed to.
    /// Returns `false` (without enqueuing) once paused or once the drain
    /// side has been torn down.
    pub fn add_record(&self, chunk: Chunk) -> bool {
        if self.is_paused() {
            return false;
        }
        self.sender.send(chunk).is_ok()
    }
}

impl PluginIdentity for EmitterInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
}

impl Input for EmitterInput {
    fn pause(&self) {
        self.paused.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(std::sync::atomic::Ordering::SeqCst)
    }
}
