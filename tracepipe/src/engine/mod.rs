//! A minimal embeddable log-pipeline engine.
//!
//! The spec treats "the host data-processing engine" as an external
//! collaborator this crate only calls into. Since nothing outside this
//! repository can be linked against, `Engine` plays both roles the spec
//! calls for: it is the outer engine the demo binary stands up, and its own
//! type is reused to build the embedded sub-engine a `TraceContext` owns —
//! mirroring the design note that "the host engine is reentrant enough to
//! host a second instance of itself" (spec §9). It carries none of a real
//! engine's plugin registry, scheduler, or config-file format; it exists to
//! give the trace subsystem somewhere real to plug into.

pub mod input;
pub mod model;
pub mod output;
pub mod router;
pub mod storage;

pub use input::{EmitterInput, FilterIdentity, Input, PluginIdentity};
pub use model::{Chunk, PackedRecords, Record};
pub use output::{NullOutput, Output, OutputError, RecordingOutput};
pub use router::RouteTable;
pub use storage::StorageContext;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc::UnboundedReceiver, oneshot};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no output named {0} is registered on this engine")]
    NoSuchOutput(String),
}

/// One engine instance: a storage context, at most one emitter input (this
/// crate never needs more than one per engine), at most one output, and a
/// direct-route table between them. An engine does nothing until `start` is
/// called, and stops draining (without losing already-enqueued chunks)
/// when `stop` is called.
pub struct Engine {
    name: String,
    flush_interval: Duration,
    grace_period: Duration,
    storage: Arc<StorageContext>,
    router: RouteTable,
    emitter: Mutex<Option<Arc<EmitterInput>>>,
    emitter_rx: Mutex<Option<UnboundedReceiver<Chunk>>>,
    output: Mutex<Option<Arc<dyn Output>>>,
    running: AtomicBool,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    drain_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Engine {
    pub fn new(name: impl Into<String>, flush_interval: Duration, grace_period: Duration) -> Self {
        let name = name.into();
        Self {
            storage: Arc::new(StorageContext::new(format!("{name}-storage"))),
            name,
            flush_interval,
            grace_period,
            router: RouteTable::new(),
            emitter: Mutex::new(None),
            emitter_rx: Mutex::new(None),
            output: Mutex::new(None),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            drain_thread: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn storage(&self) -> Arc<StorageContext> {
        self.storage.clone()
    }

    /// Register an internal emitter input, "declared to carry log-type
    /// events tagged as trace-bearing" per spec §4.3 step 3 — this engine
    /// never implements any other kind.
    pub fn register_emitter_input(
        &self,
        name: impl Into<String>,
        alias: Option<String>,
    ) -> Arc<EmitterInput> {
        let (input, rx) = EmitterInput::new(name, alias);
        let input = Arc::new(input);
        *self.emitter.lock().unwrap() = Some(input.clone());
        *self.emitter_rx.lock().unwrap() = Some(rx);
        input
    }

    pub fn emitter_input(&self) -> Option<Arc<EmitterInput>> {
        self.emitter.lock().unwrap().clone()
    }

    pub fn register_output(&self, output: Arc<dyn Output>) {
        *self.output.lock().unwrap() = Some(output);
    }

    /// Bind a direct route between the emitter input and the currently
    /// registered output, bypassing tag matching entirely (spec §4.3 step
    /// 6). Fails if no output with that name is registered.
    pub fn route(&self, input_name: &str, output_name: &str) -> Result<(), EngineError> {
        let bound = self
            .output
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|o| o.name() == output_name);
        if !bound {
            return Err(EngineError::NoSuchOutput(output_name.to_string()));
        }
        self.router.bind(input_name, output_name);
        Ok(())
    }

    /// Start the drain loop on its own OS thread, running its own
    /// single-threaded Tokio runtime rather than riding whatever async
    /// runtime the caller happens to be inside — spec §5: "the embedded
    /// engine runs its own scheduler threads". This is what lets
    /// `trace::context::new_context` (and every plain `#[test]` that calls
    /// it) start an embedded engine without the calling thread itself being
    /// inside a Tokio reactor. Idempotent — calling it twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(rx) = self.emitter_rx.lock().unwrap().take() else {
            return;
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown.lock().unwrap() = Some(shutdown_tx);
        let engine = self.clone();
        let handle = std::thread::Builder::new()
            .name(format!("{}-drain", engine.name))
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build the drain loop's runtime");
                rt.block_on(engine.drain_loop(rx, shutdown_rx));
            })
            .expect("failed to spawn the drain thread");
        *self.drain_thread.lock().unwrap() = Some(handle);
    }

    async fn drain_loop(
        self: Arc<Self>,
        mut rx: UnboundedReceiver<Chunk>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        loop {
            let chunk = tokio::select! {
                _ = &mut shutdown_rx => break,
                chunk = rx.recv() => chunk,
            };
            let Some(chunk) = chunk else { break };
            self.storage.record_chunk();
            let Some(output_name) = self.router.route_for(&chunk.input_name) else {
                log::debug!(
                    "engine {}: no route for input {}, dropping chunk",
                    self.name,
                    chunk.input_name
                );
                continue;
            };
            let output = self.output.lock().unwrap().clone();
            match output {
                Some(output) if output.name() == output_name => {
                    if let Err(err) = output.write(chunk).await {
                        log::warn!("engine {}: output write failed: {err}", self.name);
                    }
                }
                _ => log::debug!(
                    "engine {}: route points at unknown output {output_name}",
                    self.name
                ),
            }
        }
    }

    /// Pause the emitter input without stopping the drain loop, so chunks
    /// already in flight still reach the output.
    pub fn pause_emitter(&self) {
        if let Some(input) = self.emitter.lock().unwrap().as_ref() {
            input.pause();
        }
    }

    /// Stop the engine: signal the drain thread to exit its select loop and
    /// join it. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.pause_emitter();
        if let Some(tx) = self.shutdown.lock().unwrap().take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.drain_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}
