use async_trait::async_trait;

use super::model::Chunk;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("output {0} failed to accept chunk: {1}")]
    Write(String, String),
}

/// An output plugin instance. Real sinks (the recognized telemetry sink
/// among them) would forward `write` over the network; this crate ships
/// two reference implementations used by the demo binary and the test
/// suite.
#[async_trait]
pub trait Output: Send + Sync {
    fn name(&self) -> &str;
    fn properties(&self) -> &std::collections::HashMap<String, String>;
    async fn write(&self, chunk: Chunk) -> Result<(), OutputError>;
}

/// Discards everything. Used when no output kind is configured, or in
/// tests that only care about what reached the emitter input.
pub struct NullOutput {
    name: String,
    properties: std::collections::HashMap<String, String>,
}

impl NullOutput {
    pub fn new(name: impl Into<String>, properties: std::collections::HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }
}

#[async_trait]
impl Output for NullOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> &std::collections::HashMap<String, String> {
        &self.properties
    }

    async fn write(&self, _chunk: Chunk) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Appends every chunk it receives to an in-memory log, guarded by a
/// tokio mutex the way `JsonlHandler` guards its file handle.
pub struct RecordingOutput {
    name: String,
    properties: std::collections::HashMap<String, String>,
    received: tokio::sync::Mutex<Vec<Chunk>>,
}

impl RecordingOutput {
    pub fn new(name: impl Into<String>, properties: std::collections::HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            properties,
            received: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub async fn drain(&self) -> Vec<Chunk> {
        std::mem::take(&mut *self.received.lock().await)
    }
}

#[async_trait]
impl Output for RecordingOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> &std::collections::HashMap<String, String> {
        &self.properties
    }

    async fn write(&self, chunk: Chunk) -> Result<(), OutputError> {
        self.received.lock().await.push(chunk);
        Ok(())
    }
}
