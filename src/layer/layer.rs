use crate::layer::StorageError;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// A single, independently replaceable level of the key-value access path. Every layer optionally
/// delegates to a `next` (lower, more durable) layer which is assigned exactly once while the stack
/// is being built.
#[async_trait::async_trait]
pub trait Layer: Send + Sync {
    async fn get(&self, key: &Bytes) -> Result<Bytes, LayerError>;

    async fn set(&self, key: Bytes, value: Bytes) -> Result<(), LayerError>;

    async fn remove(&self, key: &Bytes) -> Result<(), LayerError>;

    /// Blocks until every write accepted by this layer (and every layer below it) has been
    /// propagated.
    async fn sync(&self) -> Result<(), LayerError>;

    async fn start(&self) -> Result<(), LayerError>;

    async fn stop(&self) -> Result<(), LayerError>;

    fn set_next(&self, next: Arc<dyn Layer>) -> Result<(), LayerError>;
}

/// Errors cross task boundaries (flusher replies, consensus correlation channels), so they are
/// `Clone` and only carry owned, cheap data.
#[derive(Clone, Debug, thiserror::Error)]
pub enum LayerError {
    #[error("Key not found")]
    NotFound,
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("Failed to encode or decode payload: {0}")]
    Encoding(String),
    #[error("Terminal layer can't have a next layer")]
    TerminalLayer,
    #[error("Next layer has already been set")]
    NextLayerAlreadySet,
    #[error("Layer requires a next layer")]
    NoNextLayer,
    #[error("Layer stack is empty")]
    EmptyStack,
    #[error("Layer has not been started")]
    NotStarted,
    #[error("Operation is not supported by this layer: {0}")]
    Unsupported(&'static str),
    #[error("{} buffered operation(s) failed to flush", .failures.len())]
    Flush { failures: Vec<FlushFailure> },
    #[error("Flusher task has exited")]
    FlusherStopped,
    #[error("Round {round} was aborted")]
    Aborted { round: u64 },
    #[error("Timed out waiting for the operation's commit result")]
    ResultTimeout,
    #[error("Coordinator rejected request: {0}")]
    Request(String),
    #[error("Transport failure: {0}")]
    Transport(String),
}

#[derive(Clone)]
pub struct FlushFailure {
    pub key: Bytes,
    pub error: LayerError,
}

impl fmt::Debug for FlushFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.key, self.error)
    }
}
