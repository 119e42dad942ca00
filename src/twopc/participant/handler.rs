use crate::layer::LayerError;
use crate::twopc::{Operation, RoundId};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AbortReason {
    /// The coordinator broadcast GlobalAbort.
    GlobalAbort,
    /// No decision arrived before the participant's idle timeout.
    Abandoned,
}

/// Local side effects of the protocol. `commit` runs exactly once per committed round this
/// participant voted in.
#[async_trait::async_trait]
pub trait CommitHandler: Send + Sync {
    /// Called before voting. An error makes this participant vote Abort.
    async fn prepare(&self, _round: RoundId, _operation: &Operation) -> Result<(), LayerError> {
        Ok(())
    }

    async fn commit(&self, round: RoundId, operation: Operation) -> Result<(), LayerError>;

    /// Called for an operation this participant had voted to commit but which won't be.
    async fn abort(&self, _round: RoundId, _operation: Operation, _reason: AbortReason) {}
}
