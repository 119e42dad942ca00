mod consensus_layer;
mod inflight;

pub use consensus_layer::ConsensusConfig;
pub use consensus_layer::ConsensusCreationError;
pub use consensus_layer::ConsensusLayer;
