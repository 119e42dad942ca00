//! Client-facing configuration surface shared by every component.
mod options;

pub use options::CacheOptions;
pub use options::ConsensusOptions;
pub use options::CoordinatorOptions;
pub use options::DisconnectPolicy;
pub use options::ParticipantOptions;

pub(crate) use options::CacheOptionsValidated;
pub(crate) use options::ConsensusOptionsValidated;
pub(crate) use options::CoordinatorOptionsValidated;
pub(crate) use options::ParticipantOptionsValidated;
