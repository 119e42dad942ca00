mod api;
mod cache;
mod consensus;
mod layer;
mod server;
mod transfer;
mod twopc;
mod grpc {
    include!("../generated/layeredkv.rs");
}

pub use api::CacheOptions;
pub use api::ConsensusOptions;
pub use api::CoordinatorOptions;
pub use api::DisconnectPolicy;
pub use api::ParticipantOptions;
pub use cache::CacheConfig;
pub use cache::CacheCreationError;
pub use cache::LayerCache;
pub use consensus::ConsensusConfig;
pub use consensus::ConsensusCreationError;
pub use consensus::ConsensusLayer;
pub use layer::FlushFailure;
pub use layer::Layer;
pub use layer::LayerError;
pub use layer::MemoryStorage;
pub use layer::Source;
pub use layer::Stack;
pub use layer::Storage;
pub use layer::StorageError;
pub use transfer::Receiver;
pub use transfer::ReceiverConfig;
pub use transfer::Transmitter;
pub use transfer::TransmitterConfig;
pub use twopc::try_create_coordinator;
pub use twopc::AbortReason;
pub use twopc::CommitHandler;
pub use twopc::Coordinator;
pub use twopc::CoordinatorConfig;
pub use twopc::CoordinatorCreationError;
pub use twopc::Decision;
pub use twopc::Message;
pub use twopc::MessageType;
pub use twopc::Operation;
pub use twopc::OperationCodecError;
pub use twopc::OperationKind;
pub use twopc::Participant;
pub use twopc::ParticipantConfig;
pub use twopc::ParticipantConnectError;
pub use twopc::ParticipantId;
pub use twopc::Phase;
pub use twopc::RoundId;
pub use twopc::RoundListener;
pub use twopc::RoundSummary;
pub use twopc::UnknownMessageType;
