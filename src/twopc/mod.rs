mod coordinator;
mod message;
mod operation;
mod participant;
mod phase;

pub use coordinator::try_create_coordinator;
pub use coordinator::Coordinator;
pub use coordinator::CoordinatorConfig;
pub use coordinator::CoordinatorCreationError;
pub use coordinator::Decision;
pub use coordinator::RoundListener;
pub use coordinator::RoundSummary;
pub use message::Message;
pub use message::MessageType;
pub use message::ParticipantId;
pub use message::RoundId;
pub use message::UnknownMessageType;
pub use operation::Operation;
pub use operation::OperationCodecError;
pub use operation::OperationKind;
pub use participant::AbortReason;
pub use participant::CommitHandler;
pub use participant::Participant;
pub use participant::ParticipantConfig;
pub use participant::ParticipantConnectError;
pub use phase::Phase;
