mod handler;
mod participant;
mod state;

pub use handler::AbortReason;
pub use handler::CommitHandler;
pub use participant::Participant;
pub use participant::ParticipantConfig;
pub use participant::ParticipantConnectError;
