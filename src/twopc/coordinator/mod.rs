mod coordinator;
mod driver;
mod registry;
mod round;
mod round_listener;
mod service;
mod wiring;

pub use coordinator::Coordinator;
pub use round::Decision;
pub use round::RoundSummary;
pub use round_listener::RoundListener;
pub use wiring::try_create_coordinator;
pub use wiring::CoordinatorConfig;
pub use wiring::CoordinatorCreationError;
