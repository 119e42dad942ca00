mod receiver;
mod transmitter;

pub use receiver::Receiver;
pub use receiver::ReceiverConfig;
pub use transmitter::Transmitter;
pub use transmitter::TransmitterConfig;
