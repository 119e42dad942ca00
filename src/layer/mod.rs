mod layer;
mod source;
mod stack;
mod storage;

pub use layer::FlushFailure;
pub use layer::Layer;
pub use layer::LayerError;
pub use source::Source;
pub use stack::Stack;
pub use storage::MemoryStorage;
pub use storage::Storage;
pub use storage::StorageError;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
pub(crate) use test_utils::{wait_until, Call, RecordingLayer};
