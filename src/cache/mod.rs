mod buffer;
mod flusher;
mod layer_cache;
mod tombstones;

pub use layer_cache::CacheConfig;
pub use layer_cache::CacheCreationError;
pub use layer_cache::LayerCache;
