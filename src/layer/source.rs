use crate::layer::{Layer, LayerError, Storage};
use bytes::Bytes;
use std::sync::Arc;

/// Source is the terminal (bottom) layer of every stack. It talks to its storage backend directly
/// and has nothing to propagate to, so `sync` is a no-op.
pub struct Source {
    storage: Arc<dyn Storage>,
}

impl Source {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Source { storage }
    }
}

#[async_trait::async_trait]
impl Layer for Source {
    async fn get(&self, key: &Bytes) -> Result<Bytes, LayerError> {
        self.storage.get(key)?.ok_or(LayerError::NotFound)
    }

    async fn set(&self, key: Bytes, value: Bytes) -> Result<(), LayerError> {
        self.storage.add(key, value)?;
        Ok(())
    }

    async fn remove(&self, key: &Bytes) -> Result<(), LayerError> {
        self.storage.remove(key)?;
        Ok(())
    }

    async fn sync(&self) -> Result<(), LayerError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), LayerError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), LayerError> {
        Ok(())
    }

    fn set_next(&self, _next: Arc<dyn Layer>) -> Result<(), LayerError> {
        Err(LayerError::TerminalLayer)
    }
}
