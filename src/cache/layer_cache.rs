use crate::api::{CacheOptions, CacheOptionsValidated};
use crate::cache::buffer::FlushOperation;
use crate::cache::flusher::Flusher;
use crate::cache::tombstones::Tombstones;
use crate::layer::{Layer, LayerError, Storage};
use bytes::Bytes;
use std::convert::TryFrom;
use std::sync::{Arc, OnceLock};

pub struct CacheConfig {
    pub logger: slog::Logger,
    pub storage: Arc<dyn Storage>,
    pub options: CacheOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheCreationError {
    #[error("Illegal options for configuring cache: {0}")]
    IllegalCacheOptions(String),
}

/// LayerCache serves reads from its local storage, falling through to the next layer on a miss,
/// and writes back to the next layer asynchronously through a `Flusher`.
///
/// Without a next layer the cache is itself the terminal store.
pub struct LayerCache {
    logger: slog::Logger,
    storage: Arc<dyn Storage>,
    options: CacheOptionsValidated,
    next: OnceLock<Arc<dyn Layer>>,
    flusher: OnceLock<Flusher>,
    // Cleared by the flusher as each Remove reaches the next layer.
    tombstones: Arc<Tombstones>,
}

impl LayerCache {
    pub fn try_new(config: CacheConfig) -> Result<Self, CacheCreationError> {
        let options = CacheOptionsValidated::try_from(config.options)
            .map_err(|e| CacheCreationError::IllegalCacheOptions(e.to_string()))?;

        Ok(LayerCache {
            logger: config.logger,
            storage: config.storage,
            options,
            next: OnceLock::new(),
            flusher: OnceLock::new(),
            tombstones: Arc::new(Tombstones::default()),
        })
    }

    fn flusher(&self) -> Result<&Flusher, LayerError> {
        self.flusher.get().ok_or(LayerError::NotStarted)
    }
}

#[async_trait::async_trait]
impl Layer for LayerCache {
    async fn get(&self, key: &Bytes) -> Result<Bytes, LayerError> {
        if let Some(value) = self.storage.get(key)? {
            return Ok(value);
        }

        let next = self.next.get().ok_or(LayerError::NotFound)?;
        if self.tombstones.contains(key) {
            return Err(LayerError::NotFound);
        }
        let value = next.get(key).await?;
        // Local population only, never re-forwarded.
        self.storage.add(key.clone(), value.clone())?;
        Ok(value)
    }

    async fn set(&self, key: Bytes, value: Bytes) -> Result<(), LayerError> {
        self.storage.add(key.clone(), value.clone())?;
        if self.next.get().is_none() {
            return Ok(());
        }

        self.tombstones.clear(&key);
        self.flusher()?.enqueue(key, FlushOperation::Set(value)).await
    }

    async fn remove(&self, key: &Bytes) -> Result<(), LayerError> {
        self.storage.remove(key)?;
        if self.next.get().is_none() {
            return Ok(());
        }

        let flusher = self.flusher()?;
        let seq = self.tombstones.add(key.clone());
        flusher.enqueue(key.clone(), FlushOperation::Remove(seq)).await
    }

    async fn sync(&self) -> Result<(), LayerError> {
        if self.next.get().is_none() {
            return Ok(());
        }

        self.flusher()?.sync().await
    }

    async fn start(&self) -> Result<(), LayerError> {
        let next = match self.next.get() {
            Some(next) => next.clone(),
            None => return Ok(()),
        };

        let logger = self.logger.new(slog::o!("Component" => "Flusher"));
        if self.flusher.set(Flusher::spawn(logger, next, self.tombstones.clone(), &self.options)).is_err() {
            slog::warn!(self.logger, "Cache already started");
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), LayerError> {
        if let Some(flusher) = self.flusher.get() {
            flusher.stop().await;
        }
        Ok(())
    }

    fn set_next(&self, next: Arc<dyn Layer>) -> Result<(), LayerError> {
        self.next.set(next).map_err(|_| LayerError::NextLayerAlreadySet)
    }
}
