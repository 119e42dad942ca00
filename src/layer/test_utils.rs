use crate::layer::{Layer, LayerError, MemoryStorage, Storage, StorageError};
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Call {
    Set(Bytes, Bytes),
    Remove(Bytes),
    Sync,
}

/// Terminal layer that journals every data call it receives and can be told to fail writes for
/// specific keys.
#[derive(Default)]
pub(crate) struct RecordingLayer {
    calls: Mutex<Vec<Call>>,
    storage: MemoryStorage,
    failing_keys: Mutex<HashSet<Bytes>>,
}

impl RecordingLayer {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(RecordingLayer::default())
    }

    pub(crate) fn fail_key(&self, key: &'static [u8]) {
        self.failing_keys.lock().unwrap().insert(Bytes::from_static(key));
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn stored(&self, key: &'static [u8]) -> Option<Bytes> {
        self.storage.get(&Bytes::from_static(key)).unwrap()
    }

    /// Waits (with a sanity timeout) until at least `count` calls have been journaled.
    pub(crate) async fn wait_for_calls(&self, count: usize) -> Vec<Call> {
        let wait = async {
            loop {
                let calls = self.calls();
                if calls.len() >= count {
                    return calls;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };

        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("Unexpected timeout")
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_key(&self, key: &Bytes) -> Result<(), LayerError> {
        if self.failing_keys.lock().unwrap().contains(key) {
            return Err(StorageError::Backend("injected failure".to_string()).into());
        }
        Ok(())
    }
}

/// Polls `condition` until it holds, with the same sanity timeout as `wait_for_calls`.
pub(crate) async fn wait_until<F: Fn() -> bool>(condition: F) {
    let wait = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };

    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("Unexpected timeout")
}

#[async_trait::async_trait]
impl Layer for RecordingLayer {
    async fn get(&self, key: &Bytes) -> Result<Bytes, LayerError> {
        self.storage.get(key)?.ok_or(LayerError::NotFound)
    }

    async fn set(&self, key: Bytes, value: Bytes) -> Result<(), LayerError> {
        self.check_key(&key)?;
        self.record(Call::Set(key.clone(), value.clone()));
        self.storage.add(key, value)?;
        Ok(())
    }

    async fn remove(&self, key: &Bytes) -> Result<(), LayerError> {
        self.check_key(key)?;
        self.record(Call::Remove(key.clone()));
        self.storage.remove(key)?;
        Ok(())
    }

    async fn sync(&self) -> Result<(), LayerError> {
        self.record(Call::Sync);
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
