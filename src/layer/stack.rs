use crate::layer::{Layer, LayerError};
use bytes::Bytes;
use std::sync::Arc;

/// Stack exclusively owns an ordered list of layers. Each pushed layer is wired to the previous top
/// as its next layer, so the first layer pushed must be a terminal one (e.g. `Source`).
#[derive(Default)]
pub struct Stack {
    // Bottom first.
    layers: Vec<Arc<dyn Layer>>,
}

impl Stack {
    pub fn new() -> Self {
        Stack::default()
    }

    pub fn push(&mut self, layer: Arc<dyn Layer>) -> Result<(), LayerError> {
        if let Some(top) = self.layers.last() {
            layer.set_next(top.clone())?;
        }
        self.layers.push(layer);
        Ok(())
    }

    pub fn top(&self) -> Result<&Arc<dyn Layer>, LayerError> {
        self.layers.last().ok_or(LayerError::EmptyStack)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Starts layers bottom-up so a layer never runs before the layer it delegates to.
    pub async fn start(&self) -> Result<(), LayerError> {
        for layer in self.layers.iter() {
            layer.start().await?;
        }
        Ok(())
    }

    /// Stops layers top-down so upper layers can drain into lower layers that are still running.
    /// Every layer is stopped even if one fails; the first error is returned.
    pub async fn stop(&self) -> Result<(), LayerError> {
        let mut first_error = None;
        for layer in self.layers.iter().rev() {
            if let Err(e) = layer.stop().await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn get(&self, key: &Bytes) -> Result<Bytes, LayerError> {
        self.top()?.get(key).await
    }

    pub async fn set(&self, key: Bytes, value: Bytes) -> Result<(), LayerError> {
        self.top()?.set(key, value).await
    }

    pub async fn remove(&self, key: &Bytes) -> Result<(), LayerError> {
        self.top()?.remove(key).await
    }

    pub async fn sync(&self) -> Result<(), LayerError> {
        self.top()?.sync().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{MemoryStorage, Source};
    use std::sync::Mutex;

    /// Records lifecycle calls into a shared journal and forwards data calls to its next layer.
    struct JournalLayer {
        name: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
        next: Mutex<Option<Arc<dyn Layer>>>,
    }

    impl JournalLayer {
        fn new(name: &'static str, journal: Arc<Mutex<Vec<String>>>) -> Self {
            JournalLayer {
                name,
                journal,
                next: Mutex::new(None),
            }
        }

        fn record(&self, event: &str) {
            self.journal.lock().unwrap().push(format!("{}:{}", event, self.name));
        }

        fn next(&self) -> Arc<dyn Layer> {
            self.next.lock().unwrap().clone().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl Layer for JournalLayer {
        async fn get(&self, key: &Bytes) -> Result<Bytes, LayerError> {
            self.next().get(key).await
        }

        async fn set(&self, key: Bytes, value: Bytes) -> Result<(), LayerError> {
            self.next().set(key, value).await
        }

        async fn remove(&self, key: &Bytes) -> Result<(), LayerError> {
            self.next().remove(key).await
        }

        async fn sync(&self) -> Result<(), LayerError> {
            self.next().sync().await
        }

        async fn start(&self) -> Result<(), LayerError> {
            self.record("start");
            Ok(())
        }

        async fn stop(&self) -> Result<(), LayerError> {
            self.record("stop");
            Ok(())
        }

        fn set_next(&self, next: Arc<dyn Layer>) -> Result<(), LayerError> {
            self.next.lock().unwrap().replace(next);
            Ok(())
        }
    }

    #[tokio::test]
    async fn lifecycle_order_and_delegation() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut stack = Stack::new();
        stack.push(Arc::new(Source::new(Arc::new(MemoryStorage::new())))).unwrap();
        stack.push(Arc::new(JournalLayer::new("lower", journal.clone()))).unwrap();
        stack.push(Arc::new(JournalLayer::new("upper", journal.clone()))).unwrap();
        assert_eq!(stack.len(), 3);

        stack.start().await.unwrap();
        stack.set(Bytes::from_static(b"k"), Bytes::from_static(b"v")).await.unwrap();
        assert_eq!(stack.get(&Bytes::from_static(b"k")).await.unwrap(), Bytes::from_static(b"v"));
        stack.stop().await.unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["start:lower", "start:upper", "stop:upper", "stop:lower"]
        );
    }

    #[tokio::test]
    async fn empty_stack_and_terminal_misuse() {
        let mut stack = Stack::new();
        assert!(matches!(stack.sync().await, Err(LayerError::EmptyStack)));

        stack.push(Arc::new(Source::new(Arc::new(MemoryStorage::new())))).unwrap();
        let result = stack.push(Arc::new(Source::new(Arc::new(MemoryStorage::new()))));
        assert!(matches!(result, Err(LayerError::TerminalLayer)));
        assert_eq!(stack.len(), 1);
    }
}
