use bytes::Bytes;
use std::collections::HashMap;

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum FlushOperation {
    Set(Bytes),
    /// Carries the sequence number of the tombstone it clears once applied.
    Remove(u64),
}

#[derive(Debug)]
pub(crate) struct FlushEntry {
    pub key: Bytes,
    pub operation: FlushOperation,
}

/// Deduplicating window of pending operations. Only the latest operation per key survives until
/// the next flush.
pub(crate) struct FlushBuffer {
    queue: HashMap<Bytes, FlushOperation>,
    limit: usize,
}

impl FlushBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        FlushBuffer {
            queue: HashMap::with_capacity(limit + 1),
            limit,
        }
    }

    /// Returns true once the buffer holds more distinct keys than its limit and must be flushed.
    pub(crate) fn insert(&mut self, entry: FlushEntry) -> bool {
        self.queue.insert(entry.key, entry.operation);
        self.queue.len() > self.limit
    }

    pub(crate) fn take(&mut self) -> HashMap<Bytes, FlushOperation> {
        std::mem::replace(&mut self.queue, HashMap::with_capacity(self.limit + 1))
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(key: &'static [u8], value: &'static [u8]) -> FlushEntry {
        FlushEntry {
            key: Bytes::from_static(key),
            operation: FlushOperation::Set(Bytes::from_static(value)),
        }
    }

    #[test]
    fn last_write_wins() {
        let mut buffer = FlushBuffer::new(5);
        assert!(!buffer.insert(set(b"k", b"1")));
        assert!(!buffer.insert(set(b"k", b"2")));
        assert_eq!(buffer.len(), 1);

        let drained = buffer.take();
        assert_eq!(
            drained.get(&Bytes::from_static(b"k")),
            Some(&FlushOperation::Set(Bytes::from_static(b"2")))
        );
        assert!(buffer.is_empty());

        buffer.insert(set(b"k", b"3"));
        buffer.insert(FlushEntry {
            key: Bytes::from_static(b"k"),
            operation: FlushOperation::Remove(0),
        });
        assert_eq!(buffer.take().get(&Bytes::from_static(b"k")), Some(&FlushOperation::Remove(0)));
    }

    #[test]
    fn reports_full_only_past_limit() {
        let mut buffer = FlushBuffer::new(5);
        let keys: [&'static [u8]; 6] = [b"a", b"b", b"c", b"d", b"e", b"f"];
        for key in keys[..5].iter() {
            assert!(!buffer.insert(set(key, b"v")));
        }
        // Rewriting an existing key doesn't grow the window.
        assert!(!buffer.insert(set(b"a", b"w")));
        assert!(buffer.insert(set(keys[5], b"v")));
    }
}
