use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Keys removed from a cache whose Remove hasn't reached the next layer yet. A read miss on a
/// tombstoned key must not fall through, or it would resurrect the old value.
///
/// Each Remove gets its own sequence number. The flusher clears a tombstone only when the Remove it
/// propagated is at least as new as the tombstone, so a newer Remove of the same key keeps hiding it.
#[derive(Default)]
pub(crate) struct Tombstones {
    keys: Mutex<HashMap<Bytes, u64>>,
    next_seq: AtomicU64,
}

impl Tombstones {
    /// Returns the sequence number to carry with the Remove.
    pub(crate) fn add(&self, key: Bytes) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel);
        self.keys
            .lock()
            .expect("Tombstones.add() mutex guard poison")
            .insert(key, seq);
        seq
    }

    pub(crate) fn contains(&self, key: &Bytes) -> bool {
        self.keys
            .lock()
            .expect("Tombstones.contains() mutex guard poison")
            .contains_key(key)
    }

    /// A Set supersedes any pending Remove of the key.
    pub(crate) fn clear(&self, key: &Bytes) {
        self.keys
            .lock()
            .expect("Tombstones.clear() mutex guard poison")
            .remove(key);
    }

    /// Called once the Remove tagged `seq` has been applied by the next layer.
    pub(crate) fn clear_flushed(&self, key: &Bytes, seq: u64) {
        let mut keys = self.keys.lock().expect("Tombstones.clear_flushed() mutex guard poison");
        if keys.get(key).map_or(false, |pending| *pending <= seq) {
            keys.remove(key);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.keys.lock().expect("Tombstones.len() mutex guard poison").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_remove_survives_older_flush() {
        let tombstones = Tombstones::default();
        let key = Bytes::from_static(b"k");

        let first = tombstones.add(key.clone());
        let second = tombstones.add(key.clone());
        assert!(second > first);

        tombstones.clear_flushed(&key, first);
        assert!(tombstones.contains(&key));

        tombstones.clear_flushed(&key, second);
        assert!(!tombstones.contains(&key));
        assert_eq!(tombstones.len(), 0);
    }

    #[test]
    fn set_clears_tombstone() {
        let tombstones = Tombstones::default();
        let key = Bytes::from_static(b"k");

        let seq = tombstones.add(key.clone());
        tombstones.clear(&key);
        assert!(!tombstones.contains(&key));

        // A late flush of the old Remove is harmless.
        tombstones.clear_flushed(&key, seq);
        assert_eq!(tombstones.len(), 0);
    }
}
