use crate::layer::LayerError;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

pub(super) type ResultReceiver = oneshot::Receiver<Result<(), LayerError>>;

/// Correlation ID -> the blocked caller waiting on that operation's outcome.
#[derive(Default)]
pub(super) struct InFlight {
    waiters: Mutex<HashMap<String, oneshot::Sender<Result<(), LayerError>>>>,
}

impl InFlight {
    pub(super) fn register(&self, correlation_id: String) -> ResultReceiver {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .expect("InFlight.register() mutex guard poison")
            .insert(correlation_id, tx);
        rx
    }

    /// Returns false if nobody on this node is waiting on `correlation_id`.
    pub(super) fn complete(&self, correlation_id: &str, result: Result<(), LayerError>) -> bool {
        let waiter = self
            .waiters
            .lock()
            .expect("InFlight.complete() mutex guard poison")
            .remove(correlation_id);

        match waiter {
            Some(waiter) => {
                let _ = waiter.send(result);
                true
            }
            None => false,
        }
    }

    pub(super) fn forget(&self, correlation_id: &str) {
        self.waiters
            .lock()
            .expect("InFlight.forget() mutex guard poison")
            .remove(correlation_id);
    }

    pub(super) fn len(&self) -> usize {
        self.waiters.lock().expect("InFlight.len() mutex guard poison").len()
    }
}
