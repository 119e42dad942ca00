use crate::twopc::coordinator::RoundSummary;
use tokio::sync::watch;

pub(super) fn new() -> (RoundNotifier, RoundListener) {
    let (snd, rcv) = watch::channel(None);

    (RoundNotifier { snd }, RoundListener { rcv })
}

pub(super) struct RoundNotifier {
    snd: watch::Sender<Option<RoundSummary>>,
}

impl RoundNotifier {
    pub(super) fn notify_round_completed(&self, summary: RoundSummary) {
        let _ = self.snd.send(Some(summary));
    }
}

/// Observes completed coordinator rounds. Like any watch channel it doesn't queue: rounds that
/// complete between two calls to `next()` are clobbered into the most recent one.
#[derive(Clone)]
pub struct RoundListener {
    rcv: watch::Receiver<Option<RoundSummary>>,
}

impl RoundListener {
    /// Returns the next completed round, or None once the coordinator has shut down.
    pub async fn next(&mut self) -> Option<RoundSummary> {
        loop {
            if self.rcv.changed().await.is_err() {
                return None;
            }
            if let Some(summary) = self.rcv.borrow().clone() {
                return Some(summary);
            }
        }
    }

    /// The most recently completed round, if any.
    pub fn latest(&self) -> Option<RoundSummary> {
        self.rcv.borrow().clone()
    }
}
