use crate::api::CoordinatorOptionsValidated;
use crate::twopc::coordinator::registry::ParticipantRegistry;
use crate::twopc::coordinator::round::{Decision, Round};
use crate::twopc::coordinator::round_listener::RoundNotifier;
use crate::twopc::{Message, MessageType, ParticipantId, Phase, RoundId};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

/// RoundDriver is the only task that owns round state. Client requests are processed strictly one
/// at a time, each as a full vote/decision/ACK round.
pub(super) struct RoundDriver {
    logger: slog::Logger,
    registry: Arc<ParticipantRegistry>,
    requests: mpsc::Receiver<Bytes>,
    inbound: mpsc::UnboundedReceiver<Message>,
    notifier: RoundNotifier,
    vote_timeout: Duration,
    ack_timeout: Duration,
    next_round: RoundId,
}

enum IdleEvent {
    Request(Bytes),
    Stale(Message),
    Closed,
}

impl RoundDriver {
    pub(super) fn new(
        logger: slog::Logger,
        registry: Arc<ParticipantRegistry>,
        requests: mpsc::Receiver<Bytes>,
        inbound: mpsc::UnboundedReceiver<Message>,
        notifier: RoundNotifier,
        options: &CoordinatorOptionsValidated,
    ) -> Self {
        RoundDriver {
            logger,
            registry,
            requests,
            inbound,
            notifier,
            vote_timeout: options.vote_timeout,
            ack_timeout: options.ack_timeout,
            next_round: RoundId::first(),
        }
    }

    pub(super) async fn run(mut self) {
        loop {
            let event = tokio::select! {
                request = self.requests.recv() => match request {
                    Some(payload) => IdleEvent::Request(payload),
                    None => IdleEvent::Closed,
                },
                Some(message) = self.inbound.recv() => IdleEvent::Stale(message),
            };

            match event {
                IdleEvent::Request(payload) => self.run_round(payload).await,
                IdleEvent::Stale(message) => {
                    slog::debug!(
                        self.logger,
                        "Ignoring {:?} for round {:?} from participant {:?} while idle",
                        message.kind,
                        message.round,
                        message.participant
                    );
                }
                IdleEvent::Closed => break,
            }
        }

        slog::info!(self.logger, "Round driver has exited");
    }

    async fn run_round(&mut self, payload: Bytes) {
        let number = self.next_round;
        self.next_round = number.next();

        let participants = self.registry.begin_round(number);
        let mut round = Round::new(number, participants);
        let logger = self.logger.new(slog::o!("Round" => number.as_u64()));

        round.set_phase(Phase::Wait);
        slog::debug!(logger, "Requesting votes from {} participants", round.participants().len());
        let request = Message::new(MessageType::VoteRequest, number, ParticipantId::new(0)).with_value(payload);
        self.registry.broadcast(round.participants(), &request);
        self.collect_votes(&logger, &mut round).await;

        let decision = round.decision();
        let global = match decision {
            Decision::Commit => {
                round.set_phase(Phase::Commit);
                MessageType::GlobalCommit
            }
            Decision::Abort => {
                round.set_phase(Phase::Abort);
                MessageType::GlobalAbort
            }
        };
        slog::info!(logger, "Round decided: {}", round.phase());
        self.registry
            .broadcast(round.participants(), &Message::new(global, number, ParticipantId::new(0)));
        self.wait_for_acks(&logger, &mut round).await;

        round.set_phase(Phase::Init);
        self.notifier.notify_round_completed(round.summary());
    }

    /// Returns once every participant voted, anyone voted Abort, or the vote timeout elapsed.
    async fn collect_votes(&mut self, logger: &slog::Logger, round: &mut Round) {
        let deadline = Instant::now() + self.vote_timeout;

        while !round.all_votes_in() && !round.any_abort_vote() {
            match tokio::time::timeout_at(deadline, self.inbound.recv()).await {
                Ok(Some(message)) => {
                    if let Err(rejection) = round.record_vote(&message) {
                        slog::debug!(logger, "Ignored vote {:?}: {:?}", message, rejection);
                    }
                }
                Ok(None) => return,
                Err(_) => {
                    slog::debug!(logger, "Vote timeout, treating missing votes as abort");
                    return;
                }
            }
        }
    }

    /// The decision is already made, the ACK timeout only bounds when the next round may start.
    async fn wait_for_acks(&mut self, logger: &slog::Logger, round: &mut Round) {
        let deadline = Instant::now() + self.ack_timeout;

        while !round.all_acks_in() {
            match tokio::time::timeout_at(deadline, self.inbound.recv()).await {
                Ok(Some(message)) => {
                    if let Err(rejection) = round.record_ack(&message) {
                        slog::debug!(logger, "Ignored ACK {:?}: {:?}", message, rejection);
                    }
                }
                Ok(None) => return,
                Err(_) => {
                    slog::debug!(logger, "ACK timeout for round {:?}", round.number());
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CoordinatorOptions;
    use crate::grpc::ProtoMessage;
    use crate::twopc::coordinator::round_listener::{self, RoundListener};
    use crate::twopc::coordinator::RoundSummary;
    use std::convert::TryFrom;
    use tonic::Status;

    struct FakeParticipant {
        id: ParticipantId,
        outbound: mpsc::UnboundedReceiver<Result<ProtoMessage, Status>>,
    }

    impl FakeParticipant {
        async fn recv(&mut self) -> Message {
            let proto = tokio::time::timeout(Duration::from_secs(5), self.outbound.recv())
                .await
                .expect("Unexpected timeout")
                .expect("Outbound stream closed")
                .expect("Unexpected status");
            Message::try_from(proto).unwrap()
        }

        fn reply(&self, inbound: &mpsc::UnboundedSender<Message>, kind: MessageType, round: RoundId) {
            inbound.send(Message::new(kind, round, self.id)).unwrap();
        }
    }

    struct Harness {
        requests: mpsc::Sender<Bytes>,
        inbound: mpsc::UnboundedSender<Message>,
        listener: RoundListener,
        participants: Vec<FakeParticipant>,
    }

    fn start(num_participants: usize, vote_timeout: Duration) -> Harness {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let registry = Arc::new(ParticipantRegistry::new(logger.clone()));
        let mut participants = Vec::new();
        for _ in 0..num_participants {
            let (tx, rx) = mpsc::unbounded_channel();
            let (id, _) = registry.register(tx).unwrap();
            let mut participant = FakeParticipant { id, outbound: rx };
            // Drain the handshake.
            participant.outbound.try_recv().unwrap().unwrap();
            participants.push(participant);
        }

        let options = CoordinatorOptionsValidated::try_from(CoordinatorOptions {
            vote_timeout: Some(vote_timeout),
            ack_timeout: Some(Duration::from_millis(100)),
            ..CoordinatorOptions::default()
        })
        .unwrap();
        let (request_tx, request_rx) = mpsc::channel(10);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (notifier, listener) = round_listener::new();
        let driver = RoundDriver::new(logger, registry, request_rx, inbound_rx, notifier, &options);
        tokio::spawn(driver.run());

        Harness {
            requests: request_tx,
            inbound: inbound_tx,
            listener,
            participants,
        }
    }

    async fn next_summary(listener: &mut RoundListener) -> RoundSummary {
        tokio::time::timeout(Duration::from_secs(5), listener.next())
            .await
            .expect("Unexpected timeout")
            .expect("Driver exited")
    }

    #[tokio::test]
    async fn unanimous_round_commits() {
        // -- setup --
        let mut harness = start(2, Duration::from_secs(5));

        // -- execute --
        harness.requests.send(Bytes::from_static(b"op")).await.unwrap();
        for participant in harness.participants.iter_mut() {
            let request = participant.recv().await;
            assert_eq!(request.kind, MessageType::VoteRequest);
            assert_eq!(request.round, RoundId::first());
            assert_eq!(request.participant, participant.id);
            assert_eq!(request.value, Bytes::from_static(b"op"));
        }
        for participant in harness.participants.iter() {
            participant.reply(&harness.inbound, MessageType::VoteCommit, RoundId::first());
        }
        for participant in harness.participants.iter_mut() {
            assert_eq!(participant.recv().await.kind, MessageType::GlobalCommit);
        }
        for participant in harness.participants.iter() {
            participant.reply(&harness.inbound, MessageType::Ack, RoundId::first());
        }

        // -- verify --
        let summary = next_summary(&mut harness.listener).await;
        assert_eq!(summary.round, RoundId::first());
        assert_eq!(summary.decision, Decision::Commit);
        assert_eq!(summary.votes, 2);
        assert_eq!(summary.acks, 2);
    }

    #[tokio::test]
    async fn silent_participant_aborts_by_timeout() {
        let mut harness = start(2, Duration::from_millis(100));

        harness.requests.send(Bytes::from_static(b"op")).await.unwrap();
        harness.participants[0].recv().await;
        harness.participants[0].reply(&harness.inbound, MessageType::VoteCommit, RoundId::first());

        assert_eq!(harness.participants[0].recv().await.kind, MessageType::GlobalAbort);
        let summary = next_summary(&mut harness.listener).await;
        assert_eq!(summary.decision, Decision::Abort);
        assert_eq!(summary.votes, 1);
    }

    #[tokio::test]
    async fn stale_votes_are_not_counted_and_rounds_advance() {
        let mut harness = start(1, Duration::from_millis(100));

        harness.requests.send(Bytes::from_static(b"first")).await.unwrap();
        harness.participants[0].recv().await;
        // Wrong round: must not count.
        harness.participants[0].reply(&harness.inbound, MessageType::VoteCommit, RoundId::new(7));
        assert_eq!(harness.participants[0].recv().await.kind, MessageType::GlobalAbort);
        assert_eq!(next_summary(&mut harness.listener).await.decision, Decision::Abort);

        harness.requests.send(Bytes::from_static(b"second")).await.unwrap();
        let request = harness.participants[0].recv().await;
        assert_eq!(request.round, RoundId::new(2));
        harness.participants[0].reply(&harness.inbound, MessageType::VoteCommit, RoundId::new(2));
        assert_eq!(harness.participants[0].recv().await.kind, MessageType::GlobalCommit);
        harness.participants[0].reply(&harness.inbound, MessageType::Ack, RoundId::new(2));

        let summary = next_summary(&mut harness.listener).await;
        assert_eq!(summary.round, RoundId::new(2));
        assert_eq!(summary.decision, Decision::Commit);
    }
}
