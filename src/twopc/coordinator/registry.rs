use crate::grpc::ProtoMessage;
use crate::twopc::{Message, MessageType, ParticipantId, RoundId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tonic::Status;

pub(super) type Outbound = mpsc::UnboundedSender<Result<ProtoMessage, Status>>;

/// Registry of connected participants' outbound streams. It's written when a connection is
/// established (or evicted) and read by the round driver for broadcasts.
pub(super) struct ParticipantRegistry {
    logger: slog::Logger,
    state: Mutex<RegistryState>,
}

struct RegistryState {
    next_participant_id: u64,
    // The round a participant connecting right now will be asked to vote in next.
    expected_round: RoundId,
    outbound: BTreeMap<ParticipantId, Outbound>,
}

impl ParticipantRegistry {
    pub(super) fn new(logger: slog::Logger) -> Self {
        ParticipantRegistry {
            logger,
            state: Mutex::new(RegistryState {
                next_participant_id: 0,
                expected_round: RoundId::first(),
                outbound: BTreeMap::new(),
            }),
        }
    }

    /// Assigns the next participant ID and queues the handshake ACK carrying that ID and the round
    /// the participant should expect. Both happen under the same lock as `begin_round`, so a
    /// participant is either part of a round's snapshot or told to expect a later round.
    pub(super) fn register(&self, outbound: Outbound) -> Option<(ParticipantId, RoundId)> {
        let mut state = self.state.lock().expect("ParticipantRegistry.register() mutex guard poison");

        let participant = ParticipantId::new(state.next_participant_id);
        let round = state.expected_round;
        let handshake = Message::new(MessageType::Ack, round, participant);
        if outbound.send(Ok(ProtoMessage::from(handshake))).is_err() {
            return None;
        }

        state.next_participant_id += 1;
        state.outbound.insert(participant, outbound);
        Some((participant, round))
    }

    /// Snapshots the participants of `round`. Anyone registering afterwards expects the next one.
    pub(super) fn begin_round(&self, round: RoundId) -> BTreeSet<ParticipantId> {
        let mut state = self.state.lock().expect("ParticipantRegistry.begin_round() mutex guard poison");

        state.expected_round = round.next();
        state.outbound.keys().copied().collect()
    }

    pub(super) fn evict(&self, participant: ParticipantId) {
        let mut state = self.state.lock().expect("ParticipantRegistry.evict() mutex guard poison");

        if state.outbound.remove(&participant).is_some() {
            slog::info!(self.logger, "Evicted participant {:?}", participant);
        }
    }

    pub(super) fn len(&self) -> usize {
        self.state
            .lock()
            .expect("ParticipantRegistry.len() mutex guard poison")
            .outbound
            .len()
    }

    /// Sends `message` to each of `participants`, addressed to that participant. A participant
    /// whose stream is gone is logged and skipped; it will simply never answer.
    pub(super) fn broadcast(&self, participants: &BTreeSet<ParticipantId>, message: &Message) {
        let state = self.state.lock().expect("ParticipantRegistry.broadcast() mutex guard poison");

        for participant in participants {
            let outbound = match state.outbound.get(participant) {
                Some(outbound) => outbound,
                None => continue,
            };

            let mut addressed = message.clone();
            addressed.participant = *participant;
            if outbound.send(Ok(ProtoMessage::from(addressed))).is_err() {
                slog::warn!(
                    self.logger,
                    "Failed to send {:?} for round {:?} to participant {:?}",
                    message.kind,
                    message.round,
                    participant
                );
            }
        }
    }
}
