use crate::twopc::{Message, MessageType, Operation, OperationCodecError, ParticipantId, Phase, RoundId};
use bytes::Bytes;

#[derive(Debug)]
pub(super) enum VoteRequestOutcome {
    /// Not in Init, an in-flight round can't be interrupted.
    Ignored,
    /// Round mismatch, reply with this VoteAbort rather than trying to catch up.
    MissedRound(Message),
    Undecodable(Message, OperationCodecError),
    /// Caller decides with `prepared` or `refused`.
    Prepare(Operation),
}

#[derive(Debug)]
pub(super) struct AbortOutcome {
    pub ack: Message,
    /// The operation of the aborted round, if this participant could decode it.
    pub dropped: Option<Operation>,
}

/// ParticipantState is the protocol logic of a participant with all I/O left to the caller. It
/// tracks the round the participant expects next and the operation it's holding while Ready.
pub(super) struct ParticipantState {
    participant: ParticipantId,
    phase: Phase,
    round: RoundId,
    pending: Option<Operation>,
    // Round this participant voted Abort in, so the matching GlobalAbort can resync it.
    aborted_round: Option<RoundId>,
    // Vote request that arrived while another round was undecided. It gets no vote, so the
    // coordinator will abort it.
    overlooked: Option<(RoundId, Operation)>,
}

impl ParticipantState {
    pub(super) fn new(participant: ParticipantId, round: RoundId) -> Self {
        ParticipantState {
            participant,
            phase: Phase::Init,
            round,
            pending: None,
            aborted_round: None,
            overlooked: None,
        }
    }

    pub(super) fn phase(&self) -> Phase {
        self.phase
    }

    pub(super) fn round(&self) -> RoundId {
        self.round
    }

    pub(super) fn on_vote_request(&mut self, round: RoundId, payload: Bytes) -> VoteRequestOutcome {
        if self.phase != Phase::Init {
            if round > self.round {
                self.overlooked = Operation::decode(payload).ok().map(|operation| (round, operation));
            }
            return VoteRequestOutcome::Ignored;
        }

        let decoded = Operation::decode(payload);
        if round != self.round {
            return VoteRequestOutcome::MissedRound(self.vote_abort(round, decoded.ok()));
        }

        match decoded {
            Ok(operation) => VoteRequestOutcome::Prepare(operation),
            Err(e) => VoteRequestOutcome::Undecodable(self.vote_abort(round, None), e),
        }
    }

    pub(super) fn prepared(&mut self, operation: Operation) -> Message {
        self.phase = Phase::Ready;
        self.pending = Some(operation);
        self.message(MessageType::VoteCommit, self.round)
    }

    pub(super) fn refused(&mut self, operation: Operation) -> Message {
        self.vote_abort(self.round, Some(operation))
    }

    /// Returns the operation to apply, if the commit is for the round this participant is Ready
    /// in. Follow up with `committed` once it's applied.
    pub(super) fn on_global_commit(&mut self, round: RoundId) -> Option<(RoundId, Operation)> {
        if self.phase != Phase::Ready || round != self.round {
            return None;
        }

        self.phase = Phase::Commit;
        self.pending.take().map(|operation| (round, operation))
    }

    pub(super) fn committed(&mut self) -> Message {
        let ack = self.message(MessageType::Ack, self.round);
        self.advance_to(self.round.next());
        ack
    }

    pub(super) fn on_global_abort(&mut self, round: RoundId) -> Option<AbortOutcome> {
        let matches_ready = self.phase == Phase::Ready && round == self.round;
        let matches_own_abort = self.phase == Phase::Abort && self.aborted_round == Some(round);
        if !matches_ready && !matches_own_abort {
            // The overlooked round is acknowledged without touching the undecided one.
            return match self.overlooked.take() {
                Some((overlooked, operation)) if overlooked == round => Some(AbortOutcome {
                    ack: self.message(MessageType::Ack, round),
                    dropped: Some(operation),
                }),
                other => {
                    self.overlooked = other;
                    None
                }
            };
        }

        self.phase = Phase::Abort;
        let dropped = self.pending.take();
        let ack = self.message(MessageType::Ack, round);
        self.advance_to(round.next());
        Some(AbortOutcome { ack, dropped })
    }

    /// Abandons an undecided round and returns the operation it was holding, if any.
    pub(super) fn on_idle_timeout(&mut self) -> Option<(RoundId, Operation)> {
        match self.phase {
            Phase::Ready => {
                let round = self.round;
                let dropped = self.pending.take();
                self.advance_to(round.next());
                dropped.map(|operation| (round, operation))
            }
            Phase::Abort => {
                let round = self.aborted_round.unwrap_or(self.round);
                let dropped = self.pending.take();
                self.advance_to(round.next());
                dropped.map(|operation| (round, operation))
            }
            _ => None,
        }
    }

    /// Keeps `operation` so whoever submitted it hears about the abort.
    fn vote_abort(&mut self, round: RoundId, operation: Option<Operation>) -> Message {
        self.phase = Phase::Abort;
        self.aborted_round = Some(round);
        self.pending = operation;
        self.message(MessageType::VoteAbort, round)
    }

    /// Never moves the round counter backwards.
    fn advance_to(&mut self, round: RoundId) {
        self.round = round.max(self.round);
        self.phase = Phase::Init;
        self.aborted_round = None;
        if matches!(self.overlooked, Some((overlooked, _)) if overlooked < self.round) {
            self.overlooked = None;
        }
    }

    fn message(&self, kind: MessageType, round: RoundId) -> Message {
        Message::new(kind, round, self.participant)
    }
}
