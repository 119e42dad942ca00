use crate::twopc::{Message, MessageType, ParticipantId, Phase, RoundId};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Decision {
    Commit,
    Abort,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Vote {
    Commit,
    Abort,
}

/// Why a vote or ACK wasn't counted.
#[derive(Debug, Eq, PartialEq)]
pub(super) enum Rejection {
    WrongType(MessageType),
    StaleRound(RoundId),
    NotInRound(ParticipantId),
    Duplicate(ParticipantId),
}

/// Summary of a finished round, published to round listeners.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoundSummary {
    pub round: RoundId,
    pub decision: Decision,
    pub participants: usize,
    pub votes: usize,
    pub acks: usize,
}

/// Round is owned exclusively by the round driver. It counts votes and ACKs only from the
/// participants that were registered when the round started, so neither map can outgrow them.
pub(super) struct Round {
    number: RoundId,
    phase: Phase,
    participants: BTreeSet<ParticipantId>,
    votes: BTreeMap<ParticipantId, Vote>,
    acks: BTreeSet<ParticipantId>,
}

impl Round {
    pub(super) fn new(number: RoundId, participants: BTreeSet<ParticipantId>) -> Self {
        Round {
            number,
            phase: Phase::Init,
            participants,
            votes: BTreeMap::new(),
            acks: BTreeSet::new(),
        }
    }

    pub(super) fn number(&self) -> RoundId {
        self.number
    }

    pub(super) fn phase(&self) -> Phase {
        self.phase
    }

    pub(super) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(super) fn participants(&self) -> &BTreeSet<ParticipantId> {
        &self.participants
    }

    pub(super) fn record_vote(&mut self, message: &Message) -> Result<(), Rejection> {
        let vote = match message.kind {
            MessageType::VoteCommit => Vote::Commit,
            MessageType::VoteAbort => Vote::Abort,
            other => return Err(Rejection::WrongType(other)),
        };
        self.check_sender(message)?;
        if self.votes.contains_key(&message.participant) {
            return Err(Rejection::Duplicate(message.participant));
        }

        self.votes.insert(message.participant, vote);
        Ok(())
    }

    pub(super) fn record_ack(&mut self, message: &Message) -> Result<(), Rejection> {
        if message.kind != MessageType::Ack {
            return Err(Rejection::WrongType(message.kind));
        }
        self.check_sender(message)?;
        if !self.acks.insert(message.participant) {
            return Err(Rejection::Duplicate(message.participant));
        }

        Ok(())
    }

    fn check_sender(&self, message: &Message) -> Result<(), Rejection> {
        if message.round != self.number {
            return Err(Rejection::StaleRound(message.round));
        }
        if !self.participants.contains(&message.participant) {
            return Err(Rejection::NotInRound(message.participant));
        }
        Ok(())
    }

    pub(super) fn all_votes_in(&self) -> bool {
        self.votes.len() == self.participants.len()
    }

    pub(super) fn any_abort_vote(&self) -> bool {
        self.votes.values().any(|vote| *vote == Vote::Abort)
    }

    pub(super) fn all_acks_in(&self) -> bool {
        self.acks.len() == self.participants.len()
    }

    /// Commit only if every participant voted and none voted Abort. Missing votes count as Abort.
    pub(super) fn decision(&self) -> Decision {
        if self.all_votes_in() && !self.any_abort_vote() {
            Decision::Commit
        } else {
            Decision::Abort
        }
    }

    pub(super) fn summary(&self) -> RoundSummary {
        RoundSummary {
            round: self.number,
            decision: self.decision(),
            participants: self.participants.len(),
            votes: self.votes.len(),
            acks: self.acks.len(),
        }
    }
}
