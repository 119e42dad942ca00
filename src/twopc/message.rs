use crate::grpc::{ProtoMessage, ProtoMessageType};
use bytes::Bytes;
use std::convert::TryFrom;
use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MessageType {
    VoteRequest,
    VoteCommit,
    VoteAbort,
    GlobalCommit,
    GlobalAbort,
    Ack,
    Set,
    Get,
    Remove,
    Sync,
}

/// Round numbers start at 1 and strictly increase. They're never reused, even after an abort.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RoundId(u64);

impl RoundId {
    pub fn new(round: u64) -> Self {
        RoundId(round)
    }

    pub fn first() -> Self {
        RoundId(1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        RoundId(self.0 + 1)
    }
}

impl fmt::Debug for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ParticipantId(u64);

impl ParticipantId {
    pub fn new(id: u64) -> Self {
        ParticipantId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unit of the two-phase commit stream and of layer-to-layer transfer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub kind: MessageType,
    pub round: RoundId,
    pub participant: ParticipantId,
    pub key: Bytes,
    pub value: Bytes,
}

impl Message {
    pub fn new(kind: MessageType, round: RoundId, participant: ParticipantId) -> Self {
        Message {
            kind,
            round,
            participant,
            key: Bytes::new(),
            value: Bytes::new(),
        }
    }

    pub fn with_key(mut self, key: Bytes) -> Self {
        self.key = key;
        self
    }

    pub fn with_value(mut self, value: Bytes) -> Self {
        self.value = value;
        self
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown message type: {0}")]
pub struct UnknownMessageType(pub i32);

// ------- Conversions --------

impl From<MessageType> for ProtoMessageType {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::VoteRequest => ProtoMessageType::VoteRequest,
            MessageType::VoteCommit => ProtoMessageType::VoteCommit,
            MessageType::VoteAbort => ProtoMessageType::VoteAbort,
            MessageType::GlobalCommit => ProtoMessageType::GlobalCommit,
            MessageType::GlobalAbort => ProtoMessageType::GlobalAbort,
            MessageType::Ack => ProtoMessageType::Ack,
            MessageType::Set => ProtoMessageType::Set,
            MessageType::Get => ProtoMessageType::Get,
            MessageType::Remove => ProtoMessageType::Remove,
            MessageType::Sync => ProtoMessageType::Sync,
        }
    }
}

impl From<ProtoMessageType> for MessageType {
    fn from(kind: ProtoMessageType) -> Self {
        match kind {
            ProtoMessageType::VoteRequest => MessageType::VoteRequest,
            ProtoMessageType::VoteCommit => MessageType::VoteCommit,
            ProtoMessageType::VoteAbort => MessageType::VoteAbort,
            ProtoMessageType::GlobalCommit => MessageType::GlobalCommit,
            ProtoMessageType::GlobalAbort => MessageType::GlobalAbort,
            ProtoMessageType::Ack => MessageType::Ack,
            ProtoMessageType::Set => MessageType::Set,
            ProtoMessageType::Get => MessageType::Get,
            ProtoMessageType::Remove => MessageType::Remove,
            ProtoMessageType::Sync => MessageType::Sync,
        }
    }
}

impl From<Message> for ProtoMessage {
    fn from(message: Message) -> Self {
        ProtoMessage {
            kind: ProtoMessageType::from(message.kind) as i32,
            round: message.round.as_u64(),
            participant: message.participant.as_u64(),
            key: message.key.to_vec(),
            value: message.value.to_vec(),
        }
    }
}

impl TryFrom<ProtoMessage> for Message {
    type Error = UnknownMessageType;

    fn try_from(proto: ProtoMessage) -> Result<Self, Self::Error> {
        let kind = ProtoMessageType::from_i32(proto.kind).ok_or(UnknownMessageType(proto.kind))?;

        Ok(Message {
            kind: MessageType::from(kind),
            round: RoundId::new(proto.round),
            participant: ParticipantId::new(proto.participant),
            key: Bytes::from(proto.key),
            value: Bytes::from(proto.value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_type() {
        let proto = ProtoMessage {
            kind: 42,
            round: 1,
            participant: 0,
            key: Vec::new(),
            value: Vec::new(),
        };

        assert!(matches!(Message::try_from(proto), Err(UnknownMessageType(42))));
    }

    #[test]
    fn keeps_round_and_payload() {
        let message = Message::new(MessageType::VoteRequest, RoundId::new(7), ParticipantId::new(3))
            .with_value(Bytes::from_static(b"payload"));

        let decoded = Message::try_from(ProtoMessage::from(message.clone())).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(format!("{:?}", decoded.round), "7");
    }
}
