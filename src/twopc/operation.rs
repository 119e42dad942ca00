use crate::grpc::{ProtoOperation, ProtoOperationKind};
use crate::layer::LayerError;
use bytes::Bytes;
use prost::Message as _;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperationKind {
    Set,
    Remove,
    Sync,
}

/// One intended mutation, identified by a per-call correlation ID so its asynchronous commit
/// result can be matched back to the caller that issued it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub key: Bytes,
    pub value: Bytes,
    pub correlation_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum OperationCodecError {
    #[error("Failed to encode operation: {0}")]
    Encode(#[from] prost::EncodeError),
    #[error("Failed to decode operation: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("Unknown operation kind: {0}")]
    UnknownKind(i32),
}

impl Operation {
    pub fn set(key: Bytes, value: Bytes) -> Self {
        Self::with_new_id(OperationKind::Set, key, value)
    }

    pub fn remove(key: Bytes) -> Self {
        Self::with_new_id(OperationKind::Remove, key, Bytes::new())
    }

    pub fn sync() -> Self {
        Self::with_new_id(OperationKind::Sync, Bytes::new(), Bytes::new())
    }

    fn with_new_id(kind: OperationKind, key: Bytes, value: Bytes) -> Self {
        Operation {
            kind,
            key,
            value,
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn encode(&self) -> Result<Bytes, OperationCodecError> {
        let proto = ProtoOperation {
            kind: ProtoOperationKind::from(self.kind) as i32,
            key: self.key.to_vec(),
            value: self.value.to_vec(),
            correlation_id: self.correlation_id.clone(),
        };

        let mut buf = Vec::with_capacity(proto.encoded_len());
        proto.encode(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    pub fn decode(payload: Bytes) -> Result<Self, OperationCodecError> {
        let proto = ProtoOperation::decode(payload)?;
        let kind = ProtoOperationKind::from_i32(proto.kind).ok_or(OperationCodecError::UnknownKind(proto.kind))?;

        Ok(Operation {
            kind: OperationKind::from(kind),
            key: Bytes::from(proto.key),
            value: Bytes::from(proto.value),
            correlation_id: proto.correlation_id,
        })
    }
}

// ------- Conversions --------

impl From<OperationKind> for ProtoOperationKind {
    fn from(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Set => ProtoOperationKind::SetOperation,
            OperationKind::Remove => ProtoOperationKind::RemoveOperation,
            OperationKind::Sync => ProtoOperationKind::SyncOperation,
        }
    }
}

impl From<ProtoOperationKind> for OperationKind {
    fn from(kind: ProtoOperationKind) -> Self {
        match kind {
            ProtoOperationKind::SetOperation => OperationKind::Set,
            ProtoOperationKind::RemoveOperation => OperationKind::Remove,
            ProtoOperationKind::SyncOperation => OperationKind::Sync,
        }
    }
}

impl From<OperationCodecError> for LayerError {
    fn from(e: OperationCodecError) -> Self {
        LayerError::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_correlation_id_per_call() {
        let a = Operation::set(Bytes::from_static(b"k"), Bytes::from_static(b"v"));
        let b = Operation::set(Bytes::from_static(b"k"), Bytes::from_static(b"v"));
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn decode_preserves_operation() {
        let operation = Operation::remove(Bytes::from_static(b"gone"));
        let decoded = Operation::decode(operation.encode().unwrap()).unwrap();
        assert_eq!(decoded, operation);
    }

    #[test]
    fn garbage_payload_is_an_encoding_error() {
        let result = Operation::decode(Bytes::from_static(&[0xff, 0xff, 0xff]));
        let error = LayerError::from(result.unwrap_err());
        assert!(matches!(error, LayerError::Encoding(_)));
    }
}
