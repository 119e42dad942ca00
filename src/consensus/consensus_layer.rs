use crate::api::{ConsensusOptions, ConsensusOptionsValidated};
use crate::consensus::inflight::InFlight;
use crate::layer::{Layer, LayerError};
use crate::twopc::{AbortReason, CommitHandler, Operation, OperationKind, Participant, ParticipantConfig, RoundId};
use bytes::Bytes;
use std::convert::TryFrom;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;

pub struct ConsensusConfig {
    /// `host:port` of the coordinator to join on `start()`.
    pub coordinator_addr: String,
    pub info_logger: slog::Logger,
    pub options: ConsensusOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsensusCreationError {
    #[error("Illegal options for configuring consensus layer: {0}")]
    IllegalConsensusOptions(String),
}

/// ConsensusLayer turns Set/Remove/Sync into cluster-wide two-phase commit rounds and blocks the
/// caller until its own node has applied (or aborted) the operation. Reads skip the protocol and go
/// straight to the next layer, so they aren't linearizable.
pub struct ConsensusLayer {
    logger: slog::Logger,
    coordinator_addr: String,
    options: ConsensusOptionsValidated,
    shared: Arc<ConsensusShared>,
    participant: RwLock<Option<Participant>>,
}

/// State reachable from both the caller side and the participant's commit callback.
struct ConsensusShared {
    logger: slog::Logger,
    next: OnceLock<Arc<dyn Layer>>,
    inflight: InFlight,
}

impl ConsensusLayer {
    pub fn try_new(config: ConsensusConfig) -> Result<Self, ConsensusCreationError> {
        let options = ConsensusOptionsValidated::try_from(config.options)
            .map_err(|e| ConsensusCreationError::IllegalConsensusOptions(e.to_string()))?;

        let shared = Arc::new(ConsensusShared {
            logger: config.info_logger.clone(),
            next: OnceLock::new(),
            inflight: InFlight::default(),
        });

        Ok(ConsensusLayer {
            logger: config.info_logger,
            coordinator_addr: config.coordinator_addr,
            options,
            shared,
            participant: RwLock::new(None),
        })
    }

    async fn submit(&self, operation: Operation) -> Result<(), LayerError> {
        let correlation_id = operation.correlation_id.clone();

        let result_rx = {
            let participant = self.participant.read().await;
            let participant = participant.as_ref().ok_or(LayerError::NotStarted)?;

            let result_rx = self.shared.inflight.register(correlation_id.clone());
            if let Err(e) = participant.request(&operation).await {
                self.shared.inflight.forget(&correlation_id);
                return Err(e);
            }
            result_rx
        };

        match tokio::time::timeout(self.options.result_timeout, result_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(LayerError::Transport("Result channel dropped".to_string())),
            Err(_) => {
                self.shared.inflight.forget(&correlation_id);
                slog::debug!(self.logger, "Timed out waiting for operation {}", correlation_id);
                Err(LayerError::ResultTimeout)
            }
        }
    }

    fn next(&self) -> Result<&Arc<dyn Layer>, LayerError> {
        self.shared.next.get().ok_or(LayerError::NoNextLayer)
    }
}

#[async_trait::async_trait]
impl Layer for ConsensusLayer {
    async fn get(&self, key: &Bytes) -> Result<Bytes, LayerError> {
        self.next()?.get(key).await
    }

    async fn set(&self, key: Bytes, value: Bytes) -> Result<(), LayerError> {
        self.submit(Operation::set(key, value)).await
    }

    async fn remove(&self, key: &Bytes) -> Result<(), LayerError> {
        self.submit(Operation::remove(key.clone())).await
    }

    async fn sync(&self) -> Result<(), LayerError> {
        self.submit(Operation::sync()).await
    }

    async fn start(&self) -> Result<(), LayerError> {
        let mut participant = self.participant.write().await;
        if participant.is_some() {
            return Ok(());
        }

        let config = ParticipantConfig {
            coordinator_addr: self.coordinator_addr.clone(),
            info_logger: self.logger.clone(),
            options: self.options.participant.clone().into(),
        };
        let handler: Arc<dyn CommitHandler> = self.shared.clone();
        let connected = Participant::connect(config, handler)
            .await
            .map_err(|e| LayerError::Transport(e.to_string()))?;

        participant.replace(connected);
        Ok(())
    }

    async fn stop(&self) -> Result<(), LayerError> {
        if let Some(participant) = self.participant.write().await.take() {
            participant.stop().await;
        }
        Ok(())
    }

    fn set_next(&self, next: Arc<dyn Layer>) -> Result<(), LayerError> {
        self.shared.next.set(next).map_err(|_| LayerError::NextLayerAlreadySet)
    }
}

#[async_trait::async_trait]
impl CommitHandler for ConsensusShared {
    async fn commit(&self, round: RoundId, operation: Operation) -> Result<(), LayerError> {
        let result = match self.next.get() {
            Some(next) => match operation.kind {
                OperationKind::Set => next.set(operation.key, operation.value).await,
                OperationKind::Remove => next.remove(&operation.key).await,
                OperationKind::Sync => next.sync().await,
            },
            None => Err(LayerError::NoNextLayer),
        };

        if !self.inflight.complete(&operation.correlation_id, result.clone()) {
            slog::debug!(self.logger, "Applied remote operation from round {:?}", round);
        }
        result
    }

    async fn abort(&self, round: RoundId, operation: Operation, reason: AbortReason) {
        let round = round.as_u64();
        if self
            .inflight
            .complete(&operation.correlation_id, Err(LayerError::Aborted { round }))
        {
            slog::debug!(self.logger, "Operation aborted in round {} ({:?})", round, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{Call, RecordingLayer};

    fn shared(next: Arc<RecordingLayer>) -> ConsensusShared {
        let shared = ConsensusShared {
            logger: slog::Logger::root(slog::Discard, slog::o!()),
            next: OnceLock::new(),
            inflight: InFlight::default(),
        };
        assert!(shared.next.set(next).is_ok());
        shared
    }

    #[tokio::test]
    async fn commit_applies_and_wakes_originator() {
        let next = RecordingLayer::new();
        let shared = shared(next.clone());
        let operation = Operation::set(Bytes::from_static(b"x"), Bytes::from_static(b"1"));
        let result_rx = shared.inflight.register(operation.correlation_id.clone());

        shared.commit(RoundId::first(), operation).await.unwrap();

        assert!(result_rx.await.unwrap().is_ok());
        assert_eq!(next.stored(b"x"), Some(Bytes::from_static(b"1")));
        assert_eq!(shared.inflight.len(), 0);
    }

    #[tokio::test]
    async fn remote_operation_applies_silently() {
        let next = RecordingLayer::new();
        let shared = shared(next.clone());

        shared
            .commit(RoundId::first(), Operation::remove(Bytes::from_static(b"x")))
            .await
            .unwrap();
        shared.commit(RoundId::new(2), Operation::sync()).await.unwrap();

        assert_eq!(next.calls(), vec![Call::Remove(Bytes::from_static(b"x")), Call::Sync]);
    }

    #[tokio::test]
    async fn local_apply_failure_reaches_originator() {
        let next = RecordingLayer::new();
        next.fail_key(b"bad");
        let shared = shared(next.clone());
        let operation = Operation::set(Bytes::from_static(b"bad"), Bytes::from_static(b"1"));
        let result_rx = shared.inflight.register(operation.correlation_id.clone());

        assert!(shared.commit(RoundId::first(), operation).await.is_err());
        assert!(matches!(result_rx.await.unwrap(), Err(LayerError::Storage(_))));
    }

    #[tokio::test]
    async fn abort_reaches_originator() {
        let shared = shared(RecordingLayer::new());
        let operation = Operation::sync();
        let result_rx = shared.inflight.register(operation.correlation_id.clone());

        shared.abort(RoundId::new(3), operation, AbortReason::GlobalAbort).await;

        assert!(matches!(result_rx.await.unwrap(), Err(LayerError::Aborted { round: 3 })));
    }

    #[tokio::test]
    async fn writes_before_start_fail() {
        let layer = ConsensusLayer::try_new(ConsensusConfig {
            coordinator_addr: "127.0.0.1:1".to_string(),
            info_logger: slog::Logger::root(slog::Discard, slog::o!()),
            options: ConsensusOptions::default(),
        })
        .unwrap();
        layer.set_next(RecordingLayer::new()).unwrap();

        let result = layer.set(Bytes::from_static(b"x"), Bytes::from_static(b"1")).await;
        assert!(matches!(result, Err(LayerError::NotStarted)));
        assert!(matches!(layer.get(&Bytes::from_static(b"x")).await, Err(LayerError::NotFound)));
    }
}
