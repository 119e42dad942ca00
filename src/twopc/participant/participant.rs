use crate::api::{ParticipantOptions, ParticipantOptionsValidated};
use crate::grpc::grpc_cluster_client::GrpcClusterClient;
use crate::grpc::{ProtoMessage, ProtoSetReq};
use crate::layer::LayerError;
use crate::twopc::participant::state::{ParticipantState, VoteRequestOutcome};
use crate::twopc::participant::{AbortReason, CommitHandler};
use crate::twopc::{Message, MessageType, Operation, ParticipantId, RoundId};
use bytes::Bytes;
use std::convert::TryFrom;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::codegen::http::uri;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Streaming};

pub struct ParticipantConfig {
    /// `host:port` of the coordinator.
    pub coordinator_addr: String,
    pub info_logger: slog::Logger,
    pub options: ParticipantOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum ParticipantConnectError {
    #[error("Illegal options for configuring participant: {0}")]
    IllegalParticipantOptions(String),
    #[error("Invalid coordinator address")]
    InvalidUri(#[from] uri::InvalidUri),
    #[error("Failed to connect to coordinator")]
    ConnectFailure(#[from] tonic::transport::Error),
    #[error("Coordinator refused connection stream: {0}")]
    StreamRefused(#[from] tonic::Status),
    #[error("Coordinator handshake failed: {0}")]
    Handshake(String),
}

/// Participant is one node's connection to the coordinator. Its main loop answers vote requests
/// and applies decisions through a `CommitHandler`.
pub struct Participant {
    logger: slog::Logger,
    id: ParticipantId,
    client: GrpcClusterClient<Channel>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    main_loop: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    receive_pump: JoinHandle<()>,
}

impl Participant {
    pub async fn connect(
        config: ParticipantConfig,
        handler: Arc<dyn CommitHandler>,
    ) -> Result<Self, ParticipantConnectError> {
        let options = ParticipantOptionsValidated::try_from(config.options)
            .map_err(|e| ParticipantConnectError::IllegalParticipantOptions(e.to_string()))?;

        let endpoint = Endpoint::from_shared(format!("http://{}", config.coordinator_addr))?;
        let mut client = GrpcClusterClient::new(endpoint.connect().await?);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let mut inbound = client
            .connection(Request::new(UnboundedReceiverStream::new(outbound_rx)))
            .await?
            .into_inner();

        let (id, round) = handshake(&mut inbound, options.handshake_timeout).await?;
        let logger = config.info_logger.new(slog::o!("ParticipantId" => id.as_u64()));
        slog::info!(logger, "Connected to coordinator, expecting round {:?}", round);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let receive_pump = tokio::spawn(receive_pump(logger.clone(), inbound, inbound_tx));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let main_loop = ParticipantLoop {
            logger: logger.clone(),
            state: ParticipantState::new(id, round),
            inbound: inbound_rx,
            outbound: outbound_tx,
            handler,
            idle_timeout: options.idle_timeout,
            shutdown: shutdown_rx,
        };
        let main_loop = tokio::spawn(main_loop.run());

        Ok(Participant {
            logger,
            id,
            client,
            shutdown: Mutex::new(Some(shutdown_tx)),
            main_loop: tokio::sync::Mutex::new(Some(main_loop)),
            receive_pump,
        })
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Submits `operation` to the coordinator's request queue. This returns once the coordinator
    /// accepted the request, not once the round is decided.
    pub async fn request(&self, operation: &Operation) -> Result<(), LayerError> {
        let payload = operation.encode()?;
        let rpc_request = ProtoSetReq {
            payload: payload.to_vec(),
        };

        let mut client = self.client.clone();
        client
            .set(Request::new(rpc_request))
            .await
            .map_err(|status| LayerError::Request(status.message().to_string()))?;

        Ok(())
    }

    /// Closes the connection and waits for the main loop to exit.
    pub async fn stop(&self) {
        if let Some(shutdown) = self
            .shutdown
            .lock()
            .expect("Participant.stop() mutex guard poison")
            .take()
        {
            let _ = shutdown.send(());
        }

        if let Some(main_loop) = self.main_loop.lock().await.take() {
            if let Err(e) = main_loop.await {
                slog::error!(self.logger, "Participant main loop failed: {:?}", e);
            }
        }
        self.receive_pump.abort();
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        self.receive_pump.abort();
    }
}

async fn handshake(
    inbound: &mut Streaming<ProtoMessage>,
    handshake_timeout: Duration,
) -> Result<(ParticipantId, RoundId), ParticipantConnectError> {
    let proto = tokio::time::timeout(handshake_timeout, inbound.message())
        .await
        .map_err(|_| ParticipantConnectError::Handshake("timed out".to_string()))??
        .ok_or_else(|| ParticipantConnectError::Handshake("stream closed".to_string()))?;
    let message = Message::try_from(proto).map_err(|e| ParticipantConnectError::Handshake(e.to_string()))?;

    if message.kind != MessageType::Ack {
        return Err(ParticipantConnectError::Handshake(format!(
            "expected ACK, got {:?}",
            message.kind
        )));
    }
    Ok((message.participant, message.round))
}

async fn receive_pump(
    logger: slog::Logger,
    mut inbound: Streaming<ProtoMessage>,
    sender: mpsc::UnboundedSender<Message>,
) {
    loop {
        match inbound.message().await {
            Ok(Some(proto)) => {
                slog::debug!(logger, "ClientWire - {:?}", proto);
                match Message::try_from(proto) {
                    Ok(message) => {
                        if sender.send(message).is_err() {
                            return;
                        }
                    }
                    Err(e) => slog::warn!(logger, "Dropping undecodable message: {}", e),
                }
            }
            Ok(None) => {
                slog::info!(logger, "Coordinator closed the connection");
                return;
            }
            Err(status) => {
                slog::warn!(logger, "Connection to coordinator failed: {}", status);
                return;
            }
        }
    }
}

enum LoopEvent {
    Message(Message),
    Disconnected,
    Idle,
    Shutdown,
}

struct ParticipantLoop {
    logger: slog::Logger,
    state: ParticipantState,
    inbound: mpsc::UnboundedReceiver<Message>,
    outbound: mpsc::UnboundedSender<ProtoMessage>,
    handler: Arc<dyn CommitHandler>,
    idle_timeout: Duration,
    shutdown: oneshot::Receiver<()>,
}

impl ParticipantLoop {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                message = self.inbound.recv() => match message {
                    Some(message) => LoopEvent::Message(message),
                    None => LoopEvent::Disconnected,
                },
                _ = tokio::time::sleep(self.idle_timeout) => LoopEvent::Idle,
                _ = &mut self.shutdown => LoopEvent::Shutdown,
            };

            match event {
                LoopEvent::Message(message) => self.handle_message(message).await,
                LoopEvent::Idle => self.handle_idle_timeout().await,
                LoopEvent::Disconnected => {
                    slog::warn!(self.logger, "Lost connection to coordinator");
                    break;
                }
                LoopEvent::Shutdown => break,
            }
        }

        slog::info!(self.logger, "Participant stopped in round {:?}", self.state.round());
    }

    async fn handle_message(&mut self, message: Message) {
        match message.kind {
            MessageType::VoteRequest => self.handle_vote_request(message.round, message.value).await,
            MessageType::GlobalCommit => self.handle_global_commit(message.round).await,
            MessageType::GlobalAbort => self.handle_global_abort(message.round).await,
            other => slog::debug!(self.logger, "Ignoring unexpected {:?} for round {:?}", other, message.round),
        }
    }

    async fn handle_vote_request(&mut self, round: RoundId, payload: Bytes) {
        match self.state.on_vote_request(round, payload) {
            VoteRequestOutcome::Ignored => {
                slog::debug!(
                    self.logger,
                    "Ignoring VoteRequest for round {:?} while {}",
                    round,
                    self.state.phase()
                );
            }
            VoteRequestOutcome::MissedRound(vote) => {
                slog::info!(
                    self.logger,
                    "VoteRequest for round {:?} but expected {:?}, voting Abort",
                    round,
                    self.state.round()
                );
                self.send(vote);
            }
            VoteRequestOutcome::Undecodable(vote, e) => {
                slog::warn!(self.logger, "Undecodable operation in round {:?}: {}", round, e);
                self.send(vote);
            }
            VoteRequestOutcome::Prepare(operation) => {
                let vote = match self.handler.prepare(round, &operation).await {
                    Ok(()) => self.state.prepared(operation),
                    Err(e) => {
                        slog::info!(self.logger, "Refusing round {:?}: {}", round, e);
                        self.state.refused(operation)
                    }
                };
                self.send(vote);
            }
        }
    }

    async fn handle_global_commit(&mut self, round: RoundId) {
        let (round, operation) = match self.state.on_global_commit(round) {
            Some(pending) => pending,
            None => {
                slog::debug!(self.logger, "Ignoring GlobalCommit for round {:?}", round);
                return;
            }
        };

        if let Err(e) = self.handler.commit(round, operation).await {
            slog::warn!(self.logger, "Local apply failed for round {:?}: {}", round, e);
        }
        let ack = self.state.committed();
        self.send(ack);
    }

    async fn handle_global_abort(&mut self, round: RoundId) {
        let outcome = match self.state.on_global_abort(round) {
            Some(outcome) => outcome,
            None => {
                slog::debug!(self.logger, "Ignoring GlobalAbort for round {:?}", round);
                return;
            }
        };

        self.send(outcome.ack);
        if let Some(operation) = outcome.dropped {
            self.handler.abort(round, operation, AbortReason::GlobalAbort).await;
        }
    }

    async fn handle_idle_timeout(&mut self) {
        let phase = self.state.phase();
        if let Some((round, operation)) = self.state.on_idle_timeout() {
            slog::debug!(self.logger, "Idle timeout, abandoning round {:?}", round);
            self.handler.abort(round, operation, AbortReason::Abandoned).await;
        } else if phase != self.state.phase() {
            slog::debug!(self.logger, "Idle timeout, resynced to round {:?}", self.state.round());
        }
    }

    fn send(&self, message: Message) {
        if self.outbound.send(ProtoMessage::from(message)).is_err() {
            slog::warn!(self.logger, "Outbound stream to coordinator is closed");
        }
    }
}
