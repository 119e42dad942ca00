use crate::api::DisconnectPolicy;
use crate::grpc::grpc_cluster_server::{GrpcCluster, GrpcClusterServer};
use crate::grpc::{ProtoMessage, ProtoSetReq, ProtoSetResult};
use crate::server::RpcServerShutdownSignal;
use crate::twopc::coordinator::registry::ParticipantRegistry;
use crate::twopc::{Message, ParticipantId};
use bytes::Bytes;
use std::convert::TryFrom;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{TcpListenerStream, UnboundedReceiverStream};
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};

/// ClusterService is the coordinator's gRPC face. It queues client requests for the round driver
/// and pumps each participant's stream into the driver's single inbound channel.
pub(super) struct ClusterService {
    logger: slog::Logger,
    registry: Arc<ParticipantRegistry>,
    requests: mpsc::Sender<Bytes>,
    inbound: mpsc::UnboundedSender<Message>,
    disconnect_policy: DisconnectPolicy,
}

impl ClusterService {
    pub(super) fn new(
        logger: slog::Logger,
        registry: Arc<ParticipantRegistry>,
        requests: mpsc::Sender<Bytes>,
        inbound: mpsc::UnboundedSender<Message>,
        disconnect_policy: DisconnectPolicy,
    ) -> Self {
        ClusterService {
            logger,
            registry,
            requests,
            inbound,
            disconnect_policy,
        }
    }

    pub(super) async fn run(self, listener: TcpListener, shutdown_signal: RpcServerShutdownSignal) {
        let logger = self.logger.clone();
        slog::info!(logger, "Listening on '{:?}'", listener.local_addr());

        let result = Server::builder()
            .add_service(GrpcClusterServer::new(self))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown_signal)
            .await;

        slog::info!(logger, "Server run() has exited: {:?}", result);
    }

    fn spawn_receive_pump(&self, participant: ParticipantId, mut stream: Streaming<ProtoMessage>) {
        let logger = self.logger.new(slog::o!("ParticipantId" => participant.as_u64()));
        let inbound = self.inbound.clone();
        let registry = self.registry.clone();
        let disconnect_policy = self.disconnect_policy;

        tokio::spawn(async move {
            loop {
                match stream.message().await {
                    Ok(Some(proto)) => {
                        slog::debug!(logger, "ServerWire - {:?}", proto);
                        let mut message = match Message::try_from(proto) {
                            Ok(message) => message,
                            Err(e) => {
                                slog::warn!(logger, "Dropping undecodable message: {}", e);
                                continue;
                            }
                        };
                        // The connection, not the payload, decides who is speaking.
                        message.participant = participant;
                        if inbound.send(message).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        slog::info!(logger, "Participant disconnected");
                        break;
                    }
                    Err(status) => {
                        slog::warn!(logger, "Participant stream failed: {}", status);
                        break;
                    }
                }
            }

            if disconnect_policy == DisconnectPolicy::Evict {
                registry.evict(participant);
            }
        });
    }
}

#[async_trait::async_trait]
impl GrpcCluster for ClusterService {
    async fn set(&self, rpc_request_wrapped: Request<ProtoSetReq>) -> Result<Response<ProtoSetResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();
        slog::debug!(self.logger, "ServerWire - Set {} bytes", rpc_request.payload.len());

        self.requests
            .send(Bytes::from(rpc_request.payload))
            .await
            .map_err(|_| Status::unavailable("Coordinator round driver has exited"))?;

        Ok(Response::new(ProtoSetResult {}))
    }

    type ConnectionStream = UnboundedReceiverStream<Result<ProtoMessage, Status>>;

    async fn connection(
        &self,
        rpc_request_wrapped: Request<Streaming<ProtoMessage>>,
    ) -> Result<Response<Self::ConnectionStream>, Status> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (participant, round) = self
            .registry
            .register(outbound_tx)
            .ok_or_else(|| Status::internal("Failed to send handshake"))?;
        slog::info!(
            self.logger,
            "Participant {:?} connected, expecting round {:?}",
            participant,
            round
        );

        self.spawn_receive_pump(participant, rpc_request_wrapped.into_inner());

        Ok(Response::new(UnboundedReceiverStream::new(outbound_rx)))
    }
}
