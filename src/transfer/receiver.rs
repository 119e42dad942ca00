use crate::grpc::grpc_transfer_server::{GrpcTransfer, GrpcTransferServer};
use crate::grpc::ProtoMessage;
use crate::layer::{Layer, LayerError};
use crate::server::{self, RpcServerShutdownHandle, RpcServerShutdownSignal};
use crate::twopc::{Message, MessageType, ParticipantId, RoundId};
use bytes::Bytes;
use std::convert::TryFrom;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

pub struct ReceiverConfig {
    pub listen_addr: SocketAddr,
    pub info_logger: slog::Logger,
}

/// Receiver sits on top of a stack and serves operations forwarded by a `Transmitter`. It can't be
/// used directly: its own Get/Set/Remove/Sync are unsupported.
pub struct Receiver {
    logger: slog::Logger,
    listen_addr: SocketAddr,
    next: OnceLock<Arc<dyn Layer>>,
    running: Mutex<Option<RunningServer>>,
}

struct RunningServer {
    local_addr: SocketAddr,
    shutdown_handle: RpcServerShutdownHandle,
    server: JoinHandle<()>,
}

impl Receiver {
    pub fn new(config: ReceiverConfig) -> Self {
        Receiver {
            logger: config.info_logger,
            listen_addr: config.listen_addr,
            next: OnceLock::new(),
            running: Mutex::new(None),
        }
    }

    /// Bound address once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .expect("Receiver.local_addr() mutex guard poison")
            .as_ref()
            .map(|running| running.local_addr)
    }
}

#[async_trait::async_trait]
impl Layer for Receiver {
    async fn get(&self, _key: &Bytes) -> Result<Bytes, LayerError> {
        Err(LayerError::Unsupported("Receiver only serves forwarded operations"))
    }

    async fn set(&self, _key: Bytes, _value: Bytes) -> Result<(), LayerError> {
        Err(LayerError::Unsupported("Receiver only serves forwarded operations"))
    }

    async fn remove(&self, _key: &Bytes) -> Result<(), LayerError> {
        Err(LayerError::Unsupported("Receiver only serves forwarded operations"))
    }

    async fn sync(&self) -> Result<(), LayerError> {
        Err(LayerError::Unsupported("Receiver only serves forwarded operations"))
    }

    async fn start(&self) -> Result<(), LayerError> {
        let next = self.next.get().ok_or(LayerError::NoNextLayer)?.clone();

        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| LayerError::Transport(e.to_string()))?;
        let local_addr = listener.local_addr().map_err(|e| LayerError::Transport(e.to_string()))?;

        let (shutdown_handle, shutdown_signal) = server::shutdown_signal();
        let service = TransferService {
            logger: self.logger.clone(),
            next,
        };
        let server = tokio::spawn(service.run(listener, shutdown_signal));

        let previous = self
            .running
            .lock()
            .expect("Receiver.start() mutex guard poison")
            .replace(RunningServer {
                local_addr,
                shutdown_handle,
                server,
            });
        if previous.is_some() {
            slog::warn!(self.logger, "Receiver restarted, previous server shut down");
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), LayerError> {
        let running = self.running.lock().expect("Receiver.stop() mutex guard poison").take();

        if let Some(mut running) = running {
            running.shutdown_handle.shutdown();
            if tokio::time::timeout(Duration::from_millis(500), &mut running.server).await.is_err() {
                running.server.abort();
            }
        }
        Ok(())
    }

    fn set_next(&self, next: Arc<dyn Layer>) -> Result<(), LayerError> {
        self.next.set(next).map_err(|_| LayerError::NextLayerAlreadySet)
    }
}

struct TransferService {
    logger: slog::Logger,
    next: Arc<dyn Layer>,
}

impl TransferService {
    async fn run(self, listener: TcpListener, shutdown_signal: RpcServerShutdownSignal) {
        let logger = self.logger.clone();
        slog::info!(logger, "Listening on '{:?}'", listener.local_addr());

        let result = Server::builder()
            .add_service(GrpcTransferServer::new(self))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown_signal)
            .await;

        slog::info!(logger, "Server run() has exited: {:?}", result);
    }

    async fn handle_apply(&self, request: Message) -> Result<Message, LayerError> {
        let mut value = Bytes::new();
        match request.kind {
            MessageType::Set => self.next.set(request.key.clone(), request.value).await?,
            MessageType::Get => value = self.next.get(&request.key).await?,
            MessageType::Remove => self.next.remove(&request.key).await?,
            MessageType::Sync => self.next.sync().await?,
            _ => return Err(LayerError::Unsupported("Only Set, Get, Remove and Sync can be forwarded")),
        }

        Ok(Message::new(request.kind, RoundId::new(0), ParticipantId::new(0))
            .with_key(request.key)
            .with_value(value))
    }
}

#[async_trait::async_trait]
impl GrpcTransfer for TransferService {
    async fn apply(&self, rpc_request_wrapped: Request<ProtoMessage>) -> Result<Response<ProtoMessage>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);

        let request = Message::try_from(rpc_request).map_err(|e| Status::invalid_argument(e.to_string()))?;
        let rpc_result = match self.handle_apply(request).await {
            Ok(reply) => Ok(ProtoMessage::from(reply)),
            Err(LayerError::NotFound) => Err(Status::not_found("Key not found")),
            Err(LayerError::Unsupported(e)) => Err(Status::invalid_argument(e)),
            Err(e) => Err(Status::internal(e.to_string())),
        };
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }
}
