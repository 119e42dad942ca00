use crate::grpc::grpc_transfer_client::GrpcTransferClient;
use crate::grpc::ProtoMessage;
use crate::layer::{Layer, LayerError};
use crate::twopc::{Message, MessageType, ParticipantId, RoundId};
use bytes::Bytes;
use std::convert::TryFrom;
use std::sync::Arc;
use tokio::sync::RwLock;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request};

pub struct TransmitterConfig {
    /// `host:port` of the `Receiver` to forward to.
    pub receiver_addr: String,
    pub info_logger: slog::Logger,
}

/// Transmitter is a terminal layer that forwards every operation to a remote `Receiver`, which
/// applies it to the stack behind it.
pub struct Transmitter {
    logger: slog::Logger,
    receiver_addr: String,
    client: RwLock<Option<GrpcTransferClient<Channel>>>,
}

impl Transmitter {
    pub fn new(config: TransmitterConfig) -> Self {
        Transmitter {
            logger: config.info_logger,
            receiver_addr: config.receiver_addr,
            client: RwLock::new(None),
        }
    }

    async fn apply(&self, kind: MessageType, key: Bytes, value: Bytes) -> Result<Message, LayerError> {
        let mut client = self.client.read().await.clone().ok_or(LayerError::NotStarted)?;

        let request = Message::new(kind, RoundId::new(0), ParticipantId::new(0))
            .with_key(key)
            .with_value(value);
        let rpc_request = ProtoMessage::from(request);
        slog::debug!(self.logger, "ClientWire - {:?}", rpc_request);

        let rpc_reply = client
            .apply(Request::new(rpc_request))
            .await
            .map_err(|status| match status.code() {
                Code::NotFound => LayerError::NotFound,
                _ => LayerError::Transport(status.message().to_string()),
            })?
            .into_inner();

        Message::try_from(rpc_reply).map_err(|e| LayerError::Encoding(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Layer for Transmitter {
    async fn get(&self, key: &Bytes) -> Result<Bytes, LayerError> {
        let reply = self.apply(MessageType::Get, key.clone(), Bytes::new()).await?;
        Ok(reply.value)
    }

    async fn set(&self, key: Bytes, value: Bytes) -> Result<(), LayerError> {
        self.apply(MessageType::Set, key, value).await?;
        Ok(())
    }

    async fn remove(&self, key: &Bytes) -> Result<(), LayerError> {
        self.apply(MessageType::Remove, key.clone(), Bytes::new()).await?;
        Ok(())
    }

    async fn sync(&self) -> Result<(), LayerError> {
        self.apply(MessageType::Sync, Bytes::new(), Bytes::new()).await?;
        Ok(())
    }

    async fn start(&self) -> Result<(), LayerError> {
        let endpoint = Endpoint::from_shared(format!("http://{}", self.receiver_addr))
            .map_err(|e| LayerError::Transport(e.to_string()))?;
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| LayerError::Transport(e.to_string()))?;

        slog::info!(self.logger, "Connected to receiver at {}", self.receiver_addr);
        self.client.write().await.replace(GrpcTransferClient::new(channel));
        Ok(())
    }

    async fn stop(&self) -> Result<(), LayerError> {
        self.client.write().await.take();
        Ok(())
    }

    fn set_next(&self, _next: Arc<dyn Layer>) -> Result<(), LayerError> {
        Err(LayerError::TerminalLayer)
    }
}
