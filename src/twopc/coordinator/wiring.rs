use crate::api::{CoordinatorOptions, CoordinatorOptionsValidated};
use crate::server;
use crate::twopc::coordinator::driver::RoundDriver;
use crate::twopc::coordinator::registry::ParticipantRegistry;
use crate::twopc::coordinator::service::ClusterService;
use crate::twopc::coordinator::{round_listener, Coordinator};
use std::convert::TryFrom;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub struct CoordinatorConfig {
    /// Port 0 binds an ephemeral port, see `Coordinator::local_addr()`.
    pub listen_addr: SocketAddr,
    pub info_logger: slog::Logger,
    pub options: CoordinatorOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorCreationError {
    #[error("Illegal options for configuring coordinator: {0}")]
    IllegalCoordinatorOptions(String),
    #[error("Failed to bind listen address")]
    Bind(#[source] io::Error),
}

pub async fn try_create_coordinator(config: CoordinatorConfig) -> Result<Coordinator, CoordinatorCreationError> {
    let root_logger = config.info_logger;

    let options = CoordinatorOptionsValidated::try_from(config.options)
        .map_err(|e| CoordinatorCreationError::IllegalCoordinatorOptions(e.to_string()))?;

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(CoordinatorCreationError::Bind)?;
    let local_addr = listener.local_addr().map_err(CoordinatorCreationError::Bind)?;

    let registry = Arc::new(ParticipantRegistry::new(
        root_logger.new(slog::o!("Component" => "Registry")),
    ));
    let (request_tx, request_rx) = mpsc::channel(options.request_queue_capacity);
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (round_notifier, round_listener) = round_listener::new();

    let driver = RoundDriver::new(
        root_logger.new(slog::o!("Component" => "RoundDriver")),
        registry.clone(),
        request_rx,
        inbound_rx,
        round_notifier,
        &options,
    );
    tokio::spawn(driver.run());

    let (server_shutdown_handle, server_shutdown_signal) = server::shutdown_signal();
    let service = ClusterService::new(
        root_logger.new(slog::o!("Component" => "ClusterService")),
        registry,
        request_tx,
        inbound_tx,
        options.disconnect_policy,
    );
    let server = tokio::spawn(service.run(listener, server_shutdown_signal));

    Ok(Coordinator::new(
        local_addr,
        round_listener,
        server_shutdown_handle,
        server,
    ))
}
