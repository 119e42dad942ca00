use crate::server::RpcServerShutdownHandle;
use crate::twopc::coordinator::RoundListener;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Handle to a running coordinator. Dropping it (or calling `shutdown`) stops the gRPC server,
/// after which the round driver exits once its request queue drains.
pub struct Coordinator {
    local_addr: SocketAddr,
    round_listener: RoundListener,
    shutdown_handle: RpcServerShutdownHandle,
    server: JoinHandle<()>,
}

impl Coordinator {
    pub(crate) fn new(
        local_addr: SocketAddr,
        round_listener: RoundListener,
        shutdown_handle: RpcServerShutdownHandle,
        server: JoinHandle<()>,
    ) -> Self {
        Coordinator {
            local_addr,
            round_listener,
            shutdown_handle,
            server,
        }
    }

    /// Address the coordinator actually bound, useful when configured with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn round_listener(&self) -> RoundListener {
        self.round_listener.clone()
    }

    /// Graceful shutdown would wait on every participant's open stream, so the server gets a short
    /// grace period and is then aborted.
    pub async fn shutdown(mut self) {
        self.shutdown_handle.shutdown();
        if tokio::time::timeout(Duration::from_millis(500), &mut self.server).await.is_err() {
            self.server.abort();
        }
    }
}
