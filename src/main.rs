use layered_kv::{CoordinatorConfig, CoordinatorOptions};
use slog::Drain;
use std::error::Error;
use std::net::SocketAddr;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9090";

/// Runs a standalone two-phase commit coordinator until Ctrl-C.
///
/// Usage: `layered-kv-coordinator [listen_addr]`
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let listen_addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
        .parse()?;
    let logger = create_root_logger();

    let coordinator = layered_kv::try_create_coordinator(CoordinatorConfig {
        listen_addr,
        info_logger: logger.clone(),
        options: CoordinatorOptions::default(),
    })
    .await?;
    slog::info!(logger, "Coordinator listening on {}", coordinator.local_addr());

    let mut round_listener = coordinator.round_listener();
    let round_logger = logger.clone();
    tokio::spawn(async move {
        while let Some(summary) = round_listener.next().await {
            slog::info!(
                round_logger,
                "Round completed";
                "Round" => summary.round.as_u64(),
                "Decision" => format!("{:?}", summary.decision),
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    slog::info!(logger, "Shutting down");
    coordinator.shutdown().await;

    Ok(())
}

fn create_root_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("Service" => "layered-kv-coordinator"))
}
