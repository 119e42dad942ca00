#![allow(dead_code)]

use bytes::Bytes;
use chrono::Utc;
use layered_kv::{
    ConsensusConfig, ConsensusLayer, ConsensusOptions, Coordinator, CoordinatorConfig, CoordinatorOptions, LayerError, MemoryStorage, ParticipantOptions, RoundListener, RoundSummary, Source, Stack,
};
use slog::Drain;
use std::fs::{self, OpenOptions};
use std::sync::Arc;
use tokio::time::{Duration, Instant};

pub const VOTE_TIMEOUT: Duration = Duration::from_millis(300);

/// Logs go to stdout, or to timestamped files when `LAYERED_KV_TEST_LOG_DIR` is set.
pub fn test_logger(name: &str) -> slog::Logger {
    match std::env::var("LAYERED_KV_TEST_LOG_DIR") {
        Ok(directory_prefix) => create_root_logger_for_file(directory_prefix, name.to_string()),
        Err(_) => create_root_logger_for_stdout(name.to_string()),
    }
}

pub fn create_root_logger_for_file(directory_prefix: String, node_name: String) -> slog::Logger {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let log_directory = format!("{}/info_log_{}", directory_prefix, node_name);
    fs::create_dir_all(&log_directory).unwrap();
    let log_path = format!("{}/{}_info.log", log_directory, now);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)
        .unwrap();

    let decorator = slog_term::PlainDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("Node" => node_name))
}

pub fn create_root_logger_for_stdout(node_name: String) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("Node" => node_name))
}

pub fn coordinator_options() -> CoordinatorOptions {
    CoordinatorOptions {
        vote_timeout: Some(VOTE_TIMEOUT),
        ack_timeout: Some(VOTE_TIMEOUT),
        ..CoordinatorOptions::default()
    }
}

/// Participants must stay Ready longer than the coordinator may take to decide.
pub fn participant_options() -> ParticipantOptions {
    ParticipantOptions {
        idle_timeout: Some(Duration::from_secs(3)),
        ..ParticipantOptions::default()
    }
}

pub async fn start_coordinator(options: CoordinatorOptions) -> Coordinator {
    layered_kv::try_create_coordinator(CoordinatorConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        info_logger: test_logger("coordinator"),
        options,
    })
    .await
    .expect("Failed to start coordinator")
}

/// Source at the bottom, consensus on top, started.
pub async fn consensus_node(coordinator: &Coordinator, name: &str) -> Stack {
    let mut stack = Stack::new();
    stack
        .push(Arc::new(Source::new(Arc::new(MemoryStorage::new()))))
        .unwrap();
    stack.push(Arc::new(consensus_layer(coordinator, name))).unwrap();
    stack.start().await.expect("Failed to start consensus node");
    stack
}

pub fn consensus_layer(coordinator: &Coordinator, name: &str) -> ConsensusLayer {
    ConsensusLayer::try_new(ConsensusConfig {
        coordinator_addr: coordinator.local_addr().to_string(),
        info_logger: test_logger(name),
        options: ConsensusOptions {
            result_timeout: Some(Duration::from_secs(5)),
            participant: participant_options(),
        },
    })
    .unwrap()
}

pub async fn next_round(listener: &mut RoundListener) -> RoundSummary {
    tokio::time::timeout(Duration::from_secs(5), listener.next())
        .await
        .expect("Timeout waiting for round")
        .expect("Coordinator has shut down")
}

/// Polls `get` until it returns `expected` or the sanity deadline passes.
pub async fn wait_for_value(stack: &Stack, key: &'static [u8], expected: &'static [u8]) {
    let key = Bytes::from_static(key);
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match stack.get(&key).await {
            Ok(value) if value == Bytes::from_static(expected) => return,
            Ok(_) | Err(LayerError::NotFound) => {}
            Err(e) => panic!("Unexpected error: {}", e),
        }
        assert!(Instant::now() < deadline, "Timeout waiting for {:?}", key);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
