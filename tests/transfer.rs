mod common;

use bytes::Bytes;
use common::test_logger;
use layered_kv::{LayerError, MemoryStorage, Receiver, ReceiverConfig, Source, Stack, Transmitter, TransmitterConfig};
use std::error::Error;
use std::sync::Arc;

#[tokio::test]
async fn transmitter_forwards_to_remote_stack() -> Result<(), Box<dyn Error>> {
    // -- setup --
    let storage = Arc::new(MemoryStorage::new());
    let receiver = Arc::new(Receiver::new(ReceiverConfig {
        listen_addr: "127.0.0.1:0".parse()?,
        info_logger: test_logger("receiver"),
    }));
    let mut remote = Stack::new();
    remote.push(Arc::new(Source::new(storage.clone())))?;
    remote.push(receiver.clone())?;
    remote.start().await?;
    let receiver_addr = receiver.local_addr().expect("Receiver should be bound once started");

    let mut local = Stack::new();
    local.push(Arc::new(Transmitter::new(TransmitterConfig {
        receiver_addr: receiver_addr.to_string(),
        info_logger: test_logger("transmitter"),
    })))?;
    local.start().await?;

    // -- execute & verify --
    assert!(matches!(local.get(&Bytes::from_static(b"k")).await, Err(LayerError::NotFound)));

    local.set(Bytes::from_static(b"k"), Bytes::from_static(b"v")).await?;
    assert_eq!(local.get(&Bytes::from_static(b"k")).await?, Bytes::from_static(b"v"));
    assert_eq!(storage.len(), 1);

    local.sync().await?;
    local.remove(&Bytes::from_static(b"k")).await?;
    assert!(matches!(local.get(&Bytes::from_static(b"k")).await, Err(LayerError::NotFound)));
    assert!(storage.is_empty());

    // The receiver itself doesn't take direct traffic.
    assert!(matches!(remote.get(&Bytes::from_static(b"k")).await, Err(LayerError::Unsupported(_))));

    local.stop().await?;
    remote.stop().await?;
    assert!(receiver.local_addr().is_none());
    Ok(())
}

#[tokio::test]
async fn transmitter_requires_start() {
    let transmitter = Transmitter::new(TransmitterConfig {
        receiver_addr: "127.0.0.1:1".to_string(),
        info_logger: test_logger("transmitter"),
    });
    let mut stack = Stack::new();
    stack.push(Arc::new(transmitter)).unwrap();

    assert!(matches!(stack.sync().await, Err(LayerError::NotStarted)));
}
