use crate::api::CacheOptionsValidated;
use crate::cache::buffer::{FlushBuffer, FlushEntry, FlushOperation};
use crate::cache::tombstones::Tombstones;
use crate::layer::{FlushFailure, Layer, LayerError};
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Flusher is the write-back half of `LayerCache`. Writers enqueue into the current generation's
/// channel; a single worker task deduplicates entries and propagates them to the next layer.
///
/// A sync request swaps in a fresh generation so writers keep making progress while the worker
/// drains the closed one.
pub(crate) struct Flusher {
    logger: slog::Logger,
    current: Arc<Mutex<Option<GenerationSender>>>,
    control: mpsc::Sender<Control>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
struct GenerationSender {
    id: u64,
    sender: mpsc::Sender<FlushEntry>,
}

struct Generation {
    id: u64,
    receiver: mpsc::Receiver<FlushEntry>,
}

enum Control {
    Sync(oneshot::Sender<Result<(), LayerError>>),
}

impl Flusher {
    pub(crate) fn spawn(
        logger: slog::Logger,
        next: Arc<dyn Layer>,
        tombstones: Arc<Tombstones>,
        options: &CacheOptionsValidated,
    ) -> Self {
        let (entry_tx, entry_rx) = mpsc::channel(options.buffer_capacity);
        let (control_tx, control_rx) = mpsc::channel(1);
        let current = Arc::new(Mutex::new(Some(GenerationSender {
            id: 0,
            sender: entry_tx,
        })));

        let worker = FlushWorker {
            logger: logger.clone(),
            next,
            tombstones,
            current: current.clone(),
            generation: Generation {
                id: 0,
                receiver: entry_rx,
            },
            control: control_rx,
            buffer: FlushBuffer::new(options.key_limit),
            buffer_capacity: options.buffer_capacity,
            idle_flush_interval: options.idle_flush_interval,
        };
        let worker = tokio::spawn(worker.run());

        Flusher {
            logger,
            current,
            control: control_tx,
            worker: tokio::sync::Mutex::new(Some(worker)),
        }
    }

    /// Blocks only while the current generation's channel is full.
    pub(crate) async fn enqueue(&self, key: Bytes, operation: FlushOperation) -> Result<(), LayerError> {
        let mut entry = FlushEntry { key, operation };
        let mut last_generation = None;

        loop {
            let generation = self.current_generation()?;
            if last_generation == Some(generation.id) {
                // Same generation refused us twice, so the worker is gone.
                return Err(LayerError::FlusherStopped);
            }

            match generation.sender.send(entry).await {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => {
                    // Closed by a sync swap. Retry on the generation that replaced it.
                    entry = returned;
                    last_generation = Some(generation.id);
                }
            }
        }
    }

    /// Blocks until everything enqueued before this call has reached the next layer and the next
    /// layer's own `sync` has completed.
    pub(crate) async fn sync(&self) -> Result<(), LayerError> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(Control::Sync(tx))
            .await
            .map_err(|_| LayerError::FlusherStopped)?;

        rx.await.map_err(|_| LayerError::FlusherStopped)?
    }

    /// Closes the input and waits for the worker to drain what is left.
    pub(crate) async fn stop(&self) {
        self.current.lock().expect("Flusher.stop() mutex guard poison").take();

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                slog::error!(self.logger, "Flusher worker failed: {:?}", e);
            }
        }
    }

    fn current_generation(&self) -> Result<GenerationSender, LayerError> {
        self.current
            .lock()
            .expect("Flusher.current_generation() mutex guard poison")
            .clone()
            .ok_or(LayerError::FlusherStopped)
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        // Lets the worker observe a closed input and exit.
        if let Ok(mut current) = self.current.lock() {
            current.take();
        }
    }
}

enum WorkerEvent {
    Entry(FlushEntry),
    InputClosed,
    Control(Control),
    Idle,
}

struct FlushWorker {
    logger: slog::Logger,
    next: Arc<dyn Layer>,
    tombstones: Arc<Tombstones>,
    current: Arc<Mutex<Option<GenerationSender>>>,
    generation: Generation,
    control: mpsc::Receiver<Control>,
    buffer: FlushBuffer,
    buffer_capacity: usize,
    idle_flush_interval: Duration,
}

impl FlushWorker {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                entry = self.generation.receiver.recv() => match entry {
                    Some(entry) => WorkerEvent::Entry(entry),
                    None => WorkerEvent::InputClosed,
                },
                Some(control) = self.control.recv() => WorkerEvent::Control(control),
                _ = tokio::time::sleep(self.idle_flush_interval) => WorkerEvent::Idle,
            };

            match event {
                WorkerEvent::Entry(entry) => {
                    if self.buffer.insert(entry) {
                        slog::debug!(self.logger, "Key limit exceeded, flushing {} keys", self.buffer.len());
                        self.flush_in_background().await;
                    }
                }
                WorkerEvent::Control(Control::Sync(reply)) => {
                    let result = self.handle_sync().await;
                    let _ = reply.send(result);
                }
                WorkerEvent::Idle => {
                    if !self.buffer.is_empty() {
                        slog::debug!(self.logger, "Idle timeout, flushing {} keys", self.buffer.len());
                        self.flush_in_background().await;
                    }
                }
                WorkerEvent::InputClosed => break,
            }
        }

        self.flush_in_background().await;
        slog::info!(self.logger, "Flusher stopped");
    }

    /// Everything still queued in the closed generation joins the buffer before anything is
    /// written, so last-write-wins holds across the sync.
    async fn handle_sync(&mut self) -> Result<(), LayerError> {
        let failures = match self.swap_generation() {
            Some(closed) => self.finish_generation(closed).await,
            None => self.flush().await,
        };

        let downstream = self.next.sync().await;

        if failures.is_empty() {
            return downstream;
        }
        if let Err(e) = downstream {
            slog::warn!(self.logger, "Downstream sync failed after flush failures: {}", e);
        }
        Err(LayerError::Flush { failures })
    }

    /// Installs a new generation for writers and hands back the old one, already closed. Returns
    /// None once the flusher is stopping, in which case the current generation keeps draining in
    /// the main loop.
    fn swap_generation(&mut self) -> Option<Generation> {
        let (sender, receiver) = mpsc::channel(self.buffer_capacity);
        let id = self.generation.id + 1;

        {
            let mut current = self.current.lock().expect("FlushWorker.swap_generation() mutex guard poison");
            match current.as_mut() {
                Some(generation) => *generation = GenerationSender { id, sender },
                None => return None,
            }
        }

        let mut closed = std::mem::replace(&mut self.generation, Generation { id, receiver });
        closed.receiver.close();
        slog::debug!(self.logger, "Swapped flusher generation {} -> {}", closed.id, id);
        Some(closed)
    }

    async fn finish_generation(&mut self, mut closed: Generation) -> Vec<FlushFailure> {
        let mut failures = Vec::new();
        while let Some(entry) = closed.receiver.recv().await {
            if self.buffer.insert(entry) {
                failures.extend(self.flush().await);
            }
        }
        failures.extend(self.flush().await);
        failures
    }

    async fn flush_in_background(&mut self) {
        for failure in self.flush().await {
            slog::error!(self.logger, "Failed to flush key {:?}: {}", failure.key, failure.error);
        }
    }

    /// Attempts every buffered operation, even after one of them failed.
    async fn flush(&mut self) -> Vec<FlushFailure> {
        let mut failures = Vec::new();
        for (key, operation) in self.buffer.take() {
            let result = match operation {
                FlushOperation::Set(value) => self.next.set(key.clone(), value).await,
                FlushOperation::Remove(seq) => {
                    let result = self.next.remove(&key).await;
                    if result.is_ok() {
                        self.tombstones.clear_flushed(&key, seq);
                    }
                    result
                }
            };
            if let Err(error) = result {
                failures.push(FlushFailure { key, error });
            }
        }
        failures
    }
}
