use kubelog_core::{LogCache, RawLogEntry, TailEvent, TailEventSink};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default capacity of the ingestion queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Counters describing pipeline throughput
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Entries accepted into the queue
    pub accepted: u64,
    /// Entries refused because the queue was full or closed
    pub refused: u64,
    /// Entries handed to the cache by the drain task
    pub delivered: u64,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    refused: AtomicU64,
    delivered: AtomicU64,
}

/// Running drain task and the token that stops it
struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Bounded queue between many producers and one serialized cache writer
///
/// `enqueue` is safe to call from any thread and never waits. A single drain
/// task writes entries into the cache in arrival order.
pub struct IngestionPipeline {
    sender: mpsc::Sender<RawLogEntry>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<RawLogEntry>>>,
    cache: Arc<dyn LogCache>,
    worker: Mutex<Option<Worker>>,
    stopped: AtomicBool,
    closed: AtomicBool,
    counters: Arc<Counters>,
}

impl IngestionPipeline {
    /// Create a pipeline with a queue of `capacity` entries writing into `cache`
    pub fn new(capacity: usize, cache: Arc<dyn LogCache>) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            cache,
            worker: Mutex::new(None),
            stopped: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Try to queue an entry without waiting
    ///
    /// Returns `false` when the queue is full, stopped or closed; the caller
    /// decides whether to drop or retry.
    pub fn enqueue(&self, entry: RawLogEntry) -> bool {
        if self.closed.load(Ordering::Acquire) || self.stopped.load(Ordering::Acquire) {
            self.counters.refused.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        match self.sender.try_send(entry) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(entry)) => {
                debug!(source = %entry.source, "Ingestion queue full, entry refused");
                self.counters.refused.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.refused.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Launch the drain task, stopping a previously running one first
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(&self) {
        self.stop().await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(drain(
            Arc::clone(&self.receiver),
            Arc::clone(&self.cache),
            Arc::clone(&self.counters),
            cancel.clone(),
        ));

        if let Ok(mut worker) = self.worker.lock() {
            *worker = Some(Worker { cancel, handle });
        }
        if !self.closed.load(Ordering::Acquire) {
            self.stopped.store(false, Ordering::Release);
        }
        info!(cache = self.cache.name(), "Ingestion pipeline started");
    }

    /// Cancel the drain task and wait for it to exit
    ///
    /// Entries still queued are not delivered.
    pub async fn stop(&self) {
        let worker = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(_) => None,
        };

        if let Some(worker) = worker {
            self.stopped.store(true, Ordering::Release);
            worker.cancel.cancel();
            if let Err(e) = worker.handle.await {
                error!(error = %e, "Ingestion drain task failed");
            }
            info!("Ingestion pipeline stopped");
        }
    }

    /// Stop the drain task and close the queue for good
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.stop().await;
        self.receiver.lock().await.close();
        debug!("Ingestion queue closed");
    }

    /// Whether a drain task is currently running
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .map(|worker| worker.as_ref().is_some_and(|w| !w.handle.is_finished()))
            .unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            refused: self.counters.refused.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
        }
    }
}

impl TailEventSink for IngestionPipeline {
    fn post(&self, event: TailEvent) {
        match event {
            TailEvent::ScanStarted { file } => debug!(file = %file, "Scan started"),
            TailEvent::ScanCompleted { file } => debug!(file = %file, "Scan completed"),
            TailEvent::Lines(entry) => {
                let source = entry.source.clone();
                let bytes = entry.lines.len();
                if !self.enqueue(entry) {
                    warn!(source = %source, bytes, "Ingestion queue refused entry, dropping it");
                }
            }
        }
    }
}

/// Deliver queued entries to the cache until cancelled
async fn drain(
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<RawLogEntry>>>,
    cache: Arc<dyn LogCache>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    let mut receiver = tokio::select! {
        _ = cancel.cancelled() => return,
        receiver = receiver.lock() => receiver,
    };

    loop {
        let entry = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            entry = receiver.recv() => entry,
        };

        let Some(entry) = entry else {
            debug!("Ingestion queue closed, drain task exiting");
            break;
        };

        let source = entry.source.clone();
        match cache.add_entry(entry) {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(cache = cache.name(), source = %source, error = %e, "Failed to add entry to cache");
            }
        }
    }
}
