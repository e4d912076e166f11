//! Buffer Coordinator
//!
//! Owns the state of the single active virtual-file transfer and brokers
//! chunks between the producer thread and the pull consumer.
//!
//! # Concurrency
//!
//! ```text
//! producer thread ──enqueue──> [ PendingQueue ] ──read──> consumer thread
//!                                    │
//!                 data_ready ────────┤ (wakes blocked readers)
//!                 space_ready ───────┘ (wakes a producer parked by Block)
//! ```
//!
//! One mutex guards queue, counters and flags. Readers wait on `data_ready`
//! in short slices so an optional [`EventPump`] can run between waits and a
//! stop request is seen promptly. Events are published after the lock is
//! released.
//!
//! Each started transfer gets a generation number. Producer callbacks carry
//! the generation they were started with, so a slow producer from a replaced
//! transfer can never touch the new one.

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::clipboard::error::ClipboardError;
use crate::clipboard::operation::{OperationHandler, OperationOutcome};
use crate::clipboard::producer::{ChunkProducer, ChunkSink, ProducerConfig, ProducerState};
use crate::clipboard::queue::{BackpressurePolicy, EnqueueOutcome, PendingQueue};

/// Unique identifier of one started transfer
pub type TransferId = Uuid;

/// Coordinator tuning
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum chunk size produced
    pub chunk_size: usize,
    /// Maximum queued chunks before backpressure applies
    pub queue_capacity: usize,
    /// Full-queue behavior
    pub backpressure: BackpressurePolicy,
    /// Producer pause between chunks
    pub producer_interval: Duration,
    /// How long stop waits for the producer thread
    pub stop_timeout: Duration,
    /// Length of one blocked-read wait slice
    pub wait_slice: Duration,
    /// Total time a read may block before returning 0
    pub read_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::CHUNK_SIZE,
            queue_capacity: 1000,
            backpressure: BackpressurePolicy::Drop,
            producer_interval: Duration::from_millis(20),
            stop_timeout: Duration::from_secs(3),
            wait_slice: Duration::from_millis(20),
            read_timeout: Duration::from_secs(30),
        }
    }
}

impl CoordinatorConfig {
    fn producer_config(&self) -> ProducerConfig {
        ProducerConfig {
            chunk_size: self.chunk_size,
            interval: self.producer_interval,
        }
    }
}

/// Hook run between wait slices of a blocked read, with the lock released.
///
/// Lets a consumer thread that also services a UI or message loop keep it
/// responsive while waiting for data.
pub trait EventPump: Send + Sync {
    /// Process pending events without blocking
    fn pump(&self);
}

impl<F: Fn() + Send + Sync> EventPump for F {
    fn pump(&self) {
        self()
    }
}

/// Refreshes whatever advertises the current transfer to the outside
pub trait TransferAdvertiser: Send + Sync {
    /// A new transfer was started
    fn advertise(&self, name: &str, total_size: u64);
}

/// Lifecycle and progress notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// A transfer was started
    Started {
        /// Transfer identifier
        id: TransferId,
        /// Advertised file name
        name: String,
        /// Declared size in bytes
        total_bytes: u64,
    },
    /// Bytes were delivered to the consumer
    Progress {
        /// Bytes consumed so far
        transferred: u64,
        /// Declared size
        total: u64,
    },
    /// Every declared byte was consumed. Emitted once per transfer.
    Finished,
    /// Transfer stopped by the control side
    Stopped,
    /// Paste target cancelled the operation
    Cancelled,
    /// Transfer ended without delivering all bytes
    Aborted {
        /// What went wrong
        reason: String,
    },
    /// Paste target reported the end of its asynchronous operation
    OperationCompleted {
        /// Whether the target performed the drop
        performed: bool,
    },
}

/// Point-in-time view of the transfer counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSnapshot {
    /// Current transfer, `None` before the first start
    pub id: Option<TransferId>,
    /// Advertised file name
    pub name: String,
    /// Declared size
    pub total_size: u64,
    /// Bytes delivered to the consumer
    pub bytes_consumed: u64,
    /// Bytes accepted into the queue
    pub bytes_enqueued: u64,
    /// Chunks waiting
    pub queued_chunks: usize,
    /// Bytes waiting
    pub queued_bytes: usize,
    /// Chunks discarded by the drop policy
    pub dropped_chunks: u64,
    /// Bytes discarded by the drop policy
    pub dropped_bytes: u64,
    /// Transfer is accepting chunks and serving reads
    pub active: bool,
    /// Producer reported it produced every byte
    pub producer_done: bool,
}

impl TransferSnapshot {
    /// Fraction consumed, 0-100
    pub fn percentage(&self) -> f64 {
        if self.total_size == 0 {
            return 100.0;
        }
        (self.bytes_consumed as f64 / self.total_size as f64) * 100.0
    }
}

/// State guarded by the coordinator mutex
struct TransferState {
    id: Option<TransferId>,
    generation: u64,
    source_path: PathBuf,
    name: String,
    total_size: u64,
    bytes_consumed: u64,
    bytes_enqueued: u64,
    dropped_chunks: u64,
    dropped_bytes: u64,
    active: bool,
    producer_done: bool,
    finished_sent: bool,
    queue: PendingQueue,
}

impl TransferState {
    fn new(capacity: usize) -> Self {
        Self {
            id: None,
            generation: 0,
            source_path: PathBuf::new(),
            name: String::new(),
            total_size: 0,
            bytes_consumed: 0,
            bytes_enqueued: 0,
            dropped_chunks: 0,
            dropped_bytes: 0,
            active: false,
            producer_done: false,
            finished_sent: false,
            queue: PendingQueue::new(capacity),
        }
    }

    fn is_complete(&self) -> bool {
        !self.active && self.bytes_consumed >= self.total_size
    }

    /// Close out a transfer whose producer is done and whose queue is empty
    fn settle_drained(&mut self, events: &mut Vec<TransferEvent>) {
        if !(self.active && self.producer_done && self.queue.is_empty()) {
            return;
        }
        self.active = false;

        if self.bytes_consumed >= self.total_size {
            if !self.finished_sent {
                self.finished_sent = true;
                info!(
                    "Transfer of '{}' finished, {} bytes delivered",
                    self.name, self.bytes_consumed
                );
                events.push(TransferEvent::Finished);
            }
        } else {
            warn!(
                "Transfer of '{}' drained at {} of {} bytes ({} bytes dropped)",
                self.name, self.bytes_consumed, self.total_size, self.dropped_bytes
            );
            events.push(TransferEvent::Aborted {
                reason: format!(
                    "queue drained at {} of {} bytes",
                    self.bytes_consumed, self.total_size
                ),
            });
        }
    }
}

/// Coordinates one virtual-file transfer between producer and consumer
pub struct BufferCoordinator {
    config: CoordinatorConfig,
    self_ref: Weak<BufferCoordinator>,
    state: Mutex<TransferState>,
    data_ready: Condvar,
    space_ready: Condvar,
    /// Serializes start and stop; holds the producer of the current transfer
    producer: Mutex<Option<ChunkProducer>>,
    subscribers: Mutex<Vec<Sender<TransferEvent>>>,
    advertiser: Mutex<Option<Weak<dyn TransferAdvertiser>>>,
    pump: Mutex<Option<Arc<dyn EventPump>>>,
}

impl BufferCoordinator {
    /// Create an idle coordinator
    pub fn new(config: CoordinatorConfig) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            state: Mutex::new(TransferState::new(config.queue_capacity)),
            config,
            self_ref: self_ref.clone(),
            data_ready: Condvar::new(),
            space_ready: Condvar::new(),
            producer: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            advertiser: Mutex::new(None),
            pump: Mutex::new(None),
        })
    }

    /// Coordinator tuning
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Register for transfer events
    pub fn subscribe(&self) -> Receiver<TransferEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Object refreshed on every start
    pub fn set_advertiser(&self, advertiser: Weak<dyn TransferAdvertiser>) {
        *self.advertiser.lock() = Some(advertiser);
    }

    /// Hook run while a read is blocked
    pub fn set_event_pump(&self, pump: Option<Arc<dyn EventPump>>) {
        *self.pump.lock() = pump;
    }

    /// Begin a transfer of `path`, replacing any transfer in progress.
    ///
    /// Failures to open the file surface asynchronously: the transfer is
    /// deactivated and an `Aborted` event is published.
    pub fn start_transfer(&self, path: impl AsRef<Path>, name: &str, size: u64) {
        let path = path.as_ref();
        let mut slot = self.producer.lock();

        self.shutdown(&mut slot, None);

        let (generation, id) = {
            let mut st = self.state.lock();
            let id = Uuid::new_v4();
            st.generation += 1;
            st.id = Some(id);
            st.source_path = path.to_path_buf();
            st.name = name.to_string();
            st.total_size = size;
            st.bytes_consumed = 0;
            st.bytes_enqueued = 0;
            st.dropped_chunks = 0;
            st.dropped_bytes = 0;
            st.producer_done = false;
            st.finished_sent = false;
            st.queue.clear();
            st.active = true;
            (st.generation, id)
        };

        info!(
            "Starting transfer {} of {:?} as '{}' ({} bytes)",
            id, path, name, size
        );
        self.publish(vec![TransferEvent::Started {
            id,
            name: name.to_string(),
            total_bytes: size,
        }]);

        let advertiser = self.advertiser.lock().as_ref().and_then(Weak::upgrade);
        if let Some(advertiser) = advertiser {
            advertiser.advertise(name, size);
        }

        let mut producer = ChunkProducer::new(self.config.producer_config());
        if let Err(e) = producer.configure(path, name, size) {
            error!("Producer configuration failed: {}", e);
            self.producer_failed_for(generation, &e.to_string());
            return;
        }

        let sink: Arc<dyn ChunkSink> = Arc::new(TransferSink {
            coordinator: self.self_ref.clone(),
            generation,
        });
        // Open and spawn failures are reported through the sink
        producer.start(sink);
        *slot = Some(producer);
    }

    /// Stop the current transfer. No-op when nothing is active.
    pub fn stop_transfer(&self) {
        let mut slot = self.producer.lock();
        self.shutdown(&mut slot, Some(TransferEvent::Stopped));
    }

    /// Stop the current transfer because the paste target cancelled it
    pub fn cancel_transfer(&self) {
        let mut slot = self.producer.lock();
        self.shutdown(&mut slot, Some(TransferEvent::Cancelled));
    }

    /// Stop the current transfer because the paste target aborted it
    pub fn abort_transfer(&self, reason: &str) {
        let mut slot = self.producer.lock();
        self.shutdown(
            &mut slot,
            Some(TransferEvent::Aborted {
                reason: reason.to_string(),
            }),
        );
    }

    /// The paste target finished its asynchronous operation
    pub fn operation_completed(&self, performed: bool) {
        info!("Paste operation completed (performed: {})", performed);
        self.publish(vec![TransferEvent::OperationCompleted { performed }]);
    }

    /// Deactivate, wake every waiter, join the producer, discard the queue
    fn shutdown(&self, slot: &mut Option<ChunkProducer>, event: Option<TransferEvent>) {
        let was_active = {
            let mut st = self.state.lock();
            let was_active = st.active;
            st.active = false;
            was_active
        };
        self.data_ready.notify_all();
        self.space_ready.notify_all();

        if let Some(mut producer) = slot.take() {
            producer.stop();
            if let Err(e) = producer.wait(self.config.stop_timeout) {
                warn!("Producer did not stop cleanly: {}", e);
                producer.detach();
            }
        }

        let name = {
            let mut st = self.state.lock();
            st.queue.clear();
            st.name.clone()
        };

        if was_active {
            info!("Transfer of '{}' stopped", name);
            if let Some(event) = event {
                self.publish(vec![event]);
            }
        }
    }

    /// Push a chunk for the current transfer
    pub fn enqueue_chunk(&self, chunk: Bytes) -> EnqueueOutcome {
        let generation = self.state.lock().generation;
        self.enqueue_for(generation, chunk)
    }

    fn enqueue_for(&self, generation: u64, chunk: Bytes) -> EnqueueOutcome {
        let len = chunk.len();
        let mut st = self.state.lock();
        loop {
            if !st.active || st.generation != generation {
                return EnqueueOutcome::Inactive;
            }
            if !st.queue.is_full() {
                break;
            }
            match self.config.backpressure {
                BackpressurePolicy::Drop => {
                    st.dropped_chunks += 1;
                    st.dropped_bytes += len as u64;
                    warn!(
                        "Queue full ({} chunks), dropped {} byte chunk",
                        st.queue.len(),
                        len
                    );
                    return EnqueueOutcome::Dropped;
                }
                BackpressurePolicy::Grow => {
                    debug!("Queue grew past capacity to {} chunks", st.queue.len() + 1);
                    break;
                }
                BackpressurePolicy::Block => {
                    trace!("Queue full, producer waiting for space");
                    self.space_ready.wait_for(&mut st, self.config.wait_slice);
                }
            }
        }

        if len > 0 {
            st.bytes_enqueued += len as u64;
            st.queue.push_back(chunk);
        }
        drop(st);
        self.data_ready.notify_all();
        EnqueueOutcome::Queued
    }

    /// Record that the producer delivered every byte of the current transfer
    pub fn mark_producer_complete(&self) {
        let generation = self.state.lock().generation;
        self.mark_complete_for(generation);
    }

    fn mark_complete_for(&self, generation: u64) {
        {
            let mut st = self.state.lock();
            if st.generation != generation {
                return;
            }
            st.producer_done = true;
            debug!(
                "Producer complete, {} bytes enqueued, {} chunks waiting",
                st.bytes_enqueued,
                st.queue.len()
            );
        }
        self.data_ready.notify_all();
    }

    fn producer_failed_for(&self, generation: u64, reason: &str) {
        let aborted = {
            let mut st = self.state.lock();
            if st.generation != generation || !st.active {
                false
            } else {
                st.active = false;
                st.queue.clear();
                true
            }
        };
        if !aborted {
            return;
        }

        error!("Transfer aborted: {}", reason);
        self.data_ready.notify_all();
        self.space_ready.notify_all();
        self.publish(vec![TransferEvent::Aborted {
            reason: reason.to_string(),
        }]);
    }

    /// Copy up to `buf.len()` bytes of the next data into `buf`.
    ///
    /// Blocks while the transfer is active, the producer is still running and
    /// nothing is queued. Returns 0 when the transfer is stopped, replaced,
    /// drained, or the read timeout elapses. Never returns more than
    /// `buf.len()`.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        self.read_transfer(None, buf)
    }

    /// Like [`read`](Self::read), but returns 0 unless `id` is still the
    /// current transfer.
    pub fn read_from(&self, id: TransferId, buf: &mut [u8]) -> usize {
        self.read_transfer(Some(id), buf)
    }

    fn read_transfer(&self, id: Option<TransferId>, buf: &mut [u8]) -> usize {
        let mut events = Vec::new();
        let pump = self.pump.lock().clone();

        let n = {
            let mut st = self.state.lock();
            if id.is_some() && st.id != id {
                debug!("Read for a replaced transfer");
                return 0;
            }
            if !st.active {
                trace!("Read on inactive transfer");
                return 0;
            }

            let generation = st.generation;
            let deadline = Instant::now() + self.config.read_timeout;
            while st.active && !st.producer_done && st.queue.is_empty() {
                let now = Instant::now();
                if now >= deadline {
                    debug!(
                        "Read timed out after {:?} at {} bytes",
                        self.config.read_timeout, st.bytes_consumed
                    );
                    return 0;
                }
                let slice = self.config.wait_slice.min(deadline - now);
                let timed_out = self.data_ready.wait_for(&mut st, slice).timed_out();
                if timed_out {
                    if let Some(pump) = &pump {
                        MutexGuard::unlocked(&mut st, || pump.pump());
                    }
                }
            }

            if st.generation != generation {
                debug!("Transfer replaced during read");
                return 0;
            }

            match st.queue.take(buf.len()) {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    st.bytes_consumed += chunk.len() as u64;
                    events.push(TransferEvent::Progress {
                        transferred: st.bytes_consumed,
                        total: st.total_size,
                    });
                    st.settle_drained(&mut events);
                    chunk.len()
                }
                None => {
                    st.settle_drained(&mut events);
                    0
                }
            }
        };

        if n > 0 {
            self.space_ready.notify_all();
        }
        self.publish(events);
        n
    }

    /// Identifier of the current transfer, `None` before the first start
    pub fn transfer_id(&self) -> Option<TransferId> {
        self.state.lock().id
    }

    /// Advertised name of the current transfer
    pub fn file_name(&self) -> String {
        self.state.lock().name.clone()
    }

    /// Source path of the current transfer
    pub fn source_path(&self) -> PathBuf {
        self.state.lock().source_path.clone()
    }

    /// Declared size of the current transfer
    pub fn total_size(&self) -> u64 {
        self.state.lock().total_size
    }

    /// Bytes delivered to the consumer
    pub fn bytes_consumed(&self) -> u64 {
        self.state.lock().bytes_consumed
    }

    /// Transfer is accepting chunks and serving reads
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Inactive with every declared byte consumed
    pub fn is_complete(&self) -> bool {
        self.state.lock().is_complete()
    }

    /// Producer lifecycle state, `None` before the first start
    pub fn producer_state(&self) -> Option<ProducerState> {
        self.producer.lock().as_ref().map(ChunkProducer::state)
    }

    /// Current counters
    pub fn snapshot(&self) -> TransferSnapshot {
        let st = self.state.lock();
        TransferSnapshot {
            id: st.id,
            name: st.name.clone(),
            total_size: st.total_size,
            bytes_consumed: st.bytes_consumed,
            bytes_enqueued: st.bytes_enqueued,
            queued_chunks: st.queue.len(),
            queued_bytes: st.queue.queued_bytes(),
            dropped_chunks: st.dropped_chunks,
            dropped_bytes: st.dropped_bytes,
            active: st.active,
            producer_done: st.producer_done,
        }
    }

    fn publish(&self, events: Vec<TransferEvent>) {
        if events.is_empty() {
            return;
        }
        let mut subscribers = self.subscribers.lock();
        for event in events {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

impl OperationHandler for BufferCoordinator {
    fn operation_ended(&self, outcome: OperationOutcome) {
        match outcome {
            OperationOutcome::Completed { performed, .. } => self.operation_completed(performed),
            OperationOutcome::Cancelled => {
                info!("Paste operation cancelled by target");
                self.cancel_transfer();
            }
            OperationOutcome::Failed { code } => {
                warn!("Paste operation failed in target (0x{:08X})", code);
                self.abort_transfer(&format!("operation failed (0x{:08X})", code));
            }
        }
    }
}

impl Drop for BufferCoordinator {
    fn drop(&mut self) {
        let mut slot = self.producer.get_mut().take();
        self.shutdown(&mut slot, None);
    }
}

impl std::fmt::Debug for BufferCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferCoordinator")
            .field("config", &self.config)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Producer-facing view of one transfer generation
struct TransferSink {
    coordinator: Weak<BufferCoordinator>,
    generation: u64,
}

impl ChunkSink for TransferSink {
    fn enqueue_chunk(&self, chunk: Bytes) -> EnqueueOutcome {
        match self.coordinator.upgrade() {
            Some(c) => c.enqueue_for(self.generation, chunk),
            None => EnqueueOutcome::Inactive,
        }
    }

    fn mark_producer_complete(&self) {
        if let Some(c) = self.coordinator.upgrade() {
            c.mark_complete_for(self.generation);
        }
    }

    fn producer_failed(&self, error: &ClipboardError) {
        if let Some(c) = self.coordinator.upgrade() {
            c.producer_failed_for(self.generation, &error.to_string());
        }
    }
}
