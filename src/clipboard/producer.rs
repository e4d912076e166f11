//! Chunk Producer
//!
//! Reads the source file on a dedicated thread and pushes fixed-size chunks
//! to a [`ChunkSink`] (the buffer coordinator in production).
//!
//! # State Machine
//!
//! ```text
//! Idle ──configure──> Configured ──start──> Running ──┬──> Finished
//!                        │                            └──> StoppedEarly
//!                        └── open fails: stays Configured, nothing produced
//! ```
//!
//! Stop is cooperative. The pause between chunks doubles as the stop wait,
//! so a stop request is observed within one loop iteration.

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::clipboard::error::{ClipboardError, Result};
use crate::clipboard::queue::EnqueueOutcome;

/// Receiver of produced chunks
///
/// Implemented by the buffer coordinator. All methods are called from the
/// producer thread.
pub trait ChunkSink: Send + Sync {
    /// Hand over the next chunk in file order
    fn enqueue_chunk(&self, chunk: Bytes) -> EnqueueOutcome;

    /// All declared bytes were produced
    fn mark_producer_complete(&self);

    /// Production stopped because of an open, spawn or read failure
    fn producer_failed(&self, error: &ClipboardError);
}

/// Producer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    /// Nothing configured
    Idle,
    /// Source recorded, file not opened (or open failed)
    Configured,
    /// Thread is reading the file
    Running,
    /// Every declared byte was produced
    Finished,
    /// Stopped on request or on a read error before the end
    StoppedEarly,
}

/// Producer tuning
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Maximum bytes per chunk
    pub chunk_size: usize,
    /// Pause between chunk reads
    pub interval: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::CHUNK_SIZE,
            interval: Duration::from_millis(20),
        }
    }
}

/// Source file parameters of one transfer
#[derive(Debug, Clone)]
pub struct SourceSpec {
    /// File to read
    pub path: PathBuf,
    /// Display name
    pub name: String,
    /// Declared size; production stops after this many bytes
    pub size: u64,
}

/// Handle to the running producer thread
struct Worker {
    handle: JoinHandle<()>,
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
}

/// Reads a source file in chunks on its own thread
pub struct ChunkProducer {
    config: ProducerConfig,
    source: Option<SourceSpec>,
    state: Arc<Mutex<ProducerState>>,
    worker: Option<Worker>,
}

impl ChunkProducer {
    /// Create an idle producer
    pub fn new(config: ProducerConfig) -> Self {
        Self {
            config,
            source: None,
            state: Arc::new(Mutex::new(ProducerState::Idle)),
            worker: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProducerState {
        *self.state.lock()
    }

    /// Configured source, if any
    pub fn source(&self) -> Option<&SourceSpec> {
        self.source.as_ref()
    }

    /// Record the source parameters. Opens nothing yet.
    pub fn configure(&mut self, path: impl AsRef<Path>, name: &str, size: u64) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            ProducerState::Idle | ProducerState::Finished | ProducerState::StoppedEarly => {}
            other => {
                return Err(ClipboardError::InvalidState(format!(
                    "cannot configure producer in state {:?}",
                    other
                )))
            }
        }

        // A finished worker may still be unjoined
        if let Some(worker) = self.worker.take() {
            let _ = worker.handle.join();
        }

        self.source = Some(SourceSpec {
            path: path.as_ref().to_path_buf(),
            name: name.to_string(),
            size,
        });
        *state = ProducerState::Configured;
        Ok(())
    }

    /// Open the source and spawn the reader thread.
    ///
    /// Returns `false` when the producer did not reach `Running`. Open and
    /// spawn failures are logged and reported to the sink, never returned.
    pub fn start(&mut self, sink: Arc<dyn ChunkSink>) -> bool {
        if self.state() != ProducerState::Configured {
            warn!("Producer start ignored in state {:?}", self.state());
            return false;
        }
        let Some(source) = self.source.clone() else {
            return false;
        };

        let file = match File::open(&source.path) {
            Ok(f) => f,
            Err(e) => {
                error!("Can't open source file {:?}: {}", source.path, e);
                sink.producer_failed(&ClipboardError::SourceUnavailable(format!(
                    "cannot open {}: {}",
                    source.path.display(),
                    e
                )));
                return false;
            }
        };

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let config = self.config.clone();
        let state = Arc::clone(&self.state);

        *self.state.lock() = ProducerState::Running;

        let spawned = thread::Builder::new()
            .name("vfile-producer".to_string())
            .spawn({
                let sink = Arc::clone(&sink);
                move || {
                    let outcome = run_producer(file, &source, &config, sink.as_ref(), &stop_rx);
                    *state.lock() = outcome;
                    let _ = done_tx.send(());
                }
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(Worker {
                    handle,
                    stop_tx,
                    done_rx,
                });
                true
            }
            Err(e) => {
                error!("Producer thread spawn failed: {}", e);
                *self.state.lock() = ProducerState::Configured;
                sink.producer_failed(&ClipboardError::ThreadSpawn(e.to_string()));
                false
            }
        }
    }

    /// Ask the running loop to exit. Does not wait.
    pub fn stop(&self) {
        if let Some(worker) = &self.worker {
            let _ = worker.stop_tx.try_send(());
        }
    }

    /// Wait for the thread to exit, at most `timeout`.
    pub fn wait(&mut self, timeout: Duration) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        // Last coordinator reference released on the producer thread itself
        if worker.handle.thread().id() == thread::current().id() {
            return Ok(());
        }

        match worker.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    error!("Producer thread panicked");
                    *self.state.lock() = ProducerState::StoppedEarly;
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Producer thread still running after {:?}", timeout);
                self.worker = Some(worker);
                Err(ClipboardError::ProducerJoinTimeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Let a thread that missed its stop deadline run on unjoined.
    ///
    /// The stop request stays pending, so the loop exits at its next check.
    /// Dropping the producer afterwards does not wait again.
    pub fn detach(&mut self) {
        if let Some(worker) = self.worker.take() {
            warn!(
                "Detaching producer thread {:?}",
                worker.handle.thread().name().unwrap_or("unnamed")
            );
            let _ = worker.stop_tx.try_send(());
        }
    }
}

impl Drop for ChunkProducer {
    fn drop(&mut self) {
        self.stop();
        let _ = self.wait(Duration::from_secs(3));
    }
}

impl std::fmt::Debug for ChunkProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkProducer")
            .field("config", &self.config)
            .field("source", &self.source)
            .field("state", &self.state())
            .finish()
    }
}

fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty))
}

/// Fill `buf` from `file`, stopping early only at EOF
fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Body of the producer thread
fn run_producer(
    mut file: File,
    source: &SourceSpec,
    config: &ProducerConfig,
    sink: &dyn ChunkSink,
    stop_rx: &Receiver<()>,
) -> ProducerState {
    info!(
        "Producer started: '{}' ({} bytes, {} byte chunks)",
        source.name, source.size, config.chunk_size
    );

    let mut produced: u64 = 0;
    while produced < source.size {
        if stop_requested(stop_rx) {
            debug!("Producer stop requested at {} bytes", produced);
            return ProducerState::StoppedEarly;
        }

        let want = (source.size - produced).min(config.chunk_size as u64) as usize;
        let mut buf = vec![0u8; want];
        let n = match read_chunk(&mut file, &mut buf) {
            Ok(0) => {
                error!(
                    "Source ended early: {} of {} bytes produced",
                    produced, source.size
                );
                sink.producer_failed(&ClipboardError::SourceUnavailable(format!(
                    "source ended after {} of {} bytes",
                    produced, source.size
                )));
                return ProducerState::StoppedEarly;
            }
            Ok(n) => n,
            Err(e) => {
                error!("Read failed at offset {}: {}", produced, e);
                sink.producer_failed(&ClipboardError::Io(e));
                return ProducerState::StoppedEarly;
            }
        };
        buf.truncate(n);
        produced += n as u64;

        match sink.enqueue_chunk(Bytes::from(buf)) {
            EnqueueOutcome::Queued | EnqueueOutcome::Dropped => {}
            EnqueueOutcome::Inactive => {
                debug!("Transfer inactive, producer exiting at {} bytes", produced);
                return ProducerState::StoppedEarly;
            }
        }
        trace!("Produced chunk of {} bytes, total {}", n, produced);

        if produced < source.size {
            match stop_rx.recv_timeout(config.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    debug!("Producer stop requested at {} bytes", produced);
                    return ProducerState::StoppedEarly;
                }
            }
        }
    }

    info!("Producer finished, {} bytes produced", produced);
    sink.mark_producer_complete();
    ProducerState::Finished
}
