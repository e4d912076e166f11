//! Virtual File Clipboard Module
//!
//! Places one file on the clipboard without copying it: a descriptor is
//! advertised up front and content is read from disk only while a paste
//! target pulls it.
//!
//! # Architecture
//!
//! - [`ChunkProducer`] - Reads the source file on its own thread
//! - [`BufferCoordinator`] - Bounded chunk queue, transfer state, events
//! - [`FileContentsStream`] - Pull read/seek/stat for the paste target
//! - [`VirtualFileObject`] - Format table, descriptor, async operation
//! - [`VirtualClipboard`] - Control-side facade
//!
//! # Data Flow
//!
//! ```text
//! Driver                Coordinator              Paste target
//! ━━━━━━                ━━━━━━━━━━━              ━━━━━━━━━━━━
//!
//! start_transfer ──> ChunkProducer
//!                       └─> enqueue ──> PendingQueue
//!                                            │
//!                      FileGroupDescriptorW <┼── get_data
//!                                            │
//!                       FileContentsStream ──┴──> read / seek / stat
//!
//! end_operation ─────> Completed | Cancelled | Failed
//! ```
//!
//! # Features
//!
//! - **Lazy Streaming**: Nothing is read until the target pulls
//! - **Backpressure**: Drop, block or grow when the queue is full
//! - **Bounded Waits**: Stop wakes every blocked reader and producer
//! - **Progress Events**: Started, progress, finished, stopped, cancelled, aborted

pub mod buffer;
pub mod data_object;
pub mod descriptor;
pub mod error;
pub mod manager;
pub mod operation;
pub mod producer;
pub mod queue;
pub mod stream;

pub use buffer::{
    BufferCoordinator, CoordinatorConfig, EventPump, TransferAdvertiser, TransferEvent,
    TransferId, TransferSnapshot,
};
pub use data_object::{
    ClipboardData, ClipboardOffer, ClipboardPublisher, Medium, VirtualFileObject, VirtualFormat,
};
pub use descriptor::{FileDescriptor, FileDescriptorFlags};
pub use error::{classify_error, ClipboardError, ErrorType, Result};
pub use manager::{VirtualClipboard, VirtualClipboardConfig};
pub use operation::{AsyncOperation, OperationHandler, OperationOutcome};
pub use producer::{ChunkProducer, ChunkSink, ProducerConfig, ProducerState};
pub use queue::{BackpressurePolicy, EnqueueOutcome, PendingQueue};
pub use stream::{FileContentsStream, SeekOrigin, StreamRead, StreamStatus, StreamStat};
