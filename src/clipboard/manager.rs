//! Virtual Clipboard
//!
//! Entry point for the control side. Wires the coordinator to the clipboard
//! object and turns a source path into a started transfer.

use crossbeam_channel::Receiver;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::clipboard::buffer::{
    BufferCoordinator, CoordinatorConfig, EventPump, TransferEvent, TransferId, TransferSnapshot,
};
use crate::clipboard::data_object::{ClipboardPublisher, VirtualFileObject};
use crate::clipboard::error::{ClipboardError, Result};
use crate::clipboard::operation::AsyncOperation;

/// Virtual clipboard configuration
#[derive(Debug, Clone)]
pub struct VirtualClipboardConfig {
    /// Coordinator and producer tuning
    pub coordinator: CoordinatorConfig,

    /// Pause before a stream read reports "retry later"
    pub retry_backoff: Duration,
}

impl Default for VirtualClipboardConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            retry_backoff: Duration::from_millis(10),
        }
    }
}

/// Owns the coordinator and the clipboard object for one process
#[derive(Debug)]
pub struct VirtualClipboard {
    coordinator: Arc<BufferCoordinator>,
    data_object: Arc<VirtualFileObject>,
}

impl VirtualClipboard {
    /// Create a clipboard with no transfer
    pub fn new(config: VirtualClipboardConfig, publisher: Option<Arc<dyn ClipboardPublisher>>) -> Self {
        let coordinator = BufferCoordinator::new(config.coordinator);
        let data_object =
            VirtualFileObject::new(Arc::clone(&coordinator), publisher, config.retry_backoff);
        Self {
            coordinator,
            data_object,
        }
    }

    /// Start streaming `path`, advertised as `name` or the file's own name.
    ///
    /// The declared size is taken from the file's metadata.
    pub fn start_transfer(&self, path: impl AsRef<Path>, name: Option<&str>) -> Result<TransferId> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .map_err(|e| ClipboardError::SourceUnavailable(format!("{}: {}", path.display(), e)))?;
        if !metadata.is_file() {
            return Err(ClipboardError::SourceUnavailable(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let name = match name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    ClipboardError::SourceUnavailable(format!("{} has no file name", path.display()))
                })?,
        };

        self.coordinator.start_transfer(path, &name, metadata.len());
        self.coordinator
            .snapshot()
            .id
            .ok_or_else(|| ClipboardError::InvalidState("transfer did not start".to_string()))
    }

    /// Stop the current transfer
    pub fn stop_transfer(&self) {
        self.coordinator.stop_transfer();
    }

    /// Stop and take the virtual file off the clipboard
    pub fn shutdown(&self) {
        self.coordinator.stop_transfer();
        if let Err(e) = self.data_object.withdraw() {
            warn!("Failed to withdraw virtual file: {}", e);
        }
        info!("Virtual clipboard shut down");
    }

    /// Register for transfer events
    pub fn subscribe(&self) -> Receiver<TransferEvent> {
        self.coordinator.subscribe()
    }

    /// Hook run while a stream read waits for data
    pub fn set_event_pump(&self, pump: Option<Arc<dyn EventPump>>) {
        self.coordinator.set_event_pump(pump);
    }

    /// Current counters
    pub fn snapshot(&self) -> TransferSnapshot {
        self.coordinator.snapshot()
    }

    /// The object a paste target queries
    pub fn data_object(&self) -> &Arc<VirtualFileObject> {
        &self.data_object
    }

    /// Async-operation interface of the clipboard object
    pub fn operation(&self) -> &AsyncOperation {
        self.data_object.operation()
    }

    /// Underlying coordinator
    pub fn coordinator(&self) -> &Arc<BufferCoordinator> {
        &self.coordinator
    }
}
