//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Transfer pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Maximum bytes per chunk read from the source
    pub chunk_size: usize,

    /// Maximum queued chunks before backpressure applies
    pub queue_capacity: usize,

    /// Producer pause between chunks in milliseconds
    pub producer_interval_ms: u64,

    /// Full-queue behavior ("drop", "block", "grow")
    pub backpressure: String,

    /// How long stopping waits for the producer thread in milliseconds
    pub stop_timeout_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::CHUNK_SIZE,
            queue_capacity: 1000,
            producer_interval_ms: 20,
            backpressure: "drop".to_string(),
            stop_timeout_ms: 3000,
        }
    }
}

/// Pull stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Pause before reporting "retry later" in milliseconds
    pub retry_backoff_ms: u64,

    /// Blocked-read wait slice in milliseconds
    pub wait_slice_ms: u64,

    /// Maximum time one read may block in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retry_backoff_ms: 10,
            wait_slice_ms: 20,
            read_timeout_ms: 30_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,

    /// Directory for daily log files (None = console only)
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}
