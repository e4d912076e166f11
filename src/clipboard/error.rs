//! Clipboard Error Types
//!
//! Error handling for the virtual file clipboard. Errors surface on the
//! control side (starting transfers, building descriptors, seeking); the pull
//! side never returns an error and degrades to a status code instead.

use thiserror::Error;

/// Result type for clipboard operations
pub type Result<T> = std::result::Result<T, ClipboardError>;

/// Clipboard module error types
#[derive(Error, Debug)]
pub enum ClipboardError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Source file missing, unreadable or not a regular file
    #[error("Source file unavailable: {0}")]
    SourceUnavailable(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Seek outside the declared size or behind already consumed data
    #[error("Invalid seek to offset {offset}: {reason}")]
    InvalidSeek {
        /// Offset the caller asked for
        offset: i64,
        /// Why it was refused
        reason: String,
    },

    /// Clipboard format not offered by the virtual file
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// FILEDESCRIPTORW / FileGroupDescriptorW bytes could not be decoded
    #[error("Malformed file descriptor: {0}")]
    MalformedDescriptor(String),

    /// Format is offered but not on the requested storage medium
    #[error("Unsupported medium for {format}: {medium}")]
    UnsupportedMedium {
        /// Requested format
        format: String,
        /// Requested medium
        medium: String,
    },

    /// Operation requires an active transfer
    #[error("No active transfer")]
    TransferInactive,

    /// Producer thread could not be spawned
    #[error("Failed to spawn producer thread: {0}")]
    ThreadSpawn(String),

    /// Producer thread did not exit within the stop timeout
    #[error("Producer thread did not stop within {0}ms")]
    ProducerJoinTimeout(u64),

    /// OS clipboard registration failed
    #[error("Clipboard publish failed: {0}")]
    Publish(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Error classification used by the driver to pick a user-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Bad source file or configuration
    Configuration,
    /// Disk errors
    Io,
    /// Operation not valid in the current transfer state
    State,
    /// Pull-stream positioning errors
    Stream,
    /// Clipboard format negotiation errors
    Format,
    /// Producer thread lifecycle errors
    Threading,
    /// OS clipboard registration errors
    Publish,
}

/// Classify error for reporting
pub fn classify_error(error: &ClipboardError) -> ErrorType {
    match error {
        ClipboardError::SourceUnavailable(_) | ClipboardError::InvalidConfig(_) => {
            ErrorType::Configuration
        }

        ClipboardError::Io(_) => ErrorType::Io,

        ClipboardError::InvalidState(_) | ClipboardError::TransferInactive => ErrorType::State,

        ClipboardError::InvalidSeek { .. } => ErrorType::Stream,

        ClipboardError::UnsupportedFormat(_)
        | ClipboardError::MalformedDescriptor(_)
        | ClipboardError::UnsupportedMedium { .. } => ErrorType::Format,

        ClipboardError::ThreadSpawn(_) | ClipboardError::ProducerJoinTimeout(_) => {
            ErrorType::Threading
        }

        ClipboardError::Publish(_) => ErrorType::Publish,
    }
}
