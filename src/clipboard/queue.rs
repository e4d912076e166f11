//! Pending Chunk Queue
//!
//! Ordered chunks waiting for the consumer, bounded by element count.
//! With chunks capped at the configured chunk size, `capacity * chunk_size`
//! bounds the memory held during a producer/consumer speed mismatch.

use bytes::Bytes;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use crate::clipboard::error::ClipboardError;

/// What the coordinator does when the producer pushes into a full queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressurePolicy {
    /// Reject the chunk and log it. The producer never blocks.
    #[default]
    Drop,
    /// Park the producer until the consumer frees a slot or the transfer stops
    Block,
    /// Accept the chunk beyond capacity
    Grow,
}

impl BackpressurePolicy {
    /// Config-file name of the policy
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drop => "drop",
            Self::Block => "block",
            Self::Grow => "grow",
        }
    }
}

impl fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackpressurePolicy {
    type Err = ClipboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "block" => Ok(Self::Block),
            "grow" => Ok(Self::Grow),
            other => Err(ClipboardError::InvalidConfig(format!(
                "unknown backpressure policy '{}' (expected drop, block or grow)",
                other
            ))),
        }
    }
}

/// Result of a producer push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Chunk is in the queue
    Queued,
    /// Queue was full and the chunk was discarded
    Dropped,
    /// Transfer is no longer active; the producer should stop
    Inactive,
}

/// FIFO of chunks in file-offset order
#[derive(Debug)]
pub struct PendingQueue {
    chunks: VecDeque<Bytes>,
    capacity: usize,
    queued_bytes: usize,
}

impl PendingQueue {
    /// Create an empty queue holding at most `capacity` chunks
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            queued_bytes: 0,
        }
    }

    /// Append a chunk at the tail. Capacity is enforced by the caller.
    pub fn push_back(&mut self, chunk: Bytes) {
        self.queued_bytes += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Remove up to `max` bytes from the head chunk.
    ///
    /// A head chunk larger than `max` is split and its tail goes back to the
    /// front of the queue, so the next call continues at the same offset.
    pub fn take(&mut self, max: usize) -> Option<Bytes> {
        if max == 0 {
            return None;
        }

        let mut head = self.chunks.pop_front()?;
        if head.len() > max {
            let remainder = head.split_off(max);
            self.chunks.push_front(remainder);
        }
        self.queued_bytes -= head.len();
        Some(head)
    }

    /// Whether another push would exceed capacity
    pub fn is_full(&self) -> bool {
        self.chunks.len() >= self.capacity
    }

    /// Number of queued chunks (a split remainder counts as one)
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no chunk is waiting
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total bytes waiting
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    /// Maximum chunk count before backpressure applies
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard everything
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.queued_bytes = 0;
    }
}
