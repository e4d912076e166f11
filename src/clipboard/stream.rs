//! File contents stream
//!
//! Pull-side view of the current transfer handed to the paste target. The
//! target reads on its own schedule and in its own sizes; every call maps to
//! a coordinator read plus a status telling it whether to continue, retry
//! later, or stop.
//!
//! Content is produced strictly forward. Seeking is position bookkeeping
//! against the declared size and can never move behind data that was
//! already delivered.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::clipboard::buffer::{BufferCoordinator, TransferId};
use crate::clipboard::error::{ClipboardError, Result};

/// Seek reference point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// From offset 0
    Set,
    /// From the current position
    Current,
    /// From the declared size
    End,
}

/// Outcome of a stream read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Data returned, more follows
    Ok,
    /// Declared size reached, or the transfer completed
    EndOfStream,
    /// Nothing ready yet; retry shortly
    Pending,
    /// Transfer stopped or failed before completion
    Aborted,
}

/// Bytes delivered by one read plus the status for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRead {
    /// Bytes written to the caller's buffer
    pub bytes: usize,
    /// What the caller should do next
    pub status: StreamStatus,
}

/// Stream metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStat {
    /// Advertised file name
    pub name: String,
    /// Declared size
    pub size: u64,
}

/// Pull stream over the transfer that was current when it was created
///
/// A stream is bound to that transfer. Once the coordinator starts another
/// one, reads report [`StreamStatus::Aborted`] instead of serving its bytes.
pub struct FileContentsStream {
    coordinator: Arc<BufferCoordinator>,
    transfer: Option<TransferId>,
    name: String,
    size: u64,
    position: Mutex<u64>,
    retry_backoff: Duration,
}

impl FileContentsStream {
    /// Stream over the transfer currently held by `coordinator`
    pub fn new(coordinator: Arc<BufferCoordinator>, retry_backoff: Duration) -> Self {
        let snapshot = coordinator.snapshot();
        Self {
            coordinator,
            transfer: snapshot.id,
            name: snapshot.name,
            size: snapshot.total_size,
            position: Mutex::new(0),
            retry_backoff,
        }
    }

    /// Declared size captured at creation
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current read position
    pub fn position(&self) -> u64 {
        *self.position.lock()
    }

    /// The coordinator moved on to another transfer
    pub fn is_stale(&self) -> bool {
        self.coordinator.transfer_id() != self.transfer
    }

    /// Read up to `buf.len()` bytes, never past the declared size.
    pub fn read(&self, buf: &mut [u8]) -> StreamRead {
        let mut position = self.position.lock();
        let remaining = self.size.saturating_sub(*position);
        let want = (buf.len() as u64).min(remaining) as usize;

        if want == 0 && remaining > 0 {
            return StreamRead {
                bytes: 0,
                status: StreamStatus::Ok,
            };
        }

        // With nothing left this still lets the coordinator settle completion
        let n = match self.transfer {
            Some(id) => self.coordinator.read_from(id, &mut buf[..want]),
            None => 0,
        };
        if n > 0 {
            *position += n as u64;
            trace!("Stream read {} bytes, position {}", n, *position);
            let status = if *position >= self.size {
                StreamStatus::EndOfStream
            } else {
                StreamStatus::Ok
            };
            return StreamRead { bytes: n, status };
        }

        let stale = self.is_stale();
        if remaining == 0 || (!stale && self.coordinator.is_complete()) {
            debug!("Stream at end, position {}", *position);
            return StreamRead {
                bytes: 0,
                status: StreamStatus::EndOfStream,
            };
        }

        if stale || !self.coordinator.is_active() {
            debug!(
                "Transfer {} at position {}",
                if stale { "replaced" } else { "inactive" },
                *position
            );
            return StreamRead {
                bytes: 0,
                status: StreamStatus::Aborted,
            };
        }

        drop(position);
        thread::sleep(self.retry_backoff);
        StreamRead {
            bytes: 0,
            status: StreamStatus::Pending,
        }
    }

    /// Move the read position. Returns the new position.
    pub fn seek(&self, offset: i64, origin: SeekOrigin) -> Result<u64> {
        let mut position = self.position.lock();
        let base = match origin {
            SeekOrigin::Set => 0i128,
            SeekOrigin::Current => *position as i128,
            SeekOrigin::End => self.size as i128,
        };
        let target = base + offset as i128;

        if target < 0 || target > self.size as i128 {
            return Err(ClipboardError::InvalidSeek {
                offset,
                reason: format!("target {} outside 0..={}", target, self.size),
            });
        }

        let target = target as u64;
        if self.is_stale() {
            return Err(ClipboardError::TransferInactive);
        }
        let consumed = self.coordinator.bytes_consumed();
        if target < consumed {
            return Err(ClipboardError::InvalidSeek {
                offset,
                reason: format!("{} bytes already delivered, cannot re-read", consumed),
            });
        }

        trace!("Stream seek {:?} {} -> {}", origin, offset, target);
        *position = target;
        Ok(target)
    }

    /// Seek back to offset 0 if nothing was delivered yet.
    ///
    /// Returns `false` and keeps the position otherwise.
    pub fn rewind(&self) -> bool {
        match self.seek(0, SeekOrigin::Set) {
            Ok(_) => true,
            Err(e) => {
                warn!("Stream rewind refused: {}", e);
                false
            }
        }
    }

    /// Name and declared size
    pub fn stat(&self) -> StreamStat {
        StreamStat {
            name: self.name.clone(),
            size: self.size,
        }
    }
}

impl std::fmt::Debug for FileContentsStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContentsStream")
            .field("size", &self.size)
            .field("position", &self.position())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::buffer::CoordinatorConfig;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn coordinator_with(data: &[u8], chunk_size: usize) -> (Arc<BufferCoordinator>, NamedTempFile) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();

        let coordinator = BufferCoordinator::new(CoordinatorConfig {
            chunk_size,
            producer_interval: Duration::from_millis(1),
            wait_slice: Duration::from_millis(5),
            read_timeout: Duration::from_secs(10),
            ..Default::default()
        });
        coordinator.start_transfer(file.path(), "stream.bin", data.len() as u64);
        (coordinator, file)
    }

    #[test]
    fn test_reads_to_end_of_stream() {
        let data: Vec<u8> = (0..100u8).collect();
        let (coordinator, _file) = coordinator_with(&data, 40);
        let stream = FileContentsStream::new(coordinator, Duration::from_millis(1));

        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let read = stream.read(&mut buf);
            out.extend_from_slice(&buf[..read.bytes]);
            match read.status {
                StreamStatus::Ok | StreamStatus::Pending => continue,
                StreamStatus::EndOfStream => break,
                StreamStatus::Aborted => panic!("unexpected abort"),
            }
        }

        assert_eq!(out, data);
        assert_eq!(stream.position(), 100);
        let again = stream.read(&mut buf);
        assert_eq!(again.bytes, 0);
        assert_eq!(again.status, StreamStatus::EndOfStream);
    }

    #[test]
    fn test_read_clamped_to_declared_size() {
        let data = vec![9u8; 10];
        let (coordinator, _file) = coordinator_with(&data, 64);
        let stream = FileContentsStream::new(coordinator, Duration::from_millis(1));

        let mut buf = [0u8; 64];
        let read = stream.read(&mut buf);
        assert_eq!(read.bytes, 10);
        assert_eq!(read.status, StreamStatus::EndOfStream);
    }

    #[test]
    fn test_stopped_transfer_reports_aborted() {
        let data = vec![1u8; 1000];
        let (coordinator, _file) = coordinator_with(&data, 100);
        let stream = FileContentsStream::new(Arc::clone(&coordinator), Duration::from_millis(1));

        coordinator.stop_transfer();
        let read = stream.read(&mut [0u8; 50]);
        assert_eq!(read.bytes, 0);
        assert_eq!(read.status, StreamStatus::Aborted);
    }

    #[test]
    fn test_seek_bookkeeping() {
        let data = vec![0u8; 100];
        let (coordinator, _file) = coordinator_with(&data, 100);
        let stream = FileContentsStream::new(coordinator, Duration::from_millis(1));

        assert_eq!(stream.seek(0, SeekOrigin::End).unwrap(), 100);
        assert_eq!(stream.seek(-30, SeekOrigin::Current).unwrap(), 70);
        assert_eq!(stream.seek(0, SeekOrigin::Set).unwrap(), 0);
        assert!(stream.seek(-1, SeekOrigin::Set).is_err());
        assert!(stream.seek(1, SeekOrigin::End).is_err());
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn test_seek_behind_consumed_rejected() {
        let data = vec![5u8; 100];
        let (coordinator, _file) = coordinator_with(&data, 100);
        let stream = FileContentsStream::new(coordinator, Duration::from_millis(1));

        let read = stream.read(&mut [0u8; 40]);
        assert_eq!(read.bytes, 40);

        let err = stream.seek(10, SeekOrigin::Set).unwrap_err();
        assert!(matches!(err, ClipboardError::InvalidSeek { offset: 10, .. }));
        assert!(!stream.rewind());
        assert_eq!(stream.position(), 40);
        assert_eq!(stream.seek(0, SeekOrigin::Current).unwrap(), 40);
    }

    #[test]
    fn test_stream_bound_to_its_transfer() {
        let (coordinator, _first) = coordinator_with(&[1u8; 100], 100);
        let stream = FileContentsStream::new(Arc::clone(&coordinator), Duration::from_millis(1));

        let mut second = NamedTempFile::new().unwrap();
        second.write_all(&[2u8; 300]).unwrap();
        second.flush().unwrap();
        coordinator.start_transfer(second.path(), "second.bin", 300);
        assert!(stream.is_stale());

        let mut buf = [0u8; 64];
        let read = stream.read(&mut buf);
        assert_eq!(read.bytes, 0);
        assert_eq!(read.status, StreamStatus::Aborted);
        assert_eq!(stream.size(), 100);
        assert_eq!(stream.stat().name, "stream.bin");
        assert!(matches!(
            stream.seek(0, SeekOrigin::Set),
            Err(ClipboardError::TransferInactive)
        ));

        // The new transfer's bytes stay with the new stream
        assert_eq!(coordinator.bytes_consumed(), 0);
        let fresh = FileContentsStream::new(Arc::clone(&coordinator), Duration::from_millis(1));
        let read = fresh.read(&mut buf);
        assert_eq!(read.bytes, 64);
        assert_eq!(&buf[..], &[2u8; 64][..]);
    }

    #[test]
    fn test_stat_reports_name_and_size() {
        let (coordinator, _file) = coordinator_with(b"hello", 4);
        let stream = FileContentsStream::new(coordinator, Duration::from_millis(1));
        let stat = stream.stat();
        assert_eq!(stat.name, "stream.bin");
        assert_eq!(stat.size, 5);
    }
}
