//! End-to-end transfer scenarios: real files, real producer thread, pull reads.

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lamco_clipboard_vfile::clipboard::operation::{DROPEFFECT_COPY, E_CANCELLED, E_FAIL, S_OK};
use lamco_clipboard_vfile::clipboard::{
    BackpressurePolicy, BufferCoordinator, ClipboardData, CoordinatorConfig, FileContentsStream,
    Medium, ProducerState, StreamStatus, TransferEvent, VirtualClipboard, VirtualClipboardConfig,
    VirtualFormat,
};
use lamco_clipboard_vfile::CHUNK_SIZE;
use tempfile::NamedTempFile;

const KIB: usize = 1024;

fn source_file(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        producer_interval: Duration::from_millis(1),
        wait_slice: Duration::from_millis(5),
        read_timeout: Duration::from_secs(10),
        ..Default::default()
    }
}

fn wait_for_producer(coordinator: &BufferCoordinator) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !coordinator.snapshot().producer_done {
        assert!(Instant::now() < deadline, "producer did not finish");
        thread::sleep(Duration::from_millis(2));
    }
}

fn count_finished(events: &crossbeam_channel::Receiver<TransferEvent>) -> usize {
    events
        .try_iter()
        .filter(|event| *event == TransferEvent::Finished)
        .count()
}

#[test]
fn test_single_chunk_file() {
    let data = pattern(CHUNK_SIZE);
    let file = source_file(&data);
    let coordinator = BufferCoordinator::new(fast_config());
    let events = coordinator.subscribe();

    coordinator.start_transfer(file.path(), "one-chunk.bin", data.len() as u64);
    wait_for_producer(&coordinator);

    let mut buf = vec![0u8; 1024 * KIB];
    assert_eq!(coordinator.read(&mut buf), CHUNK_SIZE);
    assert_eq!(&buf[..CHUNK_SIZE], &data[..]);
    assert!(coordinator.is_complete());

    assert_eq!(coordinator.read(&mut buf), 0);
    assert_eq!(coordinator.read(&mut buf), 0);
    assert_eq!(count_finished(&events), 1);
}

#[test]
fn test_reads_split_chunks_in_order() {
    // Two and a half chunks
    let data = pattern(1280 * KIB);
    let file = source_file(&data);
    let coordinator = BufferCoordinator::new(fast_config());

    coordinator.start_transfer(file.path(), "split.bin", data.len() as u64);

    let mut out = Vec::new();
    for (request, expected) in [(512 * KIB, 512 * KIB), (512 * KIB, 512 * KIB), (256 * KIB, 256 * KIB)] {
        let mut buf = vec![0u8; request];
        let n = coordinator.read(&mut buf);
        assert_eq!(n, expected);
        out.extend_from_slice(&buf[..n]);
    }

    assert_eq!(out.len(), data.len());
    assert_eq!(out, data);
}

#[test]
fn test_small_reads_never_exceed_request() {
    // One and a half chunks read through an odd-sized window
    let data = pattern(768 * KIB);
    let file = source_file(&data);
    let coordinator = BufferCoordinator::new(fast_config());
    coordinator.start_transfer(file.path(), "window.bin", data.len() as u64);

    let mut out = Vec::new();
    let mut buf = vec![0u8; 100_003];
    loop {
        let n = coordinator.read(&mut buf);
        if n == 0 {
            break;
        }
        assert!(n <= buf.len());
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, data);
    assert!(coordinator.is_complete());
}

#[test]
fn test_stream_signals_end_once() {
    let data = pattern(3000);
    let file = source_file(&data);
    let coordinator = BufferCoordinator::new(CoordinatorConfig {
        chunk_size: 1000,
        ..fast_config()
    });
    let events = coordinator.subscribe();
    coordinator.start_transfer(file.path(), "end.bin", data.len() as u64);

    let stream = FileContentsStream::new(Arc::clone(&coordinator), Duration::from_millis(1));
    let mut out = Vec::new();
    let mut buf = [0u8; 700];
    loop {
        let read = stream.read(&mut buf);
        out.extend_from_slice(&buf[..read.bytes]);
        if read.status == StreamStatus::EndOfStream && read.bytes == 0 {
            break;
        }
        assert_ne!(read.status, StreamStatus::Aborted);
    }
    assert_eq!(out, data);

    for _ in 0..3 {
        let read = stream.read(&mut buf);
        assert_eq!(read.bytes, 0);
        assert_eq!(read.status, StreamStatus::EndOfStream);
    }
    assert_eq!(count_finished(&events), 1);
}

#[test]
fn test_stop_releases_blocked_read() {
    let data = pattern(64 * KIB);
    let file = source_file(&data);
    let coordinator = BufferCoordinator::new(CoordinatorConfig {
        chunk_size: 4 * KIB,
        producer_interval: Duration::from_secs(5),
        ..fast_config()
    });
    coordinator.start_transfer(file.path(), "slow.bin", data.len() as u64);

    // First chunk arrives, then the producer sleeps
    let mut buf = vec![0u8; 8 * KIB];
    assert_eq!(coordinator.read(&mut buf), 4 * KIB);

    let reader = {
        let coordinator = Arc::clone(&coordinator);
        thread::spawn(move || {
            let mut buf = vec![0u8; 8 * KIB];
            coordinator.read(&mut buf)
        })
    };
    thread::sleep(Duration::from_millis(50));

    let stopped_at = Instant::now();
    coordinator.stop_transfer();
    assert_eq!(reader.join().unwrap(), 0);
    assert!(stopped_at.elapsed() < Duration::from_secs(1));
    assert_eq!(coordinator.producer_state(), None);
    assert!(!coordinator.is_complete());
}

#[test]
fn test_restart_resets_counters() {
    let first = pattern(64 * KIB);
    let second = pattern(10 * KIB);
    let first_file = source_file(&first);
    let second_file = source_file(&second);

    let coordinator = BufferCoordinator::new(CoordinatorConfig {
        chunk_size: 4 * KIB,
        producer_interval: Duration::from_millis(200),
        ..fast_config()
    });
    coordinator.start_transfer(first_file.path(), "first.bin", first.len() as u64);
    let mut buf = vec![0u8; 4 * KIB];
    assert_eq!(coordinator.read(&mut buf), 4 * KIB);
    let first_id = coordinator.snapshot().id;

    coordinator.start_transfer(second_file.path(), "second.bin", second.len() as u64);
    let snapshot = coordinator.snapshot();
    assert_ne!(snapshot.id, first_id);
    assert_eq!(snapshot.bytes_consumed, 0);
    assert_eq!(snapshot.total_size, second.len() as u64);
    assert_eq!(snapshot.name, "second.bin");
    assert!(snapshot.active);

    let mut out = Vec::new();
    loop {
        let n = coordinator.read(&mut buf);
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, second);
}

#[test]
fn test_full_queue_drops_without_fabricating_progress() {
    let data = pattern(64 * KIB);
    let file = source_file(&data);
    let coordinator = BufferCoordinator::new(CoordinatorConfig {
        chunk_size: 4 * KIB,
        queue_capacity: 2,
        backpressure: BackpressurePolicy::Drop,
        producer_interval: Duration::ZERO,
        ..fast_config()
    });
    let events = coordinator.subscribe();

    coordinator.start_transfer(file.path(), "lossy.bin", data.len() as u64);
    wait_for_producer(&coordinator);

    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.queued_chunks, 2);
    assert_eq!(snapshot.dropped_chunks, 14);
    assert_eq!(snapshot.bytes_enqueued + snapshot.dropped_bytes, data.len() as u64);

    let mut buf = vec![0u8; 16 * KIB];
    while coordinator.read(&mut buf) > 0 {
        let snapshot = coordinator.snapshot();
        assert!(snapshot.bytes_consumed <= snapshot.bytes_enqueued);
    }

    assert_eq!(coordinator.bytes_consumed(), 8 * KIB as u64);
    assert!(!coordinator.is_complete());
    let events: Vec<_> = events.try_iter().collect();
    assert!(!events.contains(&TransferEvent::Finished));
    assert!(events
        .iter()
        .any(|event| matches!(event, TransferEvent::Aborted { .. })));
}

#[test]
fn test_block_policy_delivers_everything() {
    let data = pattern(64 * KIB);
    let file = source_file(&data);
    let coordinator = BufferCoordinator::new(CoordinatorConfig {
        chunk_size: 4 * KIB,
        queue_capacity: 2,
        backpressure: BackpressurePolicy::Block,
        producer_interval: Duration::ZERO,
        ..fast_config()
    });

    coordinator.start_transfer(file.path(), "blocking.bin", data.len() as u64);
    thread::sleep(Duration::from_millis(30));
    assert!(coordinator.snapshot().queued_chunks <= 2);

    let mut out = Vec::new();
    let mut buf = vec![0u8; 3 * KIB];
    loop {
        let n = coordinator.read(&mut buf);
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }

    assert_eq!(out, data);
    assert_eq!(coordinator.snapshot().dropped_chunks, 0);
    assert!(coordinator.is_complete());
}

#[test]
fn test_short_source_aborts() {
    let data = pattern(100);
    let file = source_file(&data);
    let coordinator = BufferCoordinator::new(CoordinatorConfig {
        chunk_size: 64,
        ..fast_config()
    });
    let events = coordinator.subscribe();

    // Declared size larger than the file
    coordinator.start_transfer(file.path(), "short.bin", 200);
    let stream = FileContentsStream::new(Arc::clone(&coordinator), Duration::from_millis(1));

    let mut buf = [0u8; 32];
    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        let read = stream.read(&mut buf);
        if read.bytes == 0 && read.status != StreamStatus::Pending {
            break read.status;
        }
        assert!(Instant::now() < deadline);
    };

    assert_eq!(status, StreamStatus::Aborted);

    // The thread records its final state right after reporting the failure
    while coordinator.producer_state() != Some(ProducerState::StoppedEarly) {
        assert!(Instant::now() < deadline, "producer did not stop");
        thread::sleep(Duration::from_millis(2));
    }
    assert!(events
        .try_iter()
        .any(|event| matches!(event, TransferEvent::Aborted { .. })));
}

#[test]
fn test_paste_cancel_and_complete_are_distinct() {
    let data = pattern(256 * KIB);
    let file = source_file(&data);
    let config = VirtualClipboardConfig {
        coordinator: CoordinatorConfig {
            chunk_size: 16 * KIB,
            ..fast_config()
        },
        retry_backoff: Duration::from_millis(1),
    };

    // Cancelled paste
    let clipboard = VirtualClipboard::new(config.clone(), None);
    let events = clipboard.subscribe();
    clipboard.start_transfer(file.path(), Some("cancel.bin")).unwrap();

    let operation = clipboard.operation();
    operation.start_operation();
    let ClipboardData::Stream(stream) = clipboard
        .data_object()
        .get_data(VirtualFormat::FileContents, Medium::Stream, 0)
        .unwrap()
    else {
        panic!("contents must be a stream");
    };
    let mut buf = vec![0u8; 16 * KIB];
    assert!(stream.read(&mut buf).bytes > 0);
    operation.end_operation(E_CANCELLED, 0);

    assert_eq!(stream.read(&mut buf).status, StreamStatus::Aborted);
    let cancelled: Vec<_> = events.try_iter().collect();
    assert!(cancelled.contains(&TransferEvent::Cancelled));
    assert!(!cancelled
        .iter()
        .any(|event| matches!(event, TransferEvent::OperationCompleted { .. })));

    // Completed paste
    let clipboard = VirtualClipboard::new(config, None);
    let events = clipboard.subscribe();
    clipboard.start_transfer(file.path(), Some("done.bin")).unwrap();
    let operation = clipboard.operation();
    operation.start_operation();
    let ClipboardData::Stream(stream) = clipboard
        .data_object()
        .get_data(VirtualFormat::FileContents, Medium::Stream, 0)
        .unwrap()
    else {
        panic!("contents must be a stream");
    };

    let mut out = Vec::new();
    loop {
        let read = stream.read(&mut buf);
        out.extend_from_slice(&buf[..read.bytes]);
        if read.status == StreamStatus::EndOfStream && read.bytes == 0 {
            break;
        }
    }
    operation.end_operation(S_OK, DROPEFFECT_COPY);
    assert_eq!(out, data);

    let completed: Vec<_> = events.try_iter().collect();
    assert!(completed.contains(&TransferEvent::Finished));
    assert!(completed.contains(&TransferEvent::OperationCompleted { performed: true }));
    assert!(!completed.contains(&TransferEvent::Cancelled));
}

#[test]
fn test_paste_failure_takes_abort_path() {
    let data = pattern(256 * KIB);
    let file = source_file(&data);
    let clipboard = VirtualClipboard::new(
        VirtualClipboardConfig {
            coordinator: CoordinatorConfig {
                chunk_size: 16 * KIB,
                ..fast_config()
            },
            retry_backoff: Duration::from_millis(1),
        },
        None,
    );
    let events = clipboard.subscribe();
    clipboard.start_transfer(file.path(), Some("fail.bin")).unwrap();

    let operation = clipboard.operation();
    operation.start_operation();
    let ClipboardData::Stream(stream) = clipboard
        .data_object()
        .get_data(VirtualFormat::FileContents, Medium::Stream, 0)
        .unwrap()
    else {
        panic!("contents must be a stream");
    };
    let mut buf = vec![0u8; 16 * KIB];
    assert!(stream.read(&mut buf).bytes > 0);
    operation.end_operation(E_FAIL, 0);

    assert!(!clipboard.coordinator().is_active());
    assert_eq!(stream.read(&mut buf).status, StreamStatus::Aborted);

    let received: Vec<_> = events.try_iter().collect();
    assert!(received
        .iter()
        .any(|event| matches!(event, TransferEvent::Aborted { .. })));
    assert!(!received.contains(&TransferEvent::Cancelled));
    assert!(!received
        .iter()
        .any(|event| matches!(event, TransferEvent::OperationCompleted { .. })));
}

#[cfg(unix)]
#[test]
fn test_stop_timeout_bounds_stalled_producer() {
    let dir = tempfile::tempdir().unwrap();
    let fifo = dir.path().join("stalled.fifo");
    let status = std::process::Command::new("mkfifo")
        .arg(&fifo)
        .status()
        .unwrap();
    assert!(status.success());

    // The writer holds the pipe open without sending, so producer reads block
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
    let writer = {
        let fifo = fifo.clone();
        thread::spawn(move || {
            let pipe = std::fs::OpenOptions::new()
                .write(true)
                .open(&fifo)
                .unwrap();
            let _ = release_rx.recv_timeout(Duration::from_secs(10));
            drop(pipe);
        })
    };

    let coordinator = BufferCoordinator::new(CoordinatorConfig {
        stop_timeout: Duration::from_millis(100),
        ..fast_config()
    });
    coordinator.start_transfer(&fifo, "stalled.fifo", 4096);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(coordinator.producer_state(), Some(ProducerState::Running));

    let started = Instant::now();
    coordinator.stop_transfer();
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_secs(1), "stop took {:?}", elapsed);
    assert!(!coordinator.is_active());

    let _ = release_tx.send(());
    writer.join().unwrap();
}
