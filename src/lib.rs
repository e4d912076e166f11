//! # lamco-clipboard-vfile
//!
//! Virtual clipboard files: a file is announced on the clipboard by
//! descriptor only, and its bytes are read from disk while the paste target
//! pulls them.
//!
//! # Architecture
//!
//! ```text
//! lamco-clipboard-vfile
//!   ├─> VirtualClipboard (control side: start / stop / events)
//!   ├─> BufferCoordinator (bounded chunk queue, transfer state)
//!   │     └─> ChunkProducer (reader thread)
//!   └─> VirtualFileObject (formats, descriptor, async operation)
//!         └─> FileContentsStream (pull read / seek / stat)
//! ```
//!
//! # Data Flow
//!
//! **Content Path:** Source file → ChunkProducer → BufferCoordinator → FileContentsStream → Paste target
//!
//! **Control Path:** Driver → VirtualClipboard → BufferCoordinator
//!
//! **Outcome Path:** Paste target → AsyncOperation → BufferCoordinator → TransferEvent subscribers

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Runtime configuration
pub mod config;

/// Utility functions
pub mod utils;

/// Virtual file clipboard
///
/// Producer thread, bounded buffer, pull stream and the clipboard object
/// that exposes them to a paste target.
pub mod clipboard;

/// Default chunk size read from the source file
pub const CHUNK_SIZE: usize = 512 * 1024;
