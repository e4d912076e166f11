//! Utility Functions
//!
//! Byte-size formatting, file digests and user-friendly error formatting.
//!
//! ## Error Formatting
//!
//! The [`errors`] module provides user-friendly error messages:
//!
//! ```rust,no_run
//! use lamco_clipboard_vfile::utils::format_user_error;
//!
//! let error = anyhow::anyhow!("SHA-256 checksum mismatch");
//! eprintln!("{}", format_user_error(&error));
//! ```
//!
//! Error categories with context-aware help:
//! - Source errors → Missing file, directory instead of file, permissions
//! - Disk errors → Output path, free space
//! - Thread errors → Stop timeout, thread limits
//! - Config errors → Syntax, out-of-range values
//! - Integrity errors → Dropped chunks, source modified mid-transfer

pub mod errors;
pub mod format;

pub use errors::format_user_error;
pub use format::{format_file_size, sha256_file};
