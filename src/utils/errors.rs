//! User-Friendly Error Formatting
//!
//! Provides user-friendly error messages with troubleshooting hints
//! for common error scenarios.

use std::fmt::Write;

use crate::clipboard::{classify_error, ClipboardError, ErrorType};

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    // Header
    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    let error_msg = error.to_string();
    let category = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ClipboardError>())
        .map(classify_error);

    match category {
        Some(ErrorType::Configuration) => format_source_error(&mut output),
        Some(ErrorType::Io) => format_io_error(&mut output),
        Some(ErrorType::Threading) => format_threading_error(&mut output),
        Some(ErrorType::Publish) => format_publish_error(&mut output),
        Some(ErrorType::State | ErrorType::Stream | ErrorType::Format) => {
            format_generic_error(&mut output, &error_msg)
        }
        None if error_msg.contains("config") => format_config_error(&mut output),
        None if error_msg.contains("checksum") => format_integrity_error(&mut output),
        None => format_generic_error(&mut output, &error_msg),
    }

    // Technical details
    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();

    // Footer with help
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: lamco-clipboard-vfile -vv <FILE>"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Report issues: https://github.com/lamco-admin/lamco-clipboard-vfile/issues"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();

    output
}

fn format_source_error(output: &mut String) {
    writeln!(output, "Source File Error").ok();
    writeln!(output).ok();
    writeln!(output, "The file to place on the clipboard could not be used.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. File does not exist").ok();
    writeln!(output, "     → Check the path and spelling").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Path is a directory").ok();
    writeln!(output, "     → Only single regular files can be streamed").ok();
    writeln!(output).ok();
    writeln!(output, "  3. No read permission").ok();
    writeln!(output, "     → Check: ls -l <FILE>").ok();
}

fn format_io_error(output: &mut String) {
    writeln!(output, "Disk Error").ok();
    writeln!(output).ok();
    writeln!(output, "Reading the source or writing the output failed.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Output directory missing or read-only").ok();
    writeln!(output, "     → Check the --output path").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Disk full").ok();
    writeln!(output, "     → Check: df -h").ok();
    writeln!(output).ok();
    writeln!(output, "  3. Source changed while streaming").ok();
    writeln!(output, "     → The declared size is taken when the transfer starts").ok();
}

fn format_threading_error(output: &mut String) {
    writeln!(output, "Producer Thread Error").ok();
    writeln!(output).ok();
    writeln!(output, "The background reader did not start or stop in time.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Source on slow or stalled storage").ok();
    writeln!(output, "     → Raise [transfer] stop_timeout_ms in config.toml").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Thread limit reached").ok();
    writeln!(output, "     → Check: ulimit -u").ok();
}

fn format_publish_error(output: &mut String) {
    writeln!(output, "Clipboard Registration Error").ok();
    writeln!(output).ok();
    writeln!(output, "The virtual file could not be placed on the clipboard.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Another application holds the clipboard").ok();
    writeln!(output, "     → Retry the copy").ok();
}

fn format_config_error(output: &mut String) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Out-of-range values").ok();
    writeln!(output, "     → chunk_size and queue_capacity must be above zero").ok();
    writeln!(output, "     → backpressure must be 'drop', 'block' or 'grow'").ok();
}

fn format_integrity_error(output: &mut String) {
    writeln!(output, "Integrity Check Failed").ok();
    writeln!(output).ok();
    writeln!(output, "The pasted file does not match the source.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Chunks dropped on a full queue").ok();
    writeln!(output, "     → Use --backpressure block").ok();
    writeln!(output, "     → Or raise --queue-capacity").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Source modified during the transfer").ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Transfer Error").ok();
    writeln!(output).ok();
    writeln!(output, "An error occurred while streaming the virtual file.").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
}
