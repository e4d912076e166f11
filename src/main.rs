//! lamco-clipboard-vfile - Virtual clipboard file driver
//!
//! Entry point for the binary. Places a file on the virtual clipboard, then
//! pastes it the way a file manager would: query the descriptor, pull the
//! content stream, end the async operation and verify the result.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use lamco_clipboard_vfile::clipboard::descriptor::parse_group;
use lamco_clipboard_vfile::clipboard::operation::{DROPEFFECT_COPY, E_CANCELLED, E_FAIL, S_OK};
use lamco_clipboard_vfile::clipboard::{
    ClipboardData, Medium, SeekOrigin, StreamStatus, TransferEvent, VirtualClipboard, VirtualFormat,
};
use lamco_clipboard_vfile::config::{Config, LoggingConfig};
use lamco_clipboard_vfile::utils::{format_file_size, format_user_error, sha256_file};

/// Consecutive "retry later" reads before the paste gives up
const MAX_PENDING_READS: u32 = 3;

/// Command-line arguments for lamco-clipboard-vfile
#[derive(Parser, Debug)]
#[command(name = "lamco-clipboard-vfile")]
#[command(version, about = "Stream a file through a virtual clipboard file", long_about = None)]
pub struct Args {
    /// File to place on the clipboard
    pub source: PathBuf,

    /// Configuration file path
    #[arg(short, long, env = "LAMCO_VFILE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Advertised file name (defaults to the source file name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Where the paste writes the received file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Bytes requested per stream read
    #[arg(long, default_value = "65536")]
    pub read_size: usize,

    /// Cancel the paste after this many bytes
    #[arg(long)]
    pub cancel_after: Option<u64>,

    /// Chunk size override
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Queue capacity override
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Backpressure policy override (drop|block|grow)
    #[arg(long)]
    pub backpressure: Option<String>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// How the simulated paste ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PasteOutcome {
    Completed,
    Cancelled,
    Aborted,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Config first so [logging] can shape the subscriber
    let (config, config_error) = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default_config(), Some(e)),
        },
        None => (Config::default_config(), None),
    };

    let _log_guard = init_logging(&args, &config.logging)?;

    info!("════════════════════════════════════════════════════════");
    info!("  lamco-clipboard-vfile v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {} {}", env!("BUILD_DATE"), env!("BUILD_TIME"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");

    if let Some(e) = config_error {
        warn!("Failed to load config: {:#}, using defaults", e);
    }

    // Override config with CLI args
    let config = config.with_overrides(
        args.chunk_size,
        args.queue_capacity,
        args.backpressure.clone(),
    );

    if let Err(e) = config.validate().and_then(|()| run(&args, &config)) {
        eprintln!("{}", format_user_error(&e));
        return Err(e);
    }

    Ok(())
}

fn run(args: &Args, config: &Config) -> Result<()> {
    info!("Configuration loaded successfully");
    debug!("Config: {:?}", config);

    let clipboard = VirtualClipboard::new(config.to_clipboard_config()?, None);

    let events = clipboard.subscribe();
    let progress = thread::Builder::new()
        .name("vfile-progress".to_string())
        .spawn(move || report_progress(events))
        .context("Failed to spawn progress thread")?;

    let id = clipboard
        .start_transfer(&args.source, args.name.as_deref())
        .context("Failed to start transfer")?;
    info!("Transfer {} started for {:?}", id, args.source);

    let result = paste(args, &clipboard);

    clipboard.shutdown();
    let snapshot = clipboard.snapshot();
    drop(clipboard);
    if progress.join().is_err() {
        warn!("Progress thread panicked");
    }

    if snapshot.dropped_chunks > 0 {
        warn!(
            "{} chunks ({}) were dropped on a full queue",
            snapshot.dropped_chunks,
            format_file_size(snapshot.dropped_bytes)
        );
    }

    match result? {
        PasteOutcome::Completed => {
            let source = sha256_file(&args.source).context("Failed to hash source file")?;
            let output = sha256_file(&args.output).context("Failed to hash output file")?;
            if source != output {
                anyhow::bail!(
                    "SHA-256 checksum mismatch: source {} output {}",
                    source,
                    output
                );
            }
            info!("Paste verified, SHA-256 {}", output);
            Ok(())
        }
        PasteOutcome::Cancelled => {
            info!("Paste cancelled, partial output left at {:?}", args.output);
            Ok(())
        }
        PasteOutcome::Aborted => anyhow::bail!(
            "Transfer aborted after {} of {}",
            format_file_size(snapshot.bytes_consumed),
            format_file_size(snapshot.total_size)
        ),
    }
}

/// Act as the paste target: descriptor, stream, async operation
fn paste(args: &Args, clipboard: &VirtualClipboard) -> Result<PasteOutcome> {
    let object = clipboard.data_object();
    for (format, medium) in object.enum_formats() {
        debug!("Offered format {} on {}", format.name(), medium.as_str());
    }

    let ClipboardData::Global(group) =
        object.get_data(VirtualFormat::FileGroupDescriptor, Medium::HGlobal, 0)?
    else {
        anyhow::bail!("descriptor format returned a stream");
    };
    let descriptors = parse_group(&group)?;
    let descriptor = descriptors
        .first()
        .context("descriptor group is empty")?;
    let total = descriptor.size.unwrap_or(0);
    info!(
        "Pasting '{}' ({}) to {:?}",
        descriptor.name,
        format_file_size(total),
        args.output
    );

    let operation = clipboard.operation();
    operation.start_operation();

    let ClipboardData::Stream(stream) =
        object.get_data(VirtualFormat::FileContents, Medium::Stream, 0)?
    else {
        anyhow::bail!("contents format returned a memory block");
    };

    // File managers probe the size before reading
    stream.seek(0, SeekOrigin::End)?;
    stream.seek(0, SeekOrigin::Set)?;

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create output {:?}", args.output))?;
    let mut out = BufWriter::new(file);
    let mut buf = vec![0u8; args.read_size.max(1)];
    let mut written: u64 = 0;
    let mut pending = 0;

    let outcome = loop {
        if args.cancel_after.is_some_and(|limit| written >= limit) {
            break PasteOutcome::Cancelled;
        }

        let read = stream.read(&mut buf);
        out.write_all(&buf[..read.bytes])?;
        written += read.bytes as u64;

        match read.status {
            StreamStatus::Ok => pending = 0,
            StreamStatus::Pending => {
                pending += 1;
                if pending >= MAX_PENDING_READS {
                    warn!("No data after {} retries, giving up", pending);
                    break PasteOutcome::Aborted;
                }
            }
            // Keep reading until an empty end-of-stream, like a file manager
            StreamStatus::EndOfStream if read.bytes > 0 => pending = 0,
            StreamStatus::EndOfStream => break PasteOutcome::Completed,
            StreamStatus::Aborted => break PasteOutcome::Aborted,
        }
    };
    out.flush()?;

    match outcome {
        PasteOutcome::Completed => operation.end_operation(S_OK, DROPEFFECT_COPY),
        PasteOutcome::Cancelled => operation.end_operation(E_CANCELLED, 0),
        PasteOutcome::Aborted => operation.end_operation(E_FAIL, 0),
    }

    info!("Paste wrote {}", format_file_size(written));
    Ok(outcome)
}

/// Log progress in 10% steps until the transfer reaches a terminal state
fn report_progress(events: crossbeam_channel::Receiver<TransferEvent>) {
    let mut last_step = None;
    for event in events.iter() {
        match event {
            TransferEvent::Started { name, total_bytes, .. } => {
                info!("Copied '{}' ({}) to clipboard", name, format_file_size(total_bytes));
            }
            TransferEvent::Progress { transferred, total } => {
                let percent = if total == 0 { 100 } else { transferred * 100 / total };
                let step = percent / 10;
                if last_step != Some(step) {
                    last_step = Some(step);
                    info!(
                        "transferred: {} / {} ({}%)",
                        format_file_size(transferred),
                        format_file_size(total),
                        percent
                    );
                }
            }
            TransferEvent::Finished => {
                info!("Transfer finished");
                break;
            }
            TransferEvent::Stopped => {
                info!("Transfer stopped");
                break;
            }
            TransferEvent::Cancelled => {
                info!("Transfer cancelled by paste target");
                break;
            }
            TransferEvent::Aborted { reason } => {
                warn!("Transfer aborted: {}", reason);
                break;
            }
            TransferEvent::OperationCompleted { performed } => {
                debug!("Paste operation completed (performed: {})", performed);
            }
        }
    }
}

/// Plain-text layer for a secondary writer
fn plain_layer<S, W>(writer: Option<W>) -> Option<impl Layer<S>>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    })
}

fn init_logging(args: &Args, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let log_level = match args.verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "lamco_clipboard_vfile={level},warn",
            level = log_level
        ))
    });

    // --log-file writes alongside stdout
    let log_file = match &args.log_file {
        Some(path) => Some(Mutex::new(
            File::create(path).with_context(|| format!("Failed to create log file {:?}", path))?,
        )),
        None => None,
    };

    // [logging] log_dir adds a daily rolling file
    let (rolling, guard) = match &logging.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "lamco-clipboard-vfile.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    match args.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .with(plain_layer(log_file))
                .with(plain_layer(rolling))
                .init();
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact())
                .with(plain_layer(log_file))
                .with(plain_layer(rolling))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .with(plain_layer(log_file))
                .with(plain_layer(rolling))
                .init();
        }
    }

    if let Some(path) = &args.log_file {
        info!("Logging to file: {:?}", path);
    }
    if let Some(dir) = &logging.log_dir {
        info!("Logging to directory: {:?}", dir);
    }

    Ok(guard)
}
