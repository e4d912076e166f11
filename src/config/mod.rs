//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - CLI arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub mod types;

pub use types::{LoggingConfig, StreamConfig, TransferConfig};

use crate::clipboard::{BackpressurePolicy, CoordinatorConfig, VirtualClipboardConfig};

/// Largest accepted chunk size
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transfer pipeline configuration
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Pull stream configuration
    #[serde(default)]
    pub stream: StreamConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Config {
            transfer: TransferConfig::default(),
            stream: StreamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.transfer.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero");
        }
        if self.transfer.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!(
                "chunk_size ({}) exceeds maximum of {} bytes",
                self.transfer.chunk_size,
                MAX_CHUNK_SIZE
            );
        }

        if self.transfer.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than zero");
        }

        self.transfer
            .backpressure
            .parse::<BackpressurePolicy>()
            .context("Invalid backpressure policy")?;

        if self.stream.wait_slice_ms == 0 {
            anyhow::bail!("wait_slice_ms must be greater than zero");
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(
        mut self,
        chunk_size: Option<usize>,
        queue_capacity: Option<usize>,
        backpressure: Option<String>,
    ) -> Self {
        if let Some(chunk_size) = chunk_size {
            self.transfer.chunk_size = chunk_size;
        }
        if let Some(queue_capacity) = queue_capacity {
            self.transfer.queue_capacity = queue_capacity;
        }
        if let Some(backpressure) = backpressure {
            self.transfer.backpressure = backpressure;
        }

        self
    }

    /// Convert to the clipboard's runtime configuration
    ///
    /// # Mapping
    ///
    /// | Config | Clipboard |
    /// |--------|-----------|
    /// | transfer.chunk_size | coordinator.chunk_size |
    /// | transfer.queue_capacity | coordinator.queue_capacity |
    /// | transfer.backpressure | coordinator.backpressure |
    /// | transfer.producer_interval_ms | coordinator.producer_interval |
    /// | transfer.stop_timeout_ms | coordinator.stop_timeout |
    /// | stream.wait_slice_ms | coordinator.wait_slice |
    /// | stream.read_timeout_ms | coordinator.read_timeout |
    /// | stream.retry_backoff_ms | retry_backoff |
    pub fn to_clipboard_config(&self) -> Result<VirtualClipboardConfig> {
        let backpressure = self
            .transfer
            .backpressure
            .parse::<BackpressurePolicy>()
            .context("Invalid backpressure policy")?;

        Ok(VirtualClipboardConfig {
            coordinator: CoordinatorConfig {
                chunk_size: self.transfer.chunk_size,
                queue_capacity: self.transfer.queue_capacity,
                backpressure,
                producer_interval: Duration::from_millis(self.transfer.producer_interval_ms),
                stop_timeout: Duration::from_millis(self.transfer.stop_timeout_ms),
                wait_slice: Duration::from_millis(self.stream.wait_slice_ms),
                read_timeout: Duration::from_millis(self.stream.read_timeout_ms),
            },
            retry_backoff: Duration::from_millis(self.stream.retry_backoff_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default_config();
        assert_eq!(config.transfer.chunk_size, 512 * 1024);
        assert_eq!(config.transfer.queue_capacity, 1000);
        assert_eq!(config.transfer.backpressure, "drop");
        assert_eq!(config.stream.retry_backoff_ms, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_chunk_size() {
        let mut config = Config::default_config();
        config.transfer.chunk_size = 0;
        assert!(config.validate().is_err());

        config.transfer.chunk_size = MAX_CHUNK_SIZE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_backpressure() {
        let mut config = Config::default_config();
        config.transfer.backpressure = "spill".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_capacity_and_slice() {
        let mut config = Config::default_config();
        config.transfer.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default_config();
        config.stream.wait_slice_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[transfer]\nchunk_size = 65536\nqueue_capacity = 8\nproducer_interval_ms = 5\nbackpressure = \"block\"\nstop_timeout_ms = 1000\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.transfer.chunk_size, 65536);
        assert_eq!(config.stream.read_timeout_ms, 30_000);

        let clipboard = config.to_clipboard_config().unwrap();
        assert_eq!(clipboard.coordinator.backpressure, BackpressurePolicy::Block);
        assert_eq!(clipboard.coordinator.producer_interval, Duration::from_millis(5));
    }

    #[test]
    fn test_with_overrides() {
        let config = Config::default_config().with_overrides(
            Some(4096),
            None,
            Some("grow".to_string()),
        );
        assert_eq!(config.transfer.chunk_size, 4096);
        assert_eq!(config.transfer.queue_capacity, 1000);
        assert_eq!(config.transfer.backpressure, "grow");
    }
}
