//! Courier Config
//!
//! This crate contains the typed runtime configuration for courier. A
//! [`CourierConfig`] is assembled once at process start (from CLI flags and
//! environment variables) and handed by reference to the store connector,
//! the export and transfer adapters, and the task pipeline.
//!
//! Nothing in here reads the environment itself; that is the binary's job.

mod execution;
mod secret;
mod source;
mod transfer;

use std::path::PathBuf;
use std::time::Duration;

pub use execution::ExecutionConfig;
pub use secret::Secret;
pub use source::{SourceConfig, SourceDriver};
pub use transfer::{TransferConfig, TransferProtocol};

/// Error type for configuration problems detected when a value is used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  /// A setting required by the selected driver was not provided.
  #[error("missing setting: {0}")]
  Missing(&'static str),

  /// The data source settings do not form a valid connection URL.
  #[error("invalid data source url: {0}")]
  InvalidUrl(#[from] url::ParseError),

  /// The data source driver name is not supported.
  #[error("unsupported data source driver: {0}")]
  UnsupportedDriver(String),

  /// The transfer protocol name is not supported.
  #[error("unsupported transfer protocol: {0}")]
  UnsupportedProtocol(String),
}

/// Top-level configuration for a courier process.
#[derive(Debug, Clone, Default)]
pub struct CourierConfig {
  pub store: StoreConfig,
  pub source: SourceConfig,
  pub transfer: TransferConfig,
  pub execution: ExecutionConfig,
}

/// Where the task store lives.
#[derive(Debug, Clone)]
pub struct StoreConfig {
  /// Path to the SQLite database file holding scheduled tasks.
  pub database_path: PathBuf,
  /// How often a running scheduler looks for tasks added by other processes.
  pub rescan_interval: Duration,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      database_path: PathBuf::from("scheduled_tasks.db"),
      rescan_interval: Duration::from_secs(30),
    }
  }
}
