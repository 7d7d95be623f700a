//! Courier Export
//!
//! This crate provides the export adapter used by the task pipeline: run a
//! query against the configured data source and write the result set to a
//! delimited file.
//!
//! The [`ExportSource`] trait opens sessions; an [`ExportSession`] runs
//! queries and must be closed by its owner. [`SqlExportSource`] is the sqlx
//! implementation covering PostgreSQL, MySQL and SQLite.

mod csv;
mod sql;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use courier_config::ConfigError;

pub use sql::{SqlExportSession, SqlExportSource};

/// Error type for export operations.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
  /// The data source settings are unusable.
  #[error("invalid data source configuration: {0}")]
  Config(#[from] ConfigError),

  /// The data source is unreachable or rejected the credentials.
  #[error("data source connection failed: {0}")]
  Connection(#[source] sqlx::Error),

  /// The session was closed, or never connected.
  #[error("no active data source connection")]
  NotConnected,

  /// The query was rejected or failed while streaming rows.
  #[error("query failed: {0}")]
  Query(#[source] sqlx::Error),

  /// The output file could not be written.
  #[error("failed to write export file '{}': {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// What an export produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
  pub columns: usize,
  pub rows: u64,
}

/// Opens data source sessions.
#[async_trait]
pub trait ExportSource: Send + Sync {
  async fn connect(&self) -> Result<Box<dyn ExportSession>, ExportError>;
}

/// An open data source connection.
#[async_trait]
pub trait ExportSession: Send {
  /// Execute `query` and write a header row plus one line per result row to
  /// `output_path`, UTF-8 encoded.
  async fn run_query_to_file(
    &mut self,
    query: &str,
    output_path: &Path,
  ) -> Result<ExportSummary, ExportError>;

  /// Release the connection. Safe to call more than once.
  async fn close(&mut self);
}
