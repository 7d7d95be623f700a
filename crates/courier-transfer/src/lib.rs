//! Courier Transfer
//!
//! This crate provides the transfer adapter used by the task pipeline to
//! deliver an exported file to a remote endpoint over an authenticated
//! connection.
//!
//! A [`TransferConnector`] opens a [`TransferSession`] for a
//! [`TransferEndpoint`]; the session uploads files and must be closed by its
//! owner. [`SftpTransferConnector`] uploads over SFTP with password
//! authentication and is the default. [`HttpTransferConnector`] speaks
//! WebDAV-style HTTP `PUT` with basic authentication.

mod endpoint;
mod http;
mod sftp;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::{TransferConfig, TransferProtocol};

pub use endpoint::TransferEndpoint;
pub use http::{HttpTransferConnector, HttpTransferSession};
pub use sftp::{SftpTransferConnector, SftpTransferSession};

/// Error type for transfer operations.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
  /// The endpoint parameters do not form a usable address.
  #[error("invalid transfer endpoint: {0}")]
  InvalidEndpoint(String),

  /// The endpoint could not be reached.
  #[error("transfer endpoint unreachable: {0}")]
  Connection(#[source] reqwest::Error),

  /// No TCP connection could be opened to the endpoint.
  #[error("transfer endpoint {address} unreachable: {source}")]
  Unreachable {
    address: String,
    #[source]
    source: std::io::Error,
  },

  /// The endpoint refused the credentials.
  #[error("transfer endpoint rejected credentials: {0}")]
  AuthenticationFailed(String),

  /// The session was closed, or never connected.
  #[error("no active transfer connection")]
  NotConnected,

  /// The file to upload does not exist.
  #[error("local file not found: {}", .0.display())]
  MissingLocalFile(PathBuf),

  /// The endpoint refused to accept the file at this path.
  #[error("permission denied uploading to '{0}'")]
  PermissionDenied(String),

  /// The endpoint answered the upload with a non-success status.
  #[error("upload to '{remote}' rejected with status {status}")]
  Rejected { remote: String, status: u16 },

  /// The local file could not be read.
  #[error("failed to read '{}': {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The upload request failed in flight.
  #[error("upload failed: {0}")]
  Http(#[source] reqwest::Error),

  /// The SSH or SFTP layer reported an error.
  #[error("ssh session failed: {0}")]
  Ssh(#[source] ssh2::Error),

  /// Writing the remote file failed part way.
  #[error("failed to write '{remote}': {source}")]
  RemoteWrite {
    remote: String,
    #[source]
    source: std::io::Error,
  },

  /// A blocking transfer call panicked or was cancelled.
  #[error("transfer worker failed: {0}")]
  Worker(#[from] tokio::task::JoinError),
}

/// Build the connector for the configured protocol.
///
/// `timeout` bounds connection setup where the protocol needs it.
pub fn connector(config: &TransferConfig, timeout: Duration) -> Arc<dyn TransferConnector> {
  match config.protocol {
    TransferProtocol::Sftp => Arc::new(SftpTransferConnector::new(timeout)),
    TransferProtocol::Http | TransferProtocol::Https => Arc::new(HttpTransferConnector::new()),
  }
}

/// Opens transfer sessions.
#[async_trait]
pub trait TransferConnector: Send + Sync {
  /// Authenticate to the endpoint.
  async fn connect(
    &self,
    endpoint: &TransferEndpoint,
  ) -> Result<Box<dyn TransferSession>, TransferError>;
}

/// An authenticated connection to a transfer endpoint.
#[async_trait]
pub trait TransferSession: Send {
  /// Upload the file at `local_path` to `remote_path` on the endpoint.
  async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<(), TransferError>;

  /// Release the connection. Safe to call more than once.
  async fn close(&mut self);
}
