use std::time::Duration;

/// Time limits applied to each step of a task pipeline.
///
/// Every connect, export and upload call is bounded by one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionConfig {
  /// Limit for opening a data source or transfer connection.
  pub connect_timeout: Duration,
  /// Limit for running the query and writing the export file.
  pub export_timeout: Duration,
  /// Limit for uploading the export file.
  pub transfer_timeout: Duration,
}

impl Default for ExecutionConfig {
  fn default() -> Self {
    Self {
      connect_timeout: Duration::from_secs(30),
      export_timeout: Duration::from_secs(300),
      transfer_timeout: Duration::from_secs(300),
    }
  }
}
