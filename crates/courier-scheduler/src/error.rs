//! Pipeline and task creation error types.

use std::fmt;
use std::time::Duration;

use courier_cron::CronParseError;
use courier_export::ExportError;
use courier_store::StoreError;
use courier_transfer::TransferError;

/// A step of the export-then-transfer pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  SourceConnect,
  Export,
  TransferConnect,
  Upload,
}

impl fmt::Display for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Step::SourceConnect => "data source connect",
      Step::Export => "export",
      Step::TransferConnect => "transfer connect",
      Step::Upload => "upload",
    };
    f.write_str(name)
  }
}

/// Errors that end a pipeline run with `error` status.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
  #[error("export failed: {0}")]
  Export(#[from] ExportError),

  #[error("transfer failed: {0}")]
  Transfer(#[from] TransferError),

  /// An adapter call did not finish within its limit.
  #[error("{step} timed out after {limit:?}")]
  Timeout { step: Step, limit: Duration },
}

/// A rule violated by a task creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
  /// A mandatory field was empty.
  Required(&'static str),
  /// The cron expression does not match the five-field grammar.
  Schedule(CronParseError),
}

impl fmt::Display for ValidationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ValidationError::Required(field) => write!(f, "{} is required", field),
      ValidationError::Schedule(e) => write!(f, "cron_expression: {}", e),
    }
  }
}

/// Errors returned by the task creation entry point.
#[derive(Debug, thiserror::Error)]
pub enum CreateTaskError {
  /// The request was rejected before anything was stored.
  #[error("invalid task: {}", join(.0))]
  Invalid(Vec<ValidationError>),

  #[error(transparent)]
  Store(#[from] StoreError),
}

fn join(errors: &[ValidationError]) -> String {
  errors
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}
