//! Export-then-transfer execution of a single task.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_config::{CourierConfig, ExecutionConfig, TransferConfig};
use courier_export::{ExportSource, ExportSummary};
use courier_store::{StatusUpdate, StoreConnector, Task, TaskStatus};
use courier_transfer::{TransferConnector, TransferEndpoint};
use tracing::{error, info, instrument, warn};

use crate::error::{PipelineError, Step};

/// Work the scheduler runs when a trigger fires.
#[async_trait]
pub trait Job: Send + Sync {
  /// Run the task once and return the status it ended with.
  ///
  /// Implementations must not panic or return early on failure; every
  /// outcome is reported through the returned status.
  async fn run(&self, task: &Task, next_execution: Option<DateTime<Utc>>) -> TaskStatus;
}

/// The export-then-transfer pipeline.
///
/// Each run opens its own data source, transfer and store connections and
/// closes all of them before returning, whatever the outcome.
pub struct Pipeline {
  store: Arc<dyn StoreConnector>,
  source: Arc<dyn ExportSource>,
  transfer: Arc<dyn TransferConnector>,
  transfer_config: TransferConfig,
  limits: ExecutionConfig,
}

impl Pipeline {
  pub fn new(
    config: &CourierConfig,
    store: Arc<dyn StoreConnector>,
    source: Arc<dyn ExportSource>,
    transfer: Arc<dyn TransferConnector>,
  ) -> Self {
    Self {
      store,
      source,
      transfer,
      transfer_config: config.transfer.clone(),
      limits: config.execution,
    }
  }

  /// Export then deliver. Stops at the first failing step.
  async fn execute(&self, task: &Task) -> Result<ExportSummary, PipelineError> {
    let output = Path::new(&task.output_file);
    let summary = self.export(task, output).await?;
    self.deliver(task, output).await?;
    Ok(summary)
  }

  async fn export(&self, task: &Task, output: &Path) -> Result<ExportSummary, PipelineError> {
    let mut session = within(
      Step::SourceConnect,
      self.limits.connect_timeout,
      self.source.connect(),
    )
    .await?;

    let result = within(
      Step::Export,
      self.limits.export_timeout,
      session.run_query_to_file(&task.query, output),
    )
    .await;

    session.close().await;
    result
  }

  async fn deliver(&self, task: &Task, output: &Path) -> Result<(), PipelineError> {
    let endpoint = TransferEndpoint::new(
      &self.transfer_config,
      &task.transfer_host,
      task.transfer_user.clone(),
      task.transfer_credential.clone(),
    );

    let mut session = within(
      Step::TransferConnect,
      self.limits.connect_timeout,
      self.transfer.connect(&endpoint),
    )
    .await?;

    let remote = remote_path(task);
    let result = within(
      Step::Upload,
      self.limits.transfer_timeout,
      session.upload(output, &remote),
    )
    .await;

    session.close().await;
    result
  }

  /// Write the outcome back through a connection owned by this run.
  async fn record(&self, task: &Task, status: TaskStatus, next_execution: Option<DateTime<Utc>>) {
    let store = match self.store.connect().await {
      Ok(store) => store,
      Err(e) => {
        error!(error = %e, status = %status, "could not open store to record outcome");
        return;
      }
    };

    match store.update_status(task.id, status).await {
      Ok(StatusUpdate::Updated) => {}
      Ok(StatusUpdate::NotFound) => {
        warn!(status = %status, "task no longer exists in store; outcome not recorded");
      }
      Err(e) => error!(error = %e, status = %status, "failed to record outcome"),
    }

    if next_execution.is_some()
      && let Err(e) = store.set_next_execution(task.id, next_execution).await
    {
      warn!(error = %e, "failed to record next execution time");
    }

    store.close().await;
  }
}

#[async_trait]
impl Job for Pipeline {
  #[instrument(
    name = "pipeline_run",
    skip(self, task, next_execution),
    fields(
      task_id = task.id,
      task_name = %task.name,
      run_id = %uuid::Uuid::new_v4(),
    )
  )]
  async fn run(&self, task: &Task, next_execution: Option<DateTime<Utc>>) -> TaskStatus {
    info!(output_file = %task.output_file, "run started");

    let status = match self.execute(task).await {
      Ok(summary) => {
        info!(rows = summary.rows, "run completed");
        TaskStatus::Completed
      }
      Err(e) => {
        error!(error = %e, "run failed");
        TaskStatus::Error
      }
    };

    self.record(task, status, next_execution).await;
    status
  }
}

/// Destination path for a task, defaulting to the export's file name.
pub(crate) fn remote_path(task: &Task) -> String {
  if !task.remote_path.trim().is_empty() {
    return task.remote_path.clone();
  }

  Path::new(&task.output_file)
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| task.output_file.clone())
}

/// Bound an adapter call by `limit`, mapping expiry to a timeout error.
async fn within<T, E, F>(step: Step, limit: Duration, call: F) -> Result<T, PipelineError>
where
  F: Future<Output = Result<T, E>>,
  PipelineError: From<E>,
{
  match tokio::time::timeout(limit, call).await {
    Ok(result) => result.map_err(PipelineError::from),
    Err(_) => Err(PipelineError::Timeout { step, limit }),
  }
}
