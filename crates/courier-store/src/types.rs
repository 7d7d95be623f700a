use std::fmt;

use chrono::{DateTime, Utc};
use courier_config::Secret;
use serde::Serialize;
use sqlx::FromRow;

/// Identifier assigned by the store when a task is inserted.
pub type TaskId = i64;

/// Last known state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TaskStatus {
  /// Accepted by the creation entry point, not yet run.
  Scheduled,
  Pending,
  /// The last run exported and delivered the file.
  Completed,
  /// The last run failed at some step.
  Error,
}

impl TaskStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      TaskStatus::Scheduled => "scheduled",
      TaskStatus::Pending => "pending",
      TaskStatus::Completed => "completed",
      TaskStatus::Error => "error",
    }
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Whether a status write matched a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
  Updated,
  NotFound,
}

/// Fields supplied when creating a task.
#[derive(Debug, Clone)]
pub struct NewTask {
  pub name: String,
  pub query: String,
  pub output_file: String,
  pub remote_path: String,
  pub transfer_host: String,
  pub transfer_user: String,
  pub transfer_credential: Secret,
  pub cron_expression: String,
  pub initial_status: TaskStatus,
}

impl NewTask {
  /// The first mandatory field that is empty, if any.
  pub(crate) fn missing_field(&self) -> Option<&'static str> {
    [
      ("name", &self.name),
      ("query", &self.query),
      ("output_file", &self.output_file),
      ("cron_expression", &self.cron_expression),
    ]
    .into_iter()
    .find(|(_, value)| value.trim().is_empty())
    .map(|(field, _)| field)
  }
}

/// A task as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
  pub id: TaskId,
  pub name: String,
  pub query: String,
  pub output_file: String,
  pub remote_path: String,
  pub transfer_host: String,
  pub transfer_user: String,
  #[serde(skip_serializing)]
  pub transfer_credential: Secret,
  pub cron_expression: String,
  pub created_at: DateTime<Utc>,
  pub status: TaskStatus,
  pub last_execution: Option<DateTime<Utc>>,
  pub next_execution: Option<DateTime<Utc>>,
}

/// Row shape of `scheduled_tasks`.
#[derive(FromRow)]
pub(crate) struct TaskRow {
  id: i64,
  task_name: String,
  query: String,
  output_file: String,
  remote_path: Option<String>,
  sftp_host: Option<String>,
  sftp_user: Option<String>,
  sftp_password: Option<String>,
  cron_expression: String,
  created_at: DateTime<Utc>,
  status: TaskStatus,
  last_execution: Option<DateTime<Utc>>,
  next_execution: Option<DateTime<Utc>>,
}

impl From<TaskRow> for Task {
  fn from(row: TaskRow) -> Self {
    Self {
      id: row.id,
      name: row.task_name,
      query: row.query,
      output_file: row.output_file,
      remote_path: row.remote_path.unwrap_or_default(),
      transfer_host: row.sftp_host.unwrap_or_default(),
      transfer_user: row.sftp_user.unwrap_or_default(),
      transfer_credential: Secret::from(row.sftp_password.unwrap_or_default()),
      cron_expression: row.cron_expression,
      created_at: row.created_at,
      status: row.status,
      last_execution: row.last_execution,
      next_execution: row.next_execution,
    }
  }
}
