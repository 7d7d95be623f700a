//! Courier Store
//!
//! This crate provides the storage trait and SQLite implementation for
//! scheduled tasks. The store is the durable source of truth: task
//! definitions live here, and every pipeline run writes its outcome back.
//!
//! The [`TaskStore`] trait defines operations for:
//! - Inserting new tasks
//! - Listing and fetching tasks
//! - Recording execution outcomes
//!
//! A [`StoreConnector`] hands out independent store handles, so concurrent
//! pipeline runs never share a connection.

mod sqlite;
mod types;

pub use sqlite::{SqliteConnector, SqliteStore};
pub use types::{NewTask, StatusUpdate, Task, TaskId, TaskStatus};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// No usable connection: opening failed, or the store was closed.
  #[error("store connection error: {0}")]
  Connection(#[source] sqlx::Error),

  /// Applying the schema failed.
  #[error("store migration failed: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),

  /// Reading tasks failed.
  #[error("store read error: {0}")]
  Read(#[source] sqlx::Error),

  /// Writing a task failed.
  #[error("store write error: {0}")]
  Write(#[source] sqlx::Error),

  /// A mandatory task field was empty.
  #[error("missing required field: {0}")]
  MissingField(&'static str),
}

impl StoreError {
  pub(crate) fn read(e: sqlx::Error) -> Self {
    if is_connection_error(&e) {
      StoreError::Connection(e)
    } else {
      StoreError::Read(e)
    }
  }

  pub(crate) fn write(e: sqlx::Error) -> Self {
    if is_connection_error(&e) {
      StoreError::Connection(e)
    } else {
      StoreError::Write(e)
    }
  }
}

fn is_connection_error(e: &sqlx::Error) -> bool {
  matches!(
    e,
    sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)
  )
}

/// Storage trait for scheduled tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
  /// Insert a new task and return its assigned id.
  async fn insert(&self, task: &NewTask) -> Result<TaskId, StoreError>;

  /// List all tasks in insertion order.
  async fn list_tasks(&self) -> Result<Vec<Task>, StoreError>;

  /// Get a task by id.
  async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

  /// Record an execution outcome and stamp `last_execution`.
  async fn update_status(&self, id: TaskId, status: TaskStatus)
  -> Result<StatusUpdate, StoreError>;

  /// Record when the task is next expected to fire.
  async fn set_next_execution(
    &self,
    id: TaskId,
    at: Option<DateTime<Utc>>,
  ) -> Result<StatusUpdate, StoreError>;

  /// Release the underlying connection. Safe to call more than once.
  async fn close(&self);
}

/// Opens independent [`TaskStore`] handles.
#[async_trait]
pub trait StoreConnector: Send + Sync {
  async fn connect(&self) -> Result<Box<dyn TaskStore>, StoreError>;
}
