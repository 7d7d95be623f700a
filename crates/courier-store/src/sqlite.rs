use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{debug, info};

use crate::types::TaskRow;
use crate::{NewTask, StatusUpdate, StoreConnector, StoreError, Task, TaskId, TaskStatus, TaskStore};

const SELECT_TASKS: &str = r#"
            SELECT id, task_name, query, output_file, remote_path, sftp_host, sftp_user,
                   sftp_password, cron_expression, created_at, status, last_execution, next_execution
            FROM scheduled_tasks
            "#;

/// SQLite-based store implementation.
///
/// Each store owns a single connection; open one per unit of work.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open the database file at `path`, creating it if missing.
  pub async fn open(path: &Path) -> Result<Self, StoreError> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect_with(options)
      .await
      .map_err(StoreError::Connection)?;

    debug!(path = %path.display(), "store connection opened");
    Ok(Self::new(pool))
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }
}

fn non_empty(value: &str) -> Option<&str> {
  if value.is_empty() { None } else { Some(value) }
}

#[async_trait]
impl TaskStore for SqliteStore {
  async fn insert(&self, task: &NewTask) -> Result<TaskId, StoreError> {
    if let Some(field) = task.missing_field() {
      return Err(StoreError::MissingField(field));
    }

    let result = sqlx::query(
            r#"
            INSERT INTO scheduled_tasks (task_name, query, output_file, remote_path, sftp_host, sftp_user, sftp_password, cron_expression, created_at, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.name)
        .bind(&task.query)
        .bind(&task.output_file)
        .bind(non_empty(&task.remote_path))
        .bind(non_empty(&task.transfer_host))
        .bind(non_empty(&task.transfer_user))
        .bind(non_empty(task.transfer_credential.expose()))
        .bind(&task.cron_expression)
        .bind(Utc::now())
        .bind(task.initial_status)
        .execute(&self.pool)
        .await
        .map_err(StoreError::write)?;

    let id = result.last_insert_rowid();
    info!(task_id = id, task_name = %task.name, "task inserted");
    Ok(id)
  }

  async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
    let rows: Vec<TaskRow> = sqlx::query_as(&format!("{SELECT_TASKS} ORDER BY id ASC"))
      .fetch_all(&self.pool)
      .await
      .map_err(StoreError::read)?;

    debug!(count = rows.len(), "tasks fetched");
    Ok(rows.into_iter().map(Task::from).collect())
  }

  async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
    let row: Option<TaskRow> = sqlx::query_as(&format!("{SELECT_TASKS} WHERE id = ?"))
      .bind(id)
      .fetch_optional(&self.pool)
      .await
      .map_err(StoreError::read)?;

    Ok(row.map(Task::from))
  }

  async fn update_status(
    &self,
    id: TaskId,
    status: TaskStatus,
  ) -> Result<StatusUpdate, StoreError> {
    let result = sqlx::query(
      r#"
            UPDATE scheduled_tasks
            SET status = ?, last_execution = ?
            WHERE id = ?
            "#,
    )
    .bind(status)
    .bind(Utc::now())
    .bind(id)
    .execute(&self.pool)
    .await
    .map_err(StoreError::write)?;

    Ok(if result.rows_affected() == 0 {
      StatusUpdate::NotFound
    } else {
      StatusUpdate::Updated
    })
  }

  async fn set_next_execution(
    &self,
    id: TaskId,
    at: Option<DateTime<Utc>>,
  ) -> Result<StatusUpdate, StoreError> {
    let result = sqlx::query(
      r#"
            UPDATE scheduled_tasks
            SET next_execution = ?
            WHERE id = ?
            "#,
    )
    .bind(at)
    .bind(id)
    .execute(&self.pool)
    .await
    .map_err(StoreError::write)?;

    Ok(if result.rows_affected() == 0 {
      StatusUpdate::NotFound
    } else {
      StatusUpdate::Updated
    })
  }

  async fn close(&self) {
    if !self.pool.is_closed() {
      self.pool.close().await;
      debug!("store connection closed");
    }
  }
}

/// Opens a fresh [`SqliteStore`] on the same database file for every caller.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
  path: PathBuf,
}

impl SqliteConnector {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Create the database file if needed and bring its schema up to date.
  ///
  /// Call once at startup, before any concurrent connections are opened.
  pub async fn initialize(&self) -> Result<(), StoreError> {
    let store = SqliteStore::open(&self.path).await?;
    let result = store.migrate().await;
    store.close().await;
    result
  }
}

#[async_trait]
impl StoreConnector for SqliteConnector {
  async fn connect(&self) -> Result<Box<dyn TaskStore>, StoreError> {
    Ok(Box::new(SqliteStore::open(&self.path).await?))
  }
}
