//! Task creation entry point.

use std::sync::Arc;

use courier_config::Secret;
use courier_cron::CronExpr;
use courier_store::{NewTask, StoreConnector, StoreError, Task, TaskId, TaskStatus};
use tracing::{info, warn};

use crate::error::{CreateTaskError, ValidationError};
use crate::scheduler::{Registration, Scheduler};

/// A request to create a scheduled task.
#[derive(Debug, Clone, Default)]
pub struct NewTaskRequest {
  pub name: String,
  pub query: String,
  pub output_file: String,
  /// Destination path on the transfer endpoint. Empty means the output
  /// file's name.
  pub remote_path: String,
  pub sftp_host: String,
  pub sftp_user: String,
  pub sftp_password: Secret,
  pub cron_expression: String,
}

/// Every rule `request` violates, in field order. Empty when valid.
pub fn validate(request: &NewTaskRequest) -> Vec<ValidationError> {
  let mut errors: Vec<ValidationError> = [
    ("name", request.name.as_str()),
    ("query", request.query.as_str()),
    ("output_file", request.output_file.as_str()),
    ("sftp_host", request.sftp_host.as_str()),
    ("sftp_user", request.sftp_user.as_str()),
    ("sftp_password", request.sftp_password.expose()),
  ]
  .into_iter()
  .filter(|(_, value)| value.trim().is_empty())
  .map(|(field, _)| ValidationError::Required(field))
  .collect();

  if request.cron_expression.trim().is_empty() {
    errors.push(ValidationError::Required("cron_expression"));
  } else {
    errors.extend(
      CronExpr::errors(&request.cron_expression)
        .into_iter()
        .map(ValidationError::Schedule),
    );
  }

  errors
}

/// Creates tasks and hands them to a running scheduler.
pub struct TaskService {
  store: Arc<dyn StoreConnector>,
  scheduler: Option<Scheduler>,
}

impl TaskService {
  /// A service that only stores tasks. They are picked up at the next
  /// bootstrap.
  pub fn new(store: Arc<dyn StoreConnector>) -> Self {
    Self {
      store,
      scheduler: None,
    }
  }

  /// Also register created tasks with `scheduler` right away.
  pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
    self.scheduler = Some(scheduler);
    self
  }

  /// Validate, store with status `scheduled`, and register.
  ///
  /// Nothing is written when validation fails.
  pub async fn create_task(&self, request: NewTaskRequest) -> Result<TaskId, CreateTaskError> {
    let errors = validate(&request);
    if !errors.is_empty() {
      warn!(task_name = %request.name, errors = errors.len(), "task rejected");
      return Err(CreateTaskError::Invalid(errors));
    }

    let new_task = NewTask {
      name: request.name,
      query: request.query,
      output_file: request.output_file,
      remote_path: request.remote_path,
      transfer_host: request.sftp_host,
      transfer_user: request.sftp_user,
      transfer_credential: request.sftp_password,
      cron_expression: request.cron_expression,
      initial_status: TaskStatus::Scheduled,
    };

    let (id, stored) = self.insert(&new_task).await?;
    info!(task_id = id, task_name = %new_task.name, "task created");

    if let (Some(scheduler), Some(task)) = (&self.scheduler, stored) {
      match scheduler.register(&task) {
        Registration::Registered { next_fire } => {
          info!(task_id = id, next_fire = %next_fire, "task scheduled");
        }
        other => warn!(task_id = id, registration = ?other, "task stored but not scheduled"),
      }
    }

    Ok(id)
  }

  /// Insert and read the row back, closing the store either way.
  async fn insert(&self, task: &NewTask) -> Result<(TaskId, Option<Task>), StoreError> {
    let store = self.store.connect().await?;

    let result = async {
      let id = store.insert(task).await?;
      let stored = store.get_task(id).await?;
      Ok::<_, StoreError>((id, stored))
    }
    .await;

    store.close().await;
    result
  }
}
