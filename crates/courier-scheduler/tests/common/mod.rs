//! Fake adapters and store helpers shared by the integration tests.

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::{CourierConfig, ExecutionConfig, Secret};
use courier_export::{ExportError, ExportSession, ExportSource, ExportSummary};
use courier_scheduler::Pipeline;
use courier_store::{NewTask, SqliteConnector, StoreConnector, Task, TaskStatus};
use courier_transfer::{TransferConnector, TransferEndpoint, TransferError, TransferSession};
use parking_lot::Mutex;

/// Ordered record of adapter calls.
pub type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
  Succeed,
  FailConnect,
  FailOperation,
  Hang,
}

/// Export source that writes a fixed CSV instead of querying a database.
pub struct FakeSource {
  behavior: Behavior,
  log: CallLog,
}

impl FakeSource {
  pub fn new(behavior: Behavior, log: CallLog) -> Self {
    Self { behavior, log }
  }
}

#[async_trait]
impl ExportSource for FakeSource {
  async fn connect(&self) -> Result<Box<dyn ExportSession>, ExportError> {
    self.log.lock().push("source.connect".to_string());
    if self.behavior == Behavior::FailConnect {
      return Err(ExportError::NotConnected);
    }
    Ok(Box::new(FakeExportSession {
      behavior: self.behavior,
      log: self.log.clone(),
    }))
  }
}

struct FakeExportSession {
  behavior: Behavior,
  log: CallLog,
}

#[async_trait]
impl ExportSession for FakeExportSession {
  async fn run_query_to_file(
    &mut self,
    query: &str,
    output_path: &Path,
  ) -> Result<ExportSummary, ExportError> {
    self.log.lock().push(format!("source.query {}", query));
    match self.behavior {
      Behavior::FailOperation => Err(ExportError::Write {
        path: output_path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
      }),
      Behavior::Hang => {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("export should have timed out")
      }
      _ => {
        tokio::fs::write(output_path, "id,name\n1,widget\n")
          .await
          .map_err(|source| ExportError::Write {
            path: output_path.to_path_buf(),
            source,
          })?;
        Ok(ExportSummary { columns: 2, rows: 1 })
      }
    }
  }

  async fn close(&mut self) {
    self.log.lock().push("source.close".to_string());
  }
}

/// Transfer connector that records uploads instead of sending them.
pub struct FakeTransfer {
  behavior: Behavior,
  log: CallLog,
  pub endpoints: Arc<Mutex<Vec<TransferEndpoint>>>,
  pub uploads: Arc<Mutex<Vec<(PathBuf, String)>>>,
}

impl FakeTransfer {
  pub fn new(behavior: Behavior, log: CallLog) -> Self {
    Self {
      behavior,
      log,
      endpoints: Arc::default(),
      uploads: Arc::default(),
    }
  }
}

#[async_trait]
impl TransferConnector for FakeTransfer {
  async fn connect(
    &self,
    endpoint: &TransferEndpoint,
  ) -> Result<Box<dyn TransferSession>, TransferError> {
    self.log.lock().push("transfer.connect".to_string());
    self.endpoints.lock().push(endpoint.clone());
    if self.behavior == Behavior::FailConnect {
      return Err(TransferError::AuthenticationFailed("bad password".to_string()));
    }
    Ok(Box::new(FakeTransferSession {
      behavior: self.behavior,
      log: self.log.clone(),
      uploads: self.uploads.clone(),
    }))
  }
}

struct FakeTransferSession {
  behavior: Behavior,
  log: CallLog,
  uploads: Arc<Mutex<Vec<(PathBuf, String)>>>,
}

#[async_trait]
impl TransferSession for FakeTransferSession {
  async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<(), TransferError> {
    self.log.lock().push(format!("transfer.upload {}", remote_path));
    match self.behavior {
      Behavior::FailOperation => Err(TransferError::PermissionDenied(remote_path.to_string())),
      Behavior::Hang => {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("upload should have timed out")
      }
      _ => {
        self
          .uploads
          .lock()
          .push((local_path.to_path_buf(), remote_path.to_string()));
        Ok(())
      }
    }
  }

  async fn close(&mut self) {
    self.log.lock().push("transfer.close".to_string());
  }
}

/// A migrated store in a temporary directory.
pub async fn store() -> (tempfile::TempDir, Arc<SqliteConnector>) {
  let dir = tempfile::tempdir().unwrap();
  let connector = SqliteConnector::new(dir.path().join("scheduled_tasks.db"));
  connector.initialize().await.unwrap();
  (dir, Arc::new(connector))
}

pub fn new_task(name: &str, output_file: &Path, cron: &str) -> NewTask {
  NewTask {
    name: name.to_string(),
    query: "SELECT id, name FROM widgets".to_string(),
    output_file: output_file.to_string_lossy().into_owned(),
    remote_path: "/upload/widgets.csv".to_string(),
    transfer_host: "files.example.com".to_string(),
    transfer_user: "exporter".to_string(),
    transfer_credential: Secret::new("hunter2"),
    cron_expression: cron.to_string(),
    initial_status: TaskStatus::Pending,
  }
}

/// Insert `task` and read it back.
pub async fn seed(connector: &SqliteConnector, task: &NewTask) -> Task {
  let store = connector.connect().await.unwrap();
  let id = store.insert(task).await.unwrap();
  let stored = store.get_task(id).await.unwrap().unwrap();
  store.close().await;
  stored
}

pub async fn fetch(connector: &SqliteConnector, id: i64) -> Task {
  let store = connector.connect().await.unwrap();
  let task = store.get_task(id).await.unwrap().unwrap();
  store.close().await;
  task
}

pub fn config(limits: ExecutionConfig) -> CourierConfig {
  CourierConfig {
    execution: limits,
    ..CourierConfig::default()
  }
}

pub fn pipeline(
  connector: Arc<SqliteConnector>,
  source: FakeSource,
  transfer: Arc<FakeTransfer>,
  limits: ExecutionConfig,
) -> Pipeline {
  Pipeline::new(&config(limits), connector, Arc::new(source), transfer)
}

pub fn calls(log: &CallLog) -> Vec<String> {
  log.lock().clone()
}
