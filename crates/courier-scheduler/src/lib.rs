//! Courier Scheduler
//!
//! This crate schedules stored tasks on their cron expressions and runs the
//! export-then-transfer pipeline when a trigger fires.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 bootstrap / TaskService                     │
//! │  - bootstrap(store, scheduler) registers stored tasks       │
//! │  - watch(...) re-scans the store for tasks added later      │
//! │  - create_task(request) validates, stores, registers        │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Scheduler                            │
//! │  - register(task) arms one trigger per task id              │
//! │  - start(cancel) runs the timer loop                        │
//! │  - per-task overlap guard, runs tracked until shutdown      │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Pipeline                             │
//! │  - export query to CSV, upload the file                     │
//! │  - writes completed / error back to the store               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use courier_scheduler::{bootstrap, watch, Pipeline, Scheduler};
//! use tokio_util::sync::CancellationToken;
//!
//! let pipeline = Pipeline::new(&config, store.clone(), source, transfer);
//! let scheduler = Scheduler::new(Arc::new(pipeline));
//!
//! bootstrap(store.as_ref(), &scheduler).await;
//!
//! let cancel = CancellationToken::new();
//! let handle = scheduler.start(cancel.clone());
//! tokio::spawn(watch(store.clone(), scheduler.clone(), every, cancel.clone()));
//!
//! // Later: stop the loop and wait for in-flight runs.
//! cancel.cancel();
//! handle.await?;
//! ```

mod bootstrap;
mod error;
mod pipeline;
mod scheduler;
mod service;

pub use bootstrap::{BootstrapReport, bootstrap, watch};
pub use error::{CreateTaskError, PipelineError, Step, ValidationError};
pub use pipeline::{Job, Pipeline};
pub use scheduler::{Clock, Registration, Scheduler, SystemClock};
pub use service::{NewTaskRequest, TaskService, validate};
