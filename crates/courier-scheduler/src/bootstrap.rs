use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use courier_store::{StoreConnector, TaskId, TaskStatus};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::scheduler::{Registration, Scheduler};

/// Counts from one bootstrap pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
  /// Tasks read from the store.
  pub loaded: usize,
  /// Tasks left out because they already completed.
  pub skipped_completed: usize,
  /// Tasks that got a new trigger.
  pub registered: usize,
}

/// Register a trigger for every stored task that has not completed.
///
/// Store failures are logged and treated as an empty task list.
pub async fn bootstrap(store: &dyn StoreConnector, scheduler: &Scheduler) -> BootstrapReport {
  let report = scan(store, scheduler, &mut HashSet::new()).await;

  info!(
    loaded = report.loaded,
    skipped_completed = report.skipped_completed,
    registered = report.registered,
    "bootstrap complete"
  );

  report
}

/// Re-scan the store every `every` until `cancel` fires.
///
/// Tasks inserted by another process (`courier add`) get their trigger on
/// the next pass. Each task id is offered to the scheduler once per watcher.
pub async fn watch(
  store: Arc<dyn StoreConnector>,
  scheduler: Scheduler,
  every: Duration,
  cancel: CancellationToken,
) {
  let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));
  interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
  // The first tick completes immediately; bootstrap has just covered it.
  interval.tick().await;

  let mut seen = HashSet::new();
  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = interval.tick() => {
        let report = scan(store.as_ref(), &scheduler, &mut seen).await;
        if report.registered > 0 {
          info!(registered = report.registered, "registered tasks added since last scan");
        } else {
          debug!(loaded = report.loaded, "store scan found no new tasks");
        }
      }
    }
  }

  debug!("store watcher stopped");
}

async fn scan(
  store: &dyn StoreConnector,
  scheduler: &Scheduler,
  seen: &mut HashSet<TaskId>,
) -> BootstrapReport {
  let mut report = BootstrapReport::default();

  let handle = match store.connect().await {
    Ok(handle) => handle,
    Err(e) => {
      warn!(error = %e, "could not open task store; no tasks loaded");
      return report;
    }
  };

  let tasks = match handle.list_tasks().await {
    Ok(tasks) => tasks,
    Err(e) => {
      warn!(error = %e, "could not read tasks; no tasks loaded");
      Vec::new()
    }
  };
  handle.close().await;

  report.loaded = tasks.len();
  for task in tasks {
    if task.status == TaskStatus::Completed {
      report.skipped_completed += 1;
      continue;
    }
    if !seen.insert(task.id) || scheduler.is_registered(task.id) {
      continue;
    }

    if let Registration::Registered { .. } = scheduler.register(&task) {
      report.registered += 1;
    }
  }

  report
}
