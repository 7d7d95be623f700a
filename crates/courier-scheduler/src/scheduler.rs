//! Cron trigger registry and timer loop.
//!
//! The [`Scheduler`] keeps one trigger per task id. Its loop sleeps until
//! the earliest trigger is due, dispatches every due trigger as its own
//! tokio task, and advances each fired trigger to its next occurrence.
//! Triggers stay registered after firing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use courier_cron::CronExpr;
use courier_store::{Task, TaskId};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::pipeline::Job;

/// Longest single sleep of the timer loop. Wall-clock jumps are picked up
/// within this interval.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Source of the current local time for the scheduler.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Local>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Local> {
    Local::now()
  }
}

/// Result of asking the scheduler to register a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
  /// A new trigger was armed.
  Registered { next_fire: DateTime<Local> },
  /// A trigger for this task id already exists; nothing changed.
  AlreadyRegistered,
  /// The task has no cron expression and will never fire.
  Unscheduled,
  /// The cron expression is malformed or can never fire.
  Rejected(String),
}

struct Trigger {
  task: Arc<Task>,
  schedule: CronExpr,
  next_fire: DateTime<Local>,
}

struct Inner {
  job: Arc<dyn Job>,
  clock: Arc<dyn Clock>,
  triggers: Mutex<HashMap<TaskId, Trigger>>,
  /// Held for the duration of a run; a firing that cannot take it is skipped.
  running: Mutex<HashMap<TaskId, Arc<tokio::sync::Mutex<()>>>>,
  wake: Notify,
  tracker: TaskTracker,
}

/// Registry of cron triggers and the loop that fires them.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct Scheduler {
  inner: Arc<Inner>,
}

impl Scheduler {
  /// Create a scheduler that runs `job` for every firing.
  pub fn new(job: Arc<dyn Job>) -> Self {
    Self::with_clock(job, Arc::new(SystemClock))
  }

  /// Create a scheduler that reads the time from `clock`.
  pub fn with_clock(job: Arc<dyn Job>, clock: Arc<dyn Clock>) -> Self {
    Self {
      inner: Arc::new(Inner {
        job,
        clock,
        triggers: Mutex::new(HashMap::new()),
        running: Mutex::new(HashMap::new()),
        wake: Notify::new(),
        tracker: TaskTracker::new(),
      }),
    }
  }

  /// Arm a trigger for `task`.
  ///
  /// Never fails: problems are logged and reported in the returned
  /// [`Registration`] so one bad task cannot block the others.
  pub fn register(&self, task: &Task) -> Registration {
    self.register_at(task, self.inner.clock.now())
  }

  fn register_at(&self, task: &Task, now: DateTime<Local>) -> Registration {
    if task.cron_expression.trim().is_empty() {
      debug!(task_id = task.id, task_name = %task.name, "task has no schedule; not registered");
      return Registration::Unscheduled;
    }

    let mut triggers = self.inner.triggers.lock();
    if triggers.contains_key(&task.id) {
      info!(task_id = task.id, task_name = %task.name, "task already registered; skipping");
      return Registration::AlreadyRegistered;
    }

    let schedule = match CronExpr::parse(&task.cron_expression) {
      Ok(schedule) => schedule,
      Err(e) => {
        error!(
          task_id = task.id,
          task_name = %task.name,
          cron = %task.cron_expression,
          error = %e,
          "failed to register task"
        );
        return Registration::Rejected(e.to_string());
      }
    };

    let Some(next_fire) = schedule.next_after(&now) else {
      error!(
        task_id = task.id,
        task_name = %task.name,
        cron = %task.cron_expression,
        "schedule never fires; task not registered"
      );
      return Registration::Rejected("schedule never fires".to_string());
    };

    info!(
      task_id = task.id,
      task_name = %task.name,
      cron = %schedule,
      next_fire = %next_fire,
      "task registered"
    );

    triggers.insert(
      task.id,
      Trigger {
        task: Arc::new(task.clone()),
        schedule,
        next_fire,
      },
    );
    drop(triggers);
    self.inner.wake.notify_one();

    Registration::Registered { next_fire }
  }

  pub fn is_registered(&self, id: TaskId) -> bool {
    self.inner.triggers.lock().contains_key(&id)
  }

  pub fn registered_count(&self) -> usize {
    self.inner.triggers.lock().len()
  }

  /// When the trigger for `id` fires next.
  pub fn next_fire(&self, id: TaskId) -> Option<DateTime<Local>> {
    self.inner.triggers.lock().get(&id).map(|t| t.next_fire)
  }

  /// Fire every trigger due at `now` and advance it to its next occurrence.
  ///
  /// Returns how many runs were dispatched.
  pub fn fire_due(&self, now: DateTime<Local>) -> usize {
    let due: Vec<(Arc<Task>, Option<DateTime<Local>>)> = {
      let mut triggers = self.inner.triggers.lock();
      let mut due = Vec::new();
      let mut exhausted = Vec::new();

      for (id, trigger) in triggers.iter_mut().filter(|(_, t)| t.next_fire <= now) {
        let upcoming = trigger.schedule.next_after(&now);
        match upcoming {
          Some(at) => trigger.next_fire = at,
          None => exhausted.push(*id),
        }
        due.push((trigger.task.clone(), upcoming));
      }

      for id in exhausted {
        warn!(task_id = id, "schedule has no further occurrences; trigger removed");
        triggers.remove(&id);
      }

      due
    };

    let mut dispatched = 0;
    for (task, upcoming) in due {
      if self.dispatch(task, upcoming.map(|at| at.with_timezone(&Utc))) {
        dispatched += 1;
      }
    }
    dispatched
  }

  /// Spawn a run of `task` unless the previous run is still going.
  fn dispatch(&self, task: Arc<Task>, next_execution: Option<DateTime<Utc>>) -> bool {
    let lock = self
      .inner
      .running
      .lock()
      .entry(task.id)
      .or_default()
      .clone();

    let Ok(guard) = lock.try_lock_owned() else {
      warn!(
        task_id = task.id,
        task_name = %task.name,
        "previous run still in progress; skipping this firing"
      );
      return false;
    };

    debug!(task_id = task.id, task_name = %task.name, "dispatching run");
    let job = self.inner.job.clone();
    self.inner.tracker.spawn(async move {
      let _guard = guard;
      job.run(&task, next_execution).await;
    });

    true
  }

  fn earliest_fire(&self) -> Option<DateTime<Local>> {
    self.inner.triggers.lock().values().map(|t| t.next_fire).min()
  }

  /// Run the timer loop until `cancel` fires, then wait for in-flight runs.
  pub async fn run(&self, cancel: CancellationToken) {
    info!(triggers = self.registered_count(), "scheduler started");

    loop {
      let sleep_for = match self.earliest_fire() {
        Some(at) => (at - self.inner.clock.now())
          .to_std()
          .unwrap_or(Duration::ZERO)
          .min(MAX_SLEEP),
        None => MAX_SLEEP,
      };

      tokio::select! {
        _ = cancel.cancelled() => {
          info!("scheduler cancelled");
          break;
        }
        _ = self.inner.wake.notified() => {
          debug!("scheduler woken by registration");
        }
        _ = tokio::time::sleep(sleep_for) => {
          let fired = self.fire_due(self.inner.clock.now());
          if fired > 0 {
            debug!(fired, "triggers fired");
          }
        }
      }
    }

    self.drain().await;
    info!("scheduler stopped");
  }

  /// Start the timer loop on its own tokio task.
  pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
    let scheduler = self.clone();
    tokio::spawn(async move { scheduler.run(cancel).await })
  }

  /// Wait until every dispatched run has finished.
  pub async fn drain(&self) {
    self.inner.tracker.close();
    self.inner.tracker.wait().await;
    self.inner.tracker.reopen();
  }
}
