use std::{
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
  },
  time::Duration,
};

use super::{
  runtime::{spawn_periodic, LazyRuntime, PoolShape},
  PeriodicTask, Scheduler, Task, TaskHandle,
};
use crate::{error::SchedulerError, rc::lock};

/// Configuration of a [`BoundedElastic`] scheduler.
///
/// ```
/// use std::time::Duration;
/// use rxflow::scheduler::BoundedElasticConfig;
///
/// let config = BoundedElasticConfig::new()
///   .name("io")
///   .max_threads(4)
///   .max_pending(1_000)
///   .idle_timeout(Duration::from_secs(30));
/// assert_eq!(config.max_threads, 4);
/// ```
#[derive(Debug, Clone)]
pub struct BoundedElasticConfig {
  pub name: String,
  /// Upper bound of simultaneously running blocking workers.
  pub max_threads: usize,
  /// Upper bound of queued plus running tasks; further work is rejected.
  pub max_pending: usize,
  /// Idle workers are released after this long.
  pub idle_timeout: Duration,
}

impl Default for BoundedElasticConfig {
  fn default() -> Self {
    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    Self {
      name: "bounded-elastic".to_owned(),
      max_threads: 10 * cpus,
      max_pending: 100_000,
      idle_timeout: Duration::from_secs(60),
    }
  }
}

impl BoundedElasticConfig {
  pub fn new() -> Self { Self::default() }

  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn max_threads(mut self, max_threads: usize) -> Self {
    self.max_threads = max_threads;
    self
  }

  pub fn max_pending(mut self, max_pending: usize) -> Self {
    self.max_pending = max_pending;
    self
  }

  pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
    self.idle_timeout = idle_timeout;
    self
  }
}

/// Capped pool for blocking work. Threads are created on demand up to
/// `max_threads` and released after `idle_timeout` without work.
pub struct BoundedElastic {
  runtime: LazyRuntime,
  max_pending: usize,
  pending: Arc<AtomicUsize>,
}

impl BoundedElastic {
  pub fn new(config: BoundedElasticConfig) -> Self {
    let BoundedElasticConfig { name, max_threads, max_pending, idle_timeout } = config;
    BoundedElastic {
      runtime: LazyRuntime::new(name, PoolShape::Elastic { max_threads, idle_timeout }),
      max_pending,
      pending: Arc::new(AtomicUsize::new(0)),
    }
  }

  /// Number of accepted tasks that have not finished yet.
  pub fn pending(&self) -> usize { self.pending.load(Ordering::Acquire) }

  /// Reserve a pending slot; the returned permit frees it on drop.
  fn admit(&self) -> Result<PendingPermit, SchedulerError> {
    let admitted = self
      .pending
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.max_pending).then_some(n + 1))
      .is_ok();
    if admitted {
      Ok(PendingPermit(self.pending.clone()))
    } else {
      log::warn!("scheduler `{}` rejected work, {} tasks pending", self.name(), self.max_pending);
      Err(SchedulerError::Rejected {
        name: self.name().to_owned(),
        reason: format!("more than {} tasks pending", self.max_pending),
      })
    }
  }
}

struct PendingPermit(Arc<AtomicUsize>);

impl Drop for PendingPermit {
  fn drop(&mut self) { self.0.fetch_sub(1, Ordering::AcqRel); }
}

impl Scheduler for BoundedElastic {
  fn name(&self) -> &str { self.runtime.name() }

  fn schedule(&self, task: Task) -> Result<TaskHandle, SchedulerError> {
    let runtime = self.runtime.handle()?;
    let permit = self.admit()?;
    let handle = TaskHandle::new();
    let task = handle.guard(task);
    runtime.spawn_blocking(move || {
      let _permit = permit;
      task()
    });
    Ok(handle)
  }

  fn schedule_after(&self, delay: Duration, task: Task) -> Result<TaskHandle, SchedulerError> {
    let runtime = self.runtime.handle()?;
    let permit = self.admit()?;
    let handle = TaskHandle::new();
    let task = handle.guard(task);
    runtime.spawn(async move {
      tokio::time::sleep(delay).await;
      let _ = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        task()
      })
      .await;
    });
    Ok(handle)
  }

  fn schedule_periodic(
    &self,
    initial: Duration,
    period: Duration,
    task: PeriodicTask,
  ) -> Result<TaskHandle, SchedulerError> {
    let runtime = self.runtime.handle()?;
    let permit = Arc::new(self.admit()?);
    let handle = TaskHandle::new();
    let task = Arc::new(Mutex::new(task));
    spawn_periodic(&runtime, initial, period, handle.clone(), move || {
      let task = task.clone();
      let permit = permit.clone();
      async move {
        let _ = tokio::task::spawn_blocking(move || {
          let _permit = permit;
          let mut task = lock(&task);
          (*task)()
        })
        .await;
      }
    });
    Ok(handle)
  }

  fn dispose(&self) { self.runtime.dispose() }

  fn is_disposed(&self) -> bool { self.runtime.is_disposed() }
}

#[cfg(test)]
mod tests {
  use std::sync::mpsc;

  use super::*;

  #[rxflow_macro::test]
  fn rejects_beyond_max_pending() {
    let config = BoundedElasticConfig::new().name("tiny").max_threads(1).max_pending(1);
    let scheduler = BoundedElastic::new(config);
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();
    scheduler
      .schedule(Box::new(move || {
        started_tx.send(()).unwrap();
        let _ = release_rx.recv_timeout(Duration::from_secs(5));
      }))
      .unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let err = scheduler.schedule(Box::new(|| {})).unwrap_err();
    assert!(matches!(err, SchedulerError::Rejected { .. }));

    release_tx.send(()).unwrap();
    scheduler.dispose();
  }

  #[rxflow_macro::test]
  fn runs_blocking_work_on_named_threads() {
    let scheduler = BoundedElastic::new(BoundedElasticConfig::new().name("blocking-io"));
    let (tx, rx) = mpsc::channel();
    scheduler
      .schedule(Box::new(move || {
        std::thread::sleep(Duration::from_millis(5));
        tx.send(std::thread::current().name().map(str::to_owned)).unwrap();
      }))
      .unwrap();
    let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(name.as_deref(), Some("blocking-io"));
    scheduler.dispose();
  }
}
