//! Execution contexts that signals and subscriptions can be moved onto.
//!
//! Four flavours exist: [`Immediate`] runs work inline on the calling
//! thread, a *single* scheduler owns one dedicated worker, a *parallel*
//! scheduler owns a fixed pool sized to the available CPU parallelism and
//! [`BoundedElastic`] runs blocking work on a capped pool whose idle threads
//! are recycled. Blocking work belongs on bounded-elastic or single.
//!
//! Schedulers are explicit objects with a create/dispose lifecycle. The
//! shared instances returned by [`single`], [`parallel`] and
//! [`bounded_elastic`] are created on first use and torn down by
//! [`shutdown`].

use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  time::Duration,
};

use crate::error::SchedulerError;

mod bounded_elastic;
mod immediate;
mod registry;
mod runtime;

pub use bounded_elastic::{BoundedElastic, BoundedElasticConfig};
pub use immediate::Immediate;
pub use registry::*;
pub use runtime::RuntimeScheduler;

/// One-shot unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Unit of work re-run on every period.
pub type PeriodicTask = Box<dyn FnMut() + Send + 'static>;

pub type SchedulerRef = Arc<dyn Scheduler>;

pub trait Scheduler: Send + Sync + 'static {
  fn name(&self) -> &str;

  /// Run `task` on a worker as soon as possible.
  fn schedule(&self, task: Task) -> Result<TaskHandle, SchedulerError>;

  /// Run `task` on a worker once `delay` elapsed.
  fn schedule_after(&self, delay: Duration, task: Task) -> Result<TaskHandle, SchedulerError>;

  /// Run `task` after `initial`, then every `period` until the returned
  /// handle is cancelled.
  fn schedule_periodic(
    &self,
    initial: Duration,
    period: Duration,
    task: PeriodicTask,
  ) -> Result<TaskHandle, SchedulerError>;

  /// Stop accepting work and release the workers. Work not yet started is
  /// dropped.
  fn dispose(&self);

  fn is_disposed(&self) -> bool;
}

/// Cancellation handle of scheduled work. Cancelling work that already ran
/// is a no-op.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle(Arc<AtomicBool>);

impl TaskHandle {
  pub fn new() -> Self { Self::default() }

  pub fn cancel(&self) { self.0.store(true, Ordering::Release) }

  pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::Acquire) }

  /// Wrap `task` so it is skipped once this handle is cancelled.
  pub(crate) fn guard(&self, task: Task) -> impl FnOnce() + Send + 'static {
    let handle = self.clone();
    move || {
      if !handle.is_cancelled() {
        task()
      }
    }
  }
}

// ==================== Presets ====================

/// Declarative scheduler configuration.
#[derive(Debug, Clone)]
pub enum SchedulerPreset {
  Immediate,
  Single { name: String },
  BoundedElastic(BoundedElasticConfig),
  Parallel { name: String, parallelism: usize },
}

impl SchedulerPreset {
  /// Create a new, independently disposable scheduler.
  pub fn build(&self) -> SchedulerRef {
    match self {
      SchedulerPreset::Immediate => Arc::new(Immediate),
      SchedulerPreset::Single { name } => Arc::new(RuntimeScheduler::single(name.clone())),
      SchedulerPreset::BoundedElastic(config) => Arc::new(BoundedElastic::new(config.clone())),
      SchedulerPreset::Parallel { name, parallelism } => {
        Arc::new(RuntimeScheduler::parallel_with(name.clone(), *parallelism))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::mpsc;

  use super::*;

  #[rxflow_macro::test]
  fn cancelled_handle_skips_task() {
    let handle = TaskHandle::new();
    let (tx, rx) = mpsc::channel();
    let task = handle.guard(Box::new(move || tx.send(()).unwrap()));
    handle.cancel();
    task();
    assert!(rx.try_recv().is_err());
  }

  #[rxflow_macro::test]
  fn presets_build_named_schedulers() {
    let single = SchedulerPreset::Single { name: "preset-single".into() }.build();
    assert_eq!(single.name(), "preset-single");

    let (tx, rx) = mpsc::channel();
    single
      .schedule(Box::new(move || {
        tx.send(std::thread::current().name().map(str::to_owned)).unwrap();
      }))
      .unwrap();
    let thread = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(thread.as_deref(), Some("preset-single"));
    single.dispose();
    assert!(single.is_disposed());

    let immediate = SchedulerPreset::Immediate.build();
    assert_eq!(immediate.name(), "immediate");
  }
}
