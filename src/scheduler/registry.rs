use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use super::{BoundedElastic, BoundedElasticConfig, Immediate, RuntimeScheduler, Scheduler, SchedulerRef};
use crate::rc::lock;

#[derive(Default)]
struct Shared {
  single: Option<Arc<RuntimeScheduler>>,
  parallel: Option<Arc<RuntimeScheduler>>,
  bounded_elastic: Option<Arc<BoundedElastic>>,
}

static SHARED: Lazy<Mutex<Shared>> = Lazy::new(|| Mutex::new(Shared::default()));

/// Reuse the scheduler in `slot` unless it was disposed, otherwise install a
/// fresh one.
fn shared<S: Scheduler>(slot: &mut Option<Arc<S>>, create: impl FnOnce() -> S) -> SchedulerRef {
  if let Some(scheduler) = slot.as_ref().filter(|s| !s.is_disposed()) {
    return scheduler.clone();
  }
  let scheduler = Arc::new(create());
  *slot = Some(scheduler.clone());
  scheduler
}

/// Runs work inline on the calling thread.
pub fn immediate() -> SchedulerRef { Arc::new(Immediate) }

/// The shared single-worker scheduler.
pub fn single() -> SchedulerRef { shared(&mut lock(&SHARED).single, || RuntimeScheduler::single("single")) }

/// The shared CPU-sized pool.
pub fn parallel() -> SchedulerRef {
  shared(&mut lock(&SHARED).parallel, || RuntimeScheduler::parallel("parallel"))
}

/// The shared pool for blocking work.
pub fn bounded_elastic() -> SchedulerRef {
  shared(&mut lock(&SHARED).bounded_elastic, || BoundedElastic::new(BoundedElasticConfig::default()))
}

/// A new, unshared single-worker scheduler.
pub fn new_single(name: impl Into<String>) -> Arc<RuntimeScheduler> {
  Arc::new(RuntimeScheduler::single(name))
}

/// A new, unshared pool of `parallelism` workers.
pub fn new_parallel(name: impl Into<String>, parallelism: usize) -> Arc<RuntimeScheduler> {
  Arc::new(RuntimeScheduler::parallel_with(name, parallelism))
}

/// A new, unshared bounded-elastic scheduler.
pub fn new_bounded_elastic(config: BoundedElasticConfig) -> Arc<BoundedElastic> {
  Arc::new(BoundedElastic::new(config))
}

/// Dispose every shared scheduler. Later calls to [`single`],
/// [`parallel`] or [`bounded_elastic`] create fresh instances.
pub fn shutdown() {
  let Shared { single, parallel, bounded_elastic } = std::mem::take(&mut *lock(&SHARED));
  log::debug!("shutting down shared schedulers");
  single.into_iter().chain(parallel).for_each(|s| s.dispose());
  if let Some(s) = bounded_elastic {
    s.dispose();
  }
}
