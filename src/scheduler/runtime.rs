use std::{
  num::NonZeroUsize,
  panic::{self, AssertUnwindSafe},
  sync::{Arc, Mutex},
  thread,
  time::Duration,
};

use futures::{
  channel::{mpsc, oneshot},
  StreamExt,
};
use tokio::runtime::{Builder, Handle, Runtime};

use super::{PeriodicTask, Scheduler, Task, TaskHandle};
use crate::{error::SchedulerError, rc::lock};

/// How the worker pool of a [`LazyRuntime`] is shaped.
#[derive(Debug, Clone)]
pub(crate) enum PoolShape {
  /// One thread running a current-thread runtime; immediate work goes
  /// through a FIFO queue.
  Dedicated,
  /// A fixed number of async workers.
  Workers(usize),
  /// One async worker driving timers plus a capped pool of blocking threads.
  Elastic { max_threads: usize, idle_timeout: Duration },
}

enum Running {
  Pool(Runtime),
  Dedicated {
    handle: Handle,
    queue: mpsc::UnboundedSender<Task>,
    // dropping it ends the worker thread
    _stop: oneshot::Sender<()>,
  },
}

impl Running {
  fn handle(&self) -> &Handle {
    match self {
      Running::Pool(runtime) => runtime.handle(),
      Running::Dedicated { handle, .. } => handle,
    }
  }

  fn shutdown(self) {
    if let Running::Pool(runtime) = self {
      runtime.shutdown_background();
    }
  }
}

enum Slot {
  Idle,
  Running(Running),
  Disposed,
}

/// A tokio runtime started on first use and shut down on dispose.
pub(crate) struct LazyRuntime {
  name: String,
  shape: PoolShape,
  slot: Mutex<Slot>,
}

impl LazyRuntime {
  pub fn new(name: String, shape: PoolShape) -> Self {
    LazyRuntime { name, shape, slot: Mutex::new(Slot::Idle) }
  }

  pub fn name(&self) -> &str { &self.name }

  /// Handle of the running runtime, starting it if needed.
  pub fn handle(&self) -> Result<Handle, SchedulerError> { self.with_running(|running| running.handle().clone()) }

  /// Run `task` as soon as possible. On a dedicated worker tasks run in
  /// submission order.
  pub fn spawn(&self, task: Task) -> Result<(), SchedulerError> {
    self.with_running(|running| match running {
      Running::Pool(runtime) => {
        runtime.spawn(async move { task() });
      }
      Running::Dedicated { queue, .. } => {
        // the receiver only goes away on dispose, which drops pending work
        let _ = queue.unbounded_send(task);
      }
    })
  }

  fn with_running<R>(&self, f: impl FnOnce(&Running) -> R) -> Result<R, SchedulerError> {
    let mut slot = lock(&self.slot);
    match &*slot {
      Slot::Running(running) => return Ok(f(running)),
      Slot::Disposed => return Err(SchedulerError::Disposed { name: self.name.clone() }),
      Slot::Idle => {}
    }
    let running = self.start()?;
    log::debug!("scheduler `{}` started ({:?})", self.name, self.shape);
    let out = f(&running);
    *slot = Slot::Running(running);
    Ok(out)
  }

  fn spawn_error(&self, err: std::io::Error) -> SchedulerError {
    SchedulerError::Spawn { name: self.name.clone(), source: Arc::new(err) }
  }

  fn start(&self) -> Result<Running, SchedulerError> {
    let mut builder = match self.shape {
      PoolShape::Dedicated => return self.start_dedicated(),
      PoolShape::Workers(_) | PoolShape::Elastic { .. } => Builder::new_multi_thread(),
    };
    builder.thread_name(self.name.clone()).enable_time();
    match self.shape {
      PoolShape::Workers(workers) => {
        builder.worker_threads(workers.max(1));
      }
      PoolShape::Elastic { max_threads, idle_timeout } => {
        builder
          .worker_threads(1)
          .max_blocking_threads(max_threads.max(1))
          .thread_keep_alive(idle_timeout);
      }
      PoolShape::Dedicated => {}
    }
    builder.build().map(Running::Pool).map_err(|err| self.spawn_error(err))
  }

  fn start_dedicated(&self) -> Result<Running, SchedulerError> {
    let runtime = Builder::new_current_thread().enable_time().build().map_err(|err| self.spawn_error(err))?;
    let handle = runtime.handle().clone();
    let (queue, mut tasks) = mpsc::unbounded::<Task>();
    let (stop, stopped) = oneshot::channel::<()>();
    let name = self.name.clone();
    handle.spawn(async move {
      while let Some(task) = tasks.next().await {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
          log::error!("a task panicked on scheduler `{name}`");
        }
      }
    });
    thread::Builder::new()
      .name(self.name.clone())
      .spawn(move || {
        runtime.block_on(async move {
          let _ = stopped.await;
        })
      })
      .map_err(|err| self.spawn_error(err))?;
    Ok(Running::Dedicated { handle, queue, _stop: stop })
  }

  pub fn dispose(&self) {
    let previous = std::mem::replace(&mut *lock(&self.slot), Slot::Disposed);
    if let Slot::Running(running) = previous {
      log::debug!("scheduler `{}` disposed", self.name);
      running.shutdown();
    }
  }

  pub fn is_disposed(&self) -> bool { matches!(*lock(&self.slot), Slot::Disposed) }
}

impl Drop for LazyRuntime {
  fn drop(&mut self) {
    let slot = self.slot.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Slot::Running(running) = std::mem::replace(slot, Slot::Disposed) {
      running.shutdown();
    }
  }
}

/// Run `task` every `period` after `initial`, on the given runtime, until
/// `handle` is cancelled. `run` decides how a single tick executes.
pub(crate) fn spawn_periodic<F, Fut>(
  runtime: &Handle,
  initial: Duration,
  period: Duration,
  handle: TaskHandle,
  mut run: F,
) where
  F: FnMut() -> Fut + Send + 'static,
  Fut: std::future::Future<Output = ()> + Send + 'static,
{
  runtime.spawn(async move {
    let start = tokio::time::Instant::now() + initial;
    let mut ticks = tokio::time::interval_at(start, period.max(Duration::from_micros(1)));
    loop {
      ticks.tick().await;
      if handle.is_cancelled() {
        break;
      }
      run().await;
    }
  });
}

// ==================== RuntimeScheduler ====================

/// A single worker or a fixed parallel pool backed by a tokio runtime.
pub struct RuntimeScheduler {
  runtime: LazyRuntime,
}

impl RuntimeScheduler {
  /// One dedicated worker thread: work is executed in submission order.
  pub fn single(name: impl Into<String>) -> Self {
    RuntimeScheduler { runtime: LazyRuntime::new(name.into(), PoolShape::Dedicated) }
  }

  /// A pool sized to the available CPU parallelism.
  pub fn parallel(name: impl Into<String>) -> Self {
    let parallelism = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    Self::parallel_with(name, parallelism)
  }

  pub fn parallel_with(name: impl Into<String>, parallelism: usize) -> Self {
    RuntimeScheduler { runtime: LazyRuntime::new(name.into(), PoolShape::Workers(parallelism)) }
  }
}

impl Scheduler for RuntimeScheduler {
  fn name(&self) -> &str { self.runtime.name() }

  fn schedule(&self, task: Task) -> Result<TaskHandle, SchedulerError> {
    let handle = TaskHandle::new();
    self.runtime.spawn(Box::new(handle.guard(task)))?;
    Ok(handle)
  }

  fn schedule_after(&self, delay: Duration, task: Task) -> Result<TaskHandle, SchedulerError> {
    let runtime = self.runtime.handle()?;
    let handle = TaskHandle::new();
    let task = handle.guard(task);
    runtime.spawn(async move {
      tokio::time::sleep(delay).await;
      task()
    });
    Ok(handle)
  }

  fn schedule_periodic(
    &self,
    initial: Duration,
    period: Duration,
    mut task: PeriodicTask,
  ) -> Result<TaskHandle, SchedulerError> {
    let runtime = self.runtime.handle()?;
    let handle = TaskHandle::new();
    spawn_periodic(&runtime, initial, period, handle.clone(), move || {
      task();
      std::future::ready(())
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
  fn single_runs_in_order_on_one_thread() {
    let scheduler = RuntimeScheduler::single("order-single");
    let (tx, rx) = mpsc::channel();
    for i in 0..5 {
      let tx = tx.clone();
      scheduler
        .schedule(Box::new(move || tx.send((i, std::thread::current().id())).unwrap()))
        .unwrap();
    }
    let got: Vec<_> = (0..5).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
    assert_eq!(got.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    assert!(got.iter().all(|(_, id)| *id == got[0].1));
    scheduler.dispose();
  }

  #[rxflow_macro::test]
  fn single_keeps_order_for_work_scheduled_from_a_task() {
    let scheduler = Arc::new(RuntimeScheduler::single("nested-single"));
    let (tx, rx) = mpsc::channel();
    let c_scheduler = scheduler.clone();
    scheduler
      .schedule(Box::new(move || {
        for i in 0..3 {
          let tx = tx.clone();
          c_scheduler.schedule(Box::new(move || tx.send(i).unwrap())).unwrap();
        }
      }))
      .unwrap();
    let got: Vec<_> = (0..3).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
    assert_eq!(got, vec![0, 1, 2]);
    scheduler.dispose();
  }

  #[rxflow_macro::test]
  fn single_survives_a_panicking_task() {
    let scheduler = RuntimeScheduler::single("panic-single");
    let (tx, rx) = mpsc::channel();
    scheduler.schedule(Box::new(|| panic!("task failure"))).unwrap();
    scheduler.schedule(Box::new(move || tx.send(()).unwrap())).unwrap();
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    scheduler.dispose();
  }

  #[rxflow_macro::test]
  fn disposed_scheduler_rejects_work() {
    let scheduler = RuntimeScheduler::parallel("disposed-parallel");
    scheduler.dispose();
    let err = scheduler.schedule(Box::new(|| {})).unwrap_err();
    assert!(matches!(err, SchedulerError::Disposed { .. }));
  }

  #[rxflow_macro::test]
  fn periodic_stops_when_cancelled() {
    let scheduler = RuntimeScheduler::single("periodic-single");
    let (tx, rx) = mpsc::channel();
    let mut count = 0;
    let handle = scheduler
      .schedule_periodic(
        Duration::from_millis(1),
        Duration::from_millis(1),
        Box::new(move || {
          count += 1;
          let _ = tx.send(count);
        }),
      )
      .unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
    handle.cancel();
    std::thread::sleep(Duration::from_millis(20));
    while rx.try_recv().is_ok() {}
    std::thread::sleep(Duration::from_millis(20));
    assert!(rx.try_recv().is_err());
    scheduler.dispose();
  }

  #[rxflow_macro::test]
  fn delayed_work_runs_later() {
    let scheduler = RuntimeScheduler::single("delay-single");
    let (tx, rx) = mpsc::channel();
    let start = std::time::Instant::now();
    scheduler
      .schedule_after(Duration::from_millis(10), Box::new(move || tx.send(()).unwrap()))
      .unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(10));
    scheduler.dispose();
  }
}
