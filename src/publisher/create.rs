use std::{
  collections::VecDeque,
  marker::PhantomData,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
  },
};

use super::Publisher;
use crate::{
  error::{FlowError, ProtocolViolation},
  hooks,
  rc::lock,
  subscriber::{BoxedSubscriber, Downstream},
  subscription::{Demand, Subscription, WorkInProgress},
};

/// What a push source does with items emitted beyond downstream demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowStrategy {
  /// Queue every item until it is requested.
  #[default]
  Buffer,
  /// Keep at most `capacity` pending items, dropping newer ones.
  DropLatest { capacity: usize },
  /// Fail with [`FlowError::Overflow`] once more than `capacity` items are
  /// pending.
  Error { capacity: usize },
}

/// Creates a push-based source with an unbounded buffer.
///
/// `emitter` runs once per subscription and receives a [`FluxSink`] that may
/// be cloned, moved to other threads and used at any later time.
///
/// ```
/// use rxflow::prelude::*;
///
/// let source = publisher::create(|sink: FluxSink<i32>| {
///   std::thread::spawn(move || {
///     for i in 0..3 {
///       sink.next(i);
///     }
///     sink.complete();
///   });
/// });
/// source.subscribe(|v| println!("{v}"));
/// ```
pub fn create<T, F>(emitter: F) -> Create<T, F>
where
  T: Send + 'static,
  F: Fn(FluxSink<T>) + Send + Sync + 'static,
{
  create_with(OverflowStrategy::Buffer, emitter)
}

/// Like [`create`], with an explicit [`OverflowStrategy`].
pub fn create_with<T, F>(strategy: OverflowStrategy, emitter: F) -> Create<T, F>
where
  T: Send + 'static,
  F: Fn(FluxSink<T>) + Send + Sync + 'static,
{
  Create { emitter, strategy, _marker: PhantomData }
}

pub struct Create<T, F> {
  emitter: F,
  strategy: OverflowStrategy,
  _marker: PhantomData<fn() -> T>,
}

impl<T, F> Publisher for Create<T, F>
where
  T: Send + 'static,
  F: Fn(FluxSink<T>) + Send + Sync + 'static,
{
  type Item = T;

  fn actual_subscribe(&self, mut subscriber: BoxedSubscriber<T>) {
    let shared = Arc::new(SinkShared {
      strategy: self.strategy,
      demand: Demand::new(),
      wip: WorkInProgress::new(),
      cancelled: AtomicBool::new(false),
      finished: AtomicBool::new(false),
      queue: Mutex::new(Pending::default()),
      downstream: Mutex::new(None),
    });
    let owner = shared.wip.enter();
    subscriber.on_subscribe(shared.clone());
    *lock(&shared.downstream) = Some(Downstream::new(subscriber, "create"));
    if owner {
      shared.wip.drain(|| shared.pass());
    }
    (self.emitter)(FluxSink(shared));
  }
}

/// Emission handle of a [`create`] source.
pub struct FluxSink<T>(Arc<SinkShared<T>>);

impl<T> Clone for FluxSink<T> {
  fn clone(&self) -> Self { FluxSink(self.0.clone()) }
}

impl<T: Send + 'static> FluxSink<T> {
  pub fn next(&self, value: T) {
    let shared = &self.0;
    {
      let mut pending = lock(&shared.queue);
      if shared.cancelled.load(Ordering::Acquire) {
        return;
      }
      if pending.terminal.is_some() || shared.finished.load(Ordering::Acquire) {
        drop(pending);
        hooks::next_dropped("create");
        return;
      }
      match shared.strategy {
        OverflowStrategy::DropLatest { capacity } if pending.items.len() >= capacity => {
          drop(pending);
          log::debug!("create sink dropped an item, {capacity} items pending");
          return;
        }
        OverflowStrategy::Error { capacity } if pending.items.len() >= capacity => {
          pending.items.clear();
          pending.terminal = Some(Err(FlowError::Overflow { capacity }));
        }
        _ => pending.items.push_back(value),
      }
    }
    shared.wip.run(|| shared.pass());
  }

  pub fn complete(&self) { self.terminate(Ok(())) }

  pub fn error(&self, err: FlowError) { self.terminate(Err(err)) }

  /// Register cleanup that runs once the subscription is cancelled or
  /// terminated. Runs right away if that already happened.
  pub fn on_dispose(&self, f: impl FnOnce() + Send + 'static) {
    let shared = &self.0;
    {
      let mut pending = lock(&shared.queue);
      if !pending.disposed {
        pending.disposers.push(Box::new(f));
        return;
      }
    }
    f()
  }

  /// Outstanding downstream demand.
  pub fn requested(&self) -> u64 { self.0.demand.get() }

  pub fn is_cancelled(&self) -> bool { self.0.cancelled.load(Ordering::Acquire) }

  fn terminate(&self, result: Result<(), FlowError>) {
    let shared = &self.0;
    {
      let mut pending = lock(&shared.queue);
      if pending.terminal.is_some() || shared.is_closed() {
        if let Err(err) = &result {
          hooks::error_dropped(err);
        }
        return;
      }
      pending.terminal = Some(result);
    }
    shared.wip.run(|| shared.pass());
  }
}

struct Pending<T> {
  items: VecDeque<T>,
  terminal: Option<Result<(), FlowError>>,
  bad_request: bool,
  disposed: bool,
  disposers: Vec<Box<dyn FnOnce() + Send>>,
}

impl<T> Default for Pending<T> {
  fn default() -> Self {
    Pending {
      items: VecDeque::new(),
      terminal: None,
      bad_request: false,
      disposed: false,
      disposers: vec![],
    }
  }
}

struct SinkShared<T> {
  strategy: OverflowStrategy,
  demand: Demand,
  wip: WorkInProgress,
  cancelled: AtomicBool,
  finished: AtomicBool,
  queue: Mutex<Pending<T>>,
  downstream: Mutex<Option<Downstream<T>>>,
}

enum Next<T> {
  Item(T),
  Terminal(Result<(), FlowError>),
  Idle,
}

impl<T> SinkShared<T> {
  fn is_closed(&self) -> bool {
    self.cancelled.load(Ordering::Acquire) || self.finished.load(Ordering::Acquire)
  }

  fn pass(&self) {
    let mut guard = lock(&self.downstream);
    let Some(downstream) = guard.as_mut() else { return };
    loop {
      if self.cancelled.load(Ordering::Acquire) {
        *guard = None;
        drop(guard);
        self.dispose();
        return;
      }
      let next = {
        let mut pending = lock(&self.queue);
        if std::mem::take(&mut pending.bad_request) {
          pending.items.clear();
          Next::Terminal(Err(ProtocolViolation::NonPositiveRequest(0).into()))
        } else if pending.items.is_empty() {
          pending.terminal.take().map_or(Next::Idle, Next::Terminal)
        } else if self.demand.get() > 0 {
          pending.items.pop_front().map_or(Next::Idle, Next::Item)
        } else {
          Next::Idle
        }
      };
      match next {
        Next::Item(v) => {
          self.demand.produced(1);
          downstream.on_next(v);
        }
        Next::Terminal(result) => {
          self.finished.store(true, Ordering::Release);
          downstream.terminate(result);
          *guard = None;
          drop(guard);
          self.dispose();
          return;
        }
        Next::Idle => return,
      }
    }
  }

  fn dispose(&self) {
    let disposers = {
      let mut pending = lock(&self.queue);
      pending.items.clear();
      pending.disposed = true;
      std::mem::take(&mut pending.disposers)
    };
    disposers.into_iter().for_each(|f| f());
  }
}

impl<T: Send> Subscription for SinkShared<T> {
  fn request(&self, n: u64) {
    if n == 0 {
      lock(&self.queue).bad_request = true;
    } else {
      self.demand.add(n);
    }
    self.wip.run(|| self.pass());
  }

  fn cancel(&self) {
    if !self.cancelled.swap(true, Ordering::AcqRel) {
      self.wip.run(|| self.pass());
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
  };

  use super::*;
  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[rxflow_macro::test]
  fn buffers_until_requested() {
    let observer = TestSubscriber::new();
    publisher::create(|sink| {
      for i in 0..5 {
        sink.next(i);
      }
      sink.complete();
    })
    .subscribe_with(observer.clone());

    assert!(observer.items().is_empty());
    observer.request(3);
    assert_eq!(observer.items(), vec![0, 1, 2]);
    assert!(!observer.is_terminated());
    observer.request(2);
    assert_eq!(observer.items(), vec![0, 1, 2, 3, 4]);
    assert!(observer.is_completed());
    observer.assert_no_violations();
  }

  #[rxflow_macro::test]
  fn emits_from_another_thread() {
    let observer = TestSubscriber::unbounded();
    publisher::create(|sink: FluxSink<i32>| {
      std::thread::spawn(move || {
        (0..100).for_each(|i| sink.next(i));
        sink.complete();
      });
    })
    .subscribe_with(observer.clone());
    assert!(observer.await_terminal(Duration::from_secs(5)));
    assert_eq!(observer.items(), (0..100).collect::<Vec<_>>());
    observer.assert_no_violations();
  }

  #[rxflow_macro::test]
  fn drop_latest_keeps_capacity() {
    let observer = TestSubscriber::new();
    publisher::create_with(OverflowStrategy::DropLatest { capacity: 2 }, |sink| {
      (0..5).for_each(|i| sink.next(i));
      sink.complete();
    })
    .subscribe_with(observer.clone());
    observer.request(10);
    assert_eq!(observer.items(), vec![0, 1]);
    assert!(observer.is_completed());
  }

  #[rxflow_macro::test]
  fn error_strategy_fails_on_overflow() {
    let observer = TestSubscriber::<i32>::new();
    publisher::create_with(OverflowStrategy::Error { capacity: 1 }, |sink| {
      (0..3).for_each(|i| sink.next(i));
    })
    .subscribe_with(observer.clone());
    assert!(observer.items().is_empty());
    assert!(matches!(observer.error(), Some(FlowError::Overflow { capacity: 1 })));
  }

  #[rxflow_macro::test]
  fn dispose_hook_runs_once_on_cancel() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let c_disposed = disposed.clone();
    let observer = TestSubscriber::<i32>::with_request(1);
    publisher::create(move |sink| {
      let c_disposed = c_disposed.clone();
      sink.on_dispose(move || {
        c_disposed.fetch_add(1, Ordering::SeqCst);
      });
      sink.next(1);
    })
    .subscribe_with(observer.clone());
    observer.cancel();
    observer.cancel();
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(observer.items(), vec![1]);
  }

  #[rxflow_macro::test]
  fn sink_reports_demand() {
    let seen = Arc::new(Mutex::new(None));
    let c_seen = seen.clone();
    publisher::create(move |sink: FluxSink<i32>| {
      *c_seen.lock().unwrap() = Some((sink.requested(), sink.is_cancelled()));
    })
    .subscribe_with(TestSubscriber::with_request(7));
    assert_eq!(*seen.lock().unwrap(), Some((7, false)));
  }
}
