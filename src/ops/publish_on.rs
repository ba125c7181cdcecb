//! Hand every signal over to a scheduler worker.
//!
//! Signals from upstream are queued and drained by one task at a time on the
//! scheduler, so downstream observes them serialized, in order, on a worker.
//! Requests pass through unchanged: the queue never holds more items than
//! downstream asked for.

use std::{
  collections::VecDeque,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
  },
};

use crate::{
  error::FlowError,
  publisher::Publisher,
  rc::lock,
  scheduler::SchedulerRef,
  signal::Signal,
  subscriber::{BoxedSubscriber, Downstream, Subscriber},
  subscription::{Subscription, SubscriptionRef, WorkInProgress},
};

pub struct PublishOn<S> {
  pub(crate) source: S,
  pub(crate) scheduler: SchedulerRef,
}

impl<S: Publisher> Publisher for PublishOn<S> {
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    let shared = Arc::new(PublishOnShared {
      scheduler: self.scheduler.clone(),
      wip: WorkInProgress::new(),
      cancelled: AtomicBool::new(false),
      queue: Mutex::new(Queue { signals: VecDeque::new(), rejected: None }),
      upstream: Mutex::new(None),
      downstream: Mutex::new(None),
    });
    self
      .source
      .actual_subscribe(Box::new(PublishOnSubscriber { shared, pending: Some(subscriber) }));
  }
}

struct Queue<T> {
  signals: VecDeque<Signal<T>>,
  rejected: Option<FlowError>,
}

struct PublishOnShared<T> {
  scheduler: SchedulerRef,
  wip: WorkInProgress,
  cancelled: AtomicBool,
  queue: Mutex<Queue<T>>,
  upstream: Mutex<Option<SubscriptionRef>>,
  downstream: Mutex<Option<Downstream<T>>>,
}

impl<T: Send + 'static> PublishOnShared<T> {
  fn push(self: &Arc<Self>, signal: Signal<T>) {
    if self.cancelled.load(Ordering::Acquire) {
      return;
    }
    lock(&self.queue).signals.push_back(signal);
    if self.wip.enter() {
      self.start_drain();
    }
  }

  /// Drain on a worker. The caller owns the loop.
  fn start_drain(self: &Arc<Self>) {
    let shared = self.clone();
    let scheduled = self.scheduler.schedule(Box::new(move || shared.wip.drain(|| shared.pass())));
    if let Err(err) = scheduled {
      log::warn!("publish_on could not reach `{}`: {err}", self.scheduler.name());
      lock(&self.queue).rejected = Some(err.into());
      let upstream = lock(&self.upstream).take();
      if let Some(upstream) = upstream {
        upstream.cancel();
      }
      self.wip.drain(|| self.pass());
    }
  }

  fn pass(&self) {
    let mut guard = lock(&self.downstream);
    let Some(downstream) = guard.as_mut() else { return };
    loop {
      if self.cancelled.load(Ordering::Acquire) {
        lock(&self.queue).signals.clear();
        *guard = None;
        return;
      }
      let signal = {
        let mut queue = lock(&self.queue);
        match queue.rejected.take() {
          Some(err) => {
            queue.signals.clear();
            Some(Signal::Error(err))
          }
          None => queue.signals.pop_front(),
        }
      };
      match signal {
        None => return,
        Some(Signal::Item(v)) => downstream.on_next(v),
        Some(Signal::Error(err)) => {
          downstream.on_error(err);
          *guard = None;
          return;
        }
        Some(Signal::Complete) => {
          downstream.on_complete();
          *guard = None;
          return;
        }
      }
    }
  }
}

impl<T: Send + 'static> Subscription for PublishOnShared<T> {
  fn request(&self, n: u64) {
    let upstream = lock(&self.upstream).clone();
    if let Some(upstream) = upstream {
      upstream.request(n);
    }
  }

  fn cancel(&self) {
    if self.cancelled.swap(true, Ordering::AcqRel) {
      return;
    }
    lock(&self.queue).signals.clear();
    let upstream = lock(&self.upstream).take();
    if let Some(upstream) = upstream {
      upstream.cancel();
    }
  }
}

struct PublishOnSubscriber<T> {
  shared: Arc<PublishOnShared<T>>,
  pending: Option<BoxedSubscriber<T>>,
}

impl<T: Send + 'static> Subscriber<T> for PublishOnSubscriber<T> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    let shared = &self.shared;
    *lock(&shared.upstream) = Some(subscription);
    let Some(mut subscriber) = self.pending.take() else { return };
    // Signals arriving while downstream is being subscribed wait for it.
    let owner = shared.wip.enter();
    subscriber.on_subscribe(shared.clone());
    *lock(&shared.downstream) = Some(Downstream::new(subscriber, "publish_on"));
    if owner {
      shared.start_drain();
    }
  }

  fn on_next(&mut self, value: T) { self.shared.push(Signal::Item(value)) }

  fn on_error(&mut self, err: FlowError) { self.shared.push(Signal::Error(err)) }

  fn on_complete(&mut self) { self.shared.push(Signal::Complete) }
}
