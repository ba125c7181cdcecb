//! Pair the items of two publishers by position.
//!
//! Both sides are subscribed with a prefetch window; every emitted pair
//! replenishes one item on each side, so the faster side never buffers more
//! than its window. The pipeline completes once either side completed with
//! nothing left to pair, and the other side is then cancelled. An error on
//! either side cancels the other one.

use std::{
  collections::VecDeque,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
  },
};

use crate::{
  error::FlowError,
  hooks,
  publisher::Publisher,
  rc::lock,
  subscriber::{BoxedSubscriber, Downstream, Subscriber},
  subscription::{Demand, Subscription, SubscriptionRef, WorkInProgress},
};

const PREFETCH: u64 = 32;

/// Creates a publisher that pairs the items of `a` and `b`.
///
/// ```
/// use rxflow::prelude::*;
///
/// let letters = publisher::from_iter(vec!["a", "b", "c"]);
/// let counter = publisher::generate(|| 0, |n, sink| {
///   sink.next(n);
///   n + 1
/// });
/// publisher::zip(letters, counter).subscribe(|pair| println!("{pair:?}"));
/// ```
pub fn zip<A: Publisher, B: Publisher>(a: A, b: B) -> Zip<A, B> { Zip { a, b } }

pub struct Zip<A, B> {
  a: A,
  b: B,
}

impl<A: Publisher, B: Publisher> Publisher for Zip<A, B> {
  type Item = (A::Item, B::Item);

  fn actual_subscribe(&self, mut subscriber: BoxedSubscriber<Self::Item>) {
    let shared = Arc::new(ZipShared {
      demand: Demand::new(),
      wip: WorkInProgress::new(),
      cancelled: AtomicBool::new(false),
      state: Mutex::new(ZipState {
        left: VecDeque::new(),
        right: VecDeque::new(),
        left_done: false,
        right_done: false,
        error: None,
        failed: false,
      }),
      left: Mutex::new(None),
      right: Mutex::new(None),
      downstream: Mutex::new(None),
    });
    let owner = shared.wip.enter();
    subscriber.on_subscribe(shared.clone());
    *lock(&shared.downstream) = Some(Downstream::new(subscriber, "zip"));
    self.a.actual_subscribe(Box::new(LeftSubscriber(shared.clone())));
    self.b.actual_subscribe(Box::new(RightSubscriber(shared.clone())));
    if owner {
      shared.wip.drain(|| shared.pass());
    }
  }
}

#[derive(Clone, Copy)]
enum Side {
  Left,
  Right,
}

struct ZipState<A, B> {
  left: VecDeque<A>,
  right: VecDeque<B>,
  left_done: bool,
  right_done: bool,
  error: Option<FlowError>,
  failed: bool,
}

impl<A, B> ZipState<A, B> {
  /// A side that completed with an empty buffer can never pair again.
  fn exhausted(&self) -> bool {
    (self.left_done && self.left.is_empty()) || (self.right_done && self.right.is_empty())
  }
}

struct ZipShared<A, B> {
  demand: Demand,
  wip: WorkInProgress,
  cancelled: AtomicBool,
  state: Mutex<ZipState<A, B>>,
  left: Mutex<Option<SubscriptionRef>>,
  right: Mutex<Option<SubscriptionRef>>,
  downstream: Mutex<Option<Downstream<(A, B)>>>,
}

enum Next<T> {
  Pair(T),
  Error(FlowError),
  Complete,
  Idle,
}

impl<A: Send + 'static, B: Send + 'static> ZipShared<A, B> {
  fn drain(&self) { self.wip.run(|| self.pass()) }

  fn slot(&self, side: Side) -> &Mutex<Option<SubscriptionRef>> {
    match side {
      Side::Left => &self.left,
      Side::Right => &self.right,
    }
  }

  fn attach(&self, side: Side, subscription: SubscriptionRef) {
    if self.cancelled.load(Ordering::Acquire) || lock(&self.state).failed {
      subscription.cancel();
      return;
    }
    *lock(self.slot(side)) = Some(subscription.clone());
    subscription.request(PREFETCH);
  }

  fn cancel_both(&self) {
    for side in [Side::Left, Side::Right] {
      let subscription = lock(self.slot(side)).take();
      if let Some(subscription) = subscription {
        subscription.cancel();
      }
    }
  }

  fn replenish(&self) {
    for side in [Side::Left, Side::Right] {
      let subscription = lock(self.slot(side)).clone();
      if let Some(subscription) = subscription {
        subscription.request(1);
      }
    }
  }

  fn done(&self, side: Side) {
    lock(self.slot(side)).take();
    {
      let mut state = lock(&self.state);
      match side {
        Side::Left => state.left_done = true,
        Side::Right => state.right_done = true,
      }
    }
    self.drain();
  }

  /// `origin` already terminated and needs no cancel.
  fn fail(&self, origin: Option<Side>, err: FlowError) {
    if let Some(side) = origin {
      lock(self.slot(side)).take();
    }
    {
      let mut state = lock(&self.state);
      if state.failed || self.cancelled.load(Ordering::Acquire) {
        drop(state);
        hooks::error_dropped(&err);
        return;
      }
      state.failed = true;
      state.error = Some(err);
      state.left.clear();
      state.right.clear();
    }
    self.cancel_both();
    self.drain();
  }

  fn pass(&self) {
    let mut guard = lock(&self.downstream);
    let Some(downstream) = guard.as_mut() else { return };
    loop {
      if self.cancelled.load(Ordering::Acquire) {
        let mut state = lock(&self.state);
        state.left.clear();
        state.right.clear();
        drop(state);
        *guard = None;
        return;
      }
      let next = {
        let mut state = lock(&self.state);
        if let Some(err) = state.error.take() {
          Next::Error(err)
        } else if state.failed {
          Next::Idle
        } else if self.demand.get() > 0 && !state.left.is_empty() && !state.right.is_empty() {
          match (state.left.pop_front(), state.right.pop_front()) {
            (Some(a), Some(b)) => Next::Pair((a, b)),
            _ => Next::Idle,
          }
        } else if state.exhausted() {
          state.left.clear();
          state.right.clear();
          Next::Complete
        } else {
          Next::Idle
        }
      };
      match next {
        Next::Pair(pair) => {
          self.demand.produced(1);
          downstream.on_next(pair);
          self.replenish();
        }
        Next::Error(err) => {
          downstream.on_error(err);
          *guard = None;
          return;
        }
        Next::Complete => {
          self.cancel_both();
          downstream.on_complete();
          *guard = None;
          return;
        }
        Next::Idle => return,
      }
    }
  }
}

impl<A: Send + 'static, B: Send + 'static> Subscription for ZipShared<A, B> {
  fn request(&self, n: u64) {
    if n == 0 {
      self.fail(None, crate::error::ProtocolViolation::NonPositiveRequest(0).into());
      return;
    }
    self.demand.add(n);
    self.drain();
  }

  fn cancel(&self) {
    if !self.cancelled.swap(true, Ordering::AcqRel) {
      self.cancel_both();
      self.drain();
    }
  }
}

struct LeftSubscriber<A, B>(Arc<ZipShared<A, B>>);

impl<A: Send + 'static, B: Send + 'static> Subscriber<A> for LeftSubscriber<A, B> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) { self.0.attach(Side::Left, subscription) }

  fn on_next(&mut self, value: A) {
    lock(&self.0.state).left.push_back(value);
    self.0.drain();
  }

  fn on_error(&mut self, err: FlowError) { self.0.fail(Some(Side::Left), err) }

  fn on_complete(&mut self) { self.0.done(Side::Left) }
}

struct RightSubscriber<A, B>(Arc<ZipShared<A, B>>);

impl<A: Send + 'static, B: Send + 'static> Subscriber<B> for RightSubscriber<A, B> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) { self.0.attach(Side::Right, subscription) }

  fn on_next(&mut self, value: B) {
    lock(&self.0.state).right.push_back(value);
    self.0.drain();
  }

  fn on_error(&mut self, err: FlowError) { self.0.fail(Some(Side::Right), err) }

  fn on_complete(&mut self) { self.0.done(Side::Right) }
}
