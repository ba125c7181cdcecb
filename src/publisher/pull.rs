//! Demand-driven driver shared by the synchronous sources.
//!
//! A [`PullSource`] is asked for one item per unit of demand, on the thread
//! that issued the request. The driver owns the drain loop: it serializes
//! delivery, turns re-entrant `request`/`cancel` calls into extra loop
//! passes and releases the source once the sequence terminates.

use std::sync::{
  atomic::{AtomicBool, AtomicU64, Ordering},
  Arc, Mutex,
};

use crate::{
  error::{FlowError, ProtocolViolation},
  rc::lock,
  subscriber::{BoxedSubscriber, Downstream},
  subscription::{Demand, Subscription, WorkInProgress},
};

/// Outcome of one pull: an optional item, optionally followed by the end of
/// the sequence.
pub(crate) struct Pulled<T> {
  pub item: Option<T>,
  pub terminal: Option<Result<(), FlowError>>,
}

impl<T> Pulled<T> {
  pub fn item(v: T) -> Self { Pulled { item: Some(v), terminal: None } }

  pub fn last(v: T) -> Self { Pulled { item: Some(v), terminal: Some(Ok(())) } }

  pub fn done(result: Result<(), FlowError>) -> Self { Pulled { item: None, terminal: Some(result) } }

  /// Nothing available right now.
  pub fn pending() -> Self { Pulled { item: None, terminal: None } }
}

pub(crate) trait PullSource: Send + 'static {
  type Item: Send + 'static;

  /// Produce at most one item. Called only while downstream has demand.
  fn pull(&mut self) -> Pulled<Self::Item>;

  /// A terminal signal that can be delivered without any demand, e.g. the
  /// completion of an exhausted iterator.
  fn ready_terminal(&mut self) -> Option<Result<(), FlowError>> { None }

  /// Release resources; runs once, after a terminal signal or on cancel.
  fn terminate(&mut self) {}
}

/// Subscribe `subscriber` to a fresh `source`.
pub(crate) fn subscribe<S: PullSource>(
  source: S,
  mut subscriber: BoxedSubscriber<S::Item>,
  stage: &'static str,
) {
  let subscription = Arc::new(PullSubscription {
    demand: Demand::new(),
    wip: WorkInProgress::new(),
    cancelled: AtomicBool::new(false),
    bad_request: AtomicU64::new(0),
    state: Mutex::new(None),
  });
  // Own the loop while downstream is being subscribed, requests issued from
  // `on_subscribe` are served once the downstream is in place.
  let owner = subscription.wip.enter();
  subscriber.on_subscribe(subscription.clone());
  *lock(&subscription.state) =
    Some(PullState { source, downstream: Downstream::new(subscriber, stage) });
  if owner {
    subscription.wip.drain(|| subscription.pass());
  }
}

struct PullState<S: PullSource> {
  source: S,
  downstream: Downstream<S::Item>,
}

struct PullSubscription<S: PullSource> {
  demand: Demand,
  wip: WorkInProgress,
  cancelled: AtomicBool,
  bad_request: AtomicU64,
  state: Mutex<Option<PullState<S>>>,
}

impl<S: PullSource> PullSubscription<S> {
  fn pass(&self) {
    let mut guard = lock(&self.state);
    let Some(state) = guard.as_mut() else { return };

    let step = loop {
      if self.cancelled.load(Ordering::Acquire) {
        break Step::Cancelled;
      }
      if self.bad_request.swap(0, Ordering::AcqRel) > 0 {
        break Step::Terminal(Err(ProtocolViolation::NonPositiveRequest(0).into()));
      }
      if self.demand.get() == 0 {
        match state.source.ready_terminal() {
          Some(result) => break Step::Terminal(result),
          None => break Step::Idle,
        }
      }
      let Pulled { item, terminal } = state.source.pull();
      let pending = item.is_none() && terminal.is_none();
      if let Some(v) = item {
        self.demand.produced(1);
        state.downstream.on_next(v);
      }
      if let Some(result) = terminal {
        break Step::Terminal(result);
      }
      if pending {
        break Step::Idle;
      }
    };

    match step {
      Step::Idle => {}
      Step::Cancelled => {
        state.source.terminate();
        *guard = None;
      }
      Step::Terminal(result) => {
        if !self.cancelled.load(Ordering::Acquire) {
          state.downstream.terminate(result);
        }
        state.source.terminate();
        *guard = None;
      }
    }
  }
}

enum Step {
  Idle,
  Cancelled,
  Terminal(Result<(), FlowError>),
}

impl<S: PullSource> Subscription for PullSubscription<S> {
  fn request(&self, n: u64) {
    if n == 0 {
      self.bad_request.fetch_add(1, Ordering::AcqRel);
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
