//! Map every item to a publisher and merge the inner publishers.
//!
//! Items of all active inner subscriptions are funneled through one queue and
//! delivered downstream only against downstream demand. Every inner gets
//! `prefetch` items of demand up front and one more per item delivered. An
//! inner keeps its concurrency slot until its queued items were delivered,
//! so with bounded concurrency the queue stays bounded as well.
//! The first error, from the outer source or any inner, cancels everything
//! else and is delivered right away; completion waits for the outer source
//! and every inner.

use std::{
  collections::{HashMap, VecDeque},
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
  subscription::{Demand, Subscription, SubscriptionRef, WorkInProgress, UNBOUNDED},
};

/// Tuning of [`flat_map_with`](crate::publisher::PublisherExt::flat_map_with).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatMapConfig {
  concurrency: usize,
  prefetch: u64,
}

impl Default for FlatMapConfig {
  fn default() -> Self { FlatMapConfig { concurrency: usize::MAX, prefetch: 32 } }
}

impl FlatMapConfig {
  pub fn new() -> Self { Self::default() }

  /// Maximum number of inner publishers subscribed at the same time.
  /// Unbounded by default.
  pub fn concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency.max(1);
    self
  }

  /// Demand issued to every inner publisher when it is subscribed.
  pub fn prefetch(mut self, prefetch: u64) -> Self {
    self.prefetch = prefetch.max(1);
    self
  }

  fn is_bounded(&self) -> bool { self.concurrency != usize::MAX }

  fn initial_request(&self) -> u64 {
    if self.is_bounded() {
      self.concurrency as u64
    } else {
      UNBOUNDED
    }
  }
}

pub struct FlatMap<S, F> {
  pub(crate) source: S,
  pub(crate) func: Arc<F>,
  pub(crate) config: FlatMapConfig,
}

impl<S, F, P> Publisher for FlatMap<S, F>
where
  S: Publisher,
  F: Fn(S::Item) -> P + Send + Sync + 'static,
  P: Publisher,
{
  type Item = P::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<P::Item>) {
    let shared = Arc::new(MergeShared {
      config: self.config,
      demand: Demand::new(),
      wip: WorkInProgress::new(),
      cancelled: AtomicBool::new(false),
      state: Mutex::new(MergeState::default()),
      upstream: Mutex::new(None),
      downstream: Mutex::new(None),
    });
    self.source.actual_subscribe(Box::new(OuterSubscriber {
      shared,
      func: self.func.clone(),
      pending: Some(subscriber),
    }));
  }
}

#[derive(Default)]
struct InnerSlot {
  subscription: Option<SubscriptionRef>,
  queued: usize,
  done: bool,
}

struct MergeState<T> {
  queue: VecDeque<(u64, T)>,
  inners: HashMap<u64, InnerSlot>,
  next_id: u64,
  active: usize,
  outer_done: bool,
  error: Option<FlowError>,
  failed: bool,
}

impl<T> Default for MergeState<T> {
  fn default() -> Self {
    MergeState {
      queue: VecDeque::new(),
      inners: HashMap::new(),
      next_id: 0,
      active: 0,
      outer_done: false,
      error: None,
      failed: false,
    }
  }
}

struct MergeShared<T> {
  config: FlatMapConfig,
  demand: Demand,
  wip: WorkInProgress,
  cancelled: AtomicBool,
  state: Mutex<MergeState<T>>,
  upstream: Mutex<Option<SubscriptionRef>>,
  downstream: Mutex<Option<Downstream<T>>>,
}

impl<T> MergeState<T> {
  /// Drop a finished inner; `true` when its slot should go to a new one.
  fn retire(&mut self, id: u64, config: &FlatMapConfig) -> bool {
    self.inners.remove(&id);
    self.active -= 1;
    config.is_bounded() && !self.outer_done && !self.failed
  }
}

enum Next<T> {
  Item(T, Option<SubscriptionRef>, bool),
  Error(FlowError),
  Complete,
  Idle,
}

impl<T: Send + 'static> MergeShared<T> {
  fn drain(&self) { self.wip.run(|| self.pass()) }

  fn pass(&self) {
    let mut guard = lock(&self.downstream);
    let Some(downstream) = guard.as_mut() else { return };
    loop {
      if self.cancelled.load(Ordering::Acquire) {
        lock(&self.state).queue.clear();
        *guard = None;
        return;
      }
      let next = {
        let mut state = lock(&self.state);
        if let Some(err) = state.error.take() {
          state.queue.clear();
          Next::Error(err)
        } else if state.failed {
          Next::Idle
        } else if state.queue.is_empty() {
          if state.outer_done && state.active == 0 {
            Next::Complete
          } else {
            Next::Idle
          }
        } else if self.demand.get() > 0 {
          match state.queue.pop_front() {
            Some((id, v)) => {
              let (inner, finished) = match state.inners.get_mut(&id) {
                Some(slot) => {
                  slot.queued -= 1;
                  (slot.subscription.clone(), slot.done && slot.queued == 0)
                }
                None => (None, false),
              };
              let replace = finished && state.retire(id, &self.config);
              Next::Item(v, inner, replace)
            }
            None => Next::Idle,
          }
        } else {
          Next::Idle
        }
      };
      match next {
        Next::Item(v, inner, replace) => {
          self.demand.produced(1);
          downstream.on_next(v);
          if let Some(inner) = inner {
            inner.request(1);
          }
          if replace {
            self.request_outer(1);
          }
        }
        Next::Error(err) => {
          downstream.on_error(err);
          *guard = None;
          return;
        }
        Next::Complete => {
          downstream.on_complete();
          *guard = None;
          return;
        }
        Next::Idle => return,
      }
    }
  }

  /// Record the first error and tear down every other subscription.
  fn fail(&self, err: FlowError) {
    let inners = {
      let mut state = lock(&self.state);
      if state.failed || self.cancelled.load(Ordering::Acquire) {
        drop(state);
        hooks::error_dropped(&err);
        return;
      }
      state.failed = true;
      state.error = Some(err);
      std::mem::take(&mut state.inners)
    };
    self.cancel_all(inners);
    self.drain();
  }

  fn cancel_all(&self, inners: HashMap<u64, InnerSlot>) {
    let upstream = lock(&self.upstream).take();
    if let Some(upstream) = upstream {
      upstream.cancel();
    }
    inners.into_values().filter_map(|slot| slot.subscription).for_each(|inner| inner.cancel());
  }

  fn request_outer(&self, n: u64) {
    let upstream = lock(&self.upstream).clone();
    if let Some(upstream) = upstream {
      upstream.request(n);
    }
  }
}

impl<T: Send + 'static> Subscription for MergeShared<T> {
  fn request(&self, n: u64) {
    if n == 0 {
      self.fail(crate::error::ProtocolViolation::NonPositiveRequest(0).into());
      return;
    }
    self.demand.add(n);
    self.drain();
  }

  fn cancel(&self) {
    if self.cancelled.swap(true, Ordering::AcqRel) {
      return;
    }
    let inners = std::mem::take(&mut lock(&self.state).inners);
    self.cancel_all(inners);
    self.drain();
  }
}

// ==================== Outer ====================

struct OuterSubscriber<T, F> {
  shared: Arc<MergeShared<T>>,
  func: Arc<F>,
  pending: Option<BoxedSubscriber<T>>,
}

impl<Item, T, F, P> Subscriber<Item> for OuterSubscriber<T, F>
where
  T: Send + 'static,
  F: Fn(Item) -> P,
  P: Publisher<Item = T>,
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    let shared = &self.shared;
    *lock(&shared.upstream) = Some(subscription.clone());
    let Some(mut subscriber) = self.pending.take() else { return };
    let owner = shared.wip.enter();
    subscriber.on_subscribe(shared.clone());
    *lock(&shared.downstream) = Some(Downstream::new(subscriber, "flat_map"));
    if owner {
      shared.wip.drain(|| shared.pass());
    }
    if !shared.cancelled.load(Ordering::Acquire) {
      subscription.request(shared.config.initial_request());
    }
  }

  fn on_next(&mut self, value: Item) {
    let shared = &self.shared;
    let id = {
      let mut state = lock(&shared.state);
      if state.failed || shared.cancelled.load(Ordering::Acquire) {
        return;
      }
      state.active += 1;
      state.next_id += 1;
      let id = state.next_id;
      state.inners.insert(id, InnerSlot::default());
      id
    };
    let inner = (self.func)(value);
    inner.actual_subscribe(Box::new(InnerSubscriber { shared: shared.clone(), id }));
  }

  fn on_error(&mut self, err: FlowError) {
    lock(&self.shared.upstream).take();
    self.shared.fail(err)
  }

  fn on_complete(&mut self) {
    lock(&self.shared.upstream).take();
    lock(&self.shared.state).outer_done = true;
    self.shared.drain();
  }
}

// ==================== Inner ====================

struct InnerSubscriber<T> {
  shared: Arc<MergeShared<T>>,
  id: u64,
}

impl<T: Send + 'static> Subscriber<T> for InnerSubscriber<T> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    let shared = &self.shared;
    {
      let mut state = lock(&shared.state);
      let live = !state.failed && !shared.cancelled.load(Ordering::Acquire);
      if let Some(slot) = state.inners.get_mut(&self.id).filter(|_| live) {
        slot.subscription = Some(subscription.clone());
        drop(state);
        subscription.request(shared.config.prefetch);
        return;
      }
    }
    subscription.cancel();
  }

  fn on_next(&mut self, value: T) {
    {
      let mut state = lock(&self.shared.state);
      let Some(slot) = state.inners.get_mut(&self.id) else { return };
      slot.queued += 1;
      state.queue.push_back((self.id, value));
    }
    self.shared.drain();
  }

  fn on_error(&mut self, err: FlowError) {
    lock(&self.shared.state).inners.remove(&self.id);
    self.shared.fail(err)
  }

  fn on_complete(&mut self) {
    let shared = &self.shared;
    let replace = {
      let mut state = lock(&shared.state);
      match state.inners.get(&self.id).map(|slot| slot.queued) {
        Some(0) => state.retire(self.id, &shared.config),
        Some(_) => {
          if let Some(slot) = state.inners.get_mut(&self.id) {
            slot.done = true;
            slot.subscription = None;
          }
          false
        }
        None => false,
      }
    };
    if replace {
      shared.request_outer(1);
    }
    shared.drain();
  }
}
