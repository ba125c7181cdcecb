//! Resubscribe to a failed source.
//!
//! ```
//! use std::sync::{
//!   atomic::{AtomicUsize, Ordering},
//!   Arc,
//! };
//!
//! use rxflow::{ops::retry::RetryConfig, prelude::*};
//!
//! let attempts = Arc::new(AtomicUsize::new(0));
//! let c_attempts = attempts.clone();
//! let flaky = publisher::from_callable(move || {
//!   if c_attempts.fetch_add(1, Ordering::SeqCst) < 2 {
//!     Err(FlowError::msg("flaky"))
//!   } else {
//!     Ok(1)
//!   }
//! });
//!
//! flaky
//!   .retry(RetryConfig::new().count(3).when(|e| e.to_string() == "flaky"))
//!   .subscribe(|v| assert_eq!(v, 1));
//! assert_eq!(attempts.load(Ordering::SeqCst), 3);
//! ```

use std::sync::{Arc, Mutex};

use crate::{
  error::FlowError,
  hooks,
  publisher::Publisher,
  rc::lock,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{SubscriptionArbiter, SubscriptionRef, WorkInProgress},
};

/// Decides whether a failed subscription is retried.
pub trait RetryPolicy: Send + Sync + 'static {
  /// `attempt` counts the retries already made.
  fn should_retry(&self, err: &FlowError, attempt: usize) -> bool;
}

/// Retry any error, at most this many times.
impl RetryPolicy for usize {
  fn should_retry(&self, _err: &FlowError, attempt: usize) -> bool { attempt < *self }
}

type RetryPredicate = Arc<dyn Fn(&FlowError) -> bool + Send + Sync>;

/// Retry policy with a retry budget and an optional error filter.
#[derive(Clone, Default)]
pub struct RetryConfig {
  count: usize,
  predicate: Option<RetryPredicate>,
}

impl RetryConfig {
  pub fn new() -> Self { Self::default() }

  /// Maximum number of retries.
  pub fn count(mut self, count: usize) -> Self {
    self.count = count;
    self
  }

  /// Retry only errors matching `predicate`.
  pub fn when(mut self, predicate: impl Fn(&FlowError) -> bool + Send + Sync + 'static) -> Self {
    self.predicate = Some(Arc::new(predicate));
    self
  }
}

impl RetryPolicy for RetryConfig {
  fn should_retry(&self, err: &FlowError, attempt: usize) -> bool {
    attempt < self.count && self.predicate.as_ref().map_or(true, |p| p(err))
  }
}

pub struct Retry<S, P> {
  pub(crate) source: Arc<S>,
  pub(crate) policy: Arc<P>,
}

impl<S, P> Publisher for Retry<S, P>
where
  S: Publisher,
  P: RetryPolicy,
{
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    let shared = Arc::new(RetryShared {
      source: self.source.clone(),
      policy: self.policy.clone(),
      arbiter: Arc::new(SubscriptionArbiter::new()),
      wip: WorkInProgress::new(),
      pending: Mutex::new(Some((subscriber, 0))),
    });
    shared.resubscribe();
  }
}

/// State shared by every attempt of one subscription.
///
/// A source failing synchronously reports its error from inside
/// `actual_subscribe`; the next attempt is parked in `pending` and started by
/// the loop owner once that call returned, so the stack does not grow with
/// the number of attempts.
struct RetryShared<S: Publisher, P> {
  source: Arc<S>,
  policy: Arc<P>,
  arbiter: Arc<SubscriptionArbiter>,
  wip: WorkInProgress,
  pending: Mutex<Option<(BoxedSubscriber<S::Item>, usize)>>,
}

impl<S, P> RetryShared<S, P>
where
  S: Publisher,
  P: RetryPolicy,
{
  fn resubscribe(self: &Arc<Self>) {
    self.wip.run(|| {
      let Some((downstream, attempt)) = lock(&self.pending).take() else { return };
      if attempt > 0 && self.arbiter.is_cancelled() {
        return;
      }
      self.source.actual_subscribe(Box::new(RetrySubscriber {
        shared: self.clone(),
        downstream: Some(downstream),
        attempt,
      }));
    })
  }
}

struct RetrySubscriber<S: Publisher, P> {
  shared: Arc<RetryShared<S, P>>,
  downstream: Option<BoxedSubscriber<S::Item>>,
  attempt: usize,
}

impl<S, P> Subscriber<S::Item> for RetrySubscriber<S, P>
where
  S: Publisher,
  P: RetryPolicy,
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    let arbiter = &self.shared.arbiter;
    if self.attempt == 0 {
      if let Some(downstream) = self.downstream.as_mut() {
        downstream.on_subscribe(arbiter.clone());
      }
    }
    arbiter.set(subscription);
  }

  fn on_next(&mut self, value: S::Item) {
    match self.downstream.as_mut() {
      Some(downstream) => {
        self.shared.arbiter.produced(1);
        downstream.on_next(value);
      }
      None => hooks::next_dropped("retry"),
    }
  }

  fn on_error(&mut self, err: FlowError) {
    let Some(mut downstream) = self.downstream.take() else {
      hooks::error_dropped(&err);
      return;
    };
    let shared = &self.shared;
    if shared.arbiter.is_cancelled() || !shared.policy.should_retry(&err, self.attempt) {
      shared.arbiter.release();
      downstream.on_error(err);
      return;
    }
    log::debug!("retrying after error (attempt {}): {err}", self.attempt + 1);
    *lock(&shared.pending) = Some((downstream, self.attempt + 1));
    shared.resubscribe();
  }

  fn on_complete(&mut self) {
    if let Some(mut downstream) = self.downstream.take() {
      self.shared.arbiter.release();
      downstream.on_complete();
    }
  }
}
