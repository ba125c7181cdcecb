//! Subscriber trait and the terminal-state bookkeeping shared by operators.
//!
//! A subscriber receives `on_subscribe` exactly once, then zero or more
//! `on_next` calls (never more than it requested), then at most one of
//! `on_error` / `on_complete`. Signals to one subscriber never overlap.

use std::sync::Arc;

use crate::{
  error::FlowError,
  hooks,
  subscription::{Disposable, Subscription, SubscriptionArbiter, SubscriptionRef, UNBOUNDED},
};

pub trait Subscriber<Item> {
  /// Receive the subscription. Nothing flows until demand is expressed
  /// through it.
  fn on_subscribe(&mut self, subscription: SubscriptionRef);

  fn on_next(&mut self, value: Item);

  fn on_error(&mut self, err: FlowError);

  fn on_complete(&mut self);
}

/// Type-erased subscriber as accepted by
/// [`Publisher::actual_subscribe`](crate::publisher::Publisher::actual_subscribe).
pub type BoxedSubscriber<Item> = Box<dyn Subscriber<Item> + Send>;

impl<Item, S> Subscriber<Item> for Box<S>
where
  S: Subscriber<Item> + ?Sized,
{
  #[inline]
  fn on_subscribe(&mut self, subscription: SubscriptionRef) { (**self).on_subscribe(subscription) }

  #[inline]
  fn on_next(&mut self, value: Item) { (**self).on_next(value) }

  #[inline]
  fn on_error(&mut self, err: FlowError) { (**self).on_error(err) }

  #[inline]
  fn on_complete(&mut self) { (**self).on_complete() }
}

// ==================== Downstream ====================

/// The downstream end of an operator.
///
/// Tracks whether a terminal signal was already forwarded and reroutes
/// anything arriving afterwards to the dropped-signal hooks, so no subscriber
/// ever observes a signal after its terminal one.
pub(crate) struct Downstream<Item> {
  actual: BoxedSubscriber<Item>,
  stage: &'static str,
  done: bool,
}

impl<Item> Downstream<Item> {
  pub fn new(actual: BoxedSubscriber<Item>, stage: &'static str) -> Self {
    Downstream { actual, stage, done: false }
  }

  #[inline]
  pub fn is_done(&self) -> bool { self.done }

  #[inline]
  pub fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    self.actual.on_subscribe(subscription)
  }

  pub fn on_next(&mut self, value: Item) {
    if self.done {
      hooks::next_dropped(self.stage);
    } else {
      self.actual.on_next(value);
    }
  }

  pub fn on_error(&mut self, err: FlowError) {
    if self.done {
      hooks::error_dropped(&err);
    } else {
      self.done = true;
      self.actual.on_error(err);
    }
  }

  pub fn on_complete(&mut self) {
    if !self.done {
      self.done = true;
      self.actual.on_complete();
    }
  }

  /// Forward a terminal outcome.
  pub fn terminate(&mut self, result: Result<(), FlowError>) {
    match result {
      Ok(()) => self.on_complete(),
      Err(err) => self.on_error(err),
    }
  }
}

// ==================== LambdaSubscriber ====================

/// Subscriber built from callbacks by the `subscribe*` family. Requests
/// unbounded demand as soon as it is subscribed.
pub struct LambdaSubscriber<N, E, C> {
  next: N,
  error: Option<E>,
  complete: Option<C>,
  handle: Arc<SubscriptionArbiter>,
  done: bool,
}

impl<N, E, C> LambdaSubscriber<N, E, C> {
  pub fn new(next: N, error: Option<E>, complete: Option<C>) -> Self {
    LambdaSubscriber {
      next,
      error,
      complete,
      handle: Arc::new(SubscriptionArbiter::new()),
      done: false,
    }
  }

  /// A handle able to cancel this subscriber's subscription.
  pub fn disposable(&self) -> Disposable { Disposable::new(self.handle.clone()) }
}

impl<Item, N, E, C> Subscriber<Item> for LambdaSubscriber<N, E, C>
where
  N: FnMut(Item),
  E: FnOnce(FlowError),
  C: FnOnce(),
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    self.handle.set(subscription);
    self.handle.request(UNBOUNDED);
  }

  fn on_next(&mut self, value: Item) {
    if self.done {
      hooks::next_dropped("subscribe");
    } else {
      (self.next)(value)
    }
  }

  fn on_error(&mut self, err: FlowError) {
    if self.done {
      hooks::error_dropped(&err);
      return;
    }
    self.done = true;
    self.handle.release();
    match self.error.take() {
      Some(error) => error(err),
      None => hooks::unhandled_error(&err),
    }
  }

  fn on_complete(&mut self) {
    if self.done {
      return;
    }
    self.done = true;
    self.handle.release();
    if let Some(complete) = self.complete.take() {
      complete();
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

  use super::*;

  #[derive(Default)]
  struct Recorder {
    requested: AtomicU64,
    cancelled: AtomicBool,
  }

  impl Subscription for Recorder {
    fn request(&self, n: u64) { self.requested.fetch_add(n, Ordering::SeqCst); }

    fn cancel(&self) { self.cancelled.store(true, Ordering::SeqCst); }
  }

  #[rxflow_macro::test]
  fn lambda_requests_unbounded_and_disposes() {
    let mut values = vec![];
    let observer = Arc::new(Recorder::default());
    {
      let mut subscriber =
        LambdaSubscriber::new(|v: i32| values.push(v), None::<fn(FlowError)>, None::<fn()>);
      let disposable = subscriber.disposable();
      subscriber.on_subscribe(observer.clone());
      assert_eq!(observer.requested.load(Ordering::SeqCst), UNBOUNDED);
      subscriber.on_next(1);
      subscriber.on_next(2);
      disposable.dispose();
      assert!(disposable.is_disposed());
    }
    assert!(observer.cancelled.load(Ordering::SeqCst));
    assert_eq!(values, vec![1, 2]);
  }

  #[rxflow_macro::test]
  fn lambda_terminates_once() {
    let mut errors = 0;
    let mut completes = 0;
    {
      let mut subscriber = LambdaSubscriber::new(
        |_: i32| {},
        Some(|_: FlowError| errors += 1),
        Some(|| completes += 1),
      );
      let disposable = subscriber.disposable();
      subscriber.on_subscribe(Arc::new(Recorder::default()));
      subscriber.on_error(FlowError::msg("first"));
      subscriber.on_complete();
      subscriber.on_error(FlowError::msg("second"));
      assert!(disposable.is_disposed());
    }
    assert_eq!(errors, 1);
    assert_eq!(completes, 0);
  }

  #[rxflow_macro::test]
  fn downstream_drops_after_terminal() {
    struct Count(Arc<AtomicU64>);
    impl Subscriber<i32> for Count {
      fn on_subscribe(&mut self, _: SubscriptionRef) {}
      fn on_next(&mut self, _: i32) { self.0.fetch_add(1, Ordering::SeqCst); }
      fn on_error(&mut self, _: FlowError) { self.0.fetch_add(100, Ordering::SeqCst); }
      fn on_complete(&mut self) { self.0.fetch_add(1_000, Ordering::SeqCst); }
    }

    let seen = Arc::new(AtomicU64::new(0));
    let mut downstream = Downstream::new(Box::new(Count(seen.clone())), "test");
    downstream.on_next(1);
    downstream.on_complete();
    downstream.on_next(2);
    downstream.on_error(FlowError::msg("late"));
    downstream.on_complete();
    assert!(downstream.is_done());
    assert_eq!(seen.load(Ordering::SeqCst), 1_001);
  }
}
