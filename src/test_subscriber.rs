//! A recording subscriber for tests.
//!
//! [`TestSubscriber`] keeps every signal it receives, lets the test drive
//! demand by hand and flags protocol violations as they happen: items beyond
//! the requested amount, signals after a terminal one, a second terminal
//! signal and overlapping deliveries. Clones share the same recording, so a
//! test keeps one clone and subscribes the other.

use std::{
  fmt,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex, MutexGuard, PoisonError,
  },
  time::Duration,
};

use crate::{
  error::FlowError,
  rc::lock,
  subscriber::Subscriber,
  subscription::{SubscriptionRef, UNBOUNDED},
};

struct Recorded<T> {
  items: Vec<T>,
  terminal: Option<Result<(), FlowError>>,
  subscription: Option<SubscriptionRef>,
  initial_request: u64,
  outstanding: u64,
  violations: Vec<String>,
}

struct Inner<T> {
  recorded: Mutex<Recorded<T>>,
  signalled: Condvar,
  delivering: AtomicBool,
}

pub struct TestSubscriber<T> {
  inner: Arc<Inner<T>>,
}

impl<T> Clone for TestSubscriber<T> {
  fn clone(&self) -> Self { TestSubscriber { inner: self.inner.clone() } }
}

impl<T> Default for TestSubscriber<T> {
  fn default() -> Self { Self::with_request(0) }
}

impl<T> TestSubscriber<T> {
  /// Requests nothing until [`request`](Self::request) is called.
  pub fn new() -> Self { Self::default() }

  /// Requests unbounded demand when subscribed.
  pub fn unbounded() -> Self { Self::with_request(UNBOUNDED) }

  /// Requests `n` items when subscribed.
  pub fn with_request(n: u64) -> Self {
    TestSubscriber {
      inner: Arc::new(Inner {
        recorded: Mutex::new(Recorded {
          items: vec![],
          terminal: None,
          subscription: None,
          initial_request: n,
          outstanding: 0,
          violations: vec![],
        }),
        signalled: Condvar::new(),
        delivering: AtomicBool::new(false),
      }),
    }
  }

  fn recorded(&self) -> MutexGuard<'_, Recorded<T>> { lock(&self.inner.recorded) }

  /// Request `n` more items. Before subscription the demand is issued as
  /// soon as the subscription arrives.
  pub fn request(&self, n: u64) {
    let subscription = {
      let mut recorded = self.recorded();
      match recorded.subscription.clone() {
        Some(subscription) => {
          recorded.outstanding = add_demand(recorded.outstanding, n);
          subscription
        }
        None => {
          recorded.initial_request = add_demand(recorded.initial_request, n);
          return;
        }
      }
    };
    subscription.request(n);
  }

  pub fn cancel(&self) {
    let subscription = self.recorded().subscription.clone();
    if let Some(subscription) = subscription {
      subscription.cancel();
    }
  }

  pub fn error(&self) -> Option<FlowError> {
    match &self.recorded().terminal {
      Some(Err(err)) => Some(err.clone()),
      _ => None,
    }
  }

  pub fn is_completed(&self) -> bool { matches!(self.recorded().terminal, Some(Ok(()))) }

  pub fn is_terminated(&self) -> bool { self.recorded().terminal.is_some() }

  /// Block until a terminal signal arrived; `false` on timeout.
  pub fn await_terminal(&self, timeout: Duration) -> bool {
    self.wait_until(timeout, |recorded| recorded.terminal.is_some())
  }

  /// Block until `count` items arrived or the subscription terminated;
  /// `false` on timeout.
  pub fn await_count(&self, count: usize, timeout: Duration) -> bool {
    self.wait_until(timeout, |recorded| recorded.items.len() >= count || recorded.terminal.is_some())
  }

  fn wait_until(&self, timeout: Duration, done: impl Fn(&Recorded<T>) -> bool) -> bool {
    let recorded = self.recorded();
    let (recorded, _) = self
      .inner
      .signalled
      .wait_timeout_while(recorded, timeout, |recorded| !done(recorded))
      .unwrap_or_else(PoisonError::into_inner);
    done(&recorded)
  }

  pub fn violations(&self) -> Vec<String> { self.recorded().violations.clone() }

  #[track_caller]
  pub fn assert_no_violations(&self) {
    let violations = self.violations();
    assert!(violations.is_empty(), "protocol violations: {violations:?}");
  }

  fn record(&self, f: impl FnOnce(&mut Recorded<T>)) {
    if self.inner.delivering.swap(true, Ordering::AcqRel) {
      self.recorded().violations.push("overlapping signal delivery".to_owned());
    }
    {
      let mut recorded = self.recorded();
      f(&mut recorded);
    }
    self.inner.delivering.store(false, Ordering::Release);
    self.inner.signalled.notify_all();
  }
}

impl<T: Clone> TestSubscriber<T> {
  pub fn items(&self) -> Vec<T> { self.recorded().items.clone() }
}

fn add_demand(current: u64, n: u64) -> u64 { current.saturating_add(n) }

impl<T: Send + 'static> Subscriber<T> for TestSubscriber<T> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    let initial = {
      let mut recorded = self.recorded();
      if recorded.subscription.is_some() {
        recorded.violations.push("on_subscribe called twice".to_owned());
        drop(recorded);
        subscription.cancel();
        return;
      }
      recorded.subscription = Some(subscription.clone());
      let initial = std::mem::take(&mut recorded.initial_request);
      recorded.outstanding = initial;
      initial
    };
    if initial > 0 {
      subscription.request(initial);
    }
  }

  fn on_next(&mut self, value: T) {
    self.record(|recorded| {
      if recorded.terminal.is_some() {
        recorded.violations.push("item after terminal signal".to_owned());
      } else if recorded.outstanding == 0 {
        recorded.violations.push(format!("item #{} beyond requested demand", recorded.items.len() + 1));
      } else if recorded.outstanding != UNBOUNDED {
        recorded.outstanding -= 1;
      }
      recorded.items.push(value);
    });
  }

  fn on_error(&mut self, err: FlowError) {
    self.record(|recorded| match recorded.terminal {
      Some(_) => recorded.violations.push(format!("second terminal signal: error({err})")),
      None => recorded.terminal = Some(Err(err)),
    });
  }

  fn on_complete(&mut self) {
    self.record(|recorded| match recorded.terminal {
      Some(_) => recorded.violations.push("second terminal signal: complete".to_owned()),
      None => recorded.terminal = Some(Ok(())),
    });
  }
}

impl<T: fmt::Debug> fmt::Debug for TestSubscriber<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let recorded = self.recorded();
    f.debug_struct("TestSubscriber")
      .field("items", &recorded.items)
      .field("terminal", &recorded.terminal)
      .field("outstanding", &recorded.outstanding)
      .field("violations", &recorded.violations)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicU64;

  use super::*;
  use crate::subscription::Subscription;

  #[derive(Default)]
  struct Recorder(AtomicU64);

  impl Subscription for Recorder {
    fn request(&self, n: u64) { self.0.fetch_add(n, Ordering::SeqCst); }

    fn cancel(&self) {}
  }

  #[rxflow_macro::test]
  fn early_request_waits_for_subscription() {
    let observer = Arc::new(Recorder::default());
    let mut subscriber = TestSubscriber::<i32>::new();
    subscriber.request(2);
    subscriber.on_subscribe(observer.clone());
    assert_eq!(observer.0.load(Ordering::SeqCst), 2);
  }

  #[rxflow_macro::test]
  fn flags_items_beyond_demand_and_after_terminal() {
    let mut subscriber = TestSubscriber::with_request(1);
    subscriber.on_subscribe(Arc::new(Recorder::default()));
    subscriber.on_next(1);
    subscriber.on_next(2);
    subscriber.on_complete();
    subscriber.on_next(3);
    subscriber.on_error(FlowError::msg("late"));
    assert_eq!(subscriber.items(), vec![1, 2, 3]);
    assert!(subscriber.is_completed());
    assert_eq!(subscriber.violations().len(), 3);
  }
}
