//! Error recovery: observe, translate or replace a failed upstream.
//!
//! All operators here pass items and completion through untouched; they only
//! act on the error signal, and compose left to right.

use std::sync::Arc;

use crate::{
  error::FlowError,
  hooks,
  publisher::{just, Publisher},
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{SubscriptionArbiter, SubscriptionRef},
};

// ==================== do_on_error ====================

#[derive(Clone)]
pub struct DoOnError<S, F> {
  pub(crate) source: S,
  pub(crate) func: Arc<F>,
}

impl<S, F> Publisher for DoOnError<S, F>
where
  S: Publisher,
  F: Fn(&FlowError) + Send + Sync + 'static,
{
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    self.source.actual_subscribe(Box::new(DoOnErrorSubscriber {
      downstream: subscriber,
      func: self.func.clone(),
    }));
  }
}

pub struct DoOnErrorSubscriber<O, F> {
  downstream: O,
  func: Arc<F>,
}

impl<Item, O, F> Subscriber<Item> for DoOnErrorSubscriber<O, F>
where
  O: Subscriber<Item>,
  F: Fn(&FlowError),
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    self.downstream.on_subscribe(subscription)
  }

  fn on_next(&mut self, value: Item) { self.downstream.on_next(value) }

  fn on_error(&mut self, err: FlowError) {
    (self.func)(&err);
    self.downstream.on_error(err);
  }

  fn on_complete(&mut self) { self.downstream.on_complete() }
}

// ==================== on_error_map ====================

#[derive(Clone)]
pub struct OnErrorMap<S, F> {
  pub(crate) source: S,
  pub(crate) func: Arc<F>,
}

impl<S, F> Publisher for OnErrorMap<S, F>
where
  S: Publisher,
  F: Fn(FlowError) -> FlowError + Send + Sync + 'static,
{
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    self.source.actual_subscribe(Box::new(OnErrorMapSubscriber {
      downstream: subscriber,
      func: self.func.clone(),
    }));
  }
}

pub struct OnErrorMapSubscriber<O, F> {
  downstream: O,
  func: Arc<F>,
}

impl<Item, O, F> Subscriber<Item> for OnErrorMapSubscriber<O, F>
where
  O: Subscriber<Item>,
  F: Fn(FlowError) -> FlowError,
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    self.downstream.on_subscribe(subscription)
  }

  fn on_next(&mut self, value: Item) { self.downstream.on_next(value) }

  fn on_error(&mut self, err: FlowError) { self.downstream.on_error((self.func)(err)) }

  fn on_complete(&mut self) { self.downstream.on_complete() }
}

// ==================== on_error_resume ====================

/// Subscribes the replacement of a failed upstream to `subscriber`.
type Switch<T> = Arc<dyn Fn(FlowError, BoxedSubscriber<T>) + Send + Sync>;

pub struct OnErrorResume<S, F> {
  pub(crate) source: S,
  pub(crate) func: Arc<F>,
}

impl<S, F, P> Publisher for OnErrorResume<S, F>
where
  S: Publisher,
  F: Fn(FlowError) -> P + Send + Sync + 'static,
  P: Publisher<Item = S::Item>,
{
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    let func = self.func.clone();
    let switch: Switch<S::Item> =
      Arc::new(move |err: FlowError, subscriber: BoxedSubscriber<S::Item>| func(err).actual_subscribe(subscriber));
    self.source.actual_subscribe(Box::new(ResumeSubscriber::new(subscriber, switch)));
  }
}

// ==================== on_error_return ====================

pub struct OnErrorReturn<S, T> {
  pub(crate) source: S,
  pub(crate) value: T,
}

impl<S, T> Publisher for OnErrorReturn<S, T>
where
  S: Publisher<Item = T>,
  T: Clone + Send + Sync + 'static,
{
  type Item = T;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<T>) {
    let value = self.value.clone();
    let switch: Switch<T> =
      Arc::new(move |_: FlowError, subscriber: BoxedSubscriber<T>| just(value.clone()).actual_subscribe(subscriber));
    self.source.actual_subscribe(Box::new(ResumeSubscriber::new(subscriber, switch)));
  }
}

/// Subscribed first to the source, then, after an error, to the fallback.
/// Both subscriptions are exposed downstream through one arbiter.
struct ResumeSubscriber<T> {
  downstream: Option<BoxedSubscriber<T>>,
  switch: Option<Switch<T>>,
  arbiter: Arc<SubscriptionArbiter>,
  first: bool,
}

impl<T> ResumeSubscriber<T> {
  fn new(downstream: BoxedSubscriber<T>, switch: Switch<T>) -> Self {
    ResumeSubscriber {
      downstream: Some(downstream),
      switch: Some(switch),
      arbiter: Arc::new(SubscriptionArbiter::new()),
      first: true,
    }
  }
}

impl<T: Send + 'static> Subscriber<T> for ResumeSubscriber<T> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    self.arbiter.set(subscription);
    if self.first {
      if let Some(downstream) = self.downstream.as_mut() {
        downstream.on_subscribe(self.arbiter.clone());
      }
    }
  }

  fn on_next(&mut self, value: T) {
    match self.downstream.as_mut() {
      Some(downstream) => {
        self.arbiter.produced(1);
        downstream.on_next(value);
      }
      None => hooks::next_dropped("on_error_resume"),
    }
  }

  fn on_error(&mut self, err: FlowError) {
    match (self.switch.take(), self.downstream.take()) {
      (Some(switch), Some(downstream)) => {
        log::debug!("resuming after error: {err}");
        switch(
          err,
          Box::new(ResumeSubscriber {
            downstream: Some(downstream),
            switch: None,
            arbiter: self.arbiter.clone(),
            first: false,
          }),
        );
      }
      (_, Some(mut downstream)) => downstream.on_error(err),
      (_, None) => hooks::error_dropped(&err),
    }
  }

  fn on_complete(&mut self) {
    if let Some(mut downstream) = self.downstream.take() {
      downstream.on_complete();
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use thiserror::Error;

  use crate::{error::FlowError, prelude::*, test_subscriber::TestSubscriber};

  #[derive(Debug, Error)]
  #[error("business failure: {0}")]
  struct BusinessError(String);

  fn failing() -> impl Publisher<Item = i64> {
    publisher::range(1, 6).try_map(|i| {
      if i == 3 {
        Err(FlowError::msg("division by zero"))
      } else {
        Ok(10 / (i - 3))
      }
    })
  }

  #[rxflow_macro::test]
  fn map_error_to_business_error() {
    let observer = TestSubscriber::unbounded();
    failing()
      .on_error_map(|e| FlowError::new(BusinessError(e.to_string())))
      .subscribe_with(observer.clone());
    assert_eq!(observer.items(), vec![-5, -10]);
    let err = observer.error().unwrap();
    assert_eq!(err.downcast_ref::<BusinessError>().map(|b| b.0.as_str()), Some("division by zero"));
  }

  #[rxflow_macro::test]
  fn return_value_then_complete() {
    let observer = TestSubscriber::unbounded();
    failing().on_error_return(0).subscribe_with(observer.clone());
    assert_eq!(observer.items(), vec![-5, -10, 0]);
    assert!(observer.is_completed());
    observer.assert_no_violations();
  }

  #[rxflow_macro::test]
  fn return_value_respects_demand() {
    let observer = TestSubscriber::new();
    publisher::error::<i32>(FlowError::msg("boom")).on_error_return(42).subscribe_with(observer.clone());
    assert!(observer.items().is_empty());
    assert!(!observer.is_terminated());
    observer.request(1);
    assert_eq!(observer.items(), vec![42]);
    assert!(observer.is_completed());
  }

  #[rxflow_macro::test]
  fn resume_carries_outstanding_demand() {
    let observer = TestSubscriber::new();
    failing()
      .on_error_resume(|_| publisher::range(100, 10))
      .subscribe_with(observer.clone());
    observer.request(4);
    // two items from the source, two from the fallback
    assert_eq!(observer.items(), vec![-5, -10, 100, 101]);
    assert!(!observer.is_terminated());
    observer.request(1);
    assert_eq!(observer.items(), vec![-5, -10, 100, 101, 102]);
    observer.cancel();
    observer.assert_no_violations();
  }

  #[rxflow_macro::test]
  fn do_on_error_forwards_the_original() {
    let seen = Arc::new(Mutex::new(None));
    let c_seen = seen.clone();
    let observer = TestSubscriber::unbounded();
    failing()
      .do_on_error(move |e| *c_seen.lock().unwrap() = Some(e.to_string()))
      .subscribe_with(observer.clone());
    assert_eq!(seen.lock().unwrap().as_deref(), Some("division by zero"));
    assert_eq!(observer.error().map(|e| e.to_string()), Some("division by zero".to_owned()));
  }

  #[rxflow_macro::test]
  fn compose_left_to_right() {
    let observer = TestSubscriber::unbounded();
    failing()
      .on_error_map(|e| FlowError::new(BusinessError(e.to_string())))
      .on_error_resume(|e| {
        let recovered = e.downcast_ref::<BusinessError>().is_some();
        publisher::just(if recovered { 1 } else { -1 })
      })
      .subscribe_with(observer.clone());
    assert_eq!(observer.items(), vec![-5, -10, 1]);
    assert!(observer.is_completed());
  }

  #[rxflow_macro::test]
  fn resume_closure_infers_its_argument() {
    let observer = TestSubscriber::unbounded();
    failing()
      .on_error_resume(|e| publisher::just(e.to_string().len() as i64))
      .subscribe_with(observer.clone());
    assert_eq!(observer.items(), vec![-5, -10, 16]);
    assert!(observer.is_completed());
  }
}
