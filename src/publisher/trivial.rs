use std::{marker::PhantomData, sync::Arc};

use super::{
  pull::{self, PullSource, Pulled},
  Publisher,
};
use crate::{error::FlowError, subscriber::BoxedSubscriber};

/// Creates a publisher that completes immediately without emitting.
pub fn empty<T: Send + 'static>() -> Empty<T> { Empty(PhantomData) }

/// Creates a publisher that emits no items, just terminates with `err`.
pub fn error<T: Send + 'static>(err: FlowError) -> Fail<T> { Fail { err, _marker: PhantomData } }

/// Creates a publisher that never signals anything.
pub fn never<T: Send + 'static>() -> Never<T> { Never(PhantomData) }

/// Creates a publisher that calls `f` once per subscription, on the first
/// request, and emits its value or fails with its error.
pub fn from_callable<T, F>(f: F) -> FromCallable<F>
where
  F: Fn() -> Result<T, FlowError> + Send + Sync + 'static,
  T: Send + 'static,
{
  FromCallable(Arc::new(f))
}

pub struct Empty<T>(PhantomData<fn() -> T>);

impl<T: Send + 'static> Publisher for Empty<T> {
  type Item = T;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<T>) {
    pull::subscribe(TerminalSource::<T>(Some(Ok(())), PhantomData), subscriber, "empty");
  }
}

pub struct Fail<T> {
  err: FlowError,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> Publisher for Fail<T> {
  type Item = T;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<T>) {
    let source = TerminalSource::<T>(Some(Err(self.err.clone())), PhantomData);
    pull::subscribe(source, subscriber, "error");
  }
}

struct TerminalSource<T>(Option<Result<(), FlowError>>, PhantomData<fn() -> T>);

impl<T: Send + 'static> PullSource for TerminalSource<T> {
  type Item = T;

  fn pull(&mut self) -> Pulled<T> { Pulled::done(self.0.take().unwrap_or(Ok(()))) }

  fn ready_terminal(&mut self) -> Option<Result<(), FlowError>> { self.0.take() }
}

pub struct Never<T>(PhantomData<fn() -> T>);

impl<T: Send + 'static> Publisher for Never<T> {
  type Item = T;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<T>) {
    pull::subscribe(NeverSource::<T>(PhantomData), subscriber, "never");
  }
}

struct NeverSource<T>(PhantomData<fn() -> T>);

impl<T: Send + 'static> PullSource for NeverSource<T> {
  type Item = T;

  fn pull(&mut self) -> Pulled<T> { Pulled::pending() }
}

pub struct FromCallable<F>(Arc<F>);

impl<T, F> Publisher for FromCallable<F>
where
  F: Fn() -> Result<T, FlowError> + Send + Sync + 'static,
  T: Send + 'static,
{
  type Item = T;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<T>) {
    pull::subscribe(CallableSource(Some(self.0.clone())), subscriber, "from_callable");
  }
}

struct CallableSource<F>(Option<Arc<F>>);

impl<T, F> PullSource for CallableSource<F>
where
  F: Fn() -> Result<T, FlowError> + Send + Sync + 'static,
  T: Send + 'static,
{
  type Item = T;

  fn pull(&mut self) -> Pulled<T> {
    match self.0.take().map(|f| f()) {
      Some(Ok(v)) => Pulled::last(v),
      Some(Err(err)) => Pulled::done(Err(err)),
      None => Pulled::done(Ok(())),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;
  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[rxflow_macro::test]
  fn error_without_demand() {
    let observer = TestSubscriber::<i32>::new();
    publisher::error(FlowError::msg("error")).subscribe_with(observer.clone());
    assert!(observer.items().is_empty());
    assert_eq!(observer.error().map(|e| e.to_string()), Some("error".to_owned()));
  }

  #[rxflow_macro::test]
  fn empty_completes() {
    let observer = TestSubscriber::<()>::new();
    publisher::empty().subscribe_with(observer.clone());
    assert!(observer.is_completed());
  }

  #[rxflow_macro::test]
  fn never_stays_silent() {
    let observer = TestSubscriber::<i32>::unbounded();
    publisher::never().subscribe_with(observer.clone());
    assert!(!observer.is_terminated());
    assert!(observer.items().is_empty());
    observer.cancel();
  }

  #[rxflow_macro::test]
  fn callable_is_lazy_per_subscription() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c_calls = calls.clone();
    let source = publisher::from_callable(move || {
      Ok(c_calls.fetch_add(1, Ordering::SeqCst))
    });
    let observer = TestSubscriber::new();
    source.subscribe_with(observer.clone());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    observer.request(1);
    assert_eq!(observer.items(), vec![0]);
    assert!(observer.is_completed());

    let again = TestSubscriber::unbounded();
    source.subscribe_with(again.clone());
    assert_eq!(again.items(), vec![1]);
  }

  #[rxflow_macro::test]
  fn callable_error() {
    let observer = TestSubscriber::<i32>::unbounded();
    publisher::from_callable(|| Err(FlowError::msg("boom"))).subscribe_with(observer.clone());
    assert!(observer.error().is_some());
  }
}
