//! Publishers: repeatable descriptions of a stream of items.
//!
//! A [`Publisher`] does nothing until it is subscribed. Every subscription
//! builds its own chain of operator subscribers, top-down, until the
//! innermost source hands a [`Subscription`](crate::subscription::Subscription)
//! to its subscriber. Demand then travels upstream and items, errors and
//! completion travel downstream.
//!
//! [`PublisherExt`] provides the operator and consumption methods available
//! on every publisher.

use std::{borrow::Cow, sync::Arc, time::Duration};

use crate::{
  error::FlowError,
  ops::{
    checkpoint::Checkpoint,
    delay::DelayElements,
    filter::Filter,
    flat_map::{FlatMap, FlatMapConfig},
    handle::Handle,
    into_stream::PublisherStream,
    lifecycle::{DoOnNext, DoOnRequest},
    map::{Map, TryMap},
    on_error::{DoOnError, OnErrorMap, OnErrorResume, OnErrorReturn},
    publish_on::PublishOn,
    retry::{Retry, RetryPolicy},
    signal_log::Log,
    subscribe_on::SubscribeOn,
    take::Take,
    zip::Zip,
  },
  scheduler::SchedulerRef,
  sink::SynchronousSink,
  subscriber::{BoxedSubscriber, LambdaSubscriber, Subscriber},
  subscription::Disposable,
};

mod create;
mod from_iter;
mod generate;
mod interval;
pub(crate) mod pull;
mod trivial;

pub use create::{create, create_with, Create, FluxSink, OverflowStrategy};
pub use from_iter::{from_iter, just, range, FromIter, Just, Range};
pub use generate::{generate, Generate};
pub use interval::{interval, Interval};
pub use trivial::{empty, error, from_callable, never, Empty, Fail, FromCallable, Never};

pub use crate::ops::zip::zip;

pub trait Publisher: Send + Sync + 'static {
  type Item: Send + 'static;

  /// Wire `subscriber` to a new, independent subscription of this
  /// publisher. `on_subscribe` is called before any other signal.
  fn actual_subscribe(&self, subscriber: BoxedSubscriber<Self::Item>);
}

/// Type-erased, cheaply clonable publisher.
pub type BoxedPublisher<T> = Arc<dyn Publisher<Item = T>>;

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
  type Item = P::Item;

  #[inline]
  fn actual_subscribe(&self, subscriber: BoxedSubscriber<Self::Item>) {
    (**self).actual_subscribe(subscriber)
  }
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
  type Item = P::Item;

  #[inline]
  fn actual_subscribe(&self, subscriber: BoxedSubscriber<Self::Item>) {
    (**self).actual_subscribe(subscriber)
  }
}

pub trait PublisherExt: Publisher + Sized {
  // ==================== Transformation ====================

  /// Transform every item with `f`. Demand passes through unchanged.
  fn map<U, F>(self, f: F) -> Map<Self, F>
  where
    F: Fn(Self::Item) -> U + Send + Sync + 'static,
    U: Send + 'static,
  {
    Map { source: self, func: Arc::new(f) }
  }

  /// Transform every item with a fallible `f`. The first `Err` is forwarded
  /// downstream and cancels upstream.
  fn try_map<U, F>(self, f: F) -> TryMap<Self, F>
  where
    F: Fn(Self::Item) -> Result<U, FlowError> + Send + Sync + 'static,
    U: Send + 'static,
  {
    TryMap { source: self, func: Arc::new(f) }
  }

  /// Keep the items matching `predicate`. Every dropped item is replaced by
  /// a request for one more upstream item.
  fn filter<F>(self, predicate: F) -> Filter<Self, F>
  where
    F: Fn(&Self::Item) -> bool + Send + Sync + 'static,
  {
    Filter { source: self, predicate: Arc::new(predicate) }
  }

  /// Map, filter and terminate in one callback: `f` may emit at most one
  /// item per upstream item, and may complete or fail the sequence.
  fn handle<U, F>(self, f: F) -> Handle<Self, F, U>
  where
    F: Fn(Self::Item, &mut SynchronousSink<U>) + Send + Sync + 'static,
    U: Send + 'static,
  {
    Handle::new(self, f)
  }

  /// Subscribe to `f(item)` for every item and merge the inner publishers
  /// into one stream, without ordering guarantees across inners.
  fn flat_map<P, F>(self, f: F) -> FlatMap<Self, F>
  where
    F: Fn(Self::Item) -> P + Send + Sync + 'static,
    P: Publisher,
  {
    self.flat_map_with(f, FlatMapConfig::default())
  }

  /// [`flat_map`](PublisherExt::flat_map) with bounded concurrency and
  /// per-inner prefetch.
  fn flat_map_with<P, F>(self, f: F, config: FlatMapConfig) -> FlatMap<Self, F>
  where
    F: Fn(Self::Item) -> P + Send + Sync + 'static,
    P: Publisher,
  {
    FlatMap { source: self, func: Arc::new(f), config }
  }

  /// Pair items of `self` and `other` by index.
  fn zip<B: Publisher>(self, other: B) -> Zip<Self, B> { zip(self, other) }

  /// Emit the first `count` items, then cancel upstream and complete.
  fn take(self, count: u64) -> Take<Self> { Take { source: self, count } }

  // ==================== Side effects ====================

  fn do_on_next<F>(self, f: F) -> DoOnNext<Self, F>
  where
    F: Fn(&Self::Item) + Send + Sync + 'static,
  {
    DoOnNext { source: self, func: Arc::new(f) }
  }

  /// Observe every request issued by downstream.
  fn do_on_request<F>(self, f: F) -> DoOnRequest<Self, F>
  where
    F: Fn(u64) + Send + Sync + 'static,
  {
    DoOnRequest { source: self, func: Arc::new(f) }
  }

  /// Log every signal and request at `info` level under `category`.
  fn log(self, category: impl Into<Cow<'static, str>>) -> Log<Self> {
    Log { source: self, category: category.into() }
  }

  /// Label errors crossing this point; see [`FlowError::checkpoints`].
  fn checkpoint(self, label: impl Into<Cow<'static, str>>) -> Checkpoint<Self> {
    Checkpoint { source: self, label: label.into() }
  }

  // ==================== Error recovery ====================

  /// Call `f` with the error, then forward it untouched.
  fn do_on_error<F>(self, f: F) -> DoOnError<Self, F>
  where
    F: Fn(&FlowError) + Send + Sync + 'static,
  {
    DoOnError { source: self, func: Arc::new(f) }
  }

  /// Replace the error by `f(err)`.
  fn on_error_map<F>(self, f: F) -> OnErrorMap<Self, F>
  where
    F: Fn(FlowError) -> FlowError + Send + Sync + 'static,
  {
    OnErrorMap { source: self, func: Arc::new(f) }
  }

  /// On error, emit `value` once downstream requests it, then complete.
  fn on_error_return(self, value: Self::Item) -> OnErrorReturn<Self, Self::Item>
  where
    Self::Item: Clone + Sync,
  {
    OnErrorReturn { source: self, value }
  }

  /// On error, continue with the publisher returned by `f`, carrying over
  /// outstanding demand.
  fn on_error_resume<P, F>(self, f: F) -> OnErrorResume<Self, F>
  where
    F: Fn(FlowError) -> P + Send + Sync + 'static,
    P: Publisher<Item = Self::Item>,
  {
    OnErrorResume { source: self, func: Arc::new(f) }
  }

  /// Resubscribe on error while `policy` allows it. A plain `usize` retries
  /// any error that many times; see [`RetryConfig`](crate::ops::retry::RetryConfig).
  fn retry<P: RetryPolicy>(self, policy: P) -> Retry<Self, P> {
    Retry { source: Arc::new(self), policy: Arc::new(policy) }
  }

  // ==================== Scheduling ====================

  /// Subscribe to the source, and issue demand to it, on `scheduler`.
  fn subscribe_on(self, scheduler: SchedulerRef) -> SubscribeOn<Self> {
    SubscribeOn { source: Arc::new(self), scheduler }
  }

  /// Deliver every downstream signal on `scheduler`.
  fn publish_on(self, scheduler: SchedulerRef) -> PublishOn<Self> {
    PublishOn { source: self, scheduler }
  }

  /// Delay every item by `delay`, timed by `scheduler`. Items are requested
  /// from upstream one at a time.
  fn delay_elements(self, delay: Duration, scheduler: SchedulerRef) -> DelayElements<Self> {
    DelayElements { source: self, delay, scheduler }
  }

  // ==================== Conversion ====================

  fn boxed(self) -> BoxedPublisher<Self::Item> { Arc::new(self) }

  /// Bridge to `futures::Stream`, requesting one item per poll.
  fn into_stream(self) -> PublisherStream<Self::Item> { PublisherStream::new(&self) }

  // ==================== Consumption ====================

  /// Subscribe with an item callback, requesting unbounded demand. Errors
  /// go to the unhandled-error hook.
  fn subscribe<N>(&self, next: N) -> Disposable
  where
    N: FnMut(Self::Item) + Send + 'static,
  {
    self.subscribe_lambda(LambdaSubscriber::new(next, None::<fn(FlowError)>, None::<fn()>))
  }

  fn subscribe_all<N, E, C>(&self, next: N, error: E, complete: C) -> Disposable
  where
    N: FnMut(Self::Item) + Send + 'static,
    E: FnOnce(FlowError) + Send + 'static,
    C: FnOnce() + Send + 'static,
  {
    self.subscribe_lambda(LambdaSubscriber::new(next, Some(error), Some(complete)))
  }

  #[doc(hidden)]
  fn subscribe_lambda<N, E, C>(&self, subscriber: LambdaSubscriber<N, E, C>) -> Disposable
  where
    N: FnMut(Self::Item) + Send + 'static,
    E: FnOnce(FlowError) + Send + 'static,
    C: FnOnce() + Send + 'static,
  {
    let disposable = subscriber.disposable();
    self.actual_subscribe(Box::new(subscriber));
    disposable
  }

  /// Subscribe a custom subscriber, which controls demand itself.
  fn subscribe_with<S>(&self, subscriber: S)
  where
    S: Subscriber<Self::Item> + Send + 'static,
  {
    self.actual_subscribe(Box::new(subscriber))
  }
}

impl<P: Publisher> PublisherExt for P {}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[rxflow_macro::test]
  fn boxed_publishers_are_interchangeable() {
    let sources: Vec<BoxedPublisher<i64>> =
      vec![publisher::range(1, 2).boxed(), publisher::just(7).map(|v| v * 2).boxed()];
    let items: Vec<_> = sources
      .iter()
      .flat_map(|source| {
        let observer = TestSubscriber::unbounded();
        source.subscribe_with(observer.clone());
        observer.items()
      })
      .collect();
    assert_eq!(items, vec![1, 2, 14]);
  }

  #[rxflow_macro::test]
  fn subscribe_all_reports_terminal() {
    let log = Arc::new(Mutex::new(vec![]));
    let (c_next, c_err, c_complete) = (log.clone(), log.clone(), log.clone());
    publisher::range(1, 2).subscribe_all(
      move |v| c_next.lock().unwrap().push(format!("next {v}")),
      move |e| c_err.lock().unwrap().push(format!("error {e}")),
      move || c_complete.lock().unwrap().push("complete".to_owned()),
    );
    assert_eq!(*log.lock().unwrap(), vec!["next 1", "next 2", "complete"]);
  }

  #[rxflow_macro::test]
  fn cancel_from_on_next_stops_an_infinite_source() {
    struct CancelAt {
      at: i32,
      seen: Arc<Mutex<Vec<i32>>>,
      subscription: Option<SubscriptionRef>,
    }

    impl Subscriber<i32> for CancelAt {
      fn on_subscribe(&mut self, subscription: SubscriptionRef) {
        subscription.request(UNBOUNDED);
        self.subscription = Some(subscription);
      }

      fn on_next(&mut self, value: i32) {
        self.seen.lock().unwrap().push(value);
        if value == self.at {
          if let Some(s) = &self.subscription {
            s.cancel();
          }
        }
      }

      fn on_error(&mut self, _: FlowError) {}

      fn on_complete(&mut self) {}
    }

    let seen = Arc::new(Mutex::new(vec![]));
    publisher::generate(
      || 0,
      |n, sink| {
        sink.next(n);
        n + 1
      },
    )
    .subscribe_with(CancelAt { at: 2, seen: seen.clone(), subscription: None });
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
  }
}
