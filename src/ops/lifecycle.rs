//! Side-effect hooks that observe a pipeline without changing it.

use std::sync::Arc;

use crate::{
  error::FlowError,
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{Subscription, SubscriptionRef},
};

// ==================== do_on_next ====================

#[derive(Clone)]
pub struct DoOnNext<S, F> {
  pub(crate) source: S,
  pub(crate) func: Arc<F>,
}

impl<S, F> Publisher for DoOnNext<S, F>
where
  S: Publisher,
  F: Fn(&S::Item) + Send + Sync + 'static,
{
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    self
      .source
      .actual_subscribe(Box::new(DoOnNextSubscriber { downstream: subscriber, func: self.func.clone() }));
  }
}

pub struct DoOnNextSubscriber<O, F> {
  downstream: O,
  func: Arc<F>,
}

impl<Item, O, F> Subscriber<Item> for DoOnNextSubscriber<O, F>
where
  O: Subscriber<Item>,
  F: Fn(&Item),
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) { self.downstream.on_subscribe(subscription) }

  fn on_next(&mut self, value: Item) {
    (self.func)(&value);
    self.downstream.on_next(value);
  }

  fn on_error(&mut self, err: FlowError) { self.downstream.on_error(err) }

  fn on_complete(&mut self) { self.downstream.on_complete() }
}

// ==================== do_on_request ====================

#[derive(Clone)]
pub struct DoOnRequest<S, F> {
  pub(crate) source: S,
  pub(crate) func: Arc<F>,
}

impl<S, F> Publisher for DoOnRequest<S, F>
where
  S: Publisher,
  F: Fn(u64) + Send + Sync + 'static,
{
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    self
      .source
      .actual_subscribe(Box::new(DoOnRequestSubscriber { downstream: subscriber, func: self.func.clone() }));
  }
}

pub struct DoOnRequestSubscriber<O, F> {
  downstream: O,
  func: Arc<F>,
}

impl<Item, O, F> Subscriber<Item> for DoOnRequestSubscriber<O, F>
where
  O: Subscriber<Item>,
  F: Fn(u64) + Send + Sync + 'static,
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    self
      .downstream
      .on_subscribe(Arc::new(RequestHook { upstream: subscription, func: self.func.clone() }))
  }

  fn on_next(&mut self, value: Item) { self.downstream.on_next(value) }

  fn on_error(&mut self, err: FlowError) { self.downstream.on_error(err) }

  fn on_complete(&mut self) { self.downstream.on_complete() }
}

struct RequestHook<F> {
  upstream: SubscriptionRef,
  func: Arc<F>,
}

impl<F: Fn(u64) + Send + Sync> Subscription for RequestHook<F> {
  fn request(&self, n: u64) {
    (self.func)(n);
    self.upstream.request(n);
  }

  fn cancel(&self) { self.upstream.cancel() }
}
