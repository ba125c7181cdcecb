use std::sync::Arc;

use crate::{
  error::FlowError,
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Downstream, Subscriber},
  subscription::{Subscription, SubscriptionRef},
};

#[derive(Clone)]
pub struct Map<S, F> {
  pub(crate) source: S,
  pub(crate) func: Arc<F>,
}

impl<S, F, U> Publisher for Map<S, F>
where
  S: Publisher,
  F: Fn(S::Item) -> U + Send + Sync + 'static,
  U: Send + 'static,
{
  type Item = U;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<U>) {
    self
      .source
      .actual_subscribe(Box::new(MapSubscriber { downstream: subscriber, func: self.func.clone() }));
  }
}

pub struct MapSubscriber<O, F> {
  downstream: O,
  func: Arc<F>,
}

impl<Item, U, O, F> Subscriber<Item> for MapSubscriber<O, F>
where
  O: Subscriber<U>,
  F: Fn(Item) -> U,
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) { self.downstream.on_subscribe(subscription) }

  fn on_next(&mut self, value: Item) { self.downstream.on_next((self.func)(value)) }

  fn on_error(&mut self, err: FlowError) { self.downstream.on_error(err) }

  fn on_complete(&mut self) { self.downstream.on_complete() }
}

#[derive(Clone)]
pub struct TryMap<S, F> {
  pub(crate) source: S,
  pub(crate) func: Arc<F>,
}

impl<S, F, U> Publisher for TryMap<S, F>
where
  S: Publisher,
  F: Fn(S::Item) -> Result<U, FlowError> + Send + Sync + 'static,
  U: Send + 'static,
{
  type Item = U;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<U>) {
    self.source.actual_subscribe(Box::new(TryMapSubscriber {
      downstream: Downstream::new(subscriber, "try_map"),
      func: self.func.clone(),
      upstream: None,
    }));
  }
}

struct TryMapSubscriber<U, F> {
  downstream: Downstream<U>,
  func: Arc<F>,
  upstream: Option<SubscriptionRef>,
}

impl<Item, U, F> Subscriber<Item> for TryMapSubscriber<U, F>
where
  F: Fn(Item) -> Result<U, FlowError>,
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    self.upstream = Some(subscription.clone());
    self.downstream.on_subscribe(subscription);
  }

  fn on_next(&mut self, value: Item) {
    if self.downstream.is_done() {
      return;
    }
    match (self.func)(value) {
      Ok(v) => self.downstream.on_next(v),
      Err(err) => {
        if let Some(upstream) = self.upstream.take() {
          upstream.cancel();
        }
        self.downstream.on_error(err);
      }
    }
  }

  fn on_error(&mut self, err: FlowError) { self.downstream.on_error(err) }

  fn on_complete(&mut self) { self.downstream.on_complete() }
}

#[cfg(test)]
mod tests {
  use crate::{error::FlowError, prelude::*, test_subscriber::TestSubscriber};

  #[rxflow_macro::test]
  fn squares() {
    let observer = TestSubscriber::unbounded();
    publisher::range(1, 6).map(|i| i * i).subscribe_with(observer.clone());
    assert_eq!(observer.items(), vec![1, 4, 9, 16, 25, 36]);
    assert!(observer.is_completed());
  }

  #[rxflow_macro::test]
  fn map_types_mixed() {
    let observer = TestSubscriber::unbounded();
    publisher::from_iter(vec!['a', 'b', 'c'])
      .map(|c| c as u32 - 'a' as u32)
      .subscribe_with(observer.clone());
    assert_eq!(observer.items(), vec![0, 1, 2]);
  }

  #[rxflow_macro::test]
  fn demand_passes_through() {
    let observer = TestSubscriber::new();
    publisher::range(0, 100).map(|v| v + 1).subscribe_with(observer.clone());
    observer.request(3);
    assert_eq!(observer.items(), vec![1, 2, 3]);
    observer.assert_no_violations();
  }

  #[rxflow_macro::test]
  fn try_map_failure_cancels_upstream() {
    let observer = TestSubscriber::unbounded();
    publisher::range(1, 6)
      .try_map(|i| if i == 3 { Err(FlowError::msg("three")) } else { Ok(i) })
      .subscribe_with(observer.clone());
    assert_eq!(observer.items(), vec![1, 2]);
    assert_eq!(observer.error().map(|e| e.to_string()), Some("three".to_owned()));
    observer.assert_no_violations();
  }
}
