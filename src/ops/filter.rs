use std::sync::Arc;

use crate::{
  error::FlowError,
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{Subscription, SubscriptionRef},
};

#[derive(Clone)]
pub struct Filter<S, F> {
  pub(crate) source: S,
  pub(crate) predicate: Arc<F>,
}

impl<S, F> Publisher for Filter<S, F>
where
  S: Publisher,
  F: Fn(&S::Item) -> bool + Send + Sync + 'static,
{
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    self.source.actual_subscribe(Box::new(FilterSubscriber {
      downstream: subscriber,
      predicate: self.predicate.clone(),
      upstream: None,
    }));
  }
}

pub struct FilterSubscriber<O, F> {
  downstream: O,
  predicate: Arc<F>,
  upstream: Option<SubscriptionRef>,
}

impl<Item, O, F> Subscriber<Item> for FilterSubscriber<O, F>
where
  O: Subscriber<Item>,
  F: Fn(&Item) -> bool,
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    self.upstream = Some(subscription.clone());
    self.downstream.on_subscribe(subscription);
  }

  fn on_next(&mut self, value: Item) {
    if (self.predicate)(&value) {
      self.downstream.on_next(value);
    } else if let Some(upstream) = &self.upstream {
      // the dropped item consumed one unit of downstream demand
      upstream.request(1);
    }
  }

  fn on_error(&mut self, err: FlowError) { self.downstream.on_error(err) }

  fn on_complete(&mut self) { self.downstream.on_complete() }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  };

  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[rxflow_macro::test]
  fn fork_and_shared() {
    let evens = publisher::range(0, 10).filter(|v| v % 2 == 0);
    let first = TestSubscriber::unbounded();
    let second = TestSubscriber::unbounded();
    evens.subscribe_with(first.clone());
    evens.subscribe_with(second.clone());
    assert_eq!(first.items(), vec![0, 2, 4, 6, 8]);
    assert_eq!(second.items(), first.items());
  }

  #[rxflow_macro::test]
  fn dropped_items_are_re_requested() {
    let requested = Arc::new(AtomicU64::new(0));
    let c_requested = requested.clone();
    let observer = TestSubscriber::new();
    publisher::range(1, 10)
      .do_on_request(move |n| {
        c_requested.fetch_add(n, Ordering::SeqCst);
      })
      .filter(|v| v % 3 == 0)
      .subscribe_with(observer.clone());

    observer.request(2);
    assert_eq!(observer.items(), vec![3, 6]);
    // 2 from downstream, plus one per rejected item: 1, 2, 4, 5
    assert_eq!(requested.load(Ordering::SeqCst), 6);
    observer.assert_no_violations();
  }
}
