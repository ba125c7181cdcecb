use std::sync::{
  atomic::{AtomicU64, Ordering},
  Arc,
};

use crate::{
  error::FlowError,
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Downstream, Subscriber},
  subscription::{Subscription, SubscriptionRef},
};

#[derive(Clone)]
pub struct Take<S> {
  pub(crate) source: S,
  pub(crate) count: u64,
}

impl<S: Publisher> Publisher for Take<S> {
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    self.source.actual_subscribe(Box::new(TakeSubscriber {
      downstream: Downstream::new(subscriber, "take"),
      remaining: self.count,
      upstream: None,
    }));
  }
}

struct TakeSubscriber<Item> {
  downstream: Downstream<Item>,
  remaining: u64,
  upstream: Option<SubscriptionRef>,
}

impl<Item> Subscriber<Item> for TakeSubscriber<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    let capped = Arc::new(TakeSubscription {
      upstream: subscription.clone(),
      limit: self.remaining,
      requested: AtomicU64::new(0),
    });
    self.upstream = Some(subscription);
    self.downstream.on_subscribe(capped);
    if self.remaining == 0 {
      self.finish();
    }
  }

  fn on_next(&mut self, value: Item) {
    if self.remaining == 0 {
      return;
    }
    self.remaining -= 1;
    self.downstream.on_next(value);
    if self.remaining == 0 {
      self.finish();
    }
  }

  fn on_error(&mut self, err: FlowError) { self.downstream.on_error(err) }

  fn on_complete(&mut self) { self.downstream.on_complete() }
}

impl<Item> TakeSubscriber<Item> {
  fn finish(&mut self) {
    if let Some(upstream) = self.upstream.take() {
      upstream.cancel();
    }
    self.downstream.on_complete();
  }
}

/// Never asks upstream for more than `limit` items in total.
struct TakeSubscription {
  upstream: SubscriptionRef,
  limit: u64,
  requested: AtomicU64,
}

impl Subscription for TakeSubscription {
  fn request(&self, n: u64) {
    if n == 0 {
      self.upstream.request(0);
      return;
    }
    let limit = self.limit;
    let previous = self.requested.fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
      (r < limit).then(|| r.saturating_add(n).min(limit))
    });
    if let Ok(previous) = previous {
      self.upstream.request(n.min(limit - previous));
    }
  }

  fn cancel(&self) { self.upstream.cancel() }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  };

  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[rxflow_macro::test]
  fn base_function() {
    let observer = TestSubscriber::unbounded();
    publisher::range(0, 100).take(5).subscribe_with(observer.clone());
    assert_eq!(observer.items(), vec![0, 1, 2, 3, 4]);
    assert!(observer.is_completed());
  }

  #[rxflow_macro::test]
  fn take_zero_completes_at_once() {
    let observer = TestSubscriber::<i64>::new();
    publisher::range(0, 100).take(0).subscribe_with(observer.clone());
    assert!(observer.is_completed());
    assert!(observer.items().is_empty());
  }

  #[rxflow_macro::test]
  fn caps_upstream_demand() {
    let requested = Arc::new(AtomicU64::new(0));
    let c_requested = requested.clone();
    let observer = TestSubscriber::unbounded();
    publisher::generate(
      || 0,
      |n, sink| {
        sink.next(n);
        n + 1
      },
    )
    .do_on_request(move |n| {
      c_requested.fetch_add(n, Ordering::SeqCst);
    })
    .take(3)
    .subscribe_with(observer.clone());
    assert_eq!(observer.items(), vec![0, 1, 2]);
    assert_eq!(requested.load(Ordering::SeqCst), 3);
  }
}
