use std::{marker::PhantomData, sync::Arc};

use crate::{
  error::FlowError,
  publisher::Publisher,
  sink::SynchronousSink,
  subscriber::{BoxedSubscriber, Downstream, Subscriber},
  subscription::{Subscription, SubscriptionRef},
};

pub struct Handle<S, F, U> {
  source: S,
  handler: Arc<F>,
  _marker: PhantomData<fn() -> U>,
}

impl<S, F, U> Handle<S, F, U> {
  pub(crate) fn new(source: S, handler: F) -> Self {
    Handle { source, handler: Arc::new(handler), _marker: PhantomData }
  }
}

impl<S, F, U> Publisher for Handle<S, F, U>
where
  S: Publisher,
  F: Fn(S::Item, &mut SynchronousSink<U>) + Send + Sync + 'static,
  U: Send + 'static,
{
  type Item = U;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<U>) {
    self.source.actual_subscribe(Box::new(HandleSubscriber {
      downstream: Downstream::new(subscriber, "handle"),
      handler: self.handler.clone(),
      sink: SynchronousSink::new(),
      upstream: None,
    }));
  }
}

struct HandleSubscriber<U, F> {
  downstream: Downstream<U>,
  handler: Arc<F>,
  sink: SynchronousSink<U>,
  upstream: Option<SubscriptionRef>,
}

impl<Item, U, F> Subscriber<Item> for HandleSubscriber<U, F>
where
  F: Fn(Item, &mut SynchronousSink<U>),
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    self.upstream = Some(subscription.clone());
    self.downstream.on_subscribe(subscription);
  }

  fn on_next(&mut self, value: Item) {
    if self.downstream.is_done() {
      return;
    }
    (self.handler)(value, &mut self.sink);
    let (item, terminal) = self.sink.take();
    match (item, terminal) {
      (Some(v), None) => self.downstream.on_next(v),
      (None, None) => {
        if let Some(upstream) = &self.upstream {
          upstream.request(1);
        }
      }
      (item, Some(result)) => {
        if let Some(upstream) = self.upstream.take() {
          upstream.cancel();
        }
        if let Some(v) = item {
          self.downstream.on_next(v);
        }
        self.downstream.terminate(result);
      }
    }
  }

  fn on_error(&mut self, err: FlowError) { self.downstream.on_error(err) }

  fn on_complete(&mut self) { self.downstream.on_complete() }
}

#[cfg(test)]
mod tests {
  use crate::{error::FlowError, prelude::*, test_subscriber::TestSubscriber};

  fn alphabet(letter: i64) -> Option<char> {
    (1..=26).contains(&letter).then(|| (b'a' + letter as u8 - 1) as char)
  }

  #[rxflow_macro::test]
  fn maps_and_filters() {
    let observer = TestSubscriber::unbounded();
    publisher::from_iter(vec![1, -1, 2, 30, 3])
      .handle(|i, sink| {
        if let Some(letter) = alphabet(i) {
          sink.next(letter);
        }
      })
      .subscribe_with(observer.clone());
    assert_eq!(observer.items(), vec!['a', 'b', 'c']);
    assert!(observer.is_completed());
  }

  #[rxflow_macro::test]
  fn skipped_items_are_re_requested() {
    let observer = TestSubscriber::new();
    publisher::range(1, 10)
      .handle(|i, sink| {
        if i % 2 == 0 {
          sink.next(i);
        }
      })
      .subscribe_with(observer.clone());
    observer.request(2);
    assert_eq!(observer.items(), vec![2, 4]);
    observer.assert_no_violations();
  }

  #[rxflow_macro::test]
  fn error_terminates_and_cancels_upstream() {
    let observer = TestSubscriber::unbounded();
    publisher::range(1, 10)
      .handle(|i, sink| {
        if i == 3 {
          sink.error(FlowError::msg("no 3"));
        } else {
          sink.next(i);
        }
      })
      .subscribe_with(observer.clone());
    assert_eq!(observer.items(), vec![1, 2]);
    assert!(observer.error().is_some());
    observer.assert_no_violations();
  }

  #[rxflow_macro::test]
  fn complete_after_emission() {
    let observer = TestSubscriber::unbounded();
    publisher::range(1, 10)
      .handle(|i, sink| {
        sink.next(i * 10);
        if i == 2 {
          sink.complete();
        }
      })
      .subscribe_with(observer.clone());
    assert_eq!(observer.items(), vec![10, 20]);
    assert!(observer.is_completed());
  }
}
