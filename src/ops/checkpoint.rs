use std::borrow::Cow;

use crate::{
  error::FlowError,
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::SubscriptionRef,
};

/// Tags errors passing through with a label, so a failure can be traced back
/// to the segment of the pipeline it crossed.
pub struct Checkpoint<S> {
  pub(crate) source: S,
  pub(crate) label: Cow<'static, str>,
}

impl<S: Publisher> Publisher for Checkpoint<S> {
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    self
      .source
      .actual_subscribe(Box::new(CheckpointSubscriber { downstream: subscriber, label: self.label.clone() }));
  }
}

struct CheckpointSubscriber<O> {
  downstream: O,
  label: Cow<'static, str>,
}

impl<Item, O: Subscriber<Item>> Subscriber<Item> for CheckpointSubscriber<O> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) { self.downstream.on_subscribe(subscription) }

  fn on_next(&mut self, value: Item) { self.downstream.on_next(value) }

  fn on_error(&mut self, err: FlowError) {
    let label = std::mem::take(&mut self.label);
    self.downstream.on_error(err.with_checkpoint(label))
  }

  fn on_complete(&mut self) { self.downstream.on_complete() }
}

#[cfg(test)]
mod tests {
  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[rxflow_macro::test]
  fn labels_accumulate_from_the_source() {
    let observer = TestSubscriber::<i32>::unbounded();
    publisher::error(FlowError::msg("broken"))
      .checkpoint("source")
      .map(|v: i32| v + 1)
      .checkpoint("after map")
      .subscribe_with(observer.clone());

    let err = observer.error().unwrap();
    assert_eq!(err.to_string(), "broken");
    assert_eq!(err.checkpoints().as_slice(), &["source", "after map"]);
  }
}
