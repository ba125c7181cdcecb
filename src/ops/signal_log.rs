//! Trace every signal and request crossing a point of the pipeline.

use std::{borrow::Cow, fmt::Debug, sync::Arc};

use crate::{
  error::FlowError,
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{Subscription, SubscriptionRef},
};

pub struct Log<S> {
  pub(crate) source: S,
  pub(crate) category: Cow<'static, str>,
}

impl<S> Publisher for Log<S>
where
  S: Publisher,
  S::Item: Debug,
{
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    self.source.actual_subscribe(Box::new(LogSubscriber {
      downstream: subscriber,
      category: Arc::from(self.category.as_ref()),
    }));
  }
}

struct LogSubscriber<O> {
  downstream: O,
  category: Arc<str>,
}

impl<Item, O> Subscriber<Item> for LogSubscriber<O>
where
  Item: Debug,
  O: Subscriber<Item>,
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    log::info!("[{}] onSubscribe", self.category);
    self.downstream.on_subscribe(Arc::new(LoggedSubscription {
      upstream: subscription,
      category: self.category.clone(),
    }));
  }

  fn on_next(&mut self, value: Item) {
    log::info!("[{}] onNext({value:?})", self.category);
    self.downstream.on_next(value);
  }

  fn on_error(&mut self, err: FlowError) {
    log::info!("[{}] onError({err})", self.category);
    self.downstream.on_error(err);
  }

  fn on_complete(&mut self) {
    log::info!("[{}] onComplete()", self.category);
    self.downstream.on_complete();
  }
}

struct LoggedSubscription {
  upstream: SubscriptionRef,
  category: Arc<str>,
}

impl Subscription for LoggedSubscription {
  fn request(&self, n: u64) {
    if n == crate::subscription::UNBOUNDED {
      log::info!("[{}] request(unbounded)", self.category);
    } else {
      log::info!("[{}] request({n})", self.category);
    }
    self.upstream.request(n);
  }

  fn cancel(&self) {
    log::info!("[{}] cancel()", self.category);
    self.upstream.cancel();
  }
}

#[cfg(test)]
mod tests {
  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[rxflow_macro::test]
  fn is_transparent() {
    let _ = env_logger::builder().is_test(true).try_init();
    let observer = TestSubscriber::new();
    publisher::range(1, 4).log("range").map(|v| v * 2).subscribe_with(observer.clone());
    observer.request(2);
    assert_eq!(observer.items(), vec![2, 4]);
    observer.request(UNBOUNDED);
    assert_eq!(observer.items(), vec![2, 4, 6, 8]);
    assert!(observer.is_completed());
  }
}
