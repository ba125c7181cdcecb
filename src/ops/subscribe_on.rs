//! Move the subscription to the source, and every request it receives, onto
//! a scheduler.
//!
//! Downstream is subscribed synchronously with a placeholder subscription;
//! demand issued before the source is attached is held and replayed on the
//! worker. When several `subscribe_on` are stacked the one closest to the
//! source decides where it runs.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc, Mutex,
};

use crate::{
  error::FlowError,
  publisher::Publisher,
  rc::lock,
  scheduler::{SchedulerRef, TaskHandle},
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{Subscription, SubscriptionArbiter, SubscriptionRef},
};

pub struct SubscribeOn<S> {
  pub(crate) source: Arc<S>,
  pub(crate) scheduler: SchedulerRef,
}

impl<S: Publisher> Publisher for SubscribeOn<S> {
  type Item = S::Item;

  fn actual_subscribe(&self, mut subscriber: BoxedSubscriber<S::Item>) {
    let subscription = Arc::new(SubscribeOnSubscription {
      arbiter: Arc::new(SubscriptionArbiter::new()),
      scheduler: self.scheduler.clone(),
      attached: AtomicBool::new(false),
      task: Mutex::new(None),
    });
    subscriber.on_subscribe(subscription.clone());
    if subscription.arbiter.is_cancelled() {
      return;
    }

    let slot = Arc::new(Mutex::new(Some(subscriber)));
    let task = {
      let slot = slot.clone();
      let source = self.source.clone();
      let subscription = subscription.clone();
      Box::new(move || {
        let downstream = lock(&slot).take();
        if let Some(downstream) = downstream {
          subscription.attached.store(true, Ordering::Release);
          source.actual_subscribe(Box::new(SubscribeOnSubscriber {
            downstream,
            arbiter: subscription.arbiter.clone(),
          }));
        }
      })
    };
    match self.scheduler.schedule(task) {
      Ok(handle) => *lock(&subscription.task) = Some(handle),
      Err(err) => {
        log::warn!("subscribe_on could not reach `{}`: {err}", self.scheduler.name());
        let downstream = lock(&slot).take();
        if let Some(mut downstream) = downstream {
          subscription.arbiter.release();
          downstream.on_error(FlowError::from(err));
        }
      }
    }
  }
}

struct SubscribeOnSubscription {
  arbiter: Arc<SubscriptionArbiter>,
  scheduler: SchedulerRef,
  attached: AtomicBool,
  task: Mutex<Option<TaskHandle>>,
}

impl Subscription for SubscribeOnSubscription {
  fn request(&self, n: u64) {
    if !self.attached.load(Ordering::Acquire) {
      self.arbiter.request(n);
      return;
    }
    let arbiter = self.arbiter.clone();
    if let Err(err) = self.scheduler.schedule(Box::new(move || arbiter.request(n))) {
      log::warn!("request({n}) runs on the caller thread: {err}");
      self.arbiter.request(n);
    }
  }

  fn cancel(&self) {
    if let Some(task) = lock(&self.task).take() {
      task.cancel();
    }
    self.arbiter.cancel();
  }
}

struct SubscribeOnSubscriber<Item> {
  downstream: BoxedSubscriber<Item>,
  arbiter: Arc<SubscriptionArbiter>,
}

impl<Item> Subscriber<Item> for SubscribeOnSubscriber<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) { self.arbiter.set(subscription) }

  fn on_next(&mut self, value: Item) { self.downstream.on_next(value) }

  fn on_error(&mut self, err: FlowError) {
    self.arbiter.release();
    self.downstream.on_error(err)
  }

  fn on_complete(&mut self) {
    self.arbiter.release();
    self.downstream.on_complete()
  }
}
