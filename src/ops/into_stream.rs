//! Bridge a publisher into a `futures::Stream`.
//!
//! The stream requests one item per poll that finds its buffer empty, so a
//! consumer that stops polling stops the producer too. Dropping the stream
//! cancels the subscription.
//!
//! ```rust
//! use futures::StreamExt;
//! use rxflow::prelude::*;
//!
//! # async fn example() {
//! let mut stream = publisher::range(1, 3).into_stream();
//! while let Some(Ok(value)) = stream.next().await {
//!   println!("Received: {}", value);
//! }
//! # }
//! ```

use std::{
  collections::VecDeque,
  pin::Pin,
  sync::{Arc, Mutex},
  task::{Context, Poll, Waker},
};

use futures::Stream;

use crate::{
  error::FlowError,
  publisher::Publisher,
  rc::lock,
  subscriber::Subscriber,
  subscription::{Subscription, SubscriptionArbiter, SubscriptionRef},
};

struct StreamState<T> {
  queue: VecDeque<Result<T, FlowError>>,
  waker: Option<Waker>,
  closed: bool,
}

/// A `Stream` yielding the items of a publisher, then its error if any.
pub struct PublisherStream<T> {
  state: Arc<Mutex<StreamState<T>>>,
  subscription: Arc<SubscriptionArbiter>,
  in_flight: bool,
}

impl<T: Send + 'static> PublisherStream<T> {
  pub(crate) fn new<P: Publisher<Item = T>>(publisher: &P) -> Self {
    let state = Arc::new(Mutex::new(StreamState { queue: VecDeque::new(), waker: None, closed: false }));
    let subscription = Arc::new(SubscriptionArbiter::new());
    publisher.actual_subscribe(Box::new(StreamSubscriber {
      state: state.clone(),
      subscription: subscription.clone(),
    }));
    PublisherStream { state, subscription, in_flight: false }
  }
}

impl<T> Stream for PublisherStream<T> {
  type Item = Result<T, FlowError>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    {
      let mut state = lock(&this.state);
      if let Some(item) = state.queue.pop_front() {
        if item.is_ok() {
          this.in_flight = false;
        }
        return Poll::Ready(Some(item));
      }
      if state.closed {
        return Poll::Ready(None);
      }
      state.waker = Some(cx.waker().clone());
    }
    if !this.in_flight {
      this.in_flight = true;
      this.subscription.request(1);
      // a synchronous source answers inside `request`
      let mut state = lock(&this.state);
      if let Some(item) = state.queue.pop_front() {
        state.waker = None;
        if item.is_ok() {
          this.in_flight = false;
        }
        return Poll::Ready(Some(item));
      }
      if state.closed {
        return Poll::Ready(None);
      }
    }
    Poll::Pending
  }
}

impl<T> Drop for PublisherStream<T> {
  fn drop(&mut self) { self.subscription.cancel() }
}

struct StreamSubscriber<T> {
  state: Arc<Mutex<StreamState<T>>>,
  subscription: Arc<SubscriptionArbiter>,
}

impl<T> StreamSubscriber<T> {
  fn push(&self, item: Option<Result<T, FlowError>>) {
    let waker = {
      let mut state = lock(&self.state);
      match item {
        Some(item) => {
          if item.is_err() {
            state.closed = true;
          }
          state.queue.push_back(item);
        }
        None => state.closed = true,
      }
      state.waker.take()
    };
    if let Some(waker) = waker {
      waker.wake();
    }
  }
}

impl<T> Subscriber<T> for StreamSubscriber<T> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) { self.subscription.set(subscription) }

  fn on_next(&mut self, value: T) { self.push(Some(Ok(value))) }

  fn on_error(&mut self, err: FlowError) {
    self.subscription.release();
    self.push(Some(Err(err)))
  }

  fn on_complete(&mut self) {
    self.subscription.release();
    self.push(None)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use futures::StreamExt;

  use crate::{error::FlowError, prelude::*, scheduler};

  #[rxflow_macro::test]
  async fn yields_items_then_ends() {
    let values: Vec<_> = publisher::range(1, 3).into_stream().collect().await;
    let values: Vec<_> = values.into_iter().map(Result::unwrap).collect();
    assert_eq!(values, vec![1, 2, 3]);
  }

  #[rxflow_macro::test]
  async fn requests_one_per_poll() {
    let requests = Arc::new(Mutex::new(vec![]));
    let c_requests = requests.clone();
    let mut stream = publisher::range(0, 100)
      .do_on_request(move |n| c_requests.lock().unwrap().push(n))
      .into_stream();
    assert_eq!(stream.next().await.map(Result::unwrap), Some(0));
    assert_eq!(stream.next().await.map(Result::unwrap), Some(1));
    assert_eq!(*requests.lock().unwrap(), vec![1, 1]);
  }

  #[rxflow_macro::test]
  async fn error_is_the_last_item() {
    let mut stream = publisher::range(1, 3)
      .try_map(|v| if v < 2 { Ok(v) } else { Err(FlowError::msg("stop")) })
      .into_stream();
    assert_eq!(stream.next().await.map(Result::unwrap), Some(1));
    let err = stream.next().await.and_then(Result::err);
    assert_eq!(err.map(|e| e.to_string()), Some("stop".to_owned()));
    assert!(stream.next().await.is_none());
  }

  #[rxflow_macro::test(multi)]
  async fn wakes_across_threads() {
    let worker = scheduler::new_single("into-stream-worker");
    let values: Vec<_> =
      publisher::range(0, 5).subscribe_on(worker.clone()).into_stream().map(Result::unwrap).collect().await;
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    worker.dispose();
  }
}
