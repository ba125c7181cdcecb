//! The demand/cancellation channel between a subscriber and its producer.
//!
//! A [`Subscription`] is handed to a subscriber exactly once, in
//! `on_subscribe`. Through it the subscriber asks for more items
//! (`request(n)`) or stops the flow (`cancel()`). Producers never emit more
//! items than requested and stop promptly once cancelled.

use std::sync::Arc;

mod arbiter;
mod demand;
mod drain;

pub use arbiter::SubscriptionArbiter;
pub use demand::Demand;
pub(crate) use drain::WorkInProgress;

/// Demand value meaning "no limit"; outstanding demand saturates here.
pub const UNBOUNDED: u64 = u64::MAX;

pub trait Subscription: Send + Sync {
  /// Ask the producer for `n` more items. `n == 0` is a protocol violation
  /// reported back to the subscriber as an error signal. Requests made after
  /// a terminal signal are ignored.
  fn request(&self, n: u64);

  /// Stop the flow. Idempotent; once observed by the producer no further
  /// signal is delivered, buffered ones included.
  fn cancel(&self);
}

/// Shared handle to a live subscription.
pub type SubscriptionRef = Arc<dyn Subscription>;

impl<T: Subscription + ?Sized> Subscription for Arc<T> {
  #[inline]
  fn request(&self, n: u64) { (**self).request(n) }

  #[inline]
  fn cancel(&self) { (**self).cancel() }
}

/// Subscription of a source that has nothing left to produce.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySubscription;

impl Subscription for EmptySubscription {
  fn request(&self, _n: u64) {}

  fn cancel(&self) {}
}

// ==================== Disposable ====================

/// Handle returned by the `subscribe*` family to cancel a running pipeline.
#[derive(Clone)]
pub struct Disposable(Arc<SubscriptionArbiter>);

impl Disposable {
  pub(crate) fn new(arbiter: Arc<SubscriptionArbiter>) -> Self { Disposable(arbiter) }

  /// Cancel the subscription. Safe to call from any thread, any number of
  /// times.
  pub fn dispose(&self) { self.0.cancel() }

  /// Whether the subscription was cancelled or has terminated.
  pub fn is_disposed(&self) -> bool { self.0.is_cancelled() }

  /// Activates "RAII" behavior for this subscription. That means
  /// `dispose()` will be called automatically as soon as the returned
  /// value goes out of scope.
  ///
  /// **Attention:** If you don't assign the return value to a variable,
  /// `dispose()` is called immediately, which is probably not what you
  /// want!
  pub fn unsubscribe_when_dropped(self) -> DisposableGuard { DisposableGuard(self) }
}

/// An RAII implementation of a "scoped subscribed" of a subscription.
/// When this structure is dropped (falls out of scope), the subscription will
/// be disposed.
#[must_use]
pub struct DisposableGuard(Disposable);

impl DisposableGuard {
  pub fn is_disposed(&self) -> bool { self.0.is_disposed() }
}

impl Drop for DisposableGuard {
  #[inline]
  fn drop(&mut self) { self.0.dispose() }
}
