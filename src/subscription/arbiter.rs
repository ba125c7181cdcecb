use std::sync::Mutex;

use super::{SubscriptionRef, UNBOUNDED};
use crate::{rc::lock, subscription::Subscription};

/// A subscription whose upstream can be swapped while keeping the demand
/// downstream already expressed.
///
/// Handed to downstream before the real upstream subscription exists (or
/// while it is replaced by a fallback source). Requests are accumulated until
/// an upstream is [`set`](SubscriptionArbiter::set) and replayed on it;
/// cancellation is remembered and applied to every later upstream.
#[derive(Default)]
pub struct SubscriptionArbiter {
  state: Mutex<ArbiterState>,
}

#[derive(Default)]
struct ArbiterState {
  current: Option<SubscriptionRef>,
  requested: u64,
  cancelled: bool,
  invalid_request: bool,
}

impl SubscriptionArbiter {
  pub fn new() -> Self { Self::default() }

  /// Switch to a new upstream, requesting from it whatever demand is still
  /// outstanding. If the arbiter was already cancelled the upstream is
  /// cancelled right away.
  pub fn set(&self, upstream: SubscriptionRef) {
    let (outstanding, invalid) = {
      let mut state = lock(&self.state);
      if state.cancelled {
        drop(state);
        upstream.cancel();
        return;
      }
      state.current = Some(upstream.clone());
      (state.requested, std::mem::take(&mut state.invalid_request))
    };
    if invalid {
      upstream.request(0);
    } else if outstanding > 0 {
      upstream.request(outstanding);
    }
  }

  /// Account for `n` items delivered by the current upstream.
  pub fn produced(&self, n: u64) {
    let mut state = lock(&self.state);
    if state.requested != UNBOUNDED {
      state.requested = state.requested.saturating_sub(n);
    }
  }

  /// Mark the flow finished without signalling upstream, which already
  /// terminated.
  pub fn release(&self) {
    let mut state = lock(&self.state);
    state.cancelled = true;
    state.current = None;
  }

  pub fn is_cancelled(&self) -> bool { lock(&self.state).cancelled }
}

impl Subscription for SubscriptionArbiter {
  fn request(&self, n: u64) {
    let current = {
      let mut state = lock(&self.state);
      if state.cancelled {
        return;
      }
      if n == 0 {
        if state.current.is_none() {
          state.invalid_request = true;
        }
      } else {
        state.requested = state.requested.saturating_add(n);
      }
      state.current.clone()
    };
    if let Some(upstream) = current {
      upstream.request(n);
    }
  }

  fn cancel(&self) {
    let current = {
      let mut state = lock(&self.state);
      if state.cancelled {
        return;
      }
      state.cancelled = true;
      state.current.take()
    };
    if let Some(upstream) = current {
      upstream.cancel();
    }
  }
}
