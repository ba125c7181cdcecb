//! Shared mutable cells.
//!
//! Every cross-thread slot in the engine is an `Arc<Mutex<_>>`. Locks are
//! only ever held by the single party that owns the drain loop of a
//! subscription, so a poisoned lock means a user callback panicked while
//! being delivered a signal; the state behind it stays consistent and is
//! recovered instead of propagating the panic to unrelated threads.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
