//! Process-wide reporters for signals that have nowhere left to go.
//!
//! Terminal errors reaching a subscriber that supplied no error callback, and
//! signals arriving after a subscription already terminated, must not vanish
//! silently. By default they are logged; applications can install their own
//! reporters (and tests can count them).

use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::error::FlowError;

type ErrorHook = Arc<dyn Fn(&FlowError) + Send + Sync>;
type DropHook = Arc<dyn Fn(&'static str) + Send + Sync>;

#[derive(Default, Clone)]
struct Hooks {
  on_unhandled_error: Option<ErrorHook>,
  on_error_dropped: Option<ErrorHook>,
  on_next_dropped: Option<DropHook>,
}

static HOOKS: Lazy<RwLock<Hooks>> = Lazy::new(|| RwLock::new(Hooks::default()));

fn current() -> Hooks { HOOKS.read().unwrap_or_else(PoisonError::into_inner).clone() }

fn update(f: impl FnOnce(&mut Hooks)) {
  let mut hooks = HOOKS.write().unwrap_or_else(PoisonError::into_inner);
  f(&mut hooks);
}

/// Called with every terminal error delivered to a subscriber without an
/// error callback.
pub fn set_on_unhandled_error(hook: impl Fn(&FlowError) + Send + Sync + 'static) {
  update(|h| h.on_unhandled_error = Some(Arc::new(hook)));
}

/// Called with errors signalled after the subscription already terminated.
pub fn set_on_error_dropped(hook: impl Fn(&FlowError) + Send + Sync + 'static) {
  update(|h| h.on_error_dropped = Some(Arc::new(hook)));
}

/// Called when an item arrives after the subscription terminated; receives the
/// name of the stage that dropped it.
pub fn set_on_next_dropped(hook: impl Fn(&'static str) + Send + Sync + 'static) {
  update(|h| h.on_next_dropped = Some(Arc::new(hook)));
}

/// Restore the logging reporters.
pub fn reset() { update(|h| *h = Hooks::default()); }

pub(crate) fn unhandled_error(err: &FlowError) {
  match current().on_unhandled_error {
    Some(hook) => hook(err),
    None => log::error!("unhandled error in reactive pipeline: {err}"),
  }
}

pub(crate) fn error_dropped(err: &FlowError) {
  match current().on_error_dropped {
    Some(hook) => hook(err),
    None => log::warn!("error signalled after termination was dropped: {err}"),
  }
}

pub(crate) fn next_dropped(stage: &'static str) {
  match current().on_next_dropped {
    Some(hook) => hook(stage),
    None => log::warn!("`{stage}` dropped an item delivered after termination"),
  }
}
