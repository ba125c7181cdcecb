use crate::error::FlowError;

/// The wire vocabulary of a subscription: zero or more items followed by at
/// most one terminal signal.
#[derive(Debug, Clone)]
pub enum Signal<T> {
  Item(T),
  Error(FlowError),
  Complete,
}

impl<T> Signal<T> {
  /// Terminal signal for a step outcome: `Ok` completes, `Err` fails.
  pub fn terminal(result: Result<(), FlowError>) -> Self {
    match result {
      Ok(()) => Signal::Complete,
      Err(err) => Signal::Error(err),
    }
  }

  pub fn is_terminal(&self) -> bool { !matches!(self, Signal::Item(_)) }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Signal<U> {
    match self {
      Signal::Item(v) => Signal::Item(f(v)),
      Signal::Error(err) => Signal::Error(err),
      Signal::Complete => Signal::Complete,
    }
  }

  pub fn into_item(self) -> Option<T> {
    match self {
      Signal::Item(v) => Some(v),
      _ => None,
    }
  }
}
