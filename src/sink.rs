use crate::{
  error::{FlowError, ProtocolViolation},
  hooks,
};

/// Single-step emission handle given to `generate` steps and `handle`
/// callbacks.
///
/// One step may emit at most one item and may additionally terminate the
/// sequence. A second `next` within the same step fails the sequence with
/// [`ProtocolViolation::MultipleEmissions`] after the first item.
pub struct SynchronousSink<T> {
  item: Option<T>,
  emitted: bool,
  terminal: Option<Result<(), FlowError>>,
}

impl<T> SynchronousSink<T> {
  pub(crate) fn new() -> Self { SynchronousSink { item: None, emitted: false, terminal: None } }

  pub fn next(&mut self, value: T) {
    if self.terminal.is_some() {
      hooks::next_dropped("sink");
    } else if self.emitted {
      self.terminal = Some(Err(ProtocolViolation::MultipleEmissions.into()));
    } else {
      self.emitted = true;
      self.item = Some(value);
    }
  }

  pub fn complete(&mut self) {
    if self.terminal.is_none() {
      self.terminal = Some(Ok(()));
    }
  }

  pub fn error(&mut self, err: FlowError) {
    if self.terminal.is_none() {
      self.terminal = Some(Err(err));
    } else {
      hooks::error_dropped(&err);
    }
  }

  /// Whether the current step emitted or terminated.
  pub(crate) fn is_idle(&self) -> bool { !self.emitted && self.terminal.is_none() }

  /// Collect what the step produced and reset the sink for the next step.
  pub(crate) fn take(&mut self) -> (Option<T>, Option<Result<(), FlowError>>) {
    self.emitted = false;
    (self.item.take(), self.terminal.take())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[rxflow_macro::test]
  fn second_next_fails_after_first_item() {
    let mut sink = SynchronousSink::new();
    sink.next(1);
    sink.next(2);
    let (item, terminal) = sink.take();
    assert_eq!(item, Some(1));
    assert!(matches!(terminal, Some(Err(ref e)) if e.is_protocol_violation()));
    assert!(sink.is_idle());
  }

  #[rxflow_macro::test]
  fn next_after_complete_is_dropped() {
    let mut sink = SynchronousSink::new();
    sink.complete();
    sink.next(7);
    assert!(!sink.is_idle());
    let (item, terminal) = sink.take();
    assert_eq!(item, None);
    assert!(matches!(terminal, Some(Ok(()))));
  }
}
