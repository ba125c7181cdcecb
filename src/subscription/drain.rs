use std::sync::atomic::{AtomicUsize, Ordering};

/// Work-in-progress counter serializing a drain loop.
///
/// Whoever moves the counter from zero owns delivery until it brings the
/// counter back to zero; every other caller only records that more work
/// arrived. This keeps signal delivery single-threaded per subscription and
/// turns re-entrant `request`/`cancel` calls made from inside `on_next` into
/// another loop iteration instead of recursion.
#[derive(Debug, Default)]
pub(crate) struct WorkInProgress(AtomicUsize);

impl WorkInProgress {
  pub fn new() -> Self { WorkInProgress(AtomicUsize::new(0)) }

  /// Signal new work; returns `true` if the caller now owns the loop.
  #[inline]
  pub fn enter(&self) -> bool { self.0.fetch_add(1, Ordering::AcqRel) == 0 }

  /// Run `pass` until no work was missed. The caller must own the loop.
  pub fn drain(&self, mut pass: impl FnMut()) {
    let mut missed = 1;
    loop {
      pass();
      missed = self.0.fetch_sub(missed, Ordering::AcqRel) - missed;
      if missed == 0 {
        break;
      }
    }
  }

  /// `enter` followed by `drain` when the loop was acquired.
  #[inline]
  pub fn run(&self, pass: impl FnMut()) {
    if self.enter() {
      self.drain(pass);
    }
  }
}
