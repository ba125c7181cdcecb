use std::sync::atomic::{AtomicU64, Ordering};

use super::UNBOUNDED;

/// Outstanding demand of one subscription.
///
/// Additions saturate at [`UNBOUNDED`]; once unbounded the counter never
/// decreases again.
#[derive(Debug, Default)]
pub struct Demand(AtomicU64);

impl Demand {
  pub fn new() -> Self { Demand(AtomicU64::new(0)) }

  /// Add `n` to the outstanding demand, returning the previous value.
  pub fn add(&self, n: u64) -> u64 {
    self
      .0
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
        (cur != UNBOUNDED).then(|| cur.saturating_add(n))
      })
      .unwrap_or_else(|cur| cur)
  }

  /// Record `n` delivered items, returning the remaining demand.
  pub fn produced(&self, n: u64) -> u64 {
    match self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
      (cur != UNBOUNDED).then(|| cur.saturating_sub(n))
    }) {
      Ok(prev) => prev.saturating_sub(n),
      Err(_) => UNBOUNDED,
    }
  }

  #[inline]
  pub fn get(&self) -> u64 { self.0.load(Ordering::Acquire) }

  #[inline]
  pub fn is_unbounded(&self) -> bool { self.get() == UNBOUNDED }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[rxflow_macro::test]
  fn accumulates_and_consumes() {
    let demand = Demand::new();
    assert_eq!(demand.add(2), 0);
    assert_eq!(demand.add(3), 2);
    assert_eq!(demand.produced(4), 1);
    assert_eq!(demand.produced(4), 0);
    assert_eq!(demand.get(), 0);
  }

  #[rxflow_macro::test]
  fn saturates_at_unbounded() {
    let demand = Demand::new();
    demand.add(UNBOUNDED - 1);
    demand.add(10);
    assert!(demand.is_unbounded());
    assert_eq!(demand.produced(1_000), UNBOUNDED);
    assert!(demand.is_unbounded());
  }
}
