use super::{
  pull::{self, PullSource, Pulled},
  Publisher,
};
use crate::{error::FlowError, subscriber::BoxedSubscriber};

/// Creates a publisher that emits the items of `iter`, one per unit of
/// demand, then completes.
///
/// Every subscription iterates a fresh clone of `iter`. The iterator is only
/// advanced while there is demand. Completion follows the last item right
/// away when the iterator's size hint says nothing is left, otherwise it is
/// signalled once `next()` returns `None`.
///
/// ```
/// use rxflow::prelude::*;
///
/// publisher::from_iter(vec![1, 2, 3]).subscribe(|v| println!("{v}"));
/// ```
pub fn from_iter<I>(iter: I) -> FromIter<I>
where
  I: IntoIterator + Clone + Send + Sync + 'static,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
{
  FromIter(iter)
}

/// Creates a publisher that emits `count` consecutive integers starting at
/// `start`.
pub fn range(start: i64, count: u64) -> Range { Range { start, count } }

/// Creates a publisher that emits `value` and completes.
pub fn just<T>(value: T) -> Just<T>
where
  T: Clone + Send + Sync + 'static,
{
  Just(value)
}

#[derive(Clone)]
pub struct FromIter<I>(I);

impl<I> Publisher for FromIter<I>
where
  I: IntoIterator + Clone + Send + Sync + 'static,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
{
  type Item = I::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<Self::Item>) {
    pull::subscribe(IterSource(self.0.clone().into_iter()), subscriber, "from_iter");
  }
}

struct IterSource<It>(It);

impl<It: Iterator> IterSource<It> {
  fn exhausted(&self) -> bool { self.0.size_hint().1 == Some(0) }
}

impl<It> PullSource for IterSource<It>
where
  It: Iterator + Send + 'static,
  It::Item: Send + 'static,
{
  type Item = It::Item;

  fn pull(&mut self) -> Pulled<Self::Item> {
    match self.0.next() {
      Some(v) if self.exhausted() => Pulled::last(v),
      Some(v) => Pulled::item(v),
      None => Pulled::done(Ok(())),
    }
  }

  fn ready_terminal(&mut self) -> Option<Result<(), FlowError>> {
    self.exhausted().then_some(Ok(()))
  }
}

#[derive(Debug, Clone, Copy)]
pub struct Range {
  start: i64,
  count: u64,
}

impl Publisher for Range {
  type Item = i64;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<i64>) {
    let source = RangeSource { next: self.start, remaining: self.count };
    pull::subscribe(source, subscriber, "range");
  }
}

struct RangeSource {
  next: i64,
  remaining: u64,
}

impl PullSource for RangeSource {
  type Item = i64;

  fn pull(&mut self) -> Pulled<i64> {
    if self.remaining == 0 {
      return Pulled::done(Ok(()));
    }
    let v = self.next;
    self.next = self.next.wrapping_add(1);
    self.remaining -= 1;
    if self.remaining == 0 { Pulled::last(v) } else { Pulled::item(v) }
  }

  fn ready_terminal(&mut self) -> Option<Result<(), FlowError>> {
    (self.remaining == 0).then_some(Ok(()))
  }
}

#[derive(Debug, Clone)]
pub struct Just<T>(T);

impl<T> Publisher for Just<T>
where
  T: Clone + Send + Sync + 'static,
{
  type Item = T;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<T>) {
    pull::subscribe(JustSource(Some(self.0.clone())), subscriber, "just");
  }
}

struct JustSource<T>(Option<T>);

impl<T: Send + 'static> PullSource for JustSource<T> {
  type Item = T;

  fn pull(&mut self) -> Pulled<T> {
    match self.0.take() {
      Some(v) => Pulled::last(v),
      None => Pulled::done(Ok(())),
    }
  }

  fn ready_terminal(&mut self) -> Option<Result<(), FlowError>> {
    self.0.is_none().then_some(Ok(()))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
  };

  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[rxflow_macro::test]
  fn from_vec() {
    let hit_count = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicBool::new(false));
    let c_hit_count = hit_count.clone();
    let c_completed = completed.clone();
    publisher::from_iter(vec![0; 100]).subscribe_all(
      move |_| {
        c_hit_count.fetch_add(1, Ordering::SeqCst);
      },
      |_| {},
      move || c_completed.store(true, Ordering::SeqCst),
    );
    assert_eq!(hit_count.load(Ordering::SeqCst), 100);
    assert!(completed.load(Ordering::SeqCst));
  }

  #[rxflow_macro::test]
  fn each_subscription_starts_over() {
    let source = publisher::range(1, 3);
    let first = TestSubscriber::unbounded();
    let second = TestSubscriber::unbounded();
    source.subscribe_with(first.clone());
    source.subscribe_with(second.clone());
    assert_eq!(first.items(), vec![1, 2, 3]);
    assert_eq!(second.items(), vec![1, 2, 3]);
    assert!(second.is_completed());
  }

  #[rxflow_macro::test]
  fn honours_demand_and_completes_eagerly() {
    let observer = TestSubscriber::new();
    publisher::from_iter(vec!["a", "b", "c"]).subscribe_with(observer.clone());
    assert!(observer.items().is_empty());

    observer.request(2);
    assert_eq!(observer.items(), vec!["a", "b"]);
    assert!(!observer.is_terminated());

    observer.request(1);
    assert_eq!(observer.items(), vec!["a", "b", "c"]);
    assert!(observer.is_completed());
  }

  #[rxflow_macro::test]
  fn iterator_is_not_advanced_beyond_demand() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let c_pulled = pulled.clone();
    let lazy = (0..10).map(move |i| {
      c_pulled.fetch_add(1, Ordering::SeqCst);
      i
    });
    let observer = TestSubscriber::new();
    publisher::from_iter(lazy).subscribe_with(observer.clone());
    assert_eq!(pulled.load(Ordering::SeqCst), 0);

    observer.request(2);
    assert_eq!(observer.items(), vec![0, 1]);
    assert_eq!(pulled.load(Ordering::SeqCst), 2);

    observer.request(8);
    assert_eq!(pulled.load(Ordering::SeqCst), 10);
    assert!(observer.is_completed());
  }

  /// Counts down without telling how many items are left.
  #[derive(Clone)]
  struct Countdown(u32);

  impl Iterator for Countdown {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
      self.0 = self.0.checked_sub(1)?;
      Some(self.0)
    }
  }

  #[rxflow_macro::test]
  fn unsized_iterator_completes_on_next_request() {
    let observer = TestSubscriber::new();
    publisher::from_iter(Countdown(2)).subscribe_with(observer.clone());
    observer.request(2);
    assert_eq!(observer.items(), vec![1, 0]);
    assert!(!observer.is_terminated());

    observer.request(1);
    assert!(observer.is_completed());
    observer.assert_no_violations();
  }

  #[rxflow_macro::test]
  fn empty_iterator_completes_without_demand() {
    let observer = TestSubscriber::new();
    publisher::from_iter(Vec::<i32>::new()).subscribe_with(observer.clone());
    assert!(observer.is_completed());
  }

  #[rxflow_macro::test]
  fn zero_request_is_a_protocol_error() {
    let observer = TestSubscriber::new();
    publisher::range(0, 10).subscribe_with(observer.clone());
    observer.request(1);
    observer.request(0);
    assert_eq!(observer.items(), vec![0]);
    assert!(observer.error().is_some_and(|e| e.is_protocol_violation()));
    observer.assert_no_violations();
  }

  #[rxflow_macro::test]
  fn just_emits_once() {
    let observer = TestSubscriber::unbounded();
    publisher::just("hello").subscribe_with(observer.clone());
    assert_eq!(observer.items(), vec!["hello"]);
    assert!(observer.is_completed());
  }
}
