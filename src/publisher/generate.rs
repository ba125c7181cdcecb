use std::{marker::PhantomData, sync::Arc};

use super::{
  pull::{self, PullSource, Pulled},
  Publisher,
};
use crate::{error::ProtocolViolation, sink::SynchronousSink, subscriber::BoxedSubscriber};

type Cleanup<S> = Arc<dyn Fn(S) + Send + Sync>;

/// Creates a synchronous, demand-driven source.
///
/// `state_factory` runs once per subscription. Each unit of demand calls
/// `step` once, on the thread that requested, with the current state and a
/// [`SynchronousSink`]; the state it returns feeds the next call. A step
/// must emit one item or terminate the sequence.
///
/// ```
/// use rxflow::prelude::*;
///
/// let alphabet = publisher::generate(
///   || 0u8,
///   |n, sink| {
///     sink.next((b'a' + n) as char);
///     if n == 25 {
///       sink.complete();
///     }
///     n + 1
///   },
/// );
/// alphabet.subscribe(|c| print!("{c}"));
/// ```
pub fn generate<T, S, SF, F>(state_factory: SF, step: F) -> Generate<T, S, SF, F>
where
  T: Send + 'static,
  S: Send + 'static,
  SF: Fn() -> S + Send + Sync + 'static,
  F: Fn(S, &mut SynchronousSink<T>) -> S + Send + Sync + 'static,
{
  Generate {
    state_factory,
    step: Arc::new(step),
    cleanup: None,
    _marker: PhantomData,
  }
}

pub struct Generate<T, S, SF, F> {
  state_factory: SF,
  step: Arc<F>,
  cleanup: Option<Cleanup<S>>,
  _marker: PhantomData<fn() -> T>,
}

impl<T, S, SF, F> Generate<T, S, SF, F> {
  /// Run `cleanup` with the final state once the sequence terminated or was
  /// cancelled.
  pub fn on_terminate(mut self, cleanup: impl Fn(S) + Send + Sync + 'static) -> Self {
    self.cleanup = Some(Arc::new(cleanup));
    self
  }
}

impl<T, S, SF, F> Publisher for Generate<T, S, SF, F>
where
  T: Send + 'static,
  S: Send + 'static,
  SF: Fn() -> S + Send + Sync + 'static,
  F: Fn(S, &mut SynchronousSink<T>) -> S + Send + Sync + 'static,
{
  type Item = T;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<T>) {
    let source = GenerateSource {
      state: Some((self.state_factory)()),
      step: self.step.clone(),
      sink: SynchronousSink::new(),
      cleanup: self.cleanup.clone(),
    };
    pull::subscribe(source, subscriber, "generate");
  }
}

struct GenerateSource<T, S, F> {
  state: Option<S>,
  step: Arc<F>,
  sink: SynchronousSink<T>,
  cleanup: Option<Cleanup<S>>,
}

impl<T, S, F> PullSource for GenerateSource<T, S, F>
where
  T: Send + 'static,
  S: Send + 'static,
  F: Fn(S, &mut SynchronousSink<T>) -> S + Send + Sync + 'static,
{
  type Item = T;

  fn pull(&mut self) -> Pulled<T> {
    let Some(state) = self.state.take() else { return Pulled::done(Ok(())) };
    self.state = Some((self.step)(state, &mut self.sink));
    if self.sink.is_idle() {
      return Pulled::done(Err(ProtocolViolation::IdleStep.into()));
    }
    let (item, terminal) = self.sink.take();
    Pulled { item, terminal }
  }

  fn terminate(&mut self) {
    if let (Some(state), Some(cleanup)) = (self.state.take(), self.cleanup.as_ref()) {
      cleanup(state);
    }
  }
}
