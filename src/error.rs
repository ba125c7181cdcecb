//! Error types carried by the error channel of every subscription.
//!
//! A pipeline has one error type, [`FlowError`]. Errors raised by user code
//! are wrapped in [`FlowError::Source`]; everything else is raised by the
//! engine itself (protocol violations, scheduler failures, overflow).

use std::{borrow::Cow, error::Error as StdError, sync::Arc};

use smallvec::SmallVec;
use thiserror::Error;

/// Errors that terminate a subscription.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
  /// Raised by a source or a user callback.
  #[error(transparent)]
  Source(Arc<dyn StdError + Send + Sync + 'static>),

  /// A party broke the publisher/subscriber contract.
  #[error("protocol violation: {0}")]
  Protocol(#[from] ProtocolViolation),

  /// A worker pool refused or failed to run a unit of work.
  #[error(transparent)]
  Scheduler(#[from] SchedulerError),

  /// A bounded buffer in front of a push source filled up.
  #[error("buffer overflow: more than {capacity} items pending")]
  Overflow { capacity: usize },

  /// A timed source fired while downstream had no outstanding demand.
  #[error("could not emit tick {tick} due to lack of requests")]
  LackOfDemand { tick: u64 },

  /// An error that crossed a `checkpoint` operator.
  #[error("{source}")]
  Checkpoint { label: Cow<'static, str>, source: Box<FlowError> },
}

/// Contract violations detected by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
  #[error("request(n) requires n > 0, got {0}")]
  NonPositiveRequest(u64),
  #[error("sink.next() was called more than once in a single step")]
  MultipleEmissions,
  #[error("the step returned without emitting or terminating")]
  IdleStep,
}

/// Failures reported by a [`Scheduler`](crate::scheduler::Scheduler).
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
  #[error("scheduler `{name}` is disposed")]
  Disposed { name: String },
  #[error("scheduler `{name}` rejected work: {reason}")]
  Rejected { name: String, reason: String },
  #[error("scheduler `{name}` does not support {operation}")]
  Unsupported { name: String, operation: &'static str },
  #[error("scheduler `{name}` failed to start its workers: {source}")]
  Spawn { name: String, source: Arc<std::io::Error> },
}

/// Plain message error, the payload of [`FlowError::msg`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MessageError(pub Cow<'static, str>);

impl FlowError {
  /// Wrap an arbitrary error raised by user code.
  pub fn new<E>(err: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    FlowError::Source(Arc::new(err))
  }

  /// Build a source error from a message.
  pub fn msg(message: impl Into<Cow<'static, str>>) -> Self {
    FlowError::new(MessageError(message.into()))
  }

  /// Attach a checkpoint label, keeping the message untouched.
  pub fn with_checkpoint(self, label: impl Into<Cow<'static, str>>) -> Self {
    FlowError::Checkpoint { label: label.into(), source: Box::new(self) }
  }

  /// The error with every checkpoint label stripped.
  pub fn root(&self) -> &FlowError {
    let mut err = self;
    while let FlowError::Checkpoint { source, .. } = err {
      err = &**source;
    }
    err
  }

  /// Checkpoint labels this error crossed, closest to the source first.
  pub fn checkpoints(&self) -> SmallVec<[&str; 2]> {
    let mut labels = SmallVec::new();
    let mut err = self;
    while let FlowError::Checkpoint { label, source } = err {
      labels.push(label.as_ref());
      err = &**source;
    }
    labels.reverse();
    labels
  }

  /// Downcast the user error wrapped by [`FlowError::Source`].
  pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
    match self.root() {
      FlowError::Source(err) => (**err).downcast_ref::<T>(),
      _ => None,
    }
  }

  pub fn is_protocol_violation(&self) -> bool { matches!(self.root(), FlowError::Protocol(_)) }
}
