//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

// Sources live in the `publisher` module: `publisher::range(..)`.
pub use crate::publisher::{self, BoxedPublisher, FluxSink, OverflowStrategy, Publisher, PublisherExt};
// Operators configuration
pub use crate::ops::{FlatMapConfig, RetryConfig};
// Scheduler
pub use crate::scheduler::{self, Scheduler, SchedulerRef, TaskHandle};
// Subscriber / Subscription
pub use crate::subscriber::{BoxedSubscriber, Subscriber};
pub use crate::subscription::{Disposable, Subscription, SubscriptionRef, UNBOUNDED};
pub use crate::{error::FlowError, signal::Signal, sink::SynchronousSink};
