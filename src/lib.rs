//! # rxflow: backpressure-aware reactive streams
//!
//! Pull-based publishers and subscribers in which a producer never emits
//! more items than its consumer asked for.
//!
//! ## Quick Start
//!
//! ```rust
//! use rxflow::prelude::*;
//!
//! publisher::range(1, 10)
//!   .filter(|v| v % 2 == 0)
//!   .map(|v| v * 2)
//!   .subscribe(|v| println!("Value: {}", v));
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Publisher`] | Repeatable description of a stream; every subscription is independent |
//! | [`Subscriber`] | Consumes items, then at most one error or completion |
//! | [`Subscription`] | Demand (`request(n)`) and cancellation channel of one subscription |
//! | [`Scheduler`] | Worker pool used by `subscribe_on` / `publish_on` |
//!
//! Demand flows upstream through subscriptions; items, errors and completion
//! flow downstream through subscribers. Signals to one subscriber are always
//! serialized, even across scheduler hand-offs.
//!
//! [`Publisher`]: publisher::Publisher
//! [`Subscriber`]: subscriber::Subscriber
//! [`Subscription`]: subscription::Subscription
//! [`Scheduler`]: scheduler::Scheduler

pub mod error;
pub mod hooks;
pub mod ops;
pub mod prelude;
pub mod publisher;
pub(crate) mod rc;
pub mod scheduler;
pub mod signal;
pub mod sink;
pub mod subscriber;
pub mod subscription;
pub mod test_subscriber;

pub use prelude::*;
