//! Operators: publishers that transform the signals and demand of an
//! upstream publisher. They are built through
//! [`PublisherExt`](crate::publisher::PublisherExt).

pub mod checkpoint;
pub mod delay;
pub mod filter;
pub mod flat_map;
pub mod handle;
pub mod into_stream;
pub mod lifecycle;
pub mod map;
pub mod on_error;
pub mod publish_on;
pub mod retry;
pub mod signal_log;
pub mod subscribe_on;
pub mod take;
pub mod zip;

pub use flat_map::FlatMapConfig;
pub use retry::{RetryConfig, RetryPolicy};
