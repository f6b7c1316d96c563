//! Promissory: a single-threaded, cancel-aware promise engine.
//!
//! # Overview
//!
//! A [`Promise<T>`] is a deferred value that settles exactly once, as
//! `Fulfilled(T)`, `Rejected(Error)`, or `Cancelled`. Promises are driven by a
//! cooperative, per-thread tick scheduler: continuations never run inside the
//! call that settles a promise, they run on the next tick.
//!
//! # Core Guarantees
//!
//! - **Exactly-once settlement**: the first `resolve`/`reject`/`cancel` wins
//! - **No re-entrancy**: continuations are dispatched on the next tick
//! - **Cancellation graph**: cancelling a promise cancels its chained
//!   consumers; a promise whose last consumer is cancelled cancels itself
//! - **Observed failures**: a rejection nobody handles is reported one tick
//!   later, never silently dropped and never fatal
//! - **Deterministic time**: a virtual clock makes timer-driven code testable
//!
//! # Module Structure
//!
//! - [`promise`]: the promise type, resolvers, awaiting, unhandled rejections
//! - [`combinator`]: all, some, any, race, each, fold, retry, timeout, events
//! - [`time`]: clocks, the timer queue, and `delay`
//! - [`runtime`]: the tick scheduler and the functions that drive it
//! - [`config`]: scheduler configuration (env vars, optional TOML)
//! - [`error`]: the chainable rejection error
//! - [`types`]: identifiers, timestamps, status and outcome
//! - [`util`]: generation-checked arena and deterministic RNG
//!
//! # Example
//!
//! ```
//! use promissory::{runtime, time::delay, Promise, SchedulerConfig};
//! use std::time::Duration;
//!
//! runtime::install(SchedulerConfig::virtual_time()).unwrap();
//!
//! let greeting = delay(Duration::from_millis(250))
//!     .map(|_| "hello")
//!     .then(|word| Promise::resolved(format!("{word}, world")));
//!
//! assert_eq!(runtime::block_on(&greeting).unwrap(), "hello, world");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]

pub mod combinator;
pub mod config;
pub mod error;
pub mod promise;
pub mod runtime;
pub mod time;
pub mod tracing_compat;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-exports for convenient access to core types
pub use combinator::{all, all_settled, any, each, fold, from_event, race, retry, some};
pub use config::{ClockMode, ConfigError, SchedulerConfig};
pub use error::{Error, ErrorKind, Result};
pub use promise::{
    on_unhandled_rejection, promisify, OnCancel, Promise, Resolver, Step, UnhandledRejection,
};
pub use time::delay;
pub use types::{Outcome, PromiseId, Status, Time};
