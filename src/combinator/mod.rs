//! Combinators over promises.
//!
//! Every combinator is built from the public promise API (`settle`, `chain`,
//! `cancel`, `await`) and returns a new promise:
//!
//! - [`all`], [`some`], [`any`], [`all_settled`]: wait for several inputs
//! - [`race`]: first input to settle wins, the rest are cancelled
//! - [`each`], [`fold`]: sequential processing
//! - [`retry`], [`retry_with_delay`]: re-run a failing operation
//! - [`timeout`]: reject if an input takes too long
//! - [`from_event`]: first matching payload from an [`EventSource`]
//!
//! Combinators that settle early cancel the inputs they no longer need.
//! Cancelling a combinator's promise releases its hold on the inputs, which
//! cancels every input that nothing else is waiting on.

pub mod all;
pub mod each;
pub mod event;
pub mod race;
pub mod retry;
pub mod timeout;

pub use all::{all, all_settled, any, some};
pub use each::{each, fold};
pub use event::{from_event, Connection, EventSource, Signal, SignalConnection};
pub use race::race;
pub use retry::{retry, retry_with_delay};
pub use timeout::timeout;
