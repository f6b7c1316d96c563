//! Time: clocks, the timer queue, and timer-backed promises.
//!
//! - [`clock`]: wall and virtual time sources
//! - [`timer_queue`]: the sorted, doubly-linked list of pending timers
//! - [`delay`](delay()): a promise that fulfils after a duration
//!
//! # Virtual vs Wall Time
//!
//! The scheduler owns one clock, chosen by
//! [`SchedulerConfig::clock`](crate::SchedulerConfig). With the virtual clock
//! time only moves through [`runtime::advance`](crate::runtime::advance) or
//! [`runtime::block_on`](crate::runtime::block_on), which makes timer-driven
//! tests deterministic and instant.

pub mod clock;
mod delay;
pub mod timer_queue;

pub use clock::{Clock, TimeSource, VirtualClock, WallClock};
pub use delay::{delay, delay_secs};
pub use timer_queue::{Expired, TimerCallback, TimerKey, TimerQueue};
