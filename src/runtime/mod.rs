//! The per-thread scheduler and the functions that drive it.
//!
//! - [`scheduler`]: the tick loop, job queue, timer queue, and task table
//! - [`task`]: spawned futures and their wakers
//!
//! Nothing runs on its own: an application (or test) drives the scheduler by
//! calling [`tick`], [`run_until_idle`], [`advance`], or [`block_on`].
//!
//! ```
//! use promissory::{runtime, Promise, SchedulerConfig};
//!
//! runtime::install(SchedulerConfig::virtual_time()).unwrap();
//! let answer = Promise::resolved(20).map(|v| v + 1).map(|v| v * 2);
//! assert_eq!(runtime::block_on(&answer).unwrap(), 42);
//! ```

pub mod scheduler;
pub mod task;

pub use scheduler::{current, install, Job, Scheduler, TickStats};
pub use task::TaskHandle;

use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::tracing_compat::debug;
use crate::types::Time;
use std::time::Duration;

/// Runs one tick of the current scheduler.
pub fn tick() -> TickStats {
    current().tick()
}

/// Ticks the current scheduler until it has nothing runnable.
pub fn run_until_idle() -> u64 {
    current().run_until_idle()
}

/// Lets `by` elapse on the current scheduler, firing due timers in order.
pub fn advance(by: Duration) {
    current().advance(by);
}

/// Current time on the current scheduler's clock.
#[must_use]
pub fn now() -> Time {
    current().now()
}

/// Number of timers scheduled on the current scheduler.
#[must_use]
pub fn pending_timers() -> usize {
    current().pending_timers()
}

/// Number of ticks the current scheduler has run.
#[must_use]
pub fn tick_count() -> u64 {
    current().tick_count()
}

/// Drives the current scheduler until `promise` settles.
///
/// Timers are waited for (slept on with the wall clock, jumped to with the
/// virtual clock). Awaiting counts as handling a rejection.
///
/// # Errors
///
/// The promise's rejection; `AlreadyCancelled` if it is cancelled; and
/// `NotResolvedInTime` if the scheduler runs out of work (or exceeds
/// `max_ticks`) while the promise is still pending.
pub fn block_on<T: Clone + 'static>(promise: &Promise<T>) -> Result<T> {
    let sched = current();
    promise.0.mark_observed();
    let mut ticks = 0_u64;
    loop {
        if let Some(outcome) = promise.outcome() {
            return outcome.into_result();
        }
        if sched.has_runnable_work() {
            sched.tick();
            ticks += 1;
            if let Some(max) = sched.config().max_ticks {
                if ticks >= max && promise.is_pending() {
                    debug!(promise = %promise.id(), ticks, "block_on gave up at max_ticks");
                    return Err(Error::not_resolved_in_time()
                        .with_context(format!("{} still pending after {ticks} ticks", promise.id())));
                }
            }
            continue;
        }
        match sched.next_timer_due() {
            Some(due) => sched.wait_until(due),
            None => {
                debug!(promise = %promise.id(), "block_on found the scheduler idle");
                return Err(Error::not_resolved_in_time().with_context(format!(
                    "{} created at {} is pending with nothing left to run",
                    promise.id(),
                    promise.source()
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::error::ErrorKind;
    use crate::test_utils::init_test_logging;
    use crate::time::delay;

    #[test]
    fn block_on_waits_for_timers() {
        init_test_logging();
        install(SchedulerConfig::virtual_time()).expect("install");
        let promise = delay(Duration::from_secs(5)).map(|elapsed| elapsed.as_secs());
        assert_eq!(block_on(&promise).expect("fulfilled"), 5);
        assert_eq!(now(), Time::from_secs(5));
    }

    #[test]
    fn block_on_reports_a_stuck_promise() {
        init_test_logging();
        install(SchedulerConfig::virtual_time()).expect("install");
        let stuck: Promise<u8> = Promise::new(|_, _| {});
        let err = block_on(&stuck).expect_err("never settles");
        assert_eq!(err.kind(), ErrorKind::NotResolvedInTime);
    }

    #[test]
    fn block_on_honours_max_ticks() {
        init_test_logging();
        install(SchedulerConfig::virtual_time().max_ticks(3)).expect("install");
        let mut promise = Promise::resolved(0_u32);
        for _ in 0..10 {
            promise = promise.map(|v| v + 1);
        }
        let err = block_on(&promise).expect_err("too many hops");
        assert_eq!(err.kind(), ErrorKind::NotResolvedInTime);
    }

    #[test]
    fn block_on_surfaces_cancellation() {
        init_test_logging();
        install(SchedulerConfig::virtual_time()).expect("install");
        let promise: Promise<u8> = Promise::new(|_, _| {});
        promise.cancel();
        let err = block_on(&promise).expect_err("cancelled");
        assert!(err.is_cancelled());
        assert_eq!(tick_count(), 0);
    }
}
