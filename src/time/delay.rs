//! Timer-backed promises.

use crate::promise::Promise;
use crate::runtime;
use std::rc::Rc;
use std::time::Duration;

/// A promise that fulfils with the elapsed time once `duration` has passed.
///
/// Durations shorter than the scheduler's tick interval are clamped up to one
/// tick. Cancelling the promise removes its timer, so the timer callback never
/// runs.
///
/// ```
/// use promissory::{runtime, time::delay, SchedulerConfig};
/// use std::time::Duration;
///
/// runtime::install(SchedulerConfig::virtual_time()).unwrap();
/// let ready = delay(Duration::from_millis(100));
/// runtime::advance(Duration::from_millis(99));
/// assert!(ready.is_pending());
/// runtime::advance(Duration::from_millis(1));
/// assert_eq!(ready.outcome().and_then(|o| o.ok()), Some(Duration::from_millis(100)));
/// ```
#[track_caller]
pub fn delay(duration: Duration) -> Promise<Duration> {
    Promise::new(move |resolver, on_cancel| {
        let sched = runtime::current();
        let key = sched.schedule_timer(duration, Box::new(move |elapsed| resolver.resolve(elapsed)));
        let sched = Rc::downgrade(&sched);
        on_cancel.register(move || {
            if let Some(sched) = sched.upgrade() {
                sched.cancel_timer(key);
            }
        });
    })
}

/// Like [`delay`], taking seconds as a float.
///
/// NaN, negative, and infinite values clamp to one tick.
#[track_caller]
pub fn delay_secs(secs: f64) -> Promise<Duration> {
    let duration = if secs.is_finite() {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    };
    delay(duration)
}
