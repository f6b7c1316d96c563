//! Retry combinator.
//!
//! An attempt is whatever step the operation returns: a value, a `Result`, or
//! a promise to follow. A rejected attempt starts the next one until the
//! retries run out, at which point the last rejection is the result.
//!
//! Cancelling the returned promise cancels the attempt in flight (or the
//! pause before the next one) and no further attempt starts. A rejection with
//! `AlreadyCancelled` is never retried.

use crate::error::Error;
use crate::promise::{Promise, Step};
use crate::time::delay;
use crate::tracing_compat::debug;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Runs `operation`, retrying up to `times` more times while it rejects.
///
/// ```
/// use promissory::{combinator::retry, runtime, Error, SchedulerConfig};
///
/// runtime::install(SchedulerConfig::virtual_time()).unwrap();
/// let mut calls = 0;
/// let result = retry(
///     move || {
///         calls += 1;
///         if calls < 3 { Err(Error::rejected("flaky")) } else { Ok(calls) }
///     },
///     5,
/// );
/// assert_eq!(runtime::block_on(&result).unwrap(), 3);
/// ```
#[track_caller]
pub fn retry<T, F, S>(operation: F, times: usize) -> Promise<T>
where
    T: Clone + 'static,
    F: FnMut() -> S + 'static,
    S: Into<Step<T>>,
{
    attempt(Rc::new(RefCell::new(operation)), times, None, 1)
}

/// Like [`retry`], waiting `pause` between a rejection and the next attempt.
#[track_caller]
pub fn retry_with_delay<T, F, S>(operation: F, times: usize, pause: Duration) -> Promise<T>
where
    T: Clone + 'static,
    F: FnMut() -> S + 'static,
    S: Into<Step<T>>,
{
    attempt(Rc::new(RefCell::new(operation)), times, Some(pause), 1)
}

#[track_caller]
fn attempt<T, F, S>(
    operation: Rc<RefCell<F>>,
    remaining: usize,
    pause: Option<Duration>,
    number: usize,
) -> Promise<T>
where
    T: Clone + 'static,
    F: FnMut() -> S + 'static,
    S: Into<Step<T>>,
{
    let current = {
        let operation = Rc::clone(&operation);
        Promise::new(move |resolver, _| {
            let step = (*operation.borrow_mut())().into();
            resolver.apply(step);
        })
    };
    if remaining == 0 {
        return current;
    }
    current.catch(move |error: Error| {
        if !error.kind().is_retryable() {
            return Step::Reject(error);
        }
        debug!(attempt = number, remaining, error = %error, "attempt rejected, retrying");
        let next = move || attempt(operation, remaining - 1, pause, number + 1);
        match pause {
            None => Step::Adopt(next()),
            Some(pause) => Step::Adopt(delay(pause).and_then(move |_| next())),
        }
    })
}
