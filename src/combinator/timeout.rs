//! Timeout combinator: race a promise against a timer.

use crate::combinator::race;
use crate::error::Error;
use crate::promise::{Promise, Step};
use crate::time::delay;
use std::time::Duration;

/// Settles like `promise`, unless `duration` passes first, in which case the
/// result rejects with `error` and `promise` is cancelled.
///
/// When `promise` wins, the timer is cancelled. A promise that has already
/// settled is followed directly without starting a timer.
#[track_caller]
pub fn timeout<T: Clone + 'static>(promise: &Promise<T>, duration: Duration, error: Error) -> Promise<T> {
    if !promise.is_pending() {
        return Promise::from_step(Step::Adopt(promise.clone()));
    }
    let timer = delay(duration).then(move |_| Step::<T>::Reject(error));
    race([promise.clone(), timer])
}
