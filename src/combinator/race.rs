//! Race combinator: first input to settle wins.
//!
//! The winner's fulfilment or rejection becomes the result and every other
//! input is cancelled. An input that is cancelled does not win; if every
//! input ends up cancelled, so does the race.

use crate::error::Error;
use crate::promise::{Promise, Step};
use crate::tracing_compat::trace;
use crate::types::{Outcome, Status};
use std::cell::RefCell;
use std::rc::Rc;

struct Contest<T> {
    inputs: Vec<Promise<T>>,
    watchers: Vec<Promise<()>>,
    cancelled: usize,
    decided: bool,
}

/// Settles like the first input to fulfil or reject, cancelling the others.
///
/// If an input has already settled when `race` is called, the result follows
/// it without attaching to the other inputs. An empty input rejects with
/// `ExecutionError`.
///
/// ```
/// use promissory::{combinator::race, runtime, time::delay, SchedulerConfig};
/// use std::time::Duration;
///
/// runtime::install(SchedulerConfig::virtual_time()).unwrap();
/// let slow = delay(Duration::from_secs(10)).map(|_| "slow");
/// let fast = delay(Duration::from_secs(1)).map(|_| "fast");
/// let winner = race([slow.clone(), fast]);
/// assert_eq!(runtime::block_on(&winner).unwrap(), "fast");
/// assert!(slow.outcome().is_some_and(|o| o.is_cancelled()));
/// ```
#[track_caller]
pub fn race<T, I>(promises: I) -> Promise<T>
where
    T: Clone + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let inputs: Vec<Promise<T>> = promises.into_iter().collect();
    if inputs.is_empty() {
        return Promise::rejected(Error::execution("race() needs at least one promise"));
    }
    if let Some(finished) = inputs
        .iter()
        .find(|p| matches!(p.status(), Status::Fulfilled | Status::Rejected))
    {
        return Promise::from_step(Step::Adopt(finished.clone()));
    }

    Promise::new(move |resolver, on_cancel| {
        let total = inputs.len();
        let contest = Rc::new(RefCell::new(Contest {
            inputs: inputs.clone(),
            watchers: Vec::with_capacity(total),
            cancelled: 0,
            decided: false,
        }));

        for (index, input) in inputs.iter().enumerate() {
            let entrant = Rc::clone(&contest);
            let resolver = resolver.clone();
            let watcher = input.settle(move |outcome: Outcome<T>| {
                let mut state = entrant.borrow_mut();
                if state.decided {
                    return Step::Fulfill(());
                }
                if outcome.is_cancelled() {
                    state.cancelled += 1;
                    if state.cancelled == total {
                        state.decided = true;
                        drop(state);
                        resolver.apply(Step::Cancel);
                    }
                    return Step::Fulfill(());
                }
                state.decided = true;
                let losers = std::mem::take(&mut state.inputs);
                state.watchers.clear();
                drop(state);
                trace!(promise = %resolver.id(), winner = index, "race decided");
                resolver.apply(Step::from(outcome));
                for (position, loser) in losers.into_iter().enumerate() {
                    if position != index {
                        loser.cancel();
                    }
                }
                Step::Fulfill(())
            });
            contest.borrow_mut().watchers.push(watcher);
        }

        on_cancel.register(move || {
            let watchers = {
                let mut state = contest.borrow_mut();
                state.decided = true;
                state.inputs.clear();
                std::mem::take(&mut state.watchers)
            };
            for watcher in watchers {
                watcher.cancel();
            }
        });
    })
}
