//! Sequential combinators.
//!
//! Both combinators attach a settle observer to every input up front, so an
//! input that rejects before it is reached is not reported as unhandled. The
//! inputs are then consumed strictly in order.

use crate::error::{Error, Result};
use crate::promise::{Promise, Step};
use crate::runtime::{self, Scheduler, TaskHandle};
use crate::tracing_compat::trace;
use crate::types::Outcome;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::rc::{Rc, Weak};

/// Runs `predicate` on each input's value in order, waiting for the step it
/// returns before moving on. Fulfils with the values in input order.
///
/// The result rejects, and every input still pending is cancelled, when the
/// predicate rejects (or panics) or when an input is found rejected or
/// cancelled. An input that fails before the walk reaches it rejects the
/// result straight away, without waiting for the inputs ahead of it.
/// Cancelling the result cancels the inputs and the step in flight.
///
/// ```
/// use promissory::{combinator::each, runtime, Promise, SchedulerConfig};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// runtime::install(SchedulerConfig::virtual_time()).unwrap();
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let log = Rc::clone(&seen);
/// let done = each([Promise::resolved(1), Promise::resolved(2)], move |value, index| -> promissory::Result<()> {
///     log.borrow_mut().push((index, value));
///     Ok(())
/// });
/// assert_eq!(runtime::block_on(&done).unwrap(), vec![1, 2]);
/// assert_eq!(*seen.borrow(), vec![(0, 1), (1, 2)]);
/// ```
#[track_caller]
pub fn each<T, I, F, S>(promises: I, mut predicate: F) -> Promise<Vec<T>>
where
    T: Clone + 'static,
    I: IntoIterator<Item = Promise<T>>,
    F: FnMut(T, usize) -> S + 'static,
    S: Into<Step<()>> + 'static,
{
    let site = Location::caller();
    let inputs: Vec<Promise<T>> = promises.into_iter().collect();
    Promise::new(move |resolver, on_cancel| {
        let settled_early = inputs
            .iter()
            .enumerate()
            .find_map(|(index, input)| input.outcome().and_then(|outcome| failure(&outcome, index)));
        if let Some(error) = settled_early {
            trace!(promise = %resolver.id(), "each found a failed input up front");
            for input in &inputs {
                input.0.mark_observed();
            }
            resolver.reject(error);
            for input in &inputs {
                input.cancel();
            }
            return;
        }

        let sched = runtime::current();
        let weak_sched = Rc::downgrade(&sched);
        let state = Rc::new(RefCell::new(Walk {
            inputs: inputs.clone(),
            in_flight: None,
            task: None,
            reached: 0,
        }));

        let copies: Vec<Promise<Outcome<T>>> = inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let progress = Rc::clone(&state);
                let resolver = resolver.clone();
                let owner = weak_sched.clone();
                input.settle(move |outcome: Outcome<T>| {
                    let ahead = index > progress.borrow().reached;
                    if ahead && resolver.is_pending() {
                        if let Some(error) = failure(&outcome, index) {
                            trace!(promise = %resolver.id(), index, "input failed before it was reached");
                            resolver.reject(error);
                            Walk::stop(&progress, &owner);
                        }
                    }
                    Step::Fulfill(outcome)
                })
            })
            .collect();

        let task = {
            let walker = Rc::clone(&state);
            let owner = weak_sched.clone();
            sched.spawn_local(async move {
                let result = walk(&copies, &mut predicate, &walker, site).await;
                walker.borrow_mut().task = None;
                let failed = result.is_err();
                resolver.settle(result);
                if failed {
                    Walk::stop(&walker, &owner);
                }
            })
        };
        state.borrow_mut().task = Some(task);

        on_cancel.register(move || Walk::stop(&state, &weak_sched));
    })
}

/// What a running `each` owns and must release when it stops.
struct Walk<T> {
    inputs: Vec<Promise<T>>,
    in_flight: Option<Promise<()>>,
    task: Option<TaskHandle>,
    /// Index of the input the walk is waiting on or working through.
    reached: usize,
}

impl<T: Clone + 'static> Walk<T> {
    /// Aborts the walk task and cancels the step in flight and the inputs.
    /// Later calls find nothing left to release.
    fn stop(state: &RefCell<Self>, sched: &Weak<Scheduler>) {
        let (task, step, inputs) = {
            let mut walk = state.borrow_mut();
            (
                walk.task.take(),
                walk.in_flight.take(),
                std::mem::take(&mut walk.inputs),
            )
        };
        if let (Some(task), Some(sched)) = (task, sched.upgrade()) {
            sched.abort(task);
        }
        if let Some(step) = step {
            step.cancel();
        }
        for input in &inputs {
            input.cancel();
        }
    }
}

fn failure<T>(outcome: &Outcome<T>, index: usize) -> Option<Error> {
    match outcome {
        Outcome::Fulfilled(_) => None,
        Outcome::Rejected(error) => Some(error.clone()),
        Outcome::Cancelled => {
            Some(Error::already_cancelled().with_context(format!("input {index} was cancelled")))
        }
    }
}

async fn walk<T, F, S>(
    copies: &[Promise<Outcome<T>>],
    predicate: &mut F,
    state: &RefCell<Walk<T>>,
    site: &'static Location<'static>,
) -> Result<Vec<T>>
where
    T: Clone + 'static,
    F: FnMut(T, usize) -> S,
    S: Into<Step<()>>,
{
    let mut values = Vec::with_capacity(copies.len());
    for (index, copy) in copies.iter().enumerate() {
        state.borrow_mut().reached = index;
        let value = match copy.await? {
            Outcome::Fulfilled(value) => value,
            settled => return Err(failure(&settled, index).unwrap_or_else(Error::already_cancelled)),
        };
        let step = catch_unwind(AssertUnwindSafe(|| predicate(value.clone(), index)))
            .map_err(|payload| Error::from_panic(&*payload, site))?;
        let pending = Promise::<()>::from_step(step);
        state.borrow_mut().in_flight = Some(pending.clone());
        let outcome = pending.await;
        state.borrow_mut().in_flight.take();
        outcome?;
        trace!(index, "each step done");
        values.push(value);
    }
    Ok(values)
}

/// Folds the inputs in order: `reducer(acc, value, index)` returns the next
/// accumulator, as a value, a `Result`, or a promise to wait for.
///
/// Rejects with the first rejected input or reducer step.
#[track_caller]
pub fn fold<T, A, I, F, S>(promises: I, seed: A, mut reducer: F) -> Promise<A>
where
    T: Clone + 'static,
    A: Clone + 'static,
    I: IntoIterator<Item = Promise<T>>,
    F: FnMut(A, T, usize) -> S + 'static,
    S: Into<Step<A>> + 'static,
{
    let copies: Vec<Promise<Outcome<T>>> = promises.into_iter().map(|p| p.settled()).collect();
    Promise::spawn(async move {
        let mut acc = seed;
        for (index, copy) in copies.into_iter().enumerate() {
            let value = copy.await?.into_result()?;
            acc = Promise::<A>::from_step(reducer(acc, value, index)).await?;
        }
        Ok(acc)
    })
}
