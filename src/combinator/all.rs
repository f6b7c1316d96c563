//! Threshold combinators: N-of-M completion.
//!
//! `some(inputs, n)` fulfils once `n` inputs have fulfilled and rejects as
//! soon as success is impossible, i.e. on the `len - n + 1`-th failure. A
//! cancelled input counts as a failure with `AlreadyCancelled`. Once the
//! result is decided, no further input is counted and every input that is
//! still pending is cancelled.
//!
//! `all` is `some(inputs, len)` with values in input order; `any` is
//! `some(inputs, 1)` unwrapped.

use crate::error::{Error, Result};
use crate::promise::{Promise, Resolver, Step};
use crate::tracing_compat::trace;
use crate::types::Outcome;
use std::cell::RefCell;
use std::rc::Rc;

/// Fulfils with every input's value, in input order.
///
/// Rejects with the first rejection; the remaining inputs are cancelled.
/// An empty input fulfils immediately with an empty `Vec`.
#[track_caller]
pub fn all<T, I>(promises: I) -> Promise<Vec<T>>
where
    T: Clone + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let inputs: Vec<Promise<T>> = promises.into_iter().collect();
    let needed = inputs.len();
    gather(inputs, needed, true)
}

/// Fulfils with the first `n` values, in completion order.
///
/// `n == 0` fulfils immediately with an empty `Vec`; `n` larger than the
/// number of inputs rejects with `ExecutionError`.
#[track_caller]
pub fn some<T, I>(promises: I, n: usize) -> Promise<Vec<T>>
where
    T: Clone + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    gather(promises.into_iter().collect(), n, false)
}

/// Fulfils with the first value to arrive; rejects once every input failed.
#[track_caller]
pub fn any<T, I>(promises: I) -> Promise<T>
where
    T: Clone + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    some(promises, 1).try_map(|mut values: Vec<T>| {
        values
            .pop()
            .ok_or_else(|| Error::execution("any() needs at least one promise"))
    })
}

/// Fulfils once every input settled, with one [`Outcome`] per input in input
/// order. Never rejects.
#[track_caller]
pub fn all_settled<T, I>(promises: I) -> Promise<Vec<Outcome<T>>>
where
    T: Clone + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let settled: Vec<Promise<Outcome<T>>> = promises.into_iter().map(|p| p.settled()).collect();
    all(settled)
}

struct Gather<T> {
    values: Vec<(usize, T)>,
    failures: usize,
    decided: bool,
    inputs: Vec<Promise<T>>,
    watchers: Vec<Promise<()>>,
}

impl<T: Clone + 'static> Gather<T> {
    /// Ends the bookkeeping and returns what still needs cancelling.
    fn decide(&mut self) -> (Vec<Promise<T>>, Vec<Promise<()>>) {
        self.decided = true;
        (
            std::mem::take(&mut self.inputs),
            std::mem::take(&mut self.watchers),
        )
    }
}

#[track_caller]
fn gather<T: Clone + 'static>(inputs: Vec<Promise<T>>, needed: usize, input_order: bool) -> Promise<Vec<T>> {
    if needed == 0 {
        return Promise::resolved(Vec::new());
    }
    if needed > inputs.len() {
        return Promise::rejected(Error::execution(format!(
            "cannot wait for {needed} of {} promises",
            inputs.len()
        )));
    }
    let tolerance = inputs.len() - needed;

    Promise::new(move |resolver, on_cancel| {
        let state = Rc::new(RefCell::new(Gather {
            values: Vec::with_capacity(needed),
            failures: 0,
            decided: false,
            inputs: inputs.clone(),
            watchers: Vec::with_capacity(inputs.len()),
        }));

        for (index, input) in inputs.iter().enumerate() {
            let tally = Rc::clone(&state);
            let resolver = resolver.clone();
            let watcher = input.settle(move |outcome: Outcome<T>| {
                record(&tally, &resolver, index, outcome, needed, tolerance, input_order);
                Step::Fulfill(())
            });
            state.borrow_mut().watchers.push(watcher);
        }

        on_cancel.register(move || {
            let (_, watchers) = state.borrow_mut().decide();
            for watcher in watchers {
                watcher.cancel();
            }
        });
    })
}

fn record<T: Clone + 'static>(
    state: &RefCell<Gather<T>>,
    resolver: &Resolver<Vec<T>>,
    index: usize,
    outcome: Outcome<T>,
    needed: usize,
    tolerance: usize,
    input_order: bool,
) {
    let mut gather = state.borrow_mut();
    if gather.decided {
        return;
    }
    let verdict: Option<Result<Vec<T>>> = match outcome {
        Outcome::Fulfilled(value) => {
            gather.values.push((index, value));
            (gather.values.len() == needed).then(|| {
                let mut values = std::mem::take(&mut gather.values);
                if input_order {
                    values.sort_by_key(|(index, _)| *index);
                }
                Ok(values.into_iter().map(|(_, value)| value).collect())
            })
        }
        Outcome::Rejected(error) => {
            gather.failures += 1;
            (gather.failures > tolerance).then_some(Err(error))
        }
        Outcome::Cancelled => {
            gather.failures += 1;
            (gather.failures > tolerance).then(|| {
                Err(Error::already_cancelled().with_context(format!("input {index} was cancelled")))
            })
        }
    };
    let Some(verdict) = verdict else {
        return;
    };
    let (inputs, _) = gather.decide();
    drop(gather);
    trace!(promise = %resolver.id(), ok = verdict.is_ok(), "threshold decided");
    resolver.settle(verdict);
    for input in inputs {
        input.cancel();
    }
}
