//! Cancellation graph tests: downward cascades, upward release of orphaned
//! producers, and how combinators prune the graph once they decide.

mod common;

use common::*;
use promissory::combinator::{all, race, retry_with_delay};
use promissory::runtime;
use promissory::time::delay;
use promissory::{Error, Promise, Status, Step};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// A pending promise that counts how often its cancellation hook runs.
fn producer(hook_runs: &Rc<Cell<u32>>) -> Promise<u32> {
    let counter = Rc::clone(hook_runs);
    Promise::new(move |_, on_cancel| {
        on_cancel.register(move || counter.set(counter.get() + 1));
    })
}

#[test]
fn cancelling_a_root_reaches_every_descendant() {
    setup();
    test_phase!("downward cascade");
    let hooks = Rc::new(Cell::new(0));
    let root = producer(&hooks);
    let left = root.map(|v| v + 1);
    let right = root.map(|v| v + 2);
    let leaf: Promise<u32> = left.then(|v| Promise::resolved(v * 2));

    root.cancel();
    for promise in [&left, &right, &leaf] {
        assert_cancelled!(promise);
    }
    assert_eq!(hooks.get(), 1);
    test_complete!("cancelling_a_root_reaches_every_descendant");
}

#[test]
fn cancelling_the_only_leaf_releases_the_whole_chain() {
    setup();
    let hooks = Rc::new(Cell::new(0));
    let root = producer(&hooks);
    let mut chain = vec![root.clone()];
    for _ in 0..200 {
        let next = chain.last().expect("non-empty").map(|v| v + 1);
        chain.push(next);
    }

    chain.last().expect("non-empty").cancel();
    assert!(chain.iter().all(|p| p.status() == Status::Cancelled));
    assert_eq!(hooks.get(), 1);
}

#[test]
fn a_producer_stays_alive_while_any_consumer_remains() {
    setup();
    test_phase!("upward release");
    let hooks = Rc::new(Cell::new(0));
    let root = producer(&hooks);
    let consumers: Vec<_> = (0..3).map(|i| root.map(move |v| v + i)).collect();

    consumers[0].cancel();
    consumers[2].cancel();
    assert!(root.is_pending());
    assert_eq!(root.consumer_count(), 1);

    consumers[1].cancel();
    assert_cancelled!(root);
    assert_eq!(hooks.get(), 1);
}

#[test]
fn settle_observers_see_cancellation_instead_of_cascading() {
    setup();
    let hooks = Rc::new(Cell::new(0));
    let root = producer(&hooks);
    let observed: Promise<Status> = root.settle(|outcome| Step::Fulfill(outcome.status()));

    root.cancel();
    assert!(observed.is_pending());
    assert_eq!(runtime::block_on(&observed).expect("fulfilled"), Status::Cancelled);
}

#[test]
fn cancelling_a_join_releases_its_diamond() {
    setup();
    test_phase!("diamond");
    let hooks = Rc::new(Cell::new(0));
    let root = producer(&hooks);
    let a = root.map(|v| v + 1);
    let b = root.map(|v| v * 2);
    let joined = all([a.clone(), b.clone()]);

    joined.cancel();
    assert_cancelled!(a);
    assert_cancelled!(b);
    assert_cancelled!(root);
    assert_eq!(hooks.get(), 1);
}

#[test]
fn cancelling_a_join_spares_shared_inputs() {
    setup();
    let hooks = Rc::new(Cell::new(0));
    let shared = producer(&hooks);
    let other_user = shared.map(|v| v + 1);
    let joined = all([shared.clone()]);

    joined.cancel();
    assert!(shared.is_pending());
    assert!(other_user.is_pending());
    assert_eq!(hooks.get(), 0);
}

#[test]
fn race_losers_release_their_timers() {
    setup();
    test_phase!("race losers");
    let fast = delay(Duration::from_millis(100)).then_return("fast");
    let slow = delay(Duration::from_secs(60)).then_return("slow");
    let winner = race([fast, slow.clone()]);
    assert_eq!(runtime::pending_timers(), 2);

    assert_eq!(runtime::block_on(&winner).expect("fulfilled"), "fast");
    assert_cancelled!(slow);
    assert_eq!(runtime::pending_timers(), 0);
}

#[test]
fn timeout_cancels_the_work_behind_it() {
    setup();
    let work = delay(Duration::from_secs(10)).map(|_| 1_u8);
    let limited = work.timeout(Duration::from_secs(1));

    let err = runtime::block_on(&limited).expect_err("timed out");
    assert!(err.is_timeout());
    assert_cancelled!(work);
    assert_eq!(runtime::pending_timers(), 0);
}

#[test]
fn failed_join_cancels_the_slow_inputs() {
    setup();
    let slow = delay(Duration::from_secs(30)).then_return(1_u8);
    let failing = delay(Duration::from_millis(10)).then(|_| Step::<u8>::Reject(Error::rejected("bad input")));
    let joined = all([slow.clone(), failing]);

    let err = runtime::block_on(&joined).expect_err("rejected");
    assert_eq!(err.message(), Some("bad input"));
    assert_cancelled!(slow);
    assert_eq!(runtime::pending_timers(), 0);
}

#[test]
fn cancelling_a_retry_stops_the_pause_timer() {
    setup();
    let attempts = Rc::new(Cell::new(0));
    let counter = Rc::clone(&attempts);
    let retried: Promise<u8> = retry_with_delay(
        move || {
            counter.set(counter.get() + 1);
            Err::<u8, _>(Error::rejected("still down"))
        },
        10,
        Duration::from_secs(5),
    );
    runtime::advance(Duration::from_secs(6));
    assert_eq!(attempts.get(), 2);

    retried.cancel();
    assert_eq!(runtime::pending_timers(), 0);
    runtime::advance(Duration::from_secs(60));
    assert_eq!(attempts.get(), 2);
}
