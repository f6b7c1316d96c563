//! End-to-end promise lifecycle tests: settlement, chaining, async tasks,
//! and both clock modes.

mod common;

use common::*;
use promissory::runtime;
use promissory::time::{delay, delay_secs};
use promissory::types::Time;
use promissory::{ClockMode, Error, ErrorKind, Outcome, Promise, SchedulerConfig, Status, Step};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[test]
fn pipeline_settles_in_dependency_order() {
    setup();
    test_phase!("pipeline");
    let log = Rc::new(RefCell::new(Vec::new()));

    let l = Rc::clone(&log);
    let fetched = delay(Duration::from_millis(300)).map(move |_| {
        l.borrow_mut().push("fetched");
        vec![3_u32, 1, 2]
    });
    let l = Rc::clone(&log);
    let sorted = fetched.map(move |mut rows| {
        rows.sort_unstable();
        l.borrow_mut().push("sorted");
        rows
    });
    let l = Rc::clone(&log);
    let stored = sorted.and_then(move |rows| {
        l.borrow_mut().push("storing");
        delay(Duration::from_millis(200)).then_return(rows.len())
    });
    let l = Rc::clone(&log);
    let reported = stored.finally(move |status| {
        assert_eq!(status, Status::Fulfilled);
        l.borrow_mut().push("finally");
    });

    assert_eq!(runtime::block_on(&reported).expect("fulfilled"), 3);
    assert_eq!(*log.borrow(), vec!["fetched", "sorted", "storing", "finally"]);
    assert_eq!(runtime::now(), Time::from_millis(500));
    assert_fulfilled!(sorted, vec![1, 2, 3]);
    test_complete!("pipeline_settles_in_dependency_order");
}

#[test]
fn failure_skips_to_the_nearest_catch() {
    setup();
    test_phase!("failure propagation");
    let reached = Rc::new(RefCell::new(Vec::new()));

    let r = Rc::clone(&reached);
    let result = Promise::resolved(1_u32)
        .then(|_| -> promissory::Result<u32> { Err(Error::rejected("disk full")) })
        .map(move |v| {
            r.borrow_mut().push("map");
            v
        })
        .catch(|error| {
            assert_eq!(error.message(), Some("disk full"));
            Step::Fulfill(0)
        })
        .map(|v| v + 100);

    assert_eq!(runtime::block_on(&result).expect("recovered"), 100);
    assert!(reached.borrow().is_empty());
    test_complete!("failure_skips_to_the_nearest_catch");
}

#[test]
fn continuations_attached_after_settlement_still_run_later() {
    setup();
    let source = Promise::resolved("early");
    runtime::run_until_idle();

    let seen = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&seen);
    let late = source.tap(move |v| *sink.borrow_mut() = Some(*v));
    assert!(seen.borrow().is_none());
    runtime::tick();
    assert_eq!(*seen.borrow(), Some("early"));
    assert_fulfilled!(late, "early");
}

#[test]
fn tasks_interleave_deterministically_on_the_virtual_clock() {
    setup();
    test_phase!("interleaving");
    let log = Rc::new(RefCell::new(Vec::new()));

    let spawn_worker = |name: &'static str, step: u64| {
        let log = Rc::clone(&log);
        Promise::spawn(async move {
            for round in 0..3 {
                delay(Duration::from_millis(step)).await?;
                log.borrow_mut().push((name, round));
            }
            Ok::<_, Error>(name)
        })
    };
    let fast = spawn_worker("fast", 100);
    let slow = spawn_worker("slow", 250);

    let both = promissory::all([fast, slow]);
    assert_eq!(runtime::block_on(&both).expect("fulfilled"), vec!["fast", "slow"]);
    assert_eq!(
        *log.borrow(),
        vec![
            ("fast", 0),
            ("fast", 1),
            ("slow", 0),
            ("fast", 2),
            ("slow", 1),
            ("slow", 2),
        ]
    );
    assert_eq!(runtime::now(), Time::from_millis(750));
}

#[test]
fn advance_fires_only_what_is_due() {
    setup();
    let short = delay_secs(1.0);
    let long = delay_secs(3.0);
    runtime::advance(Duration::from_secs(2));
    assert_fulfilled!(short, Duration::from_secs(1));
    assert!(long.is_pending());
    assert_eq!(runtime::pending_timers(), 1);
}

#[test]
fn wall_clock_sleeps_for_timers() {
    init_test_logging();
    let sched = runtime::install(
        SchedulerConfig::new()
            .clock(ClockMode::Wall)
            .tick_interval(Duration::from_millis(1)),
    )
    .expect("install");
    assert_eq!(sched.clock_mode(), ClockMode::Wall);

    let started = Instant::now();
    let waited = runtime::block_on(&delay(Duration::from_millis(20))).expect("fulfilled");
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert!(waited >= Duration::from_millis(20));
}

#[test]
fn installing_a_new_scheduler_starts_fresh() {
    setup();
    let _old = delay(Duration::from_secs(1));
    assert_eq!(runtime::pending_timers(), 1);
    setup();
    assert_eq!(runtime::pending_timers(), 0);
    assert_eq!(runtime::now(), Time::ZERO);
    assert_eq!(runtime::tick_count(), 0);
}

#[test]
fn block_on_reports_cancellation_and_stalls() {
    setup();
    let (stalled, _resolver) = pending::<u8>();
    let err = runtime::block_on(&stalled).expect_err("nothing can settle it");
    assert_eq!(err.kind(), ErrorKind::NotResolvedInTime);

    stalled.cancel();
    let err = runtime::block_on(&stalled).expect_err("cancelled");
    assert_eq!(err.kind(), ErrorKind::AlreadyCancelled);
}

#[test]
fn settled_outcomes_are_visible_without_observing() {
    setup();
    let (promise, resolver) = pending::<u8>();
    assert_eq!(promise.outcome().map(|o| o.status()), None);
    resolver.reject(Error::rejected("x"));
    assert!(matches!(promise.outcome(), Some(Outcome::Rejected(_))));
    assert_eq!(promise.status(), Status::Rejected);
}
