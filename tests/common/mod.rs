#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use promissory::runtime::{self, Scheduler};
use promissory::{on_unhandled_rejection, Promise, PromiseId, Resolver, SchedulerConfig};
use promissory::promise::UnhandledRejectionGuard;
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED_5EED;

const PROPTEST_SEED_ENV: &str = "PROMISSORY_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    // Honor an existing PROPTEST_RNG_SEED, otherwise apply our own.
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }
    std::env::var("CI").ok().map(|_| DEFAULT_PROPTEST_SEED)
}

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level. `RUST_LOG` overrides it.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Install a virtual-clock scheduler on the current test thread.
pub fn setup() -> Rc<Scheduler> {
    init_test_logging();
    runtime::install(SchedulerConfig::virtual_time()).expect("virtual scheduler config is valid")
}

/// A pending promise together with the resolver that settles it.
pub fn pending<T: Clone + 'static>() -> (Promise<T>, Resolver<T>) {
    let mut slot = None;
    let promise = Promise::new(|resolver, _| slot = Some(resolver));
    (promise, slot.expect("executor runs synchronously"))
}

/// Collects the ids of unhandled rejections reported while it is alive.
pub struct RejectionLog {
    seen: Rc<RefCell<Vec<PromiseId>>>,
    _guard: UnhandledRejectionGuard,
}

impl RejectionLog {
    /// Starts recording.
    pub fn install() -> Self {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let guard = on_unhandled_rejection(move |rejection| {
            tracing::debug!(promise = %rejection.promise, error = %rejection.error, "recorded unhandled rejection");
            sink.borrow_mut().push(rejection.promise);
        });
        Self { seen, _guard: guard }
    }

    /// Ids reported so far, in report order.
    pub fn ids(&self) -> Vec<PromiseId> {
        self.seen.borrow().clone()
    }

    /// Number of reports so far.
    pub fn len(&self) -> usize {
        self.seen.borrow().len()
    }
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Assert that a promise is Fulfilled with a specific value.
#[macro_export]
macro_rules! assert_fulfilled {
    ($promise:expr, $expected:expr) => {
        match $promise.outcome() {
            Some(::promissory::Outcome::Fulfilled(v)) => assert_eq!(v, $expected),
            other => panic!("expected Fulfilled({:?}), got {:?}", $expected, other),
        }
    };
}

/// Assert that a promise is Rejected with a specific error kind.
#[macro_export]
macro_rules! assert_rejected {
    ($promise:expr, $kind:expr) => {
        match $promise.outcome() {
            Some(::promissory::Outcome::Rejected(e)) => assert_eq!(e.kind(), $kind),
            other => panic!("expected Rejected({:?}), got {:?}", $kind, other),
        }
    };
}

/// Assert that a promise is Cancelled.
#[macro_export]
macro_rules! assert_cancelled {
    ($promise:expr) => {
        match $promise.outcome() {
            Some(::promissory::Outcome::Cancelled) => {}
            other => panic!("expected Cancelled, got {:?}", other),
        }
    };
}
