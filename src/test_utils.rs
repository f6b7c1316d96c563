//! Test utilities for promissory.
//!
//! Shared helpers for unit tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - A virtual-clock scheduler constructor
//! - Outcome assertion macros

use crate::config::SchedulerConfig;
use crate::runtime::{self, Scheduler};
use std::rc::Rc;
use std::sync::{Mutex, Once};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once. `RUST_LOG` overrides
/// the level.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
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

/// Acquire the global environment lock for tests that mutate env vars.
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Install a fresh virtual-clock scheduler on this thread.
pub fn install_virtual() -> Rc<Scheduler> {
    init_test_logging();
    runtime::install(SchedulerConfig::virtual_time()).expect("virtual scheduler config is valid")
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

/// Assert that a promise's outcome is Fulfilled with a specific value.
#[macro_export]
macro_rules! assert_fulfilled {
    ($promise:expr, $expected:expr) => {
        match $promise.outcome() {
            Some($crate::types::Outcome::Fulfilled(v)) => assert_eq!(v, $expected),
            other => panic!("expected Fulfilled({:?}), got {:?}", $expected, other),
        }
    };
}

/// Assert that a promise's outcome is Rejected with a specific error kind.
#[macro_export]
macro_rules! assert_rejected {
    ($promise:expr, $kind:expr) => {
        match $promise.outcome() {
            Some($crate::types::Outcome::Rejected(e)) => assert_eq!(e.kind(), $kind),
            other => panic!("expected Rejected({:?}), got {:?}", $kind, other),
        }
    };
}

/// Assert that a promise is Cancelled.
#[macro_export]
macro_rules! assert_cancelled {
    ($promise:expr) => {
        match $promise.outcome() {
            Some($crate::types::Outcome::Cancelled) => {}
            other => panic!("expected Cancelled, got {:?}", other),
        }
    };
}
