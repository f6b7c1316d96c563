//! Error types and error handling strategy for promissory.
//!
//! Rejections carry an [`Error`] instead of a raw payload so failures can be
//! inspected programmatically and re-wrapped without losing history:
//!
//! - Errors are typed by [`ErrorKind`] (no stringly-typed kinds)
//! - Every error may extend a parent error, forming a chain that
//!   [`Error::chain`] walks from newest to oldest
//! - Panics inside executors and handlers are converted to
//!   [`ErrorKind::ExecutionError`] and never unwind through the scheduler
//!
//! # Kinds
//!
//! - **ExecutionError**: a handler or executor panicked or failed
//! - **AlreadyCancelled**: a continuation was attached to, or awaited on, a
//!   cancelled promise
//! - **NotResolvedInTime**: a snapshot read observed a still-pending promise
//! - **TimedOut**: a `timeout` fired before the promise settled
//! - **Rejected**: a producer rejected explicitly

use core::fmt;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::Location;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A handler or executor panicked or returned a failure.
    ExecutionError,
    /// A continuation was attached to, or awaited on, a cancelled promise.
    AlreadyCancelled,
    /// A snapshot read found the promise still pending.
    NotResolvedInTime,
    /// A timeout elapsed before the promise settled.
    TimedOut,
    /// The producer rejected the promise explicitly.
    Rejected,
}

impl ErrorKind {
    /// Returns the stable name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutionError => "ExecutionError",
            Self::AlreadyCancelled => "AlreadyCancelled",
            Self::NotResolvedInTime => "NotResolvedInTime",
            Self::TimedOut => "TimedOut",
            Self::Rejected => "Rejected",
        }
    }

    /// Returns true if retrying the producing operation can plausibly succeed.
    ///
    /// Cancellation is final; everything else depends on the producer.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::AlreadyCancelled)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chainable failure record.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    context: Option<String>,
    trace: Option<String>,
    parent: Option<Arc<Error>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            context: None,
            trace: None,
            parent: None,
        }
    }

    /// Creates an explicit producer rejection.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Rejected).with_message(message)
    }

    /// Creates an execution error.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExecutionError).with_message(message)
    }

    /// Creates the error handed to continuations of a cancelled promise.
    #[must_use]
    pub fn already_cancelled() -> Self {
        Self::new(ErrorKind::AlreadyCancelled).with_message("promise is cancelled")
    }

    /// Creates the error returned by snapshot reads of pending promises.
    #[must_use]
    pub fn not_resolved_in_time() -> Self {
        Self::new(ErrorKind::NotResolvedInTime)
            .with_message("this promise was not resolved in time")
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timed_out() -> Self {
        Self::new(ErrorKind::TimedOut).with_message("timed out")
    }

    /// Converts a caught panic payload into an execution error.
    ///
    /// The panic message becomes the error message. The diagnostic trace
    /// records `site` followed by a backtrace of the catching stack when
    /// `RUST_BACKTRACE`/`RUST_LIB_BACKTRACE` enable capture.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send), site: &'static Location<'static>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with a non-string payload".to_string());
        Self::new(ErrorKind::ExecutionError)
            .with_message(message)
            .with_trace(panic_trace(site, &Backtrace::capture()))
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error (not its parents) has the given kind.
    #[must_use]
    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::AlreadyCancelled)
    }

    /// Returns true if this error is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::TimedOut)
    }

    /// Adds a message to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds free-form diagnostic context to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Attaches a captured diagnostic trace.
    #[must_use]
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Replaces the kind, keeping everything else.
    #[must_use]
    pub const fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Creates a new error of the same kind whose parent is `self`.
    ///
    /// This is the only way to build a parent link, so chains are acyclic.
    #[must_use]
    pub fn extend(&self, message: impl Into<String>) -> Self {
        Self {
            kind: self.kind,
            message: Some(message.into()),
            context: None,
            trace: None,
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the diagnostic context, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns the captured trace, if any.
    #[must_use]
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    /// Returns the error this one extends.
    #[must_use]
    pub fn parent(&self) -> Option<&Self> {
        self.parent.as_deref()
    }

    /// Returns this error followed by all of its ancestors.
    #[must_use]
    pub fn chain(&self) -> Vec<&Self> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent() {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Returns the oldest error in the chain.
    #[must_use]
    pub fn root(&self) -> &Self {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    fn fmt_one(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        if let Some(ctx) = &self.context {
            write!(f, " ({ctx})")?;
        }
        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_one(f)?;
        let mut current = self.parent();
        while let Some(parent) = current {
            f.write_str("\n  caused by: ")?;
            parent.fmt_one(f)?;
            current = parent.parent();
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.parent.as_ref().map(|e| e.as_ref() as _)
    }
}

/// A specialized Result type for promise operations.
#[allow(clippy::result_large_err)]
pub type Result<T> = core::result::Result<T, Error>;

fn panic_trace(site: &Location<'_>, backtrace: &Backtrace) -> String {
    match backtrace.status() {
        BacktraceStatus::Captured => format!("promise created at {site}\n{backtrace}"),
        _ => format!("promise created at {site}"),
    }
}
