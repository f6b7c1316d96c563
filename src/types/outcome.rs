//! Promise status and settled outcome.
//!
//! A promise moves exactly once from [`Status::Pending`] to one of three
//! terminal states. The settled value is an [`Outcome`]:
//!
//! - `Fulfilled(T)`: success with a value
//! - `Rejected(Error)`: failure
//! - `Cancelled`: nobody wants the value any more
//!
//! Cancellation is a distinct terminal state, not an error. Code that needs a
//! `Result` sees it as [`ErrorKind::AlreadyCancelled`](crate::ErrorKind).

use crate::error::{Error, Result};
use core::fmt;

/// The lifecycle state of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Not settled yet.
    Pending,
    /// Settled with a value.
    Fulfilled,
    /// Settled with an error.
    Rejected,
    /// Cancelled before it settled.
    Cancelled,
}

impl Status {
    /// Returns true for every state except `Pending`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns true if the promise has not settled.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Fulfilled => "fulfilled",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// The terminal value of a promise.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// Settled with a value.
    Fulfilled(T),
    /// Settled with an error.
    Rejected(Error),
    /// Cancelled before it settled.
    Cancelled,
}

impl<T> Outcome<T> {
    /// Returns the status this outcome corresponds to.
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::Fulfilled(_) => Status::Fulfilled,
            Self::Rejected(_) => Status::Rejected,
            Self::Cancelled => Status::Cancelled,
        }
    }

    /// Returns true if this outcome is `Fulfilled`.
    #[must_use]
    pub const fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    /// Returns true if this outcome is `Rejected`.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Returns true if this outcome is `Cancelled`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the fulfilled value, if any.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Fulfilled(v) => Some(v),
            Self::Rejected(_) | Self::Cancelled => None,
        }
    }

    /// Returns the rejection error, if any.
    pub fn err(self) -> Option<Error> {
        match self {
            Self::Rejected(e) => Some(e),
            Self::Fulfilled(_) | Self::Cancelled => None,
        }
    }

    /// Converts to a `Result`, mapping cancellation to `AlreadyCancelled`.
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Fulfilled(v) => Ok(v),
            Self::Rejected(e) => Err(e),
            Self::Cancelled => Err(Error::already_cancelled()),
        }
    }

    /// Maps the fulfilled value using the provided function.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Fulfilled(v) => Outcome::Fulfilled(f(v)),
            Self::Rejected(e) => Outcome::Rejected(e),
            Self::Cancelled => Outcome::Cancelled,
        }
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(v) => Self::Fulfilled(v),
            Err(e) => Self::Rejected(e),
        }
    }
}
