//! Producer-side handles: [`Resolver`], [`OnCancel`], and handler results.

use crate::error::{Error, Result};
use crate::promise::core::{Node, Shared};
use crate::promise::Promise;
use crate::types::{Outcome, PromiseId, Status};
use core::fmt;
use std::rc::Rc;

/// What a handler wants to happen to the promise it feeds.
#[derive(Debug)]
pub enum Step<T> {
    /// Fulfil with a value.
    Fulfill(T),
    /// Reject with an error.
    Reject(Error),
    /// Follow another promise and settle the same way it does.
    Adopt(Promise<T>),
    /// Cancel.
    Cancel,
}

impl<T> From<Promise<T>> for Step<T> {
    fn from(promise: Promise<T>) -> Self {
        Self::Adopt(promise)
    }
}

impl<T> From<Result<T>> for Step<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Fulfill(value),
            Err(error) => Self::Reject(error),
        }
    }
}

impl<T> From<Outcome<T>> for Step<T> {
    fn from(outcome: Outcome<T>) -> Self {
        match outcome {
            Outcome::Fulfilled(value) => Self::Fulfill(value),
            Outcome::Rejected(error) => Self::Reject(error),
            Outcome::Cancelled => Self::Cancel,
        }
    }
}

/// Settles the promise it was created for.
///
/// Every method is a no-op once the promise has settled, so a resolver can be
/// cloned into several callbacks and the first one to fire wins.
pub struct Resolver<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resolver").field(&self.shared.id).finish()
    }
}

impl<T: Clone + 'static> Resolver<T> {
    pub(crate) fn new(shared: &Rc<Shared<T>>) -> Self {
        Self {
            shared: Rc::clone(shared),
        }
    }

    /// The id of the promise this resolver settles.
    #[must_use]
    pub fn id(&self) -> PromiseId {
        self.shared.id
    }

    /// Returns true until the promise settles.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.shared.is_pending()
    }

    /// Fulfils the promise with `value`.
    pub fn resolve(&self, value: T) {
        self.shared.fulfill(value);
    }

    /// Makes the promise follow `promise`.
    ///
    /// If the promise already settled, `promise` is told it lost a consumer,
    /// which cancels it when nothing else is waiting on it.
    pub fn resolve_with(&self, promise: &Promise<T>) {
        self.shared.adopt(promise);
    }

    /// Rejects the promise with `error`.
    pub fn reject(&self, error: Error) {
        self.shared.reject(error);
    }

    /// Fulfils on `Ok`, rejects on `Err`.
    pub fn settle(&self, result: Result<T>) {
        self.apply(result.into());
    }

    /// Applies a handler result.
    pub fn apply(&self, step: Step<T>) {
        self.shared.apply(step);
    }
}

/// Registers the cancellation hook of the promise being constructed.
#[derive(Clone)]
pub struct OnCancel {
    node: Rc<dyn Node>,
}

impl fmt::Debug for OnCancel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OnCancel").field(&self.node.id()).finish()
    }
}

impl OnCancel {
    pub(crate) fn new<T: Clone + 'static>(shared: &Rc<Shared<T>>) -> Self {
        Self {
            node: Rc::clone(shared) as Rc<dyn Node>,
        }
    }

    /// Installs `hook`, replacing any earlier one. It runs exactly once, when
    /// the promise is cancelled.
    ///
    /// If the promise is already cancelled the hook runs immediately and this
    /// returns true; producers use that to skip starting work.
    pub fn register(&self, hook: impl FnOnce() + 'static) -> bool {
        Rc::clone(&self.node).set_cancellation_hook(Box::new(hook))
    }

    /// Returns true once the promise has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.node.status() == Status::Cancelled
    }
}
