//! Promises: deferred values with explicit state and cancellation.
//!
//! A [`Promise<T>`] is a cheap handle to a value that settles exactly once, as
//! `Fulfilled(T)`, `Rejected(Error)`, or `Cancelled`. Producers settle it
//! through a [`Resolver`]; consumers attach continuations that each return a
//! new promise.
//!
//! Continuations never run inside the call that settles a promise. They are
//! queued on the thread's scheduler and run on the next tick, so a producer's
//! stack never re-enters consumer code.
//!
//! # Cancellation
//!
//! Promises form a graph. Each chained promise is a *consumer* of the promise
//! it was chained from (its *parent*):
//!
//! - cancelling a promise cancels all of its chained consumers;
//! - a pending promise whose last consumer is cancelled cancels itself, and
//!   in turn notifies its own parent.
//!
//! ```
//! use promissory::{runtime, Promise, SchedulerConfig, Status};
//!
//! runtime::install(SchedulerConfig::virtual_time()).unwrap();
//! let source: Promise<u32> = Promise::new(|_resolve, _on_cancel| {});
//! let doubled = source.map(|v| v * 2);
//! doubled.cancel();
//! assert_eq!(source.status(), Status::Cancelled);
//! ```

mod core;
mod future;
mod resolver;
pub mod unhandled;

pub use self::future::{PromiseFuture, Settled};
pub use self::resolver::{OnCancel, Resolver, Step};
pub use self::unhandled::{on_unhandled_rejection, UnhandledRejection, UnhandledRejectionGuard};

use self::core::{advancer, Shared};
use self::future::CatchUnwind;
use crate::error::{Error, Result};
use crate::runtime;
use crate::types::{Outcome, PromiseId, Status};
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::rc::Rc;
use std::time::Duration;

/// A deferred value. Cloning the handle does not clone the promise.
pub struct Promise<T>(pub(crate) Rc<Shared<T>>);

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.0.id)
            .field("source", &format_args!("{}", self.0.source))
            .finish_non_exhaustive()
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// Creates a promise and runs `executor` immediately.
    ///
    /// The executor receives the [`Resolver`] and an [`OnCancel`] registrar. A
    /// panic inside the executor rejects the promise with an execution error
    /// (unless it already settled).
    #[track_caller]
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T>, OnCancel),
    {
        let shared = Shared::new(Location::caller());
        let resolver = Resolver::new(&shared);
        let on_cancel = OnCancel::new(&shared);
        if let Err(payload) = catch_unwind(AssertUnwindSafe(move || executor(resolver, on_cancel))) {
            shared.reject(Error::from_panic(&*payload, shared.source));
        }
        Self(shared)
    }

    /// Like [`Promise::new`], but the executor runs on the next tick.
    #[track_caller]
    pub fn defer<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T>, OnCancel) + 'static,
    {
        let shared = Shared::new(Location::caller());
        let resolver = Resolver::new(&shared);
        let on_cancel = OnCancel::new(&shared);
        let target = Rc::clone(&shared);
        runtime::current().defer(move || {
            if !target.is_pending() {
                return;
            }
            if let Err(payload) =
                catch_unwind(AssertUnwindSafe(move || executor(resolver, on_cancel)))
            {
                target.reject(Error::from_panic(&*payload, target.source));
            }
        });
        Self(shared)
    }

    /// Runs `future` as a scheduler task and settles with its result.
    ///
    /// Cancelling the promise drops the task. A panic inside the future rejects
    /// the promise with an execution error.
    #[track_caller]
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + 'static,
    {
        let site = Location::caller();
        Self::new_at(site, move |resolver, on_cancel| {
            let sched = runtime::current();
            let handle = sched.spawn_local(async move {
                match CatchUnwind::new(future).await {
                    Ok(result) => resolver.settle(result),
                    Err(payload) => resolver.reject(Error::from_panic(&*payload, site)),
                }
            });
            let sched = Rc::downgrade(&sched);
            on_cancel.register(move || {
                if let Some(sched) = sched.upgrade() {
                    sched.abort(handle);
                }
            });
        })
    }

    /// A promise already fulfilled with `value`.
    #[track_caller]
    pub fn resolved(value: T) -> Self {
        let shared = Shared::new(Location::caller());
        shared.fulfill(value);
        Self(shared)
    }

    /// A promise already rejected with `error`.
    #[track_caller]
    pub fn rejected(error: Error) -> Self {
        let shared = Shared::new(Location::caller());
        shared.reject(error);
        Self(shared)
    }

    /// Runs `f` now and lifts its result into a promise. A panic becomes an
    /// execution error.
    #[track_caller]
    pub fn wrap<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<T>,
    {
        Self::new_at(Location::caller(), move |resolver, _| resolver.settle(f()))
    }

    /// A promise settled (or adopting) according to `step`.
    #[track_caller]
    pub fn from_step(step: impl Into<Step<T>>) -> Self {
        let shared = Shared::new(Location::caller());
        shared.apply(step.into());
        Self(shared)
    }

    fn new_at<F>(site: &'static Location<'static>, executor: F) -> Self
    where
        F: FnOnce(Resolver<T>, OnCancel),
    {
        let shared = Shared::new(site);
        let resolver = Resolver::new(&shared);
        let on_cancel = OnCancel::new(&shared);
        if let Err(payload) = catch_unwind(AssertUnwindSafe(move || executor(resolver, on_cancel))) {
            shared.reject(Error::from_panic(&*payload, site));
        }
        Self(shared)
    }

    /// This promise's id.
    #[must_use]
    pub fn id(&self) -> PromiseId {
        self.0.id
    }

    /// Where this promise was created.
    #[must_use]
    pub fn source(&self) -> &'static Location<'static> {
        self.0.source
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.0.status()
    }

    /// Returns true until the promise settles.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.0.is_pending()
    }

    /// The settled outcome, or `None` while pending. Does not count as
    /// observing a rejection.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome<T>> {
        self.0.outcome()
    }

    /// Number of live chained consumers.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.0.consumer_count()
    }

    /// Cancels the promise if it is still pending.
    ///
    /// Runs the cancellation hook, cancels every chained consumer, and tells
    /// the parent it lost a consumer.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Attaches both continuations; the returned promise settles with the
    /// [`Step`] the invoked handler returns.
    ///
    /// If this promise is already cancelled the result is rejected with
    /// `AlreadyCancelled`.
    #[track_caller]
    pub fn chain<U, F, R, SF, SR>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> SF + 'static,
        SF: Into<Step<U>>,
        R: FnOnce(Error) -> SR + 'static,
        SR: Into<Step<U>>,
    {
        let child = Shared::<U>::new(Location::caller());
        self.0.link_consumer(&child, true);
        let subscribed = self.0.subscribe(
            advancer(&child, move |value| on_fulfilled(value).into()),
            advancer(&child, move |error| on_rejected(error).into()),
        );
        if !subscribed {
            child.reject(
                Error::already_cancelled()
                    .with_context(format!("chained onto {} created at {}", self.0.id, self.0.source)),
            );
        }
        Promise(child)
    }

    /// Fulfilment continuation; rejections pass through unchanged.
    ///
    /// The handler may return a `Result<U>`, a `Promise<U>` to follow, an
    /// `Outcome<U>`, or a [`Step<U>`].
    #[track_caller]
    pub fn then<U, F, S>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> S + 'static,
        S: Into<Step<U>>,
    {
        self.chain(on_fulfilled, Step::Reject)
    }

    /// Maps the fulfilled value.
    #[track_caller]
    pub fn map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.chain(move |value| Step::Fulfill(f(value)), Step::Reject)
    }

    /// Maps the fulfilled value with a fallible function.
    #[track_caller]
    pub fn try_map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<U> + 'static,
    {
        self.chain(f, Step::Reject)
    }

    /// Continues with the promise `f` returns.
    #[track_caller]
    pub fn and_then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Promise<U> + 'static,
    {
        self.chain(move |value| Step::Adopt(f(value)), Step::Reject)
    }

    /// Rejection continuation; fulfilment passes through unchanged.
    #[track_caller]
    pub fn catch<F, S>(&self, on_rejected: F) -> Self
    where
        F: FnOnce(Error) -> S + 'static,
        S: Into<Step<T>>,
    {
        self.chain(Step::Fulfill, on_rejected)
    }

    /// Runs `f` on the fulfilled value and passes the value through.
    #[track_caller]
    pub fn tap<F>(&self, f: F) -> Self
    where
        F: FnOnce(&T) + 'static,
    {
        self.chain(
            move |value| {
                f(&value);
                Step::Fulfill(value)
            },
            Step::Reject,
        )
    }

    /// Replaces the fulfilled value with `value`.
    #[track_caller]
    pub fn then_return<U: Clone + 'static>(&self, value: U) -> Promise<U> {
        self.map(move |_| value)
    }

    /// Attaches a handler that sees the outcome, whatever it is.
    ///
    /// Unlike [`Promise::chain`], cancelling this promise does not cancel the
    /// returned one directly: the handler runs with `Outcome::Cancelled` and
    /// decides.
    #[track_caller]
    pub fn settle<U, F, S>(&self, on_settled: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(Outcome<T>) -> S + 'static,
        S: Into<Step<U>>,
    {
        self.settle_at(Location::caller(), true, move |outcome| on_settled(outcome).into())
    }

    /// Runs `f` with the final status and passes the outcome through.
    #[track_caller]
    pub fn finally<F>(&self, f: F) -> Self
    where
        F: FnOnce(Status) + 'static,
    {
        self.settle_at(Location::caller(), true, move |outcome: Outcome<T>| {
            f(outcome.status());
            Step::from(outcome)
        })
    }

    /// Like [`Promise::finally`], but the handler is skipped for rejections,
    /// which propagate untouched to the returned promise.
    #[track_caller]
    pub fn done<F>(&self, f: F) -> Self
    where
        F: FnOnce(Status) + 'static,
    {
        self.settle_at(Location::caller(), true, move |outcome: Outcome<T>| {
            if !outcome.is_rejected() {
                f(outcome.status());
            }
            Step::from(outcome)
        })
    }

    /// A promise that always fulfils, with this promise's outcome.
    #[track_caller]
    pub fn settled(&self) -> Promise<Outcome<T>> {
        self.settle_at(Location::caller(), true, Step::Fulfill)
    }

    fn settle_at<U, F>(&self, site: &'static Location<'static>, observe: bool, handler: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(Outcome<T>) -> Step<U> + 'static,
    {
        let child = Shared::<U>::new(site);
        self.0.link_consumer(&child, false);
        self.0.subscribe_settle(advancer(&child, handler), observe);
        Promise(child)
    }

    /// Snapshot read: a promise that fulfils with the value if this promise is
    /// already fulfilled, and rejects with `NotResolvedInTime` otherwise.
    #[track_caller]
    pub fn now(&self) -> Self {
        if self.status() == Status::Fulfilled {
            return self.chain(Step::Fulfill, Step::Reject);
        }
        Self::rejected(
            Error::not_resolved_in_time()
                .with_context(format!("{} created at {} is {}", self.0.id, self.0.source, self.status())),
        )
    }

    /// Rejects with `TimedOut` unless this promise settles within `duration`.
    #[track_caller]
    pub fn timeout(&self, duration: Duration) -> Self {
        let error = Error::timed_out().with_context(format!("no result within {duration:?}"));
        crate::combinator::timeout(self, duration, error)
    }

    /// Rejects with `error` unless this promise settles within `duration`.
    #[track_caller]
    pub fn timeout_with(&self, duration: Duration, error: Error) -> Self {
        crate::combinator::timeout(self, duration, error)
    }

    /// Future yielding the [`Outcome`], including cancellation.
    pub fn await_status(&self) -> Settled<T> {
        Settled::new(self.clone())
    }

    /// Awaits the value.
    ///
    /// # Panics
    ///
    /// Panics if the promise rejects or is cancelled. Inside
    /// [`Promise::spawn`] that panic rejects the spawned promise.
    pub async fn expect(self) -> T {
        let id = self.0.id;
        let source = self.0.source;
        match self.await_status().await {
            Outcome::Fulfilled(value) => value,
            Outcome::Rejected(error) => panic!("{id} created at {source} rejected: {error}"),
            Outcome::Cancelled => panic!("{id} created at {source} was cancelled"),
        }
    }
}

/// Turns a fallible function into one that returns promises.
///
/// Each call runs `f` immediately; a panic becomes an execution error.
pub fn promisify<A, T, F>(f: F) -> impl Fn(A) -> Promise<T>
where
    T: Clone + 'static,
    F: Fn(A) -> Result<T>,
{
    move |arg| Promise::wrap(|| f(arg))
}
