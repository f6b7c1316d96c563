//! Awaiting promises from async code.
//!
//! A pending promise is awaited by registering a settle continuation that
//! wakes the polling task. The continuation is dispatched like any other, so
//! the task resumes in the same tick the continuation runs.

use crate::error::Result;
use crate::promise::Promise;
use crate::types::Outcome;
use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Future returned by [`Promise::await_status`]: resolves to the promise's
/// [`Outcome`], whatever it is.
#[must_use = "futures do nothing unless polled"]
pub struct Settled<T> {
    promise: Promise<T>,
    waker: Option<Rc<RefCell<Option<Waker>>>>,
}

impl<T: Clone + 'static> Settled<T> {
    pub(crate) fn new(promise: Promise<T>) -> Self {
        Self {
            promise,
            waker: None,
        }
    }
}

impl<T: Clone + 'static> Future for Settled<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.promise.0.mark_observed();
        if let Some(outcome) = self.promise.outcome() {
            return Poll::Ready(outcome);
        }
        if let Some(slot) = &self.waker {
            *slot.borrow_mut() = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let slot = Rc::new(RefCell::new(Some(cx.waker().clone())));
        let wake = Rc::clone(&slot);
        self.promise.0.subscribe_settle(
            Box::new(move |_| {
                if let Some(waker) = wake.borrow_mut().take() {
                    waker.wake();
                }
            }),
            true,
        );
        self.waker = Some(slot);
        Poll::Pending
    }
}

impl<T> std::fmt::Debug for Settled<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settled")
            .field("promise", &self.promise.0.id)
            .finish_non_exhaustive()
    }
}

/// Future returned by `promise.await`: `Ok` on fulfilment, the rejection
/// error otherwise. Cancellation surfaces as
/// [`ErrorKind::AlreadyCancelled`](crate::error::ErrorKind::AlreadyCancelled).
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct PromiseFuture<T> {
    settled: Settled<T>,
}

impl<T: Clone + 'static> Future for PromiseFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.settled).poll(cx).map(Outcome::into_result)
    }
}

impl<T: Clone + 'static> IntoFuture for Promise<T> {
    type Output = Result<T>;
    type IntoFuture = PromiseFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        PromiseFuture {
            settled: Settled::new(self),
        }
    }
}

impl<T: Clone + 'static> IntoFuture for &Promise<T> {
    type Output = Result<T>;
    type IntoFuture = PromiseFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.clone().into_future()
    }
}

/// Converts a panic escaping `future` into an `Err` carrying the payload.
pub(crate) struct CatchUnwind<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> CatchUnwind<F> {
    pub(crate) fn new(future: F) -> Self {
        Self {
            inner: Box::pin(future),
        }
    }
}

impl<F: Future> Future for CatchUnwind<F> {
    type Output = std::thread::Result<F::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = self.inner.as_mut();
        match catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Err(payload) => Poll::Ready(Err(payload)),
        }
    }
}

