//! Shared promise state and the cancellation graph.
//!
//! Every promise owns a [`Shared`] cell. Links between promises are weak in
//! both directions: a consumer does not keep its parent alive through the
//! graph, and a parent does not keep its consumers alive. Strong references
//! only live in continuation queues and user handles, so a promise that nobody
//! holds and nobody waits on is simply dropped.
//!
//! Cancellation flows downstream unconditionally (every cascading consumer is
//! cancelled) and upstream only when a pending promise loses its last
//! consumer, which makes it cancel itself and notify its own parent.

use crate::error::{Error, ErrorKind};
use crate::promise::resolver::Step;
use crate::promise::unhandled::{self, UnhandledRejection};
use crate::promise::Promise;
use crate::runtime::{self, Scheduler};
use crate::tracing_compat::{debug, trace, warn};
use crate::types::{Outcome, PromiseId, Status};
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::rc::{Rc, Weak};

type Callback<A> = Box<dyn FnOnce(A)>;
type Hook = Box<dyn FnOnce()>;

/// Type-erased view of a promise used for graph edges.
pub(crate) trait Node {
    fn id(&self) -> PromiseId;
    fn status(&self) -> Status;
    /// Cancels this node if pending, pushing its parent notification and
    /// cascading consumers onto `work` instead of recursing into them.
    fn cancel_step(self: Rc<Self>, work: &mut Vec<Unwind>);
    /// Drops `consumer` from this node; pushes a cancellation onto `work` if
    /// it was the last one.
    fn release_step(self: Rc<Self>, consumer: PromiseId, work: &mut Vec<Unwind>);
    /// Installs the cancellation hook. Returns true if the promise was already
    /// cancelled, in which case the hook has run.
    fn set_cancellation_hook(self: Rc<Self>, hook: Hook) -> bool;
}

/// Pending graph work while a cancellation spreads.
pub(crate) enum Unwind {
    Cancel(Rc<dyn Node>),
    Release {
        parent: Rc<dyn Node>,
        consumer: PromiseId,
    },
}

/// Drains `work` until the cancellation has reached every affected node.
///
/// Runs iteratively so chain depth never turns into stack depth.
fn unwind(mut work: Vec<Unwind>) {
    while let Some(item) = work.pop() {
        match item {
            Unwind::Cancel(node) => node.cancel_step(&mut work),
            Unwind::Release { parent, consumer } => parent.release_step(consumer, &mut work),
        }
    }
}

struct ConsumerLink {
    id: PromiseId,
    node: Weak<dyn Node>,
    /// Cancel the consumer when this promise is cancelled. Settle-derived
    /// consumers observe the cancellation through their handler instead.
    cascade: bool,
}

struct Inner<T> {
    outcome: Option<Outcome<T>>,
    hook: Option<Hook>,
    parent: Option<Weak<dyn Node>>,
    consumers: Vec<ConsumerLink>,
    on_fulfill: Vec<Callback<T>>,
    on_reject: Vec<Callback<Error>>,
    on_settle: Vec<Callback<Outcome<T>>>,
    unhandled_rejection: bool,
}

/// Everything taken out of a promise when it settles. Held until the
/// transition has finished propagating, then dropped outside any borrow.
struct Detached<T> {
    hook: Option<Hook>,
    parent: Option<Weak<dyn Node>>,
    consumers: Vec<ConsumerLink>,
    on_fulfill: Vec<Callback<T>>,
    on_reject: Vec<Callback<Error>>,
    on_settle: Vec<Callback<Outcome<T>>>,
}

impl<T> Inner<T> {
    fn detach(&mut self) -> Detached<T> {
        Detached {
            hook: self.hook.take(),
            parent: self.parent.take(),
            consumers: std::mem::take(&mut self.consumers),
            on_fulfill: std::mem::take(&mut self.on_fulfill),
            on_reject: std::mem::take(&mut self.on_reject),
            on_settle: std::mem::take(&mut self.on_settle),
        }
    }
}

/// Shared state behind a [`Promise`] handle.
pub(crate) struct Shared<T> {
    pub(crate) id: PromiseId,
    pub(crate) source: &'static Location<'static>,
    inner: RefCell<Inner<T>>,
}

impl<T: Clone + 'static> Shared<T> {
    pub(crate) fn new(source: &'static Location<'static>) -> Rc<Self> {
        let shared = Rc::new(Self {
            id: PromiseId::next(),
            source,
            inner: RefCell::new(Inner {
                outcome: None,
                hook: None,
                parent: None,
                consumers: Vec::new(),
                on_fulfill: Vec::new(),
                on_reject: Vec::new(),
                on_settle: Vec::new(),
                unhandled_rejection: true,
            }),
        });
        trace!(promise = %shared.id, source = %source, "promise created");
        shared
    }

    pub(crate) fn status(&self) -> Status {
        self.inner
            .borrow()
            .outcome
            .as_ref()
            .map_or(Status::Pending, Outcome::status)
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.inner.borrow().outcome.is_none()
    }

    pub(crate) fn outcome(&self) -> Option<Outcome<T>> {
        self.inner.borrow().outcome.clone()
    }

    pub(crate) fn mark_observed(&self) {
        self.inner.borrow_mut().unhandled_rejection = false;
    }

    pub(crate) fn consumer_count(&self) -> usize {
        self.inner.borrow().consumers.len()
    }

    /// Records `child` as a consumer of `self` and `self` as the child's parent.
    ///
    /// The consumer entry is only kept while `self` is pending; a settled
    /// promise has no graph left to propagate through.
    pub(crate) fn link_consumer<U: Clone + 'static>(
        self: &Rc<Self>,
        child: &Rc<Shared<U>>,
        cascade: bool,
    ) {
        let parent: Rc<dyn Node> = Rc::clone(self) as Rc<dyn Node>;
        child.inner.borrow_mut().parent = Some(Rc::downgrade(&parent));
        let mut inner = self.inner.borrow_mut();
        if inner.outcome.is_none() {
            let node: Rc<dyn Node> = Rc::clone(child) as Rc<dyn Node>;
            inner.consumers.push(ConsumerLink {
                id: child.id,
                node: Rc::downgrade(&node),
                cascade,
            });
        }
    }

    /// Attaches fulfil/reject continuations.
    ///
    /// Pending: queued. Fulfilled or Rejected: the matching continuation is
    /// deferred to the next tick. Returns false if `self` is cancelled, in
    /// which case neither continuation will ever run.
    pub(crate) fn subscribe(
        self: &Rc<Self>,
        on_fulfill: Callback<T>,
        on_reject: Callback<Error>,
    ) -> bool {
        let mut inner = self.inner.borrow_mut();
        inner.unhandled_rejection = false;
        match inner.outcome.clone() {
            None => {
                inner.on_fulfill.push(on_fulfill);
                inner.on_reject.push(on_reject);
                true
            }
            Some(Outcome::Fulfilled(value)) => {
                drop(inner);
                runtime::current().defer(move || on_fulfill(value));
                true
            }
            Some(Outcome::Rejected(error)) => {
                drop(inner);
                runtime::current().defer(move || on_reject(error));
                true
            }
            Some(Outcome::Cancelled) => false,
        }
    }

    /// Attaches a continuation that receives whatever outcome `self` reaches,
    /// including cancellation.
    pub(crate) fn subscribe_settle(self: &Rc<Self>, on_settle: Callback<Outcome<T>>, observe: bool) {
        let mut inner = self.inner.borrow_mut();
        if observe {
            inner.unhandled_rejection = false;
        }
        match inner.outcome.clone() {
            None => inner.on_settle.push(on_settle),
            Some(outcome) => {
                drop(inner);
                runtime::current().defer(move || on_settle(outcome));
            }
        }
    }

    pub(crate) fn fulfill(self: &Rc<Self>, value: T) {
        let detached = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return;
            }
            inner.outcome = Some(Outcome::Fulfilled(value.clone()));
            inner.detach()
        };
        trace!(promise = %self.id, "promise fulfilled");
        let sched = runtime::current();
        dispatch(&sched, detached.on_fulfill, &value);
        dispatch(&sched, detached.on_settle, &Outcome::Fulfilled(value));
    }

    pub(crate) fn reject(self: &Rc<Self>, error: Error) {
        let detached = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return;
            }
            inner.outcome = Some(Outcome::Rejected(error.clone()));
            inner.detach()
        };
        trace!(promise = %self.id, error = %error, "promise rejected");
        let sched = runtime::current();
        if detached.on_reject.is_empty() {
            self.schedule_unhandled_check(&sched, error.clone());
        } else {
            dispatch(&sched, detached.on_reject, &error);
        }
        dispatch(&sched, detached.on_settle, &Outcome::Rejected(error));
    }

    pub(crate) fn cancel(self: &Rc<Self>) {
        if self.is_pending() {
            unwind(vec![Unwind::Cancel(Rc::clone(self) as Rc<dyn Node>)]);
        }
    }

    /// Tells `self` that `consumer` no longer waits on it.
    pub(crate) fn release(self: &Rc<Self>, consumer: PromiseId) {
        unwind(vec![Unwind::Release {
            parent: Rc::clone(self) as Rc<dyn Node>,
            consumer,
        }]);
    }

    /// Settles `self` with the outcome of `other`.
    pub(crate) fn adopt(self: &Rc<Self>, other: &Promise<T>) {
        if !self.is_pending() {
            other.0.release(self.id);
            return;
        }
        if Rc::ptr_eq(self, &other.0) {
            self.reject(Error::execution("a promise cannot be resolved with itself"));
            return;
        }
        if other.0.status() == Status::Cancelled {
            self.cancel();
            return;
        }

        let on_value = Rc::clone(self);
        let on_error = Rc::clone(self);
        let intermediate = Shared::<()>::new(self.source);
        other.0.link_consumer(&intermediate, true);
        let subscribed = other.0.subscribe(
            advancer(&intermediate, move |value: T| {
                on_value.fulfill(value);
                Step::Fulfill(())
            }),
            advancer(&intermediate, move |error: Error| {
                let error = if error.kind() == ErrorKind::ExecutionError {
                    error.extend("chained to a promise that errored")
                } else {
                    error
                };
                on_error.reject(error);
                Step::Fulfill(())
            }),
        );
        if !subscribed {
            self.cancel();
            return;
        }
        trace!(promise = %self.id, adopted = %other.0.id, "promise adopting");
        intermediate.link_consumer(self, true);
    }

    pub(crate) fn apply(self: &Rc<Self>, step: Step<T>) {
        match step {
            Step::Fulfill(value) => self.fulfill(value),
            Step::Reject(error) => self.reject(error),
            Step::Adopt(promise) => self.adopt(&promise),
            Step::Cancel => self.cancel(),
        }
    }

    fn schedule_unhandled_check(self: &Rc<Self>, sched: &Scheduler, error: Error) {
        let promise = Rc::clone(self);
        sched.defer_check(move || {
            if promise.inner.borrow().unhandled_rejection {
                unhandled::report(&UnhandledRejection {
                    promise: promise.id,
                    created_at: promise.source,
                    error,
                });
            }
        });
    }
}

impl<T: Clone + 'static> Node for Shared<T> {
    fn id(&self) -> PromiseId {
        self.id
    }

    fn status(&self) -> Status {
        Self::status(self)
    }

    fn cancel_step(self: Rc<Self>, work: &mut Vec<Unwind>) {
        let detached = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return;
            }
            inner.outcome = Some(Outcome::Cancelled);
            inner.detach()
        };
        debug!(
            promise = %self.id,
            consumers = detached.consumers.len(),
            "promise cancelled"
        );

        if let Some(hook) = detached.hook {
            if catch_unwind(AssertUnwindSafe(hook)).is_err() {
                warn!(promise = %self.id, source = %self.source, "cancellation hook panicked");
            }
        }
        // Stack order: the parent is popped first, then the consumers in
        // registration order.
        for link in detached.consumers.iter().rev() {
            if link.cascade {
                if let Some(consumer) = link.node.upgrade() {
                    work.push(Unwind::Cancel(consumer));
                }
            }
        }
        if let Some(parent) = detached.parent.as_ref().and_then(Weak::upgrade) {
            work.push(Unwind::Release {
                parent,
                consumer: self.id,
            });
        }
        let sched = runtime::current();
        dispatch(&sched, detached.on_settle, &Outcome::Cancelled);
        // Consumers whose only strong references lived in these queues are
        // now held by `work`, so dropping the queues never recurses.
        drop(detached.on_fulfill);
        drop(detached.on_reject);
    }

    fn release_step(self: Rc<Self>, consumer: PromiseId, work: &mut Vec<Unwind>) {
        let orphaned = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return;
            }
            inner
                .consumers
                .retain(|link| link.id != consumer && link.node.strong_count() > 0);
            inner.consumers.is_empty()
        };
        if orphaned {
            trace!(promise = %self.id, "last consumer cancelled");
            let node: Rc<dyn Node> = self;
            work.push(Unwind::Cancel(node));
        }
    }

    fn set_cancellation_hook(self: Rc<Self>, hook: Hook) -> bool {
        let mut inner = self.inner.borrow_mut();
        let status = inner.outcome.as_ref().map_or(Status::Pending, Outcome::status);
        match status {
            Status::Pending => {
                inner.hook = Some(hook);
                false
            }
            Status::Cancelled => {
                drop(inner);
                hook();
                true
            }
            Status::Fulfilled | Status::Rejected => false,
        }
    }
}

/// Wraps a handler into a queue entry that settles `target` with the step the
/// handler returns.
///
/// The handler is skipped if `target` settled in the meantime (typically
/// because it was cancelled). A panic in the handler rejects `target` with an
/// execution error.
pub(crate) fn advancer<A, U, F>(target: &Rc<Shared<U>>, handler: F) -> Callback<A>
where
    A: 'static,
    U: Clone + 'static,
    F: FnOnce(A) -> Step<U> + 'static,
{
    let target = Rc::clone(target);
    Box::new(move |arg| {
        if !target.is_pending() {
            return;
        }
        match catch_unwind(AssertUnwindSafe(move || handler(arg))) {
            Ok(step) => target.apply(step),
            Err(payload) => target.reject(Error::from_panic(&*payload, target.source)),
        }
    })
}

fn dispatch<A: Clone + 'static>(sched: &Scheduler, callbacks: Vec<Callback<A>>, arg: &A) {
    for callback in callbacks {
        let arg = arg.clone();
        sched.defer(move || callback(arg));
    }
}
