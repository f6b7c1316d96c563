//! Unhandled-rejection reporting.
//!
//! A rejected promise with no failure handler schedules a check for the end of
//! the next tick. If no handler, settle continuation, or awaiter has attached
//! by then, the rejection is reported once: to every hook registered with
//! [`on_unhandled_rejection`], and as a `warn!` record unless the scheduler
//! config disables it. A report never aborts anything.

use crate::error::Error;
use crate::runtime;
use crate::tracing_compat::warn;
use crate::types::PromiseId;
use crate::util::{Arena, ArenaIndex};
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::rc::Rc;

type HookFn = Rc<dyn Fn(&UnhandledRejection)>;

thread_local! {
    static HOOKS: RefCell<Arena<HookFn>> = const { RefCell::new(Arena::new()) };
}

/// A rejection nobody handled within a tick.
#[derive(Debug, Clone)]
pub struct UnhandledRejection {
    /// The rejected promise.
    pub promise: PromiseId,
    /// Where that promise was created.
    pub created_at: &'static Location<'static>,
    /// The rejection.
    pub error: Error,
}

/// Registers `hook` for every unhandled rejection on this thread.
///
/// The hook stays registered until the returned guard is dropped.
pub fn on_unhandled_rejection(hook: impl Fn(&UnhandledRejection) + 'static) -> UnhandledRejectionGuard {
    let slot = HOOKS.with(|hooks| hooks.borrow_mut().insert(Rc::new(hook)));
    UnhandledRejectionGuard { slot: Some(slot) }
}

/// Keeps an unhandled-rejection hook registered.
#[must_use = "the hook is removed when the guard is dropped"]
#[derive(Debug)]
pub struct UnhandledRejectionGuard {
    slot: Option<ArenaIndex>,
}

impl UnhandledRejectionGuard {
    /// Removes the hook now.
    pub fn disconnect(mut self) {
        self.remove();
    }

    /// Leaves the hook registered for the rest of the thread's life.
    pub fn detach(mut self) {
        self.slot = None;
    }

    fn remove(&mut self) {
        if let Some(slot) = self.slot.take() {
            // The thread-local may already be gone during thread teardown.
            let _ = HOOKS.try_with(|hooks| hooks.borrow_mut().remove(slot));
        }
    }
}

impl Drop for UnhandledRejectionGuard {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Number of hooks currently registered on this thread.
#[must_use]
pub fn hook_count() -> usize {
    HOOKS.with(|hooks| hooks.borrow().len())
}

pub(crate) fn report(rejection: &UnhandledRejection) {
    if runtime::current().config().report_unhandled_rejections {
        warn!(
            promise = %rejection.promise,
            created_at = %rejection.created_at,
            error = %rejection.error,
            "unhandled promise rejection"
        );
    }
    let hooks: Vec<HookFn> = HOOKS.with(|hooks| hooks.borrow().iter().map(|(_, h)| Rc::clone(h)).collect());
    for hook in hooks {
        if catch_unwind(AssertUnwindSafe(|| hook(rejection))).is_err() {
            warn!(promise = %rejection.promise, "unhandled-rejection hook panicked");
        }
    }
}
