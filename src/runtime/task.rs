//! Spawned future tasks.
//!
//! A [`LocalTask`] owns a type-erased `!Send` future. Its waker is `Send`
//! (the `Waker` contract requires it) and records the task's slot in a shared
//! wake list that the scheduler drains once per tick.

use crate::tracing_compat::trace;
use crate::util::ArenaIndex;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

/// Slots of tasks whose wakers fired since the last drain.
pub(crate) type WakeList = Arc<Mutex<Vec<ArenaIndex>>>;

/// Handle to a spawned task, used to abort it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub(crate) ArenaIndex);

/// A future stored in the scheduler's task table.
pub(crate) struct LocalTask {
    future: Pin<Box<dyn Future<Output = ()>>>,
    waker: Waker,
    poll_count: u64,
}

impl LocalTask {
    pub(crate) fn new<F>(future: F, slot: ArenaIndex, woken: &WakeList) -> Self
    where
        F: Future<Output = ()> + 'static,
    {
        let waker = Waker::from(Arc::new(TaskWaker {
            slot,
            woken: Arc::clone(woken),
        }));
        Self {
            future: Box::pin(future),
            waker,
            poll_count: 0,
        }
    }

    /// Polls the task once with its own waker.
    pub(crate) fn poll(&mut self, slot: ArenaIndex) -> Poll<()> {
        self.poll_count += 1;
        let mut cx = Context::from_waker(&self.waker);
        let result = self.future.as_mut().poll(&mut cx);
        trace!(
            task = ?slot,
            poll_number = self.poll_count,
            ready = result.is_ready(),
            "task polled"
        );
        result
    }

    /// Queues the task for its next poll.
    pub(crate) fn wake(&self) {
        self.waker.wake_by_ref();
    }
}

impl std::fmt::Debug for LocalTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTask")
            .field("poll_count", &self.poll_count)
            .finish_non_exhaustive()
    }
}

struct TaskWaker {
    slot: ArenaIndex,
    woken: WakeList,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.woken.lock().push(self.slot);
    }
}
