//! Time-sorted doubly-linked timer queue.
//!
//! Nodes live in an [`Arena`] and link to each other by index, so a node can
//! be unlinked in O(1) from its own `prev`/`next` without walking the list.
//! Insertion walks backwards from the tail, which is O(n) in the worst case
//! and O(1) for the common case of monotonically increasing deadlines.
//!
//! The list is sorted ascending by due time. Nodes with equal due times keep
//! insertion order: a new node is placed after every node due at or before
//! its own deadline.

use crate::types::Time;
use crate::util::{Arena, ArenaIndex};
use core::fmt;
use std::time::Duration;

/// Callback fired when a timer expires; receives the elapsed time since the
/// timer was scheduled.
pub type TimerCallback = Box<dyn FnOnce(Duration)>;

/// Handle to a scheduled timer.
///
/// Stale keys (the timer already fired or was cancelled) are detected and
/// ignored; they never alias a newer timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey(ArenaIndex);

struct TimerNode {
    due: Time,
    start: Time,
    callback: Option<TimerCallback>,
    prev: Option<ArenaIndex>,
    next: Option<ArenaIndex>,
}

impl fmt::Debug for TimerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerNode")
            .field("due", &self.due)
            .field("start", &self.start)
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

/// A timer fired by [`TimerQueue::pop_due`].
pub struct Expired {
    /// The callback to run.
    pub callback: TimerCallback,
    /// Time between scheduling and `now`.
    pub elapsed: Duration,
    /// The deadline the timer was scheduled for.
    pub due: Time,
}

impl fmt::Debug for Expired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expired")
            .field("elapsed", &self.elapsed)
            .field("due", &self.due)
            .finish_non_exhaustive()
    }
}

/// Sorted timer list with O(1) cancellation.
#[derive(Debug, Default)]
pub struct TimerQueue {
    nodes: Arena<TimerNode>,
    head: Option<ArenaIndex>,
    tail: Option<ArenaIndex>,
    connected: bool,
}

impl TimerQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scheduled timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no timers are scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns true while the queue holds at least one timer.
    ///
    /// The scheduler only reads the clock for timers while connected.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Deadline of the earliest timer.
    #[must_use]
    pub fn next_due(&self) -> Option<Time> {
        self.head.and_then(|idx| self.nodes.get(idx)).map(|n| n.due)
    }

    /// Returns true if `key` refers to a timer that is still scheduled.
    #[must_use]
    pub fn contains(&self, key: TimerKey) -> bool {
        self.nodes.contains(key.0)
    }

    /// Schedules `callback` to fire at `now + delay`.
    pub fn insert(&mut self, now: Time, delay: Duration, callback: TimerCallback) -> TimerKey {
        self.insert_at(now, now + delay, callback)
    }

    /// Schedules `callback` to fire at `due`; `start` is used to report the
    /// elapsed time when it fires.
    pub fn insert_at(&mut self, start: Time, due: Time, callback: TimerCallback) -> TimerKey {
        // Walk back from the tail to the last node due at or before `due`.
        let mut after = self.tail;
        while let Some(idx) = after {
            let Some(node) = self.nodes.get(idx) else {
                break;
            };
            if node.due <= due {
                break;
            }
            after = node.prev;
        }

        let next = match after {
            Some(idx) => self.nodes.get(idx).and_then(|n| n.next),
            None => self.head,
        };
        let idx = self.nodes.insert(TimerNode {
            due,
            start,
            callback: Some(callback),
            prev: after,
            next,
        });

        match after {
            Some(prev) => self.node_mut(prev).next = Some(idx),
            None => self.head = Some(idx),
        }
        match next {
            Some(next) => self.node_mut(next).prev = Some(idx),
            None => self.tail = Some(idx),
        }

        if !self.connected {
            self.connected = true;
            crate::tracing_compat::trace!("timer queue connected");
        }
        TimerKey(idx)
    }

    /// Cancels a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, key: TimerKey) -> bool {
        self.unlink(key.0).is_some()
    }

    /// Removes and returns the earliest timer if it is due at `now`.
    pub fn pop_due(&mut self, now: Time) -> Option<Expired> {
        let head = self.head?;
        if self.nodes.get(head)?.due > now {
            return None;
        }
        let mut node = self.unlink(head)?;
        let callback = node.callback.take()?;
        Some(Expired {
            callback,
            elapsed: now.duration_since(node.start),
            due: node.due,
        })
    }

    /// Deadlines in list order (earliest first).
    pub fn deadlines(&self) -> impl Iterator<Item = Time> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = self.nodes.get(cursor?)?;
            cursor = node.next;
            Some(node.due)
        })
    }

    fn node_mut(&mut self, idx: ArenaIndex) -> &mut TimerNode {
        self.nodes.get_mut(idx).expect("linked timer node missing")
    }

    fn unlink(&mut self, idx: ArenaIndex) -> Option<TimerNode> {
        let node = self.nodes.remove(idx)?;
        match node.prev {
            Some(prev) => self.node_mut(prev).next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.node_mut(next).prev = node.prev,
            None => self.tail = node.prev,
        }
        if self.head.is_none() && self.connected {
            self.connected = false;
            crate::tracing_compat::trace!("timer queue disconnected");
        }
        Some(node)
    }
}
