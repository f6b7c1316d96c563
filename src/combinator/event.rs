//! Event sources and the `from_event` combinator.
//!
//! An [`EventSource`] hands out a [`Connection`] per listener; disconnecting
//! it stops delivery. [`Signal`] is the in-crate source: listeners are kept in
//! an arena so a disconnect is O(1) and never disturbs delivery to the others.

use crate::error::Error;
use crate::promise::Promise;
use crate::tracing_compat::trace;
use crate::util::{Arena, ArenaIndex};
use std::cell::RefCell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::rc::{Rc, Weak};

/// A live listener registration.
pub trait Connection {
    /// Stops delivery to the listener. Calling it again does nothing.
    fn disconnect(&mut self);
}

/// Something that delivers payloads of type `T` to listeners.
pub trait EventSource<T> {
    /// The registration handle for one listener.
    type Connection: Connection + 'static;

    /// Registers `listener` and returns its connection.
    ///
    /// A source may deliver events synchronously from inside `connect`.
    fn connect(&self, listener: Box<dyn FnMut(&T)>) -> Self::Connection;
}

/// Fulfils with the first payload from `source` that `predicate` accepts.
///
/// The listener is disconnected as soon as the promise settles, including
/// when it is cancelled. A panicking predicate rejects with an execution
/// error.
///
/// ```
/// use promissory::combinator::{from_event, Signal};
/// use promissory::{runtime, SchedulerConfig};
///
/// runtime::install(SchedulerConfig::virtual_time()).unwrap();
/// let clicks = Signal::new();
/// let big = from_event(&clicks, |n: &u32| *n > 10);
/// clicks.fire(&3);
/// clicks.fire(&42);
/// assert_eq!(runtime::block_on(&big).unwrap(), 42);
/// assert_eq!(clicks.listener_count(), 0);
/// ```
#[track_caller]
pub fn from_event<T, S, P>(source: &S, mut predicate: P) -> Promise<T>
where
    T: Clone + 'static,
    S: EventSource<T> + ?Sized,
    P: FnMut(&T) -> bool + 'static,
{
    let site = Location::caller();
    Promise::new(move |resolver, on_cancel| {
        let connection: Rc<RefCell<Option<S::Connection>>> = Rc::new(RefCell::new(None));
        let matched = Rc::new(std::cell::Cell::new(false));

        let listener = {
            let connection = Rc::clone(&connection);
            let matched = Rc::clone(&matched);
            Box::new(move |payload: &T| {
                if matched.get() || !resolver.is_pending() {
                    return;
                }
                match catch_unwind(AssertUnwindSafe(|| predicate(payload))) {
                    Ok(false) => return,
                    Ok(true) => resolver.resolve(payload.clone()),
                    Err(panic) => resolver.reject(Error::from_panic(&*panic, site)),
                }
                matched.set(true);
                trace!(promise = %resolver.id(), "event matched");
                disconnect(&connection);
            })
        };

        let mut live = source.connect(listener);
        if matched.get() {
            live.disconnect();
            return;
        }
        *connection.borrow_mut() = Some(live);
        on_cancel.register(move || disconnect(&connection));
    })
}

fn disconnect<C: Connection>(slot: &RefCell<Option<C>>) {
    let taken = slot.borrow_mut().take();
    if let Some(mut connection) = taken {
        connection.disconnect();
    }
}

type Listener<T> = Rc<RefCell<Box<dyn FnMut(&T)>>>;
type Listeners<T> = RefCell<Arena<Listener<T>>>;

/// A single-threaded broadcast event source.
pub struct Signal<T> {
    listeners: Rc<Listeners<T>>,
}

impl<T: 'static> Signal<T> {
    /// Creates a signal with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Rc::new(RefCell::new(Arena::new())),
        }
    }

    /// Number of connected listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Registers `listener`.
    pub fn subscribe(&self, listener: impl FnMut(&T) + 'static) -> SignalConnection<T> {
        let listener: Box<dyn FnMut(&T)> = Box::new(listener);
        let slot = self.listeners.borrow_mut().insert(Rc::new(RefCell::new(listener)));
        SignalConnection {
            listeners: Rc::downgrade(&self.listeners),
            slot: Some(slot),
        }
    }

    /// Delivers `payload` to every listener connected when the call began.
    ///
    /// Listeners disconnected during delivery are skipped. A listener that
    /// fires the same signal recursively is not re-entered. Returns the number
    /// of listeners called.
    pub fn fire(&self, payload: &T) -> usize {
        let snapshot: Vec<(ArenaIndex, Listener<T>)> = self
            .listeners
            .borrow()
            .iter()
            .map(|(slot, listener)| (slot, Rc::clone(listener)))
            .collect();
        let mut delivered = 0;
        for (slot, listener) in snapshot {
            if !self.listeners.borrow().contains(slot) {
                continue;
            }
            let Ok(mut listener) = listener.try_borrow_mut() else {
                continue;
            };
            (*listener)(payload);
            delivered += 1;
        }
        delivered
    }
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl<T: 'static> EventSource<T> for Signal<T> {
    type Connection = SignalConnection<T>;

    fn connect(&self, listener: Box<dyn FnMut(&T)>) -> Self::Connection {
        self.subscribe(listener)
    }
}

/// Connection returned by [`Signal::subscribe`]. Dropping it does not
/// disconnect; call [`Connection::disconnect`].
pub struct SignalConnection<T> {
    listeners: Weak<Listeners<T>>,
    slot: Option<ArenaIndex>,
}

impl<T> SignalConnection<T> {
    /// Returns true until disconnected (or the signal is dropped).
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.slot.is_some_and(|slot| {
            self.listeners
                .upgrade()
                .is_some_and(|listeners| listeners.borrow().contains(slot))
        })
    }
}

impl<T> Connection for SignalConnection<T> {
    fn disconnect(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        if let Some(listeners) = self.listeners.upgrade() {
            let removed = listeners.borrow_mut().remove(slot);
            drop(removed);
        }
    }
}

impl<T> fmt::Debug for SignalConnection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalConnection")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}
