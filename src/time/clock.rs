//! Time sources for the scheduler.
//!
//! The scheduler reads either a monotonic wall clock or a virtual clock that
//! only moves when told to. Both report [`Time`] relative to their own epoch.

use crate::config::ClockMode;
use crate::types::Time;
use std::cell::Cell;
use std::time::{Duration, Instant};

/// A source of the current time.
pub trait TimeSource {
    /// Returns the current time.
    fn now(&self) -> Time;
}

/// Monotonic wall clock whose epoch is its creation instant.
#[derive(Debug)]
pub struct WallClock {
    epoch: Instant,
}

impl WallClock {
    /// Creates a wall clock starting now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> Time {
        let nanos = u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX);
        Time::from_nanos(nanos)
    }
}

/// Manually advanced clock for deterministic tests.
///
/// ```
/// use promissory::time::{TimeSource, VirtualClock};
/// use promissory::types::Time;
/// use std::time::Duration;
///
/// let clock = VirtualClock::new();
/// assert_eq!(clock.now(), Time::ZERO);
/// clock.advance(Duration::from_secs(1));
/// assert_eq!(clock.now(), Time::from_secs(1));
/// ```
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Cell<Time>,
}

impl VirtualClock {
    /// Creates a virtual clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Moves time forward to `time`. Never moves backwards.
    pub fn advance_to(&self, time: Time) {
        if time > self.now.get() {
            self.now.set(time);
        }
    }
}

impl TimeSource for VirtualClock {
    fn now(&self) -> Time {
        self.now.get()
    }
}

/// The clock a scheduler owns, selected by [`ClockMode`].
#[derive(Debug)]
pub enum Clock {
    /// Wall clock.
    Wall(WallClock),
    /// Virtual clock.
    Virtual(VirtualClock),
}

impl Clock {
    /// Creates the clock for `mode`.
    #[must_use]
    pub fn from_mode(mode: ClockMode) -> Self {
        match mode {
            ClockMode::Wall => Self::Wall(WallClock::new()),
            ClockMode::Virtual => Self::Virtual(VirtualClock::new()),
        }
    }

    /// Returns true for the virtual clock.
    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual(_))
    }

    /// Returns the virtual clock, if this is one.
    #[must_use]
    pub const fn as_virtual(&self) -> Option<&VirtualClock> {
        match self {
            Self::Virtual(clock) => Some(clock),
            Self::Wall(_) => None,
        }
    }
}

impl TimeSource for Clock {
    fn now(&self) -> Time {
        match self {
            Self::Wall(clock) => clock.now(),
            Self::Virtual(clock) => clock.now(),
        }
    }
}
