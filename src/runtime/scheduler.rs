//! The single-threaded tick scheduler.
//!
//! One [`Scheduler`] lives in each thread that uses promises. A tick runs four
//! phases in order:
//!
//! 1. **Timers**: the clock is read once and every timer due at that instant
//!    fires, earliest first.
//! 2. **Jobs**: the batch of continuation jobs queued before the batch began.
//!    Jobs queued while the batch runs wait for the next tick.
//! 3. **Tasks**: spawned futures whose wakers fired are polled.
//! 4. **Checks**: deferred checks registered before the tick began (used by the
//!    unhandled-rejection detector to look one tick into the future).

use crate::config::{ClockMode, ConfigError, SchedulerConfig};
use crate::runtime::task::{LocalTask, TaskHandle, WakeList};
use crate::time::clock::{Clock, TimeSource};
use crate::time::timer_queue::{TimerCallback, TimerKey, TimerQueue};
use crate::tracing_compat::{debug, error, trace, warn};
use crate::types::Time;
use crate::util::Arena;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::task::Poll;
use std::time::Duration;

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce()>;

thread_local! {
    static CURRENT: RefCell<Option<Rc<Scheduler>>> = const { RefCell::new(None) };
}

/// Returns this thread's scheduler, creating it from the environment on first
/// use.
#[must_use]
pub fn current() -> Rc<Scheduler> {
    CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        let scheduler = slot.get_or_insert_with(|| {
            let config = SchedulerConfig::from_env().unwrap_or_else(|err| {
                warn!(error = %err, "ignoring invalid scheduler environment configuration");
                SchedulerConfig::default()
            });
            Rc::new(Scheduler::new(config))
        });
        Rc::clone(scheduler)
    })
}

/// Replaces this thread's scheduler with a fresh one built from `config`.
///
/// Timers and tasks owned by the previous scheduler are dropped.
pub fn install(config: SchedulerConfig) -> Result<Rc<Scheduler>, ConfigError> {
    config.validate()?;
    let scheduler = Rc::new(Scheduler::new(config));
    let previous = CURRENT.with(|slot| slot.borrow_mut().replace(Rc::clone(&scheduler)));
    drop(previous);
    debug!(clock = ?scheduler.config.clock, "scheduler installed");
    Ok(scheduler)
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickStats {
    /// Sequence number of the tick (starting at 1).
    pub tick: u64,
    /// Timers fired in phase 1.
    pub timers_fired: usize,
    /// Jobs run in phase 2.
    pub jobs_run: usize,
    /// Tasks polled in phase 3.
    pub tasks_polled: usize,
    /// Deferred checks run in phase 4.
    pub checks_run: usize,
}

impl TickStats {
    /// Returns true if the tick did no work at all.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.timers_fired == 0 && self.jobs_run == 0 && self.tasks_polled == 0 && self.checks_run == 0
    }
}

/// Single-threaded scheduler: timer queue, job queue, task table.
pub struct Scheduler {
    config: SchedulerConfig,
    clock: Clock,
    timers: RefCell<TimerQueue>,
    jobs: RefCell<VecDeque<Job>>,
    tasks: RefCell<Arena<Option<LocalTask>>>,
    woken: WakeList,
    checks: RefCell<Vec<Job>>,
    ticks: Cell<u64>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("now", &self.now())
            .field("timers", &self.timers.borrow().len())
            .field("jobs", &self.jobs.borrow().len())
            .field("tasks", &self.tasks.borrow().len())
            .field("ticks", &self.ticks.get())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler. Prefer [`install`] to make it the thread's current
    /// scheduler.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            clock: Clock::from_mode(config.clock),
            config,
            timers: RefCell::new(TimerQueue::new()),
            jobs: RefCell::new(VecDeque::new()),
            tasks: RefCell::new(Arena::new()),
            woken: WakeList::default(),
            checks: RefCell::new(Vec::new()),
            ticks: Cell::new(0),
        }
    }

    /// The configuration this scheduler was built with.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Current time on this scheduler's clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.clock.now()
    }

    /// Number of ticks run so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks.get()
    }

    /// Number of scheduled timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Number of live spawned tasks.
    #[must_use]
    pub fn live_tasks(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Deadline of the earliest timer.
    #[must_use]
    pub fn next_timer_due(&self) -> Option<Time> {
        self.timers.borrow().next_due()
    }

    /// Returns true if the next tick has jobs, woken tasks, or checks to run.
    #[must_use]
    pub fn has_runnable_work(&self) -> bool {
        !self.jobs.borrow().is_empty()
            || !self.checks.borrow().is_empty()
            || !self.woken.lock().is_empty()
            || self
                .next_timer_due()
                .is_some_and(|due| due <= self.clock.now())
    }

    /// Queues `job` to run during the next tick's job phase.
    pub fn defer(&self, job: impl FnOnce() + 'static) {
        self.jobs.borrow_mut().push_back(Box::new(job));
    }

    /// Queues `check` to run at the end of the next tick.
    pub fn defer_check(&self, check: impl FnOnce() + 'static) {
        self.checks.borrow_mut().push(Box::new(check));
    }

    /// Schedules `callback` after `delay`, clamped up to one tick interval.
    pub fn schedule_timer(&self, delay: Duration, callback: TimerCallback) -> TimerKey {
        let delay = delay.max(self.config.tick_interval);
        let now = self.clock.now();
        let key = self.timers.borrow_mut().insert(now, delay, callback);
        trace!(?delay, now = %now, "timer scheduled");
        key
    }

    /// Cancels a timer. Returns false if it already fired or was cancelled.
    pub fn cancel_timer(&self, key: TimerKey) -> bool {
        self.timers.borrow_mut().cancel(key)
    }

    /// Spawns a future; it is first polled during the next tick.
    pub fn spawn_local<F>(&self, future: F) -> TaskHandle
    where
        F: Future<Output = ()> + 'static,
    {
        let mut tasks = self.tasks.borrow_mut();
        let slot = tasks.insert(None);
        let task = LocalTask::new(future, slot, &self.woken);
        task.wake();
        if let Some(entry) = tasks.get_mut(slot) {
            *entry = Some(task);
        }
        trace!(task = ?slot, "task spawned");
        TaskHandle(slot)
    }

    /// Drops a spawned task without polling it again.
    pub fn abort(&self, handle: TaskHandle) -> bool {
        let removed = self.tasks.borrow_mut().remove(handle.0);
        let aborted = removed.is_some();
        drop(removed);
        if aborted {
            trace!(task = ?handle.0, "task aborted");
        }
        aborted
    }

    /// Runs one tick.
    pub fn tick(&self) -> TickStats {
        let tick = self.ticks.get() + 1;
        self.ticks.set(tick);
        let checks = std::mem::take(&mut *self.checks.borrow_mut());

        let timers_fired = self.fire_due_timers();

        let jobs = std::mem::take(&mut *self.jobs.borrow_mut());
        let jobs_run = jobs.len();
        for job in jobs {
            run_guarded("job", job);
        }

        let tasks_polled = self.poll_woken_tasks();

        let checks_run = checks.len();
        for check in checks {
            run_guarded("deferred check", check);
        }

        let stats = TickStats {
            tick,
            timers_fired,
            jobs_run,
            tasks_polled,
            checks_run,
        };
        if !stats.is_idle() {
            trace!(?stats, "tick");
        }
        stats
    }

    /// Ticks until no jobs, woken tasks, due timers, or checks remain.
    ///
    /// Returns the number of ticks run. Timers that are not yet due do not
    /// count as work.
    pub fn run_until_idle(&self) -> u64 {
        let mut ticks = 0;
        while self.has_runnable_work() {
            self.tick();
            ticks += 1;
            if self.config.max_ticks.is_some_and(|max| ticks >= max) {
                warn!(ticks, "run_until_idle stopped at max_ticks");
                break;
            }
        }
        ticks
    }

    /// Lets `by` elapse, firing every timer due in that window in order.
    ///
    /// With the virtual clock time jumps from deadline to deadline; with the
    /// wall clock the thread sleeps.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        loop {
            self.run_until_idle();
            match self.next_timer_due() {
                Some(due) if due <= target => self.wait_until(due),
                _ => break,
            }
        }
        self.wait_until(target);
        self.run_until_idle();
    }

    /// Blocks (wall) or jumps (virtual) until `time`.
    pub fn wait_until(&self, time: Time) {
        match &self.clock {
            Clock::Virtual(clock) => clock.advance_to(time),
            Clock::Wall(clock) => {
                let remaining = time.duration_since(clock.now());
                if !remaining.is_zero() {
                    std::thread::sleep(remaining);
                }
            }
        }
    }

    /// Returns the clock mode.
    #[must_use]
    pub fn clock_mode(&self) -> ClockMode {
        if self.clock.is_virtual() {
            ClockMode::Virtual
        } else {
            ClockMode::Wall
        }
    }

    fn fire_due_timers(&self) -> usize {
        if !self.timers.borrow().is_connected() {
            return 0;
        }
        let now = self.clock.now();
        let mut fired = 0;
        loop {
            let expired = self.timers.borrow_mut().pop_due(now);
            let Some(expired) = expired else {
                break;
            };
            debug!(due = %expired.due, elapsed = ?expired.elapsed, "timer fired");
            let callback = expired.callback;
            let elapsed = expired.elapsed;
            run_guarded("timer", move || callback(elapsed));
            fired += 1;
        }
        fired
    }

    fn poll_woken_tasks(&self) -> usize {
        let mut batch = std::mem::take(&mut *self.woken.lock());
        let mut seen = std::collections::HashSet::with_capacity(batch.len());
        batch.retain(|slot| seen.insert(*slot));

        let mut polled = 0;
        for slot in batch {
            let task = self.tasks.borrow_mut().get_mut(slot).and_then(Option::take);
            let Some(mut task) = task else {
                continue;
            };
            polled += 1;
            match catch_unwind(AssertUnwindSafe(|| task.poll(slot))) {
                Ok(Poll::Pending) => {
                    let mut tasks = self.tasks.borrow_mut();
                    if let Some(entry) = tasks.get_mut(slot) {
                        *entry = Some(task);
                        continue;
                    }
                    drop(tasks);
                    // Aborted while it was being polled.
                    drop(task);
                }
                Ok(Poll::Ready(())) => {
                    let entry = self.tasks.borrow_mut().remove(slot);
                    drop(entry);
                    drop(task);
                }
                Err(_) => {
                    error!(task = ?slot, "spawned task panicked; dropping it");
                    let entry = self.tasks.borrow_mut().remove(slot);
                    drop(entry);
                    drop(task);
                }
            }
        }
        polled
    }
}

fn run_guarded(what: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(what, "scheduler callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn virtual_scheduler() -> Scheduler {
        Scheduler::new(SchedulerConfig::virtual_time())
    }

    #[test]
    fn jobs_queued_during_a_batch_run_next_tick() {
        let sched = Rc::new(virtual_scheduler());
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = Rc::clone(&log);
            let inner = Rc::clone(&sched);
            sched.defer(move || {
                log.borrow_mut().push("first");
                let log = Rc::clone(&log);
                inner.defer(move || log.borrow_mut().push("second"));
            });
        }
        let stats = sched.tick();
        assert_eq!(stats.jobs_run, 1);
        assert_eq!(*log.borrow(), vec!["first"]);
        sched.tick();
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn checks_run_one_tick_after_registration() {
        let sched = Rc::new(virtual_scheduler());
        let ran = Rc::new(Cell::new(0_u64));
        {
            let ran = Rc::clone(&ran);
            let inner = Rc::clone(&sched);
            sched.defer(move || {
                // Registered during tick 1, runs at the end of tick 2.
                let observer = Rc::clone(&inner);
                inner.defer_check(move || ran.set(observer.tick_count()));
            });
        }
        sched.tick();
        assert_eq!(ran.get(), 0);
        sched.tick();
        assert_eq!(ran.get(), 2);
    }

    #[test]
    fn delays_clamp_to_one_tick() {
        let sched = virtual_scheduler();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        sched.schedule_timer(Duration::ZERO, Box::new(move |_| flag.set(true)));
        assert_eq!(sched.next_timer_due(), Some(Time::ZERO + sched.config().tick_interval));
        sched.tick();
        assert!(!fired.get());
        sched.advance(sched.config().tick_interval);
        assert!(fired.get());
    }

    #[test]
    fn advance_fires_timers_in_order_and_reports_elapsed() {
        let sched = virtual_scheduler();
        let log = Rc::new(RefCell::new(Vec::new()));
        for ms in [300_u64, 100, 200] {
            let log = Rc::clone(&log);
            sched.schedule_timer(
                Duration::from_millis(ms),
                Box::new(move |elapsed| log.borrow_mut().push((ms, elapsed))),
            );
        }
        sched.advance(Duration::from_millis(250));
        assert_eq!(
            *log.borrow(),
            vec![
                (100, Duration::from_millis(100)),
                (200, Duration::from_millis(200)),
            ]
        );
        assert_eq!(sched.now(), Time::from_millis(250));
        sched.advance(Duration::from_millis(100));
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let sched = virtual_scheduler();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let key = sched.schedule_timer(Duration::from_millis(50), Box::new(move |_| flag.set(true)));
        assert!(sched.cancel_timer(key));
        sched.advance(Duration::from_secs(1));
        assert!(!fired.get());
        assert_eq!(sched.pending_timers(), 0);
    }

    #[test]
    fn spawned_task_is_polled_on_next_tick() {
        let sched = virtual_scheduler();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        sched.spawn_local(async move { flag.set(true) });
        assert!(!ran.get());
        let stats = sched.tick();
        assert_eq!(stats.tasks_polled, 1);
        assert!(ran.get());
        assert_eq!(sched.live_tasks(), 0);
    }

    #[test]
    fn aborted_task_is_not_polled() {
        let sched = virtual_scheduler();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let handle = sched.spawn_local(async move { flag.set(true) });
        assert!(sched.abort(handle));
        sched.run_until_idle();
        assert!(!ran.get());
        assert!(!sched.abort(handle));
    }

    #[test]
    fn panicking_job_does_not_poison_the_tick() {
        let sched = virtual_scheduler();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        sched.defer(|| panic!("job failure"));
        sched.defer(move || flag.set(true));
        sched.tick();
        assert!(ran.get());
    }

    #[test]
    fn install_replaces_current() {
        let first = install(SchedulerConfig::virtual_time()).unwrap();
        assert!(Rc::ptr_eq(&first, &current()));
        let second = install(SchedulerConfig::virtual_time()).unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
        assert!(Rc::ptr_eq(&second, &current()));
        assert!(install(SchedulerConfig::default().tick_interval(Duration::ZERO)).is_err());
    }
}
