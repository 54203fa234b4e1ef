#![forbid(unsafe_code)]

//! Host event-loop abstraction.
//!
//! Nothing in this crate spawns threads. Periodic work (the poller's ticks,
//! delayed persistence writes) is registered with a [`Scheduler`] supplied
//! by the host, which runs callbacks on its own turn.
//!
//! Two implementations are provided:
//!
//! - [`LabScheduler`]: a virtual clock that only moves when
//!   [`advance`](LabScheduler::advance) is called. Used by tests.
//! - [`PumpedScheduler`]: wall-clock deadlines, drained by the host calling
//!   [`run_due`](PumpedScheduler::run_due) from its main loop.
//!
//! # Invariants
//!
//! 1. Due timers run in deadline order; equal deadlines run in registration
//!    order.
//! 2. A periodic timer is rescheduled from its previous deadline, not from
//!    the time it actually ran, so it never drifts. The lab clock replays
//!    every period it passes over; the pumped scheduler runs a late timer
//!    once and skips the periods it missed.
//! 3. A cancelled timer never runs again, even if cancelled by another timer
//!    that runs earlier in the same drain.
//! 4. Timers may register new timers; those become due no earlier than
//!    their own deadline.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use web_time::{Duration, Instant};

/// Cooperative scheduler offering delayed and periodic callbacks.
pub trait Scheduler {
    /// Time elapsed since the scheduler's epoch.
    fn now(&self) -> Duration;

    /// Run `task` once, `delay` from now.
    fn call_later(&self, delay: Duration, task: Box<dyn FnOnce()>) -> TimerHandle;

    /// Run `task` every `interval`, first at `now + interval`.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    fn register_periodic(&self, interval: Duration, task: Rc<dyn Fn()>) -> TimerHandle;
}

/// Cancellation handle for a scheduled callback.
///
/// Dropping the handle does not cancel the timer.
#[derive(Clone, Default)]
pub struct TimerHandle {
    cancelled: Rc<Cell<bool>>,
}

impl TimerHandle {
    /// Stop the timer. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.cancelled.get())
            .finish()
    }
}

// ─── Timer queue ─────────────────────────────────────────────────────────────

enum Task {
    Once(Box<dyn FnOnce()>),
    Periodic { interval: Duration, task: Rc<dyn Fn()> },
}

struct Timer {
    seq: u64,
    deadline: Duration,
    task: Task,
    cancelled: Rc<Cell<bool>>,
}

#[derive(Default)]
struct TimerQueue {
    next_seq: u64,
    timers: Vec<Timer>,
}

impl TimerQueue {
    fn push(&mut self, deadline: Duration, task: Task, cancelled: Rc<Cell<bool>>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.push(Timer {
            seq,
            deadline,
            task,
            cancelled,
        });
    }

    fn schedule(&mut self, deadline: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::default();
        self.push(deadline, task, Rc::clone(&handle.cancelled));
        handle
    }

    /// Remove and return the earliest live timer due at or before `limit`.
    fn pop_due(&mut self, limit: Duration) -> Option<Timer> {
        self.timers.retain(|t| !t.cancelled.get());
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline <= limit)
            .min_by_key(|(_, t)| (t.deadline, t.seq))
            .map(|(i, _)| i)?;
        Some(self.timers.swap_remove(index))
    }

    fn next_deadline(&self) -> Option<Duration> {
        self.timers
            .iter()
            .filter(|t| !t.cancelled.get())
            .map(|t| t.deadline)
            .min()
    }

    fn len(&self) -> usize {
        self.timers.iter().filter(|t| !t.cancelled.get()).count()
    }
}

/// Next deadline of a periodic timer. With `skip_until` set, whole periods
/// ending at or before it are dropped.
fn next_periodic_deadline(
    deadline: Duration,
    interval: Duration,
    skip_until: Option<Duration>,
) -> Duration {
    let next = deadline + interval;
    match skip_until {
        Some(now) if next <= now => {
            let missed = (now - next).as_nanos() / interval.as_nanos() + 1;
            let missed = u32::try_from(missed).unwrap_or(u32::MAX);
            next.saturating_add(interval.saturating_mul(missed))
        }
        _ => next,
    }
}

/// Run one popped timer with no queue borrow held, then reschedule it if
/// periodic.
fn fire(queue: &RefCell<TimerQueue>, timer: Timer, skip_until: Option<Duration>) {
    if timer.cancelled.get() {
        return;
    }
    match timer.task {
        Task::Once(task) => task(),
        Task::Periodic { interval, task } => {
            task();
            if !timer.cancelled.get() {
                queue.borrow_mut().push(
                    next_periodic_deadline(timer.deadline, interval, skip_until),
                    Task::Periodic { interval, task },
                    timer.cancelled,
                );
            }
        }
    }
}

fn periodic(interval: Duration, task: Rc<dyn Fn()>) -> Task {
    assert!(!interval.is_zero(), "periodic interval must be non-zero");
    Task::Periodic { interval, task }
}

// ─── LabScheduler ────────────────────────────────────────────────────────────

struct LabInner {
    now: Cell<Duration>,
    queue: RefCell<TimerQueue>,
}

/// A manually-advanced virtual clock.
///
/// Cloning shares the same clock and timer queue.
#[derive(Clone)]
pub struct LabScheduler {
    inner: Rc<LabInner>,
}

impl LabScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(LabInner {
                now: Cell::new(Duration::ZERO),
                queue: RefCell::new(TimerQueue::default()),
            }),
        }
    }

    /// Move the clock forward by `delta`, running every timer that comes due.
    ///
    /// While a timer runs, [`now`](Scheduler::now) reports its deadline.
    pub fn advance(&self, delta: Duration) {
        let target = self.inner.now.get() + delta;
        loop {
            let next = self.inner.queue.borrow_mut().pop_due(target);
            let Some(timer) = next else { break };
            self.inner.now.set(timer.deadline.max(self.inner.now.get()));
            fire(&self.inner.queue, timer, None);
        }
        self.inner.now.set(target);
    }

    /// Number of live (uncancelled) timers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.inner.queue.borrow().next_deadline()
    }
}

impl Default for LabScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LabScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabScheduler")
            .field("now", &self.inner.now.get())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Scheduler for LabScheduler {
    fn now(&self) -> Duration {
        self.inner.now.get()
    }

    fn call_later(&self, delay: Duration, task: Box<dyn FnOnce()>) -> TimerHandle {
        let deadline = self.inner.now.get() + delay;
        self.inner
            .queue
            .borrow_mut()
            .schedule(deadline, Task::Once(task))
    }

    fn register_periodic(&self, interval: Duration, task: Rc<dyn Fn()>) -> TimerHandle {
        let task = periodic(interval, task);
        let deadline = self.inner.now.get() + interval;
        self.inner.queue.borrow_mut().schedule(deadline, task)
    }
}

// ─── PumpedScheduler ─────────────────────────────────────────────────────────

struct PumpedInner {
    epoch: Instant,
    queue: RefCell<TimerQueue>,
}

/// Wall-clock scheduler drained by the host's main loop.
///
/// The host calls [`run_due`](Self::run_due) whenever it wakes, and may use
/// [`time_until_next`](Self::time_until_next) to decide how long to sleep.
#[derive(Clone)]
pub struct PumpedScheduler {
    inner: Rc<PumpedInner>,
}

impl PumpedScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(PumpedInner {
                epoch: Instant::now(),
                queue: RefCell::new(TimerQueue::default()),
            }),
        }
    }

    /// Run every timer whose deadline has passed. Returns how many ran.
    pub fn run_due(&self) -> usize {
        let limit = self.now();
        let mut ran = 0;
        loop {
            let next = self.inner.queue.borrow_mut().pop_due(limit);
            let Some(timer) = next else { break };
            fire(&self.inner.queue, timer, Some(limit));
            ran += 1;
        }
        ran
    }

    /// Time until the earliest pending timer, or `None` if idle.
    #[must_use]
    pub fn time_until_next(&self) -> Option<Duration> {
        let next = self.inner.queue.borrow().next_deadline()?;
        Some(next.saturating_sub(self.now()))
    }
}

impl Default for PumpedScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for PumpedScheduler {
    fn now(&self) -> Duration {
        self.inner.epoch.elapsed()
    }

    fn call_later(&self, delay: Duration, task: Box<dyn FnOnce()>) -> TimerHandle {
        let deadline = self.now() + delay;
        self.inner
            .queue
            .borrow_mut()
            .schedule(deadline, Task::Once(task))
    }

    fn register_periodic(&self, interval: Duration, task: Rc<dyn Fn()>) -> TimerHandle {
        let task = periodic(interval, task);
        let deadline = self.now() + interval;
        self.inner.queue.borrow_mut().schedule(deadline, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = Rc::clone(&log);
        let make = move |name: &'static str| -> Box<dyn FnOnce()> {
            let log = Rc::clone(&log2);
            Box::new(move || log.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn call_later_runs_once_when_due() {
        let lab = LabScheduler::new();
        let (log, make) = recorder();
        lab.call_later(Duration::from_millis(500), make("a"));

        lab.advance(Duration::from_millis(499));
        assert!(log.borrow().is_empty());
        lab.advance(Duration::from_millis(1));
        assert_eq!(*log.borrow(), vec!["a"]);
        lab.advance(Duration::from_secs(10));
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(lab.pending(), 0);
    }

    #[test]
    fn due_timers_run_in_deadline_then_registration_order() {
        let lab = LabScheduler::new();
        let (log, make) = recorder();
        lab.call_later(Duration::from_millis(20), make("late"));
        lab.call_later(Duration::from_millis(10), make("first"));
        lab.call_later(Duration::from_millis(10), make("second"));
        lab.advance(Duration::from_secs(1));
        assert_eq!(*log.borrow(), vec!["first", "second", "late"]);
    }

    #[test]
    fn periodic_fires_once_per_interval() {
        let lab = LabScheduler::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let handle = lab.register_periodic(
            Duration::from_millis(100),
            Rc::new(move || c.set(c.get() + 1)),
        );

        lab.advance(Duration::from_millis(350));
        assert_eq!(count.get(), 3);
        assert_eq!(lab.now(), Duration::from_millis(350));

        handle.cancel();
        lab.advance(Duration::from_secs(1));
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn cancelled_by_earlier_timer_in_same_drain() {
        let lab = LabScheduler::new();
        let (log, make) = recorder();
        let victim = lab.call_later(Duration::from_millis(20), make("victim"));
        lab.call_later(Duration::from_millis(10), Box::new(move || victim.cancel()));
        lab.advance(Duration::from_secs(1));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn timer_can_schedule_follow_up() {
        let lab = LabScheduler::new();
        let (log, make) = recorder();
        let lab2 = lab.clone();
        let follow = make("follow");
        lab.call_later(
            Duration::from_millis(10),
            Box::new(move || {
                lab2.call_later(Duration::from_millis(10), follow);
            }),
        );
        lab.advance(Duration::from_millis(15));
        assert!(log.borrow().is_empty());
        assert_eq!(lab.next_deadline(), Some(Duration::from_millis(20)));
        lab.advance(Duration::from_millis(5));
        assert_eq!(*log.borrow(), vec!["follow"]);
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn zero_interval_is_rejected() {
        let lab = LabScheduler::new();
        lab.register_periodic(Duration::ZERO, Rc::new(|| {}));
    }

    #[test]
    fn pumped_runs_zero_delay_tasks() {
        let pumped = PumpedScheduler::new();
        let (log, make) = recorder();
        pumped.call_later(Duration::ZERO, make("now"));
        pumped.call_later(Duration::from_secs(3600), make("later"));
        assert_eq!(pumped.run_due(), 1);
        assert_eq!(*log.borrow(), vec!["now"]);
        let wait = pumped.time_until_next().unwrap();
        assert!(wait > Duration::from_secs(3500));
    }

    #[test]
    fn periodic_deadline_skips_missed_periods() {
        let ms = Duration::from_millis;
        assert_eq!(next_periodic_deadline(ms(30), ms(10), None), ms(40));
        assert_eq!(next_periodic_deadline(ms(30), ms(10), Some(ms(35))), ms(40));
        assert_eq!(next_periodic_deadline(ms(30), ms(10), Some(ms(40))), ms(50));
        assert_eq!(next_periodic_deadline(ms(30), ms(10), Some(ms(10_035))), ms(10_040));
    }

    #[test]
    fn pumped_runs_stalled_periodic_timer_once() {
        let pumped = PumpedScheduler::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        pumped.register_periodic(Duration::from_millis(1), Rc::new(move || c.set(c.get() + 1)));
        std::thread::sleep(std::time::Duration::from_millis(30));
        assert_eq!(pumped.run_due(), 1);
        assert_eq!(count.get(), 1);
        assert!(pumped.time_until_next().is_some());
    }

    #[test]
    fn lab_replays_every_missed_period() {
        let lab = LabScheduler::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        lab.register_periodic(Duration::from_millis(10), Rc::new(move || c.set(c.get() + 1)));
        lab.advance(Duration::from_millis(100));
        assert_eq!(count.get(), 10);
    }
}
