#![forbid(unsafe_code)]

//! Periodic sampling of cells that cannot push their own changes.
//!
//! The [`Poller`] owns every (cell, callback) registration for cells whose
//! change policy resolves to [`Delivery::Poll`](crate::Delivery::Poll). Each
//! tick re-reads every registered cell, compares the result with the value
//! recorded for that registration, and fires the callback on mismatch.
//!
//! # Invariants
//!
//! 1. The recorded value is taken at registration time, so a change between
//!    `register` and the first tick is delivered by that tick.
//! 2. Several changes between two ticks are delivered once (coalescing).
//! 3. A tick iterates a snapshot ordered by registration id: registrations
//!    added during the tick are first evaluated by the next one, and
//!    registrations removed during the tick are skipped.
//! 4. A panicking callback (or getter) is contained to its registration;
//!    the rest of the tick proceeds.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use celltree::{LooseCell, Poller, PollQueue, CellRef, Value, ValueType};
//!
//! let poller = Poller::new();
//! let cell = CellRef::new(LooseCell::new(1, "n", ValueType::Int));
//! let _sub = poller.subscribe(cell.clone(), Rc::new(|_: &Value| {}), PollQueue::Fast);
//! assert_eq!(poller.len(), 1);
//! assert_eq!(poller.poll_all(), 0);
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::cell::CellRef;
use crate::config::PollerConfig;
use crate::error::{CellError, Result};
use crate::policy::PollQueue;
use crate::scheduler::{Scheduler, TimerHandle};
use crate::subscription::{ActiveFlag, Callback, Listener, Subscription};
use crate::value::Value;

/// Handle to one poller registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

struct Registration {
    cell: CellRef,
    listener: Listener,
    queue: PollQueue,
    last: Rc<RefCell<Value>>,
}

#[derive(Default)]
struct PollerInner {
    next_id: u64,
    registrations: BTreeMap<u64, Registration>,
    timers: Vec<TimerHandle>,
}

/// Shared registry of polled subscriptions.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct Poller {
    inner: Rc<RefCell<PollerInner>>,
}

impl Poller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, cell: CellRef, callback: Callback, queue: PollQueue) -> (u64, ActiveFlag) {
        // Read before borrowing: the getter may itself touch the poller.
        let initial = cell.get();
        let listener = Listener::new(callback);
        let active = listener.active.clone();
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.registrations.insert(
            id,
            Registration {
                cell,
                listener,
                queue,
                last: Rc::new(RefCell::new(initial)),
            },
        );
        (id, active)
    }

    /// Start sampling `cell` on `queue`.
    pub fn register(&self, cell: CellRef, callback: Callback, queue: PollQueue) -> RegistrationId {
        RegistrationId(self.insert(cell, callback, queue).0)
    }

    /// Drop a registration.
    ///
    /// # Errors
    ///
    /// [`CellError::SubscriptionMisuse`] if `id` is not registered.
    pub fn remove(&self, id: RegistrationId) -> Result<()> {
        let removed = self.inner.borrow_mut().registrations.remove(&id.0);
        match removed {
            Some(registration) => {
                registration.listener.active.clear();
                tracing::debug!(
                    key = %registration.cell.identity().key(),
                    queue = %registration.queue,
                    "unsubscribe polled cell"
                );
                Ok(())
            }
            None => Err(CellError::misuse(format!(
                "poller registration {} is not active",
                id.0
            ))),
        }
    }

    /// Register and wrap the registration in a [`Subscription`].
    pub fn subscribe(&self, cell: CellRef, callback: Callback, queue: PollQueue) -> Subscription {
        let (id, active) = self.insert(cell, callback, queue);
        let weak: Weak<RefCell<PollerInner>> = Rc::downgrade(&self.inner);
        Subscription::new(active, move || {
            if let Some(inner) = weak.upgrade() {
                let removed = Poller { inner }.remove(RegistrationId(id));
                debug_assert!(removed.is_ok(), "subscription outlived its registration");
            }
        })
    }

    /// Sample every registration on `queue`. Returns how many callbacks fired.
    pub fn poll(&self, queue: PollQueue) -> usize {
        self.tick(Some(queue))
    }

    /// Sample every registration regardless of queue.
    pub fn poll_all(&self) -> usize {
        self.tick(None)
    }

    fn tick(&self, queue: Option<PollQueue>) -> usize {
        let snapshot: Vec<(CellRef, Listener, Rc<RefCell<Value>>)> = self
            .inner
            .borrow()
            .registrations
            .values()
            .filter(|r| queue.is_none_or(|q| r.queue == q))
            .map(|r| (r.cell.clone(), r.listener.clone(), Rc::clone(&r.last)))
            .collect();

        let polled = snapshot.len();
        let mut fired = 0;
        for (cell, listener, last) in snapshot {
            if !listener.active.is_active() {
                continue;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let value = cell.get();
                if *last.borrow() == value {
                    return false;
                }
                *last.borrow_mut() = value.clone();
                listener.deliver(&value)
            }));
            match outcome {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(payload) => {
                    tracing::error!(
                        key = %cell.identity().key(),
                        panic = %panic_message(payload.as_ref()),
                        "subscriber callback panicked during poll"
                    );
                }
            }
        }

        match queue {
            Some(queue) => tracing::trace!(%queue, polled, fired, "poll tick"),
            None => tracing::trace!(queue = "all", polled, fired, "poll tick"),
        }
        fired
    }

    /// Install periodic ticks for both queues on `scheduler`.
    ///
    /// Replaces any ticks installed by an earlier `start`.
    pub fn start(&self, scheduler: &dyn Scheduler, config: &PollerConfig) {
        self.stop();
        let timers = [
            (PollQueue::Fast, config.fast_interval()),
            (PollQueue::Slow, config.slow_interval()),
        ]
        .into_iter()
        .map(|(queue, interval)| {
            let weak = Rc::downgrade(&self.inner);
            scheduler.register_periodic(
                interval,
                Rc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        Poller { inner }.poll(queue);
                    }
                }),
            )
        })
        .collect();
        self.inner.borrow_mut().timers = timers;
    }

    /// Cancel ticks installed by [`start`](Self::start).
    pub fn stop(&self) {
        let timers = std::mem::take(&mut self.inner.borrow_mut().timers);
        for timer in timers {
            timer.cancel();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().registrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().registrations.is_empty()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Poller")
            .field("registrations", &inner.registrations.len())
            .field("running", &!inner.timers.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, CellMetadata};
    use crate::policy::Changes;
    use crate::scheduler::LabScheduler;
    use crate::types::ValueType;
    use std::cell::Cell as StdCell;
    use std::time::Duration;

    fn counter_cell(owner: &Rc<StdCell<i64>>) -> CellRef {
        CellRef::new(Cell::new(
            owner,
            "n",
            CellMetadata::new(ValueType::Int, Changes::Continuous),
            |o: &StdCell<i64>| Value::Int(o.get()),
        ))
    }

    fn collecting() -> (Rc<RefCell<Vec<Value>>>, Callback) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        (seen, Rc::new(move |v: &Value| s.borrow_mut().push(v.clone())))
    }

    #[test]
    fn change_before_first_tick_is_delivered() {
        let owner = Rc::new(StdCell::new(0));
        let poller = Poller::new();
        let (seen, cb) = collecting();
        let _sub = poller.subscribe(counter_cell(&owner), cb, PollQueue::Fast);

        assert_eq!(poller.poll_all(), 0);
        owner.set(1);
        owner.set(2);
        assert_eq!(poller.poll_all(), 1);
        assert_eq!(*seen.borrow(), vec![Value::Int(2)]);
        assert_eq!(poller.poll_all(), 0);
    }

    #[test]
    fn poll_only_touches_its_queue() {
        let owner = Rc::new(StdCell::new(0));
        let poller = Poller::new();
        let (seen, cb) = collecting();
        let _sub = poller.subscribe(counter_cell(&owner), cb, PollQueue::Slow);
        owner.set(5);
        assert_eq!(poller.poll(PollQueue::Fast), 0);
        assert_eq!(poller.poll(PollQueue::Slow), 1);
        assert_eq!(*seen.borrow(), vec![Value::Int(5)]);
    }

    #[test]
    fn remove_unknown_id_is_misuse() {
        let owner = Rc::new(StdCell::new(0));
        let poller = Poller::new();
        let id = poller.register(counter_cell(&owner), Rc::new(|_: &Value| {}), PollQueue::Fast);
        poller.remove(id).unwrap();
        assert!(matches!(
            poller.remove(id),
            Err(CellError::SubscriptionMisuse { .. })
        ));
        assert!(poller.is_empty());
    }

    #[test]
    fn unsubscribe_mid_tick_suppresses_later_registration() {
        let owner = Rc::new(StdCell::new(0));
        let poller = Poller::new();
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let v = Rc::clone(&victim);
        let _killer = poller.subscribe(
            counter_cell(&owner),
            Rc::new(move |_: &Value| {
                v.borrow_mut().take();
            }),
            PollQueue::Fast,
        );
        let (seen, cb) = collecting();
        *victim.borrow_mut() = Some(poller.subscribe(counter_cell(&owner), cb, PollQueue::Fast));

        owner.set(1);
        assert_eq!(poller.poll_all(), 1);
        assert!(seen.borrow().is_empty());
        assert_eq!(poller.len(), 1);
    }

    #[test]
    fn subscribe_during_tick_waits_for_next_tick() {
        let owner = Rc::new(StdCell::new(0));
        let poller = Poller::new();
        let (seen, cb) = collecting();
        let added: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));
        let (p, o, a) = (poller.clone(), Rc::clone(&owner), Rc::clone(&added));
        let _adder = poller.subscribe(
            counter_cell(&owner),
            Rc::new(move |_: &Value| {
                let sub = p.subscribe(counter_cell(&o), Rc::clone(&cb), PollQueue::Fast);
                a.borrow_mut().push(sub);
            }),
            PollQueue::Fast,
        );

        owner.set(1);
        assert_eq!(poller.poll_all(), 1);
        assert_eq!(poller.len(), 2);
        assert!(seen.borrow().is_empty());

        owner.set(2);
        poller.poll_all();
        assert_eq!(*seen.borrow(), vec![Value::Int(2)]);
    }

    #[test]
    fn panicking_callback_does_not_stop_tick() {
        let owner = Rc::new(StdCell::new(0));
        let poller = Poller::new();
        let _bad = poller.subscribe(
            counter_cell(&owner),
            Rc::new(|_: &Value| panic!("subscriber exploded")),
            PollQueue::Fast,
        );
        let (seen, cb) = collecting();
        let _good = poller.subscribe(counter_cell(&owner), cb, PollQueue::Fast);

        owner.set(3);
        assert_eq!(poller.poll_all(), 1);
        assert_eq!(*seen.borrow(), vec![Value::Int(3)]);
    }

    #[test]
    fn start_drives_ticks_from_scheduler() {
        let owner = Rc::new(StdCell::new(0));
        let lab = LabScheduler::new();
        let poller = Poller::new();
        poller.start(&lab, &PollerConfig::default());
        let (seen, cb) = collecting();
        let _sub = poller.subscribe(counter_cell(&owner), cb, PollQueue::Fast);

        owner.set(4);
        lab.advance(Duration::from_millis(40));
        assert_eq!(*seen.borrow(), vec![Value::Int(4)]);

        poller.stop();
        assert_eq!(lab.pending(), 0);
        owner.set(5);
        lab.advance(Duration::from_secs(1));
        assert_eq!(seen.borrow().len(), 1);
    }
}
