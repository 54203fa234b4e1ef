#![forbid(unsafe_code)]

//! Subscription handles and the per-consumer subscription context.
//!
//! # Invariants
//!
//! 1. [`Subscription`] is always returned by value; there is no null handle.
//! 2. `unsubscribe` consumes the handle, so calling it twice does not
//!    type-check. Dropping the handle unsubscribes as well.
//! 3. The shared `active` flag is cleared before the cancel hook runs, and
//!    every delivery path checks it immediately before invoking a callback.
//!    No callback fires after `unsubscribe` returns, even when a tick or a
//!    `set` is already iterating a snapshot that contains the registration.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::poller::Poller;
use crate::scheduler::Scheduler;
use crate::value::Value;

/// Change callback. Receives the new value.
pub type Callback = Rc<dyn Fn(&Value)>;

/// Shared liveness flag for one registration.
#[derive(Clone, Debug)]
pub(crate) struct ActiveFlag(Rc<Cell<bool>>);

impl ActiveFlag {
    pub(crate) fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.0.get()
    }

    pub(crate) fn clear(&self) {
        self.0.set(false);
    }
}

/// A callback paired with its liveness flag.
#[derive(Clone)]
pub(crate) struct Listener {
    pub(crate) active: ActiveFlag,
    pub(crate) callback: Callback,
}

impl Listener {
    pub(crate) fn new(callback: Callback) -> Self {
        Self {
            active: ActiveFlag::new(),
            callback,
        }
    }

    /// Invoke the callback unless the registration has been cancelled.
    pub(crate) fn deliver(&self, value: &Value) -> bool {
        if self.active.is_active() {
            (self.callback)(value);
            true
        } else {
            false
        }
    }
}

/// Cancellable registration returned by `subscribe`.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    active: ActiveFlag,
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(active: ActiveFlag, cancel: impl FnOnce() + 'static) -> Self {
        Self {
            active,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that will never deliver anything.
    pub(crate) fn inert() -> Self {
        let active = ActiveFlag::new();
        Self {
            active,
            cancel: None,
        }
    }

    /// Stop delivery. Takes effect before this call returns.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    /// Whether callbacks can still be delivered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_active()
    }

    fn cancel_now(&mut self) {
        self.active.clear();
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Capabilities a cell needs to arrange delivery for one consumer.
///
/// Cheap to clone; clones share the same scheduler and poller.
#[derive(Clone)]
pub struct SubscriptionContext {
    pub scheduler: Rc<dyn Scheduler>,
    pub poller: Poller,
}

impl SubscriptionContext {
    #[must_use]
    pub fn new(scheduler: Rc<dyn Scheduler>, poller: Poller) -> Self {
        Self { scheduler, poller }
    }
}

impl fmt::Debug for SubscriptionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionContext")
            .field("now", &self.scheduler.now())
            .field("poller", &self.poller)
            .finish()
    }
}
