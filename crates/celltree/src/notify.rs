#![forbid(unsafe_code)]

//! Push delivery: synchronous fan-out from a `set` call to subscribers.
//!
//! [`Notifier`] is a subscriber list owned by a value holder (loose cells,
//! view cells). Owner-backed cells are recreated on every `state()` call, so
//! they cannot own their subscriber list; their lists live in a per-thread
//! registry keyed by [`CellIdentity`], which makes every instance for the
//! same (owner, key) pair share subscribers.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. `notify` iterates a snapshot: subscribers added by a callback are first
//!    notified by the next `notify`; subscribers removed by a callback are
//!    skipped for the rest of the current one.
//! 3. A registry entry exists only while it has at least one subscriber.
//! 4. A registry subscription holds its cell, and so the cell's owner, until
//!    it is cancelled. An owner address in the registry is never reused by
//!    another object while subscribers are listening on it.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::cell::{BaseCell, CellIdentity, CellRef};
use crate::subscription::{Callback, Listener, Subscription};
use crate::value::Value;

/// Ordered list of push subscribers.
#[derive(Default)]
pub(crate) struct Notifier {
    listeners: RefCell<Vec<(u64, Listener)>>,
    next_id: Cell<u64>,
}

impl Notifier {
    fn add(&self, callback: Callback) -> (u64, Listener) {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let listener = Listener::new(callback);
        self.listeners.borrow_mut().push((id, listener.clone()));
        (id, listener)
    }

    fn remove(&self, id: u64) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(i, _)| *i != id);
        listeners.len() != before
    }

    /// Deliver `value` to every live subscriber. Returns how many fired.
    pub(crate) fn notify(&self, value: &Value) -> usize {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        snapshot.iter().filter(|l| l.deliver(value)).count()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }
}

/// Subscribe to a notifier owned by the caller.
///
/// `on_empty` runs after the last subscriber leaves.
pub(crate) fn subscribe(
    notifier: &Rc<Notifier>,
    callback: Callback,
    on_empty: impl FnOnce() + 'static,
) -> Subscription {
    let (id, listener) = notifier.add(callback);
    let weak: Weak<Notifier> = Rc::downgrade(notifier);
    Subscription::new(listener.active, move || {
        if let Some(notifier) = weak.upgrade() {
            notifier.remove(id);
            if notifier.is_empty() {
                on_empty();
            }
        }
    })
}

// ─── Identity-keyed registry ─────────────────────────────────────────────────

thread_local! {
    static SETTER_SUBSCRIBERS: RefCell<HashMap<CellIdentity, Rc<Notifier>>> =
        RefCell::new(HashMap::new());
}

/// Subscribe to pushes for `cell`, keeping it alive until cancelled.
pub(crate) fn subscribe_identity(cell: CellRef, callback: Callback) -> Subscription {
    let identity = cell.identity();
    let notifier = SETTER_SUBSCRIBERS.with(|map| {
        Rc::clone(map.borrow_mut().entry(identity.clone()).or_default())
    });
    subscribe(&notifier, callback, move || {
        // The registry may already be gone if this runs during thread teardown.
        let _ = SETTER_SUBSCRIBERS.try_with(|map| {
            let mut map = map.borrow_mut();
            if map.get(&identity).is_some_and(|n| n.is_empty()) {
                map.remove(&identity);
            }
        });
        drop(cell);
    })
}

/// Push `value` to subscribers of `identity`. Returns how many fired.
pub(crate) fn notify_identity(identity: &CellIdentity, value: &Value) -> usize {
    let notifier = SETTER_SUBSCRIBERS.with(|map| map.borrow().get(identity).cloned());
    notifier.map_or(0, |n| n.notify(value))
}

#[cfg(test)]
pub(crate) fn registry_len() -> usize {
    SETTER_SUBSCRIBERS.with(|map| map.borrow().len())
}
