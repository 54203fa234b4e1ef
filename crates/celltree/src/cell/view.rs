#![forbid(unsafe_code)]

//! Cells derived from another cell through a pair of transforms.
//!
//! `get() = get_transform(base.get())` and
//! `set(v) = base.set(set_transform(v))`. The transforms are not assumed to
//! be exact inverses; floating-point drift through a round trip is accepted.
//!
//! # Subscription
//!
//! A view subscribes to its base only while it has subscribers of its own,
//! using the context of the subscriber that arrived first. Each base change
//! recomputes the view and pushes to view subscribers when the derived
//! value differs from the last one delivered.
//!
//! When the transforms change, the owner calls
//! [`changed_transform`](ViewCell::changed_transform): the base subscription
//! is renewed and subscribers receive the freshly transformed value of the
//! unchanged base value.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::{BaseCell, CellIdentity, CellMetadata, CellRef, owner_address};
use crate::error::Result;
use crate::notify::{self, Notifier};
use crate::subscription::{Callback, Subscription, SubscriptionContext};
use crate::types::ValueType;
use crate::value::Value;

/// A value transform.
pub type Transform = Rc<dyn Fn(&Value) -> Value>;

struct ViewInner {
    key: Rc<str>,
    metadata: CellMetadata,
    base: CellRef,
    get_transform: RefCell<Transform>,
    set_transform: RefCell<Transform>,
    last: RefCell<Value>,
    notifier: Rc<Notifier>,
    base_subscription: RefCell<Option<Subscription>>,
    context: RefCell<Option<SubscriptionContext>>,
}

impl ViewInner {
    fn compute(&self) -> Value {
        let transform = Rc::clone(&self.get_transform.borrow());
        transform(&self.base.get())
    }

    /// Recompute and push if the derived value moved.
    fn refresh(&self) {
        let value = self.compute();
        let changed = {
            let mut last = self.last.borrow_mut();
            if *last == value {
                false
            } else {
                *last = value.clone();
                true
            }
        };
        if changed {
            self.notifier.notify(&value);
        }
    }

    fn attach(self: &Rc<Self>, context: &SubscriptionContext) {
        let weak: Weak<ViewInner> = Rc::downgrade(self);
        let subscription = self.base.subscribe(
            Rc::new(move |_: &Value| {
                if let Some(inner) = weak.upgrade() {
                    inner.refresh();
                }
            }),
            context,
        );
        let previous = self.base_subscription.borrow_mut().replace(subscription);
        drop(previous);
    }

    fn detach(&self) {
        let previous = self.base_subscription.borrow_mut().take();
        drop(previous);
        self.context.borrow_mut().take();
    }
}

/// A cell computed from a base cell.
///
/// Cloning shares transforms and subscribers.
#[derive(Clone)]
pub struct ViewCell {
    inner: Rc<ViewInner>,
}

impl ViewCell {
    /// A writable view over `base`.
    ///
    /// The view reports the base cell's change policy.
    pub fn new(
        base: CellRef,
        get_transform: impl Fn(&Value) -> Value + 'static,
        set_transform: impl Fn(&Value) -> Value + 'static,
        key: impl Into<Rc<str>>,
        value_type: ValueType,
    ) -> Self {
        let metadata =
            CellMetadata::new(value_type, base.metadata().changes()).writable(base.is_writable());
        let get_transform: Transform = Rc::new(get_transform);
        let initial = get_transform(&base.get());
        Self {
            inner: Rc::new(ViewInner {
                key: key.into(),
                metadata,
                base,
                get_transform: RefCell::new(get_transform),
                set_transform: RefCell::new(Rc::new(set_transform)),
                last: RefCell::new(initial),
                notifier: Rc::new(Notifier::default()),
                base_subscription: RefCell::new(None),
                context: RefCell::new(None),
            }),
        }
    }

    #[must_use]
    pub fn base(&self) -> &CellRef {
        &self.inner.base
    }

    /// Replace both transforms and notify as for
    /// [`changed_transform`](Self::changed_transform).
    pub fn set_transforms(
        &self,
        get_transform: impl Fn(&Value) -> Value + 'static,
        set_transform: impl Fn(&Value) -> Value + 'static,
    ) {
        *self.inner.get_transform.borrow_mut() = Rc::new(get_transform);
        *self.inner.set_transform.borrow_mut() = Rc::new(set_transform);
        self.changed_transform();
    }

    /// The transforms' behavior changed (for example, a captured parameter).
    ///
    /// Renews the base subscription and pushes the re-derived value to
    /// current subscribers if it differs from the last one delivered.
    pub fn changed_transform(&self) {
        let context = self.inner.context.borrow().clone();
        if let Some(context) = context {
            self.inner.attach(&context);
        }
        self.inner.refresh();
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.notifier.len()
    }
}

impl BaseCell for ViewCell {
    fn identity(&self) -> CellIdentity {
        CellIdentity::new(owner_address(&self.inner), Rc::clone(&self.inner.key))
    }

    fn metadata(&self) -> &CellMetadata {
        &self.inner.metadata
    }

    fn get(&self) -> Value {
        self.inner.compute()
    }

    fn set(&self, value: Value) -> Result<()> {
        let value = self.inner.metadata.value_type().coerce(value)?;
        let transform = Rc::clone(&self.inner.set_transform.borrow());
        self.inner.base.set(transform(&value))?;
        self.inner.refresh();
        Ok(())
    }

    fn subscribe(&self, callback: Callback, context: &SubscriptionContext) -> Subscription {
        if self.inner.base_subscription.borrow().is_none() {
            *self.inner.last.borrow_mut() = self.inner.compute();
            *self.inner.context.borrow_mut() = Some(context.clone());
            self.inner.attach(context);
        }
        let weak = Rc::downgrade(&self.inner);
        notify::subscribe(&self.inner.notifier, callback, move || {
            if let Some(inner) = weak.upgrade() {
                inner.detach();
            }
        })
    }
}

impl fmt::Debug for ViewCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewCell")
            .field("key", &self.inner.key)
            .field("base", &self.inner.base)
            .field("last", &*self.inner.last.borrow())
            .finish()
    }
}
