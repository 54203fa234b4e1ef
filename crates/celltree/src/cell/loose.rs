#![forbid(unsafe_code)]

//! Standalone value cells.
//!
//! A [`LooseCell`] owns its value, so it is the sole mutator by construction
//! and always delivers by push, whatever context it is subscribed with.
//! Writing a value equal to the current one is a no-op.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::{BaseCell, CellIdentity, CellMetadata, owner_address};
use crate::error::{CellError, Result};
use crate::notify::{self, Notifier};
use crate::policy::Changes;
use crate::subscription::{Callback, Subscription, SubscriptionContext};
use crate::types::ValueType;
use crate::value::Value;

struct LooseInner {
    key: Rc<str>,
    metadata: CellMetadata,
    value: RefCell<Value>,
    notifier: Rc<Notifier>,
}

/// A cell holding its own value.
///
/// Cloning shares the value and subscribers.
#[derive(Clone)]
pub struct LooseCell {
    inner: Rc<LooseInner>,
}

impl LooseCell {
    /// A writable cell of type `value_type` holding `value`.
    pub fn new(value: impl Into<Value>, key: impl Into<Rc<str>>, value_type: ValueType) -> Self {
        Self::with_metadata(
            value,
            key,
            CellMetadata::new(value_type, Changes::ThisSetter).writable(true),
        )
    }

    /// A cell with explicit metadata. The change policy is always
    /// `this_setter`, since nothing else can reach the value.
    pub fn with_metadata(
        value: impl Into<Value>,
        key: impl Into<Rc<str>>,
        metadata: CellMetadata,
    ) -> Self {
        let metadata = CellMetadata {
            changes: Changes::ThisSetter,
            ..metadata
        };
        Self {
            inner: Rc::new(LooseInner {
                key: key.into(),
                metadata,
                value: RefCell::new(value.into()),
                notifier: Rc::new(Notifier::default()),
            }),
        }
    }

    /// Store `value` even if the cell is read-only to outside callers.
    ///
    /// Intended for the cell's owner.
    pub fn set_internal(&self, value: Value) -> Result<()> {
        let value = self.inner.metadata.value_type().coerce(value)?;
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return Ok(());
            }
            *current = value.clone();
        }
        self.inner.notifier.notify(&value);
        Ok(())
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.notifier.len()
    }
}

impl BaseCell for LooseCell {
    fn identity(&self) -> CellIdentity {
        CellIdentity::new(owner_address(&self.inner), Rc::clone(&self.inner.key))
    }

    fn metadata(&self) -> &CellMetadata {
        &self.inner.metadata
    }

    fn get(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    fn set(&self, value: Value) -> Result<()> {
        if !self.inner.metadata.is_writable() {
            return Err(CellError::not_writable(&*self.inner.key));
        }
        self.set_internal(value)
    }

    fn subscribe(&self, callback: Callback, _context: &SubscriptionContext) -> Subscription {
        tracing::debug!(key = %self.inner.key, "subscribe loose cell");
        notify::subscribe(&self.inner.notifier, callback, || {})
    }
}

impl fmt::Debug for LooseCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LooseCell")
            .field("key", &self.inner.key)
            .field("value", &*self.inner.value.borrow())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
