#![forbid(unsafe_code)]

//! Cells: addressable, typed, subscribable values.
//!
//! - [`Cell`]: reads and writes an attribute of an owning object through
//!   getter/setter closures.
//! - [`LooseCell`]: a standalone value holder.
//! - [`ViewCell`]: a value derived from another cell through a pair of
//!   transforms.
//! - [`CommandCell`]: a zero-argument action; writing to it invokes it.
//!
//! All of them implement [`BaseCell`] and are handled through [`CellRef`].
//!
//! # Identity
//!
//! Cells are created lazily on every `state()` call, so two lookups of the
//! same attribute usually yield distinct instances. [`CellRef`] compares and
//! hashes by [`CellIdentity`] (owner allocation, key) so that those instances
//! are interchangeable as map and set keys.

mod attr;
mod command;
mod loose;
mod view;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;

use crate::error::Result;
use crate::policy::{Changes, Delivery};
use crate::subscription::{Callback, Subscription, SubscriptionContext};
use crate::types::ValueType;
use crate::value::Value;

pub use attr::Cell;
pub use command::CommandCell;
pub use loose::LooseCell;
pub use view::{Transform, ViewCell};

// ─── Identity ────────────────────────────────────────────────────────────────

/// The (owner, key) pair that identifies a cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellIdentity {
    owner: usize,
    key: Rc<str>,
}

impl CellIdentity {
    #[must_use]
    pub fn new(owner: usize, key: impl Into<Rc<str>>) -> Self {
        Self {
            owner,
            key: key.into(),
        }
    }

    /// Identity of `key` on the object behind `owner`.
    #[must_use]
    pub fn of<O: ?Sized>(owner: &Rc<O>, key: impl Into<Rc<str>>) -> Self {
        Self::new(owner_address(owner), key)
    }

    #[must_use]
    pub fn owner(&self) -> usize {
        self.owner
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Address of the allocation behind `rc`; stable while any clone lives.
pub(crate) fn owner_address<O: ?Sized>(rc: &Rc<O>) -> usize {
    Rc::as_ptr(rc).cast::<()>() as usize
}

// ─── Metadata ────────────────────────────────────────────────────────────────

/// Declared properties of a cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellMetadata {
    value_type: ValueType,
    changes: Changes,
    writable: bool,
    persists: Option<bool>,
    label: Option<String>,
    parameter: Option<String>,
}

impl CellMetadata {
    /// Read-only metadata with the given type and change policy.
    #[must_use]
    pub fn new(value_type: ValueType, changes: Changes) -> Self {
        Self {
            value_type,
            changes,
            writable: false,
            persists: None,
            label: None,
            parameter: None,
        }
    }

    #[must_use]
    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// Override whether the value is included in serialized state.
    ///
    /// Defaults to [`is_writable`](Self::is_writable).
    #[must_use]
    pub fn persists(mut self, persists: bool) -> Self {
        self.persists = Some(persists);
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Name of the constructor parameter that receives this value when the
    /// owner is rebuilt from serialized state.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>) -> Self {
        self.parameter = Some(name.into());
        self
    }

    #[must_use]
    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    #[must_use]
    pub fn changes(&self) -> Changes {
        self.changes
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.persists.unwrap_or(self.writable)
    }

    #[must_use]
    pub fn label_text(&self) -> Option<&str> {
        self.label.as_deref()
    }

    #[must_use]
    pub fn parameter_name(&self) -> Option<&str> {
        self.parameter.as_deref()
    }
}

// ─── BaseCell ────────────────────────────────────────────────────────────────

/// Common interface of every cell variant.
pub trait BaseCell {
    fn identity(&self) -> CellIdentity;

    fn metadata(&self) -> &CellMetadata;

    /// Current value.
    fn get(&self) -> Value;

    /// Coerce and store `value`.
    ///
    /// # Errors
    ///
    /// [`CellError::NotWritable`](crate::CellError::NotWritable) for
    /// read-only cells, [`CellError::TypeCoercion`](crate::CellError::TypeCoercion)
    /// if the value does not fit the declared type.
    fn set(&self, value: Value) -> Result<()>;

    /// Arrange for `callback` to receive every change of this cell.
    fn subscribe(&self, callback: Callback, context: &SubscriptionContext) -> Subscription;

    fn key(&self) -> String {
        self.identity().key().to_owned()
    }

    fn is_writable(&self) -> bool {
        self.metadata().is_writable()
    }

    /// Whether the value is a nested block rather than a leaf.
    fn is_block(&self) -> bool {
        self.metadata().value_type().is_reference()
    }
}

/// Shared, identity-compared handle to a cell.
#[derive(Clone)]
pub struct CellRef(Rc<dyn BaseCell>);

impl CellRef {
    #[must_use]
    pub fn new(cell: impl BaseCell + 'static) -> Self {
        Self(Rc::new(cell))
    }
}

impl Deref for CellRef {
    type Target = dyn BaseCell;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for CellRef {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for CellRef {}

impl Hash for CellRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identity = self.identity();
        f.debug_struct("CellRef")
            .field("key", &identity.key())
            .field("owner", &format_args!("{:#x}", identity.owner()))
            .field("changes", &self.metadata().changes())
            .finish()
    }
}

/// Subscribe `cell` according to its declared change policy.
///
/// Push-delivered subscribers are keyed by identity, so that every instance
/// of an owner-backed cell reaches them from its `set`.
pub(crate) fn subscribe_by_policy(
    cell: CellRef,
    callback: Callback,
    context: &SubscriptionContext,
) -> Subscription {
    let changes = cell.metadata().changes();
    tracing::debug!(key = %cell.identity().key(), %changes, "subscribe");
    match changes.delivery() {
        Delivery::None => Subscription::inert(),
        Delivery::Push => crate::notify::subscribe_identity(cell, callback),
        Delivery::Poll(queue) => context.poller.subscribe(cell, callback, queue),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn persists_defaults_to_writable() {
        let ro = CellMetadata::new(ValueType::Int, Changes::Never);
        assert!(!ro.is_persistent());
        let rw = ro.clone().writable(true);
        assert!(rw.is_persistent());
        assert!(!rw.persists(false).is_persistent());
        assert!(ro.persists(true).is_persistent());
    }

    #[test]
    fn identity_of_same_rc_matches() {
        let owner = Rc::new(5u8);
        let a = CellIdentity::of(&owner, "x");
        let b = CellIdentity::of(&Rc::clone(&owner), "x");
        assert_eq!(a, b);
        assert_ne!(a, CellIdentity::of(&owner, "y"));
        assert_ne!(a, CellIdentity::of(&Rc::new(5u8), "x"));
    }

    #[test]
    fn cell_refs_dedupe_in_sets() {
        let owner = Rc::new(std::cell::Cell::new(1i64));
        let make = || {
            CellRef::new(Cell::new(
                &owner,
                "n",
                CellMetadata::new(ValueType::Int, Changes::Never),
                |o: &std::cell::Cell<i64>| Value::Int(o.get()),
            ))
        };
        let set: HashSet<CellRef> = [make(), make(), make()].into_iter().collect();
        assert_eq!(set.len(), 1);
    }
}
