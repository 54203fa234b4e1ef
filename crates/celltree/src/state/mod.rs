#![forbid(unsafe_code)]

//! The exported state tree.
//!
//! An object joins the tree by implementing [`ExportedState`], usually via
//! [`Exported`] and a [`Schema`] describing its cells. Block-typed cells
//! point at child nodes, giving a tree that can be walked, serialized with
//! [`BlockRef::state_to_json`], and restored with
//! [`BlockRef::state_from_json`].
//!
//! # Example
//!
//! ```
//! use std::cell::Cell as StdCell;
//! use std::rc::Rc;
//! use celltree::{BlockRef, CellMetadata, Changes, Exported, Schema, Value, ValueType};
//!
//! struct Tuner {
//!     freq: StdCell<f64>,
//! }
//!
//! impl Exported for Tuner {
//!     fn schema() -> Schema<Self> {
//!         Schema::new().writable_value(
//!             "freq",
//!             CellMetadata::new(ValueType::Float, Changes::ThisSetter),
//!             |t: &Tuner| Value::Float(t.freq.get()),
//!             |t: &Tuner, v| {
//!                 t.freq.set(f64::try_from(v)?);
//!                 Ok(())
//!             },
//!         )
//!     }
//! }
//!
//! let tuner = BlockRef::new(Tuner { freq: StdCell::new(100.0) });
//! tuner.state_from_json(&serde_json::json!({ "freq": 101.5 }));
//! assert_eq!(tuner.state()["freq"].get(), Value::Float(101.5));
//! ```

mod collection;
mod json;
mod schema;
mod unserialize;

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::cell::CellRef;
use crate::error::Result;

pub use collection::{ChildFactory, CollectionState};
pub use schema::{Exported, Schema};
pub use unserialize::{FromKwargs, Kwargs, take_kwarg, unserialize_exported_state};

/// Cells of one node, by key. Iteration order is stable.
pub type StateMap = BTreeMap<String, CellRef>;

/// A node of the state tree.
pub trait ExportedState {
    /// The node's cells.
    ///
    /// Takes the owning `Rc` so that cells can keep their owner alive.
    fn state(self: Rc<Self>) -> StateMap;

    /// Whether the set of keys returned by [`state`](Self::state) may change
    /// over the node's lifetime.
    fn state_is_dynamic(&self) -> bool {
        false
    }

    /// The insertion capability, for nodes that can create children on
    /// demand during [`BlockRef::state_from_json`].
    fn inserter(&self) -> Option<&dyn Inserter> {
        None
    }
}

/// Creates children for keys that a node does not yet have.
pub trait Inserter {
    /// Construct and install a child named `key` from `descriptor`.
    ///
    /// # Errors
    ///
    /// [`CellError::Insertion`](crate::CellError::Insertion) if the
    /// descriptor is rejected. The node must be left unchanged.
    fn state_insert(&self, key: &str, descriptor: &serde_json::Value) -> Result<()>;
}

/// A node that exports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyState;

impl ExportedState for EmptyState {
    fn state(self: Rc<Self>) -> StateMap {
        StateMap::new()
    }
}

/// Shared handle to a tree node, compared by identity.
#[derive(Clone)]
pub struct BlockRef(Rc<dyn ExportedState>);

impl BlockRef {
    pub fn new(node: impl ExportedState + 'static) -> Self {
        Self(Rc::new(node))
    }

    /// Wrap an existing allocation; handles made from clones of the same
    /// `Rc` compare equal.
    pub fn from_rc<T: ExportedState + 'static>(node: Rc<T>) -> Self {
        Self(node)
    }

    /// A fresh [`EmptyState`] node.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(EmptyState)
    }

    #[must_use]
    pub fn state(&self) -> StateMap {
        Rc::clone(&self.0).state()
    }

    #[must_use]
    pub fn state_is_dynamic(&self) -> bool {
        self.0.state_is_dynamic()
    }

    #[must_use]
    pub fn inserter(&self) -> Option<&dyn Inserter> {
        self.0.inserter()
    }

    /// Persisted leaf values by key, with blocks nested recursively.
    #[must_use]
    pub fn state_to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        json::state_to_json(self)
    }

    /// Apply `tree` to this node.
    ///
    /// Failures are contained per key and logged; nothing is propagated.
    pub fn state_from_json(&self, tree: &serde_json::Value) {
        json::state_from_json(self, tree);
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl PartialEq for BlockRef {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for BlockRef {}

impl std::hash::Hash for BlockRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl fmt::Debug for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockRef({:#x})", self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_refs_compare_by_allocation() {
        let node = Rc::new(EmptyState);
        let a = BlockRef::from_rc(Rc::clone(&node));
        let b = BlockRef::from_rc(node);
        assert_eq!(a, b);
        assert_ne!(a, BlockRef::empty());
    }

    #[test]
    fn empty_state_has_no_cells() {
        let empty = BlockRef::empty();
        assert!(empty.state().is_empty());
        assert!(empty.state_to_json().is_empty());
        assert!(!empty.state_is_dynamic());
        assert!(empty.inserter().is_none());
    }
}
