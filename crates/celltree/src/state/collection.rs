#![forbid(unsafe_code)]

//! Keyed collections of child nodes.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::{BlockRef, ExportedState, Inserter, StateMap};
use crate::cell::{Cell, CellMetadata, CellRef};
use crate::error::{CellError, Result};
use crate::policy::Changes;
use crate::types::ValueType;
use crate::value::Value;

/// Builds a child from its key and JSON descriptor.
pub type ChildFactory = Box<dyn Fn(&str, &serde_json::Value) -> Result<BlockRef>>;

/// A node whose cells are the blocks in a keyed table.
///
/// With a factory attached, the collection is an [`Inserter`]: unknown keys
/// met during `state_from_json` are built by the factory, given the
/// descriptor, and installed. A failing factory leaves the table unchanged.
pub struct CollectionState {
    table: RefCell<BTreeMap<String, BlockRef>>,
    dynamic: bool,
    factory: Option<ChildFactory>,
}

impl CollectionState {
    /// An empty collection. `dynamic` declares that keys come and go.
    #[must_use]
    pub fn new(dynamic: bool) -> Self {
        Self {
            table: RefCell::new(BTreeMap::new()),
            dynamic,
            factory: None,
        }
    }

    /// A collection pre-populated from `children`.
    pub fn with_children(
        children: impl IntoIterator<Item = (String, BlockRef)>,
        dynamic: bool,
    ) -> Self {
        let collection = Self::new(dynamic);
        collection.table.borrow_mut().extend(children);
        collection
    }

    #[must_use]
    pub fn with_factory(
        mut self,
        factory: impl Fn(&str, &serde_json::Value) -> Result<BlockRef> + 'static,
    ) -> Self {
        self.factory = Some(Box::new(factory));
        self
    }

    /// Install `child` under `key`, returning any child it replaced.
    pub fn insert_child(&self, key: impl Into<String>, child: BlockRef) -> Option<BlockRef> {
        self.table.borrow_mut().insert(key.into(), child)
    }

    pub fn remove(&self, key: &str) -> Option<BlockRef> {
        self.table.borrow_mut().remove(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<BlockRef> {
        self.table.borrow().get(key).cloned()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.table.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.borrow().is_empty()
    }
}

impl ExportedState for CollectionState {
    fn state(self: Rc<Self>) -> StateMap {
        let changes = if self.dynamic {
            Changes::ThisObject
        } else {
            Changes::Never
        };
        self.keys()
            .into_iter()
            .map(|key| {
                let lookup = key.clone();
                let cell = Cell::new(
                    &self,
                    key.as_str(),
                    CellMetadata::new(ValueType::Reference, changes),
                    move |c: &CollectionState| c.get(&lookup).map_or(Value::Null, Value::Block),
                );
                (key, CellRef::new(cell))
            })
            .collect()
    }

    fn state_is_dynamic(&self) -> bool {
        self.dynamic
    }

    fn inserter(&self) -> Option<&dyn Inserter> {
        self.factory.as_ref().map(|_| self as &dyn Inserter)
    }
}

impl Inserter for CollectionState {
    fn state_insert(&self, key: &str, descriptor: &serde_json::Value) -> Result<()> {
        let Some(factory) = &self.factory else {
            return Err(CellError::insertion(key, "collection has no factory"));
        };
        let child = factory(key, descriptor)?;
        child.state_from_json(descriptor);
        self.insert_child(key, child);
        Ok(())
    }
}

impl fmt::Debug for CollectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionState")
            .field("keys", &self.keys())
            .field("dynamic", &self.dynamic)
            .field("insertable", &self.factory.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracing_test::traced_test;

    fn failing_factory() -> CollectionState {
        CollectionState::new(true).with_factory(|key, desc| {
            if desc.get("fail").and_then(serde_json::Value::as_bool) == Some(true) {
                Err(CellError::insertion(key, "descriptor asked to fail"))
            } else {
                Ok(BlockRef::empty())
            }
        })
    }

    #[test]
    fn state_reflects_live_keys() {
        let collection = Rc::new(CollectionState::new(true));
        let child = BlockRef::empty();
        collection.insert_child("b", child.clone());
        collection.insert_child("a", BlockRef::empty());

        let state = Rc::clone(&collection).state();
        assert_eq!(state.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(state["b"].get(), Value::Block(child));
        assert_eq!(state["b"].metadata().changes(), Changes::ThisObject);

        collection.remove("b");
        assert_eq!(state["b"].get(), Value::Null);
        assert_eq!(Rc::clone(&collection).state().len(), 1);
    }

    #[traced_test]
    #[test]
    fn insert_success_and_failure() {
        let collection = Rc::new(failing_factory());
        let block = BlockRef::from_rc(Rc::clone(&collection));
        block.state_from_json(&json!({"foo": {"fail": true}}));
        assert!(collection.is_empty());
        assert!(logs_contain("state insertion failed"));

        block.state_from_json(&json!({"foo": {"fail": false}}));
        assert_eq!(collection.keys(), vec!["foo"]);
    }

    #[traced_test]
    #[test]
    fn no_factory_discards_unknown_keys() {
        let collection = Rc::new(CollectionState::new(true));
        assert!(collection.inserter().is_none());
        BlockRef::from_rc(Rc::clone(&collection)).state_from_json(&json!({"foo": {"fail": true}}));
        assert!(collection.is_empty());
        assert!(logs_contain("discarding unexpected state key"));
    }

    #[test]
    fn static_collections_use_never() {
        let collection = Rc::new(CollectionState::with_children(
            [("x".to_owned(), BlockRef::empty())],
            false,
        ));
        let state = Rc::clone(&collection).state();
        assert_eq!(state["x"].metadata().changes(), Changes::Never);
        assert!(!collection.state_is_dynamic());
    }
}
