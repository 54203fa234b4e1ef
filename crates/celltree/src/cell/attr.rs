#![forbid(unsafe_code)]

//! Owner-backed cells.

use std::fmt;
use std::rc::Rc;

use super::{BaseCell, CellIdentity, CellMetadata, CellRef, subscribe_by_policy};
use crate::error::{CellError, Result};
use crate::notify;
use crate::policy::Delivery;
use crate::subscription::{Callback, Subscription, SubscriptionContext};
use crate::value::Value;

type Getter = Rc<dyn Fn() -> Value>;
type Setter = Rc<dyn Fn(Value) -> Result<()>>;

/// A cell that reads (and optionally writes) an attribute of an owner.
///
/// The cell keeps the owner alive. Cloning is cheap and yields an equal cell.
#[derive(Clone)]
pub struct Cell {
    identity: CellIdentity,
    metadata: CellMetadata,
    getter: Getter,
    setter: Option<Setter>,
}

impl Cell {
    /// A read-only cell over `owner`.
    ///
    /// `metadata` is forced read-only.
    pub fn new<O: 'static>(
        owner: &Rc<O>,
        key: impl Into<Rc<str>>,
        metadata: CellMetadata,
        get: impl Fn(&O) -> Value + 'static,
    ) -> Self {
        let owner = Rc::clone(owner);
        Self {
            identity: CellIdentity::of(&owner, key),
            metadata: metadata.writable(false),
            getter: Rc::new(move || get(&owner)),
            setter: None,
        }
    }

    /// A writable cell over `owner`.
    ///
    /// `set` receives values already coerced to the declared type.
    pub fn with_setter<O: 'static>(
        owner: &Rc<O>,
        key: impl Into<Rc<str>>,
        metadata: CellMetadata,
        get: impl Fn(&O) -> Value + 'static,
        set: impl Fn(&O, Value) -> Result<()> + 'static,
    ) -> Self {
        let get_owner = Rc::clone(owner);
        let set_owner = Rc::clone(owner);
        Self {
            identity: CellIdentity::of(owner, key),
            metadata: metadata.writable(true),
            getter: Rc::new(move || get(&get_owner)),
            setter: Some(Rc::new(move |v| set(&set_owner, v))),
        }
    }
}

impl BaseCell for Cell {
    fn identity(&self) -> CellIdentity {
        self.identity.clone()
    }

    fn metadata(&self) -> &CellMetadata {
        &self.metadata
    }

    fn get(&self) -> Value {
        (self.getter)()
    }

    fn set(&self, value: Value) -> Result<()> {
        let setter = self
            .setter
            .as_ref()
            .ok_or_else(|| CellError::not_writable(self.identity.key()))?;
        let value = self.metadata.value_type().coerce(value)?;
        let push = self.metadata.changes().delivery() == Delivery::Push;
        let before = push.then(|| self.get());
        setter(value)?;
        if let Some(before) = before {
            let after = self.get();
            if after != before {
                notify::notify_identity(&self.identity, &after);
            }
        }
        Ok(())
    }

    fn subscribe(&self, callback: Callback, context: &SubscriptionContext) -> Subscription {
        subscribe_by_policy(CellRef::new(self.clone()), callback, context)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("key", &self.identity.key())
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Changes;
    use crate::types::ValueType;
    use std::cell::Cell as StdCell;

    struct Radio {
        freq: StdCell<f64>,
    }

    fn freq_cell(radio: &Rc<Radio>, changes: Changes) -> Cell {
        Cell::with_setter(
            radio,
            "freq",
            CellMetadata::new(ValueType::Float, changes),
            |r: &Radio| Value::Float(r.freq.get()),
            |r: &Radio, v| {
                r.freq.set(f64::try_from(v)?);
                Ok(())
            },
        )
    }

    #[test]
    fn read_only_cell_rejects_set() {
        let radio = Rc::new(Radio {
            freq: StdCell::new(1.0),
        });
        let cell = Cell::new(
            &radio,
            "freq",
            CellMetadata::new(ValueType::Float, Changes::Never).writable(true),
            |r: &Radio| Value::Float(r.freq.get()),
        );
        assert!(!cell.is_writable());
        assert_eq!(
            cell.set(Value::Float(2.0)),
            Err(CellError::not_writable("freq"))
        );
    }

    #[test]
    fn set_coerces_before_reaching_owner() {
        let radio = Rc::new(Radio {
            freq: StdCell::new(0.0),
        });
        let cell = freq_cell(&radio, Changes::ThisSetter);
        cell.set(Value::Int(7)).unwrap();
        assert_eq!(radio.freq.get(), 7.0);
        assert!(matches!(
            cell.set(Value::from("fast")),
            Err(CellError::TypeCoercion { .. })
        ));
        assert_eq!(radio.freq.get(), 7.0);
    }

    #[test]
    fn instances_for_same_attribute_are_equal() {
        let radio = Rc::new(Radio {
            freq: StdCell::new(0.0),
        });
        let a = CellRef::new(freq_cell(&radio, Changes::ThisSetter));
        let b = CellRef::new(freq_cell(&radio, Changes::ThisSetter));
        assert_eq!(a, b);
        assert_eq!(a.key(), "freq");
    }
}
