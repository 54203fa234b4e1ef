#![forbid(unsafe_code)]

//! Small exported types exercised by the behavioral tests.

use std::cell::{Cell as StdCell, RefCell};
use std::rc::Rc;

use celltree::{
    BlockRef, Cell, CellError, CellMetadata, Changes, CollectionState, Exported, FromKwargs,
    Kwargs, Range, Result, Schema, Value, ValueType, take_kwarg,
};

/// A float value (also a constructor parameter) next to a nested block.
#[derive(Debug)]
pub struct ValueAndBlockSpecimen {
    block: BlockRef,
    value: StdCell<f64>,
}

impl ValueAndBlockSpecimen {
    pub fn new(block: BlockRef) -> Rc<Self> {
        Rc::new(Self {
            block,
            value: StdCell::new(0.0),
        })
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.value.get()
    }
}

impl Exported for ValueAndBlockSpecimen {
    fn schema() -> Schema<Self> {
        Schema::new()
            .block("block", Changes::Never, |s: &Self| s.block.clone())
            .writable_value(
                "value",
                CellMetadata::new(ValueType::Float, Changes::ThisSetter).parameter("value"),
                |s: &Self| Value::Float(s.value.get()),
                |s: &Self, v| {
                    s.value.set(f64::try_from(v)?);
                    Ok(())
                },
            )
    }
}

impl FromKwargs for ValueAndBlockSpecimen {
    fn from_kwargs(kwargs: &mut Kwargs) -> Result<Self> {
        let block = take_kwarg(kwargs, "block")?.unwrap_or_else(BlockRef::empty);
        let value = take_kwarg(kwargs, "value")?.unwrap_or(0.0);
        Ok(Self {
            block,
            value: StdCell::new(value),
        })
    }
}

/// Exports a constant that subtypes pick up through [`Schema::inherit`].
#[derive(Debug, Default)]
pub struct InheritedSpecimen;

impl Exported for InheritedSpecimen {
    fn schema() -> Schema<Self> {
        Schema::new().value(
            "inherited",
            CellMetadata::new(ValueType::Float, Changes::Never),
            |_: &Self| Value::Float(9.0),
        )
    }
}

/// Inherits [`InheritedSpecimen`]'s cells and adds a ranged value.
#[derive(Debug, Default)]
pub struct InheritingSpecimen {
    base: InheritedSpecimen,
    rw: StdCell<f64>,
}

impl InheritingSpecimen {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }
}

impl Exported for InheritingSpecimen {
    fn schema() -> Schema<Self> {
        Schema::new()
            .inherit(|s: &Self| &s.base)
            .writable_value(
                "rw",
                CellMetadata::new(
                    ValueType::Range(Range::new([(0.0, 10.0)])),
                    Changes::ThisSetter,
                ),
                |s: &Self| Value::Float(s.rw.get()),
                |s: &Self, v| {
                    s.rw.set(f64::try_from(v)?);
                    Ok(())
                },
            )
    }
}

/// A plain object with no exported schema; tests wrap its field in cells of
/// every change policy.
#[derive(Debug, Default)]
pub struct NoInherentCellSpecimen {
    pub value: StdCell<i64>,
}

impl NoInherentCellSpecimen {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// A writable cell over `value` declaring `changes`.
    pub fn cell(self: &Rc<Self>, changes: Changes) -> Cell {
        Cell::with_setter(
            self,
            "value",
            CellMetadata::new(ValueType::Int, changes),
            |s: &Self| Value::Int(s.value.get()),
            |s: &Self, v| {
                s.value.set(i64::try_from(v)?);
                Ok(())
            },
        )
    }
}

/// A block cell whose target can be swapped behind the cell's back.
#[derive(Debug)]
pub struct BlockCellSpecimen {
    block: RefCell<BlockRef>,
}

impl BlockCellSpecimen {
    pub fn new(block: BlockRef) -> Rc<Self> {
        Rc::new(Self {
            block: RefCell::new(block),
        })
    }

    pub fn replace_block(&self, block: BlockRef) {
        *self.block.borrow_mut() = block;
    }
}

impl Exported for BlockCellSpecimen {
    fn schema() -> Schema<Self> {
        Schema::new().block("block", Changes::Global, |s: &Self| s.block.borrow().clone())
    }
}

/// Counts invocations of its `cmd` command.
#[derive(Debug, Default)]
pub struct CommandSpecimen {
    count: StdCell<u32>,
}

impl CommandSpecimen {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn cmd(&self) {
        self.count.set(self.count.get() + 1);
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count.get()
    }
}

impl Exported for CommandSpecimen {
    fn schema() -> Schema<Self> {
        Schema::new().command("cmd", Self::cmd)
    }
}

/// A dynamic collection whose factory fails when the descriptor says so.
pub fn insert_fail_specimen() -> Rc<CollectionState> {
    Rc::new(CollectionState::new(true).with_factory(|key, descriptor| {
        if descriptor.get("fail").and_then(serde_json::Value::as_bool) == Some(true) {
            tracing::debug!(%key, "specimen rejecting descriptor");
            Err(CellError::insertion(key, "descriptor requested failure"))
        } else {
            Ok(BlockRef::empty())
        }
    }))
}

/// Reports a dynamic key set, forcing uncached cell creation.
#[derive(Debug)]
pub struct CellIdentitySpecimen {
    block: BlockRef,
}

impl CellIdentitySpecimen {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            block: BlockRef::empty(),
        })
    }
}

impl Exported for CellIdentitySpecimen {
    fn schema() -> Schema<Self> {
        Schema::new()
            .value(
                "value",
                CellMetadata::new(ValueType::Any, Changes::Never),
                |_: &Self| Value::Int(9),
            )
            .block("block", Changes::Never, |s: &Self| s.block.clone())
    }

    fn is_dynamic(&self) -> bool {
        true
    }
}
