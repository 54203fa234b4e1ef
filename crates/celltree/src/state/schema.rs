#![forbid(unsafe_code)]

//! Per-type cell declarations.
//!
//! A [`Schema<T>`] lists the cells a `T` exports: a key, metadata, and the
//! accessor closures that read and write the value on a `&T`. Binding the
//! schema to an `Rc<T>` produces the node's [`StateMap`].
//!
//! Later declarations replace earlier ones with the same key, so a type can
//! [`inherit`](Schema::inherit) another type's schema and then override
//! individual cells.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::{BlockRef, ExportedState, StateMap};
use crate::cell::{Cell, CellMetadata, CellRef, CommandCell};
use crate::error::Result;
use crate::policy::Changes;
use crate::types::ValueType;
use crate::value::Value;

type Getter<T> = Rc<dyn Fn(&T) -> Value>;
type Setter<T> = Rc<dyn Fn(&T, Value) -> Result<()>>;
type Action<T> = Rc<dyn Fn(&T)>;

enum Accessor<T> {
    Value {
        get: Getter<T>,
        set: Option<Setter<T>>,
    },
    Command(Action<T>),
}

struct Declaration<T> {
    key: Rc<str>,
    metadata: CellMetadata,
    accessor: Accessor<T>,
}

/// The cells exported by `T`.
pub struct Schema<T> {
    declarations: Vec<Declaration<T>>,
}

impl<T: 'static> Schema<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            declarations: Vec::new(),
        }
    }

    fn push(mut self, key: &str, metadata: CellMetadata, accessor: Accessor<T>) -> Self {
        self.declarations.push(Declaration {
            key: Rc::from(key),
            metadata,
            accessor,
        });
        self
    }

    /// A read-only value.
    #[must_use]
    pub fn value(
        self,
        key: &str,
        metadata: CellMetadata,
        get: impl Fn(&T) -> Value + 'static,
    ) -> Self {
        let accessor = Accessor::Value {
            get: Rc::new(get),
            set: None,
        };
        self.push(key, metadata.writable(false), accessor)
    }

    /// A writable value. `set` receives values already coerced to the
    /// declared type.
    #[must_use]
    pub fn writable_value(
        self,
        key: &str,
        metadata: CellMetadata,
        get: impl Fn(&T) -> Value + 'static,
        set: impl Fn(&T, Value) -> Result<()> + 'static,
    ) -> Self {
        let accessor = Accessor::Value {
            get: Rc::new(get),
            set: Some(Rc::new(set)),
        };
        self.push(key, metadata.writable(true), accessor)
    }

    /// A nested node.
    #[must_use]
    pub fn block(
        self,
        key: &str,
        changes: Changes,
        get: impl Fn(&T) -> BlockRef + 'static,
    ) -> Self {
        let accessor = Accessor::Value {
            get: Rc::new(move |t: &T| Value::Block(get(t))),
            set: None,
        };
        self.push(key, CellMetadata::new(ValueType::Reference, changes), accessor)
    }

    /// An action invoked by writing to the cell.
    #[must_use]
    pub fn command(self, key: &str, action: impl Fn(&T) + 'static) -> Self {
        let metadata = CellMetadata::new(ValueType::Any, Changes::Never)
            .writable(true)
            .persists(false);
        self.push(key, metadata, Accessor::Command(Rc::new(action)))
    }

    /// Export every cell of `U` through `project`.
    ///
    /// The resulting cells belong to the `T` they are bound to.
    #[must_use]
    pub fn inherit<U: Exported>(mut self, project: impl Fn(&T) -> &U + 'static) -> Self {
        let project: Rc<dyn Fn(&T) -> &U> = Rc::new(project);
        for decl in U::schema().declarations {
            let accessor = match decl.accessor {
                Accessor::Value { get, set } => {
                    let p = Rc::clone(&project);
                    let get: Getter<T> = Rc::new(move |t: &T| get(p(t)));
                    let set = set.map(|inner| {
                        let p = Rc::clone(&project);
                        Rc::new(move |t: &T, v: Value| inner(p(t), v)) as Setter<T>
                    });
                    Accessor::Value { get, set }
                }
                Accessor::Command(action) => {
                    let p = Rc::clone(&project);
                    Accessor::Command(Rc::new(move |t: &T| action(p(t))))
                }
            };
            self.declarations.push(Declaration {
                key: decl.key,
                metadata: decl.metadata,
                accessor,
            });
        }
        self
    }

    /// Keys and metadata, in declaration order.
    pub fn declarations(&self) -> impl Iterator<Item = (&str, &CellMetadata)> {
        self.declarations.iter().map(|d| (&*d.key, &d.metadata))
    }

    /// `(key, parameter name, type)` for every declaration that feeds a
    /// constructor parameter. Later declarations win.
    pub(crate) fn parameters(&self) -> Vec<(String, String, ValueType)> {
        let mut by_key: BTreeMap<&str, Option<(&str, &ValueType)>> = BTreeMap::new();
        for decl in &self.declarations {
            let param = decl
                .metadata
                .parameter_name()
                .map(|name| (name, decl.metadata.value_type()));
            by_key.insert(&decl.key, param);
        }
        by_key
            .into_iter()
            .filter_map(|(key, p)| {
                p.map(|(param, ty)| (key.to_owned(), param.to_owned(), ty.clone()))
            })
            .collect()
    }

    /// Create this schema's cells over `owner`.
    pub fn bind(&self, owner: &Rc<T>) -> StateMap {
        let mut map = StateMap::new();
        for decl in &self.declarations {
            let cell = match &decl.accessor {
                Accessor::Value { get, set: None } => {
                    let get = Rc::clone(get);
                    CellRef::new(Cell::new(
                        owner,
                        Rc::clone(&decl.key),
                        decl.metadata.clone(),
                        move |t: &T| get(t),
                    ))
                }
                Accessor::Value {
                    get,
                    set: Some(set),
                } => {
                    let get = Rc::clone(get);
                    let set = Rc::clone(set);
                    CellRef::new(Cell::with_setter(
                        owner,
                        Rc::clone(&decl.key),
                        decl.metadata.clone(),
                        move |t: &T| get(t),
                        move |t: &T, v| set(t, v),
                    ))
                }
                Accessor::Command(action) => {
                    let action = Rc::clone(action);
                    let mut cell = CommandCell::new(owner, Rc::clone(&decl.key), move |t: &T| {
                        action(t);
                    });
                    if let Some(label) = decl.metadata.label_text() {
                        cell = cell.label(label);
                    }
                    CellRef::new(cell)
                }
            };
            map.insert(decl.key.to_string(), cell);
        }
        map
    }
}

impl<T: 'static> Default for Schema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.declarations.iter().map(|d| &*d.key))
            .finish()
    }
}

/// Types that export a fixed [`Schema`].
///
/// Every `Exported` type is an [`ExportedState`].
pub trait Exported: Sized + 'static {
    fn schema() -> Schema<Self>;

    /// See [`ExportedState::state_is_dynamic`].
    fn is_dynamic(&self) -> bool {
        false
    }
}

impl<T: Exported> ExportedState for T {
    fn state(self: Rc<Self>) -> StateMap {
        T::schema().bind(&self)
    }

    fn state_is_dynamic(&self) -> bool {
        self.is_dynamic()
    }
}
