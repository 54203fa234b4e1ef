#![forbid(unsafe_code)]

//! Celltree: reactive property cells and serializable state trees.
//!
//! Objects expose named, typed values and nested sub-objects as a tree of
//! cells. Observers subscribe to a cell and receive its new value whenever
//! it changes. Whether that happens by push from the cell's own setter or by
//! periodic polling is decided by the cell's declared [`Changes`] policy;
//! the subscriber sees one interface either way.
//!
//! # Modules
//!
//! - [`cell`]: the cell variants and their shared [`BaseCell`] trait.
//! - [`poller`]: sampling of cells that cannot push.
//! - [`scheduler`]: the host event-loop abstraction and a virtual clock.
//! - [`state`]: the exported state tree and its JSON (de)serialization.
//! - [`persistence`]: change detection and state files.
//!
//! # Quick start
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use celltree::{
//!     BaseCell, LabScheduler, LooseCell, Poller, SubscriptionContext, Value, ValueType,
//! };
//!
//! let context = SubscriptionContext::new(Rc::new(LabScheduler::new()), Poller::new());
//! let cell = LooseCell::new(0, "a", ValueType::Int);
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! let sub = cell.subscribe(Rc::new(move |v: &Value| sink.borrow_mut().push(v.clone())), &context);
//!
//! cell.set(Value::Float(2.1)).unwrap();
//! assert_eq!(cell.get(), Value::Int(2));
//! assert_eq!(*seen.borrow(), vec![Value::Int(2)]);
//! sub.unsubscribe();
//! ```

pub mod cell;
pub mod config;
pub mod error;
mod notify;
pub mod persistence;
pub mod policy;
pub mod poller;
pub mod scheduler;
pub mod state;
pub mod subscription;
pub mod types;
pub mod value;

pub use cell::{
    BaseCell, Cell, CellIdentity, CellMetadata, CellRef, CommandCell, LooseCell, Transform,
    ViewCell,
};
pub use config::PollerConfig;
pub use error::{CellError, Result};
pub use persistence::{ChangeDetector, PersistenceError, PersistenceGlue, StateFile};
pub use policy::{Changes, Delivery, PollQueue};
pub use poller::{Poller, RegistrationId};
pub use scheduler::{LabScheduler, PumpedScheduler, Scheduler, TimerHandle};
pub use state::{
    BlockRef, ChildFactory, CollectionState, EmptyState, Exported, ExportedState, FromKwargs,
    Inserter, Kwargs, Schema, StateMap, take_kwarg, unserialize_exported_state,
};
pub use subscription::{Callback, Subscription, SubscriptionContext};
pub use types::{EnumType, Range, ValueType};
pub use value::Value;
