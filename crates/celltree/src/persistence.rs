#![forbid(unsafe_code)]

//! Saving and restoring a state tree to a JSON file.
//!
//! - [`ChangeDetector`] watches every persisted leaf and block cell under a
//!   root and reports "something persistable changed", coalesced to one
//!   callback per scheduler turn.
//! - [`StateFile`] reads and writes the serialized tree.
//! - [`PersistenceGlue`] ties the two together: restore on creation, then
//!   write a fixed delay after each change.
//!
//! # Invariants
//!
//! 1. When a block cell changes (a child was replaced), the detector
//!    re-walks the tree before reporting, so cells of the new child are
//!    watched from then on.
//! 2. A node reachable through several paths is watched once; cycles
//!    terminate.
//! 3. The state file is replaced atomically (write to a sibling temporary
//!    file, then rename).

use std::cell::{Cell as StdCell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use thiserror::Error;
use web_time::Duration;

use crate::cell::{BaseCell, CellIdentity, CellMetadata, CellRef, subscribe_by_policy};
use crate::config::PollerConfig;
use crate::error::{CellError, Result as CellResult};
use crate::policy::Changes;
use crate::scheduler::{Scheduler, TimerHandle};
use crate::state::BlockRef;
use crate::subscription::{Callback, Subscription, SubscriptionContext};
use crate::types::ValueType;
use crate::value::Value;

pub type Result<T> = std::result::Result<T, PersistenceError>;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state file does not contain a JSON object: {path}")]
    NotAnObject { path: PathBuf },
}

// ─── Change detection ────────────────────────────────────────────────────────

/// Synthetic cell whose value is the key set of a dynamic node.
#[derive(Clone)]
struct KeySetCell {
    block: BlockRef,
    metadata: CellMetadata,
}

impl KeySetCell {
    fn new(block: BlockRef) -> Self {
        Self {
            block,
            metadata: CellMetadata::new(ValueType::Str, Changes::ThisObject).persists(false),
        }
    }
}

impl BaseCell for KeySetCell {
    fn identity(&self) -> CellIdentity {
        CellIdentity::new(self.block.address(), "<keys>")
    }

    fn metadata(&self) -> &CellMetadata {
        &self.metadata
    }

    fn get(&self) -> Value {
        let keys: Vec<String> = self.block.state().into_keys().collect();
        Value::Str(keys.join("\n"))
    }

    fn set(&self, _value: Value) -> CellResult<()> {
        Err(CellError::not_writable("<keys>"))
    }

    fn subscribe(&self, callback: Callback, context: &SubscriptionContext) -> Subscription {
        subscribe_by_policy(CellRef::new(self.clone()), callback, context)
    }
}

struct DetectorInner {
    root: BlockRef,
    context: SubscriptionContext,
    callback: Box<dyn Fn()>,
    subscriptions: RefCell<Vec<Subscription>>,
    pending: StdCell<bool>,
    structure_dirty: StdCell<bool>,
    timer: RefCell<Option<TimerHandle>>,
}

impl DetectorInner {
    fn rewalk(self: &Rc<Self>) {
        let mut subscriptions = Vec::new();
        let mut visited = HashSet::new();
        self.walk(&self.root, &mut visited, &mut subscriptions);
        let previous = self.subscriptions.replace(subscriptions);
        drop(previous);
    }

    fn walk(
        self: &Rc<Self>,
        block: &BlockRef,
        visited: &mut HashSet<BlockRef>,
        out: &mut Vec<Subscription>,
    ) {
        if !visited.insert(block.clone()) {
            return;
        }
        if block.state_is_dynamic() {
            out.push(self.watch(&KeySetCell::new(block.clone()), true));
        }
        for cell in block.state().into_values() {
            if cell.is_block() {
                out.push(self.watch(&*cell, true));
                if let Value::Block(child) = cell.get() {
                    self.walk(&child, visited, out);
                }
            } else if cell.metadata().is_persistent() {
                out.push(self.watch(&*cell, false));
            }
        }
    }

    fn watch(self: &Rc<Self>, cell: &dyn BaseCell, structural: bool) -> Subscription {
        let weak = Rc::downgrade(self);
        cell.subscribe(
            Rc::new(move |_: &Value| {
                if let Some(inner) = weak.upgrade() {
                    inner.changed(structural);
                }
            }),
            &self.context,
        )
    }

    fn changed(self: &Rc<Self>, structural: bool) {
        if structural {
            self.structure_dirty.set(true);
        }
        if self.pending.replace(true) {
            return;
        }
        let weak: Weak<DetectorInner> = Rc::downgrade(self);
        let timer = self.context.scheduler.call_later(
            Duration::ZERO,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.fire();
                }
            }),
        );
        self.timer.replace(Some(timer));
    }

    fn fire(self: &Rc<Self>) {
        self.pending.set(false);
        self.timer.replace(None);
        if self.structure_dirty.replace(false) {
            self.rewalk();
        }
        (self.callback)();
    }
}

/// Reports changes to anything under a root that would alter its
/// serialized state.
///
/// Dropping the detector releases every subscription it holds.
pub struct ChangeDetector {
    inner: Rc<DetectorInner>,
}

impl ChangeDetector {
    pub fn new(
        root: BlockRef,
        context: &SubscriptionContext,
        callback: impl Fn() + 'static,
    ) -> Self {
        let inner = Rc::new(DetectorInner {
            root,
            context: context.clone(),
            callback: Box::new(callback),
            subscriptions: RefCell::new(Vec::new()),
            pending: StdCell::new(false),
            structure_dirty: StdCell::new(false),
            timer: RefCell::new(None),
        });
        inner.rewalk();
        Self { inner }
    }

    /// Number of cells currently watched.
    #[must_use]
    pub fn watched(&self) -> usize {
        self.inner.subscriptions.borrow().len()
    }

    /// Whether a callback is scheduled but has not run yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.pending.get()
    }
}

impl Drop for ChangeDetector {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.timer.take() {
            timer.cancel();
        }
        self.inner.subscriptions.take();
    }
}

impl fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeDetector")
            .field("root", &self.inner.root)
            .field("watched", &self.watched())
            .field("pending", &self.is_pending())
            .finish()
    }
}

// ─── State file ──────────────────────────────────────────────────────────────

/// A JSON file holding one serialized state tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored tree, or `None` if the file does not exist.
    pub fn load(&self) -> Result<Option<serde_json::Value>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let tree: serde_json::Value = serde_json::from_str(&content)?;
        if !tree.is_object() {
            return Err(PersistenceError::NotAnObject {
                path: self.path.clone(),
            });
        }
        Ok(Some(tree))
    }

    /// Serialize `root` and replace the file with the result.
    pub fn save(&self, root: &BlockRef) -> Result<()> {
        let tree = serde_json::Value::Object(root.state_to_json());
        let content = serde_json::to_string_pretty(&tree)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.temp_path();
        fs::write(&tmp, content)?;
        if let Err(err) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        tracing::debug!(path = %self.path.display(), "state saved");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

// ─── Glue ────────────────────────────────────────────────────────────────────

struct GlueInner {
    root: BlockRef,
    file: StateFile,
    scheduler: Rc<dyn Scheduler>,
    delay: Duration,
    write_timer: RefCell<Option<TimerHandle>>,
    detector: RefCell<Option<ChangeDetector>>,
}

impl GlueInner {
    fn schedule_write(self: &Rc<Self>) {
        if self.write_timer.borrow().is_some() {
            return;
        }
        let weak = Rc::downgrade(self);
        let timer = self.scheduler.call_later(
            self.delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.write_timer.replace(None);
                    if let Err(error) = inner.file.save(&inner.root) {
                        tracing::error!(
                            path = %inner.file.path().display(),
                            %error,
                            "failed to save state"
                        );
                    }
                }
            }),
        );
        self.write_timer.replace(Some(timer));
    }
}

/// Keeps a state file in sync with a tree.
///
/// Dropping the glue cancels a pending write without performing it; call
/// [`flush`](Self::flush) first to keep the latest changes.
pub struct PersistenceGlue {
    inner: Rc<GlueInner>,
}

impl PersistenceGlue {
    /// Restore `root` from `file` (if it exists) and start watching it.
    ///
    /// # Errors
    ///
    /// The stored file exists but cannot be read or parsed.
    pub fn new(
        root: BlockRef,
        file: StateFile,
        context: &SubscriptionContext,
        config: &PollerConfig,
    ) -> Result<Self> {
        if let Some(tree) = file.load()? {
            tracing::debug!(path = %file.path().display(), "restoring state");
            root.state_from_json(&tree);
        }
        let inner = Rc::new(GlueInner {
            root: root.clone(),
            file,
            scheduler: Rc::clone(&context.scheduler),
            delay: config.persist_delay(),
            write_timer: RefCell::new(None),
            detector: RefCell::new(None),
        });
        let weak = Rc::downgrade(&inner);
        let detector = ChangeDetector::new(root, context, move || {
            if let Some(inner) = weak.upgrade() {
                inner.schedule_write();
            }
        });
        inner.detector.replace(Some(detector));
        Ok(Self { inner })
    }

    /// Write now, cancelling any pending delayed write.
    pub fn flush(&self) -> Result<()> {
        if let Some(timer) = self.inner.write_timer.take() {
            timer.cancel();
        }
        self.inner.file.save(&self.inner.root)
    }

    /// Whether a delayed write is scheduled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.write_timer.borrow().is_some()
    }

    #[must_use]
    pub fn file(&self) -> &StateFile {
        &self.inner.file
    }
}

impl Drop for PersistenceGlue {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.write_timer.take() {
            timer.cancel();
        }
        self.inner.detector.take();
    }
}

impl fmt::Debug for PersistenceGlue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceGlue")
            .field("path", &self.inner.file.path())
            .field("pending", &self.is_pending())
            .finish()
    }
}
