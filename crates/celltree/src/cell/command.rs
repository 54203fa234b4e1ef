#![forbid(unsafe_code)]

//! Action cells.

use std::fmt;
use std::rc::Rc;

use super::{BaseCell, CellIdentity, CellMetadata};
use crate::error::Result;
use crate::policy::Changes;
use crate::subscription::{Callback, Subscription, SubscriptionContext};
use crate::types::ValueType;
use crate::value::Value;

/// A zero-argument action exposed as a cell.
///
/// Writing any value invokes the action; reading yields `Null`. Commands are
/// never persisted and have nothing to subscribe to.
#[derive(Clone)]
pub struct CommandCell {
    identity: CellIdentity,
    metadata: CellMetadata,
    action: Rc<dyn Fn()>,
}

impl CommandCell {
    pub fn new<O: 'static>(
        owner: &Rc<O>,
        key: impl Into<Rc<str>>,
        action: impl Fn(&O) + 'static,
    ) -> Self {
        let target = Rc::clone(owner);
        Self {
            identity: CellIdentity::of(owner, key),
            metadata: CellMetadata::new(ValueType::Any, Changes::Never)
                .writable(true)
                .persists(false),
            action: Rc::new(move || action(&target)),
        }
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.metadata = self.metadata.label(label);
        self
    }

    pub fn invoke(&self) {
        tracing::debug!(key = %self.identity.key(), "invoke command");
        (self.action)();
    }
}

impl BaseCell for CommandCell {
    fn identity(&self) -> CellIdentity {
        self.identity.clone()
    }

    fn metadata(&self) -> &CellMetadata {
        &self.metadata
    }

    fn get(&self) -> Value {
        Value::Null
    }

    fn set(&self, _value: Value) -> Result<()> {
        self.invoke();
        Ok(())
    }

    fn subscribe(&self, _callback: Callback, _context: &SubscriptionContext) -> Subscription {
        Subscription::inert()
    }
}

impl fmt::Debug for CommandCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandCell")
            .field("key", &self.identity.key())
            .finish_non_exhaustive()
    }
}
