#![forbid(unsafe_code)]

//! Error kinds shared by cells, collections, and state-tree deserialization.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CellError>;

/// Errors raised by cell reads/writes and tree operations.
///
/// Tree-level deserialization never propagates these past
/// [`BlockRef::state_from_json`](crate::state::BlockRef::state_from_json);
/// they are logged and contained per key.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CellError {
    #[error("cell {key:?} is not writable")]
    NotWritable { key: String },

    #[error("cannot coerce {found} to {expected}")]
    TypeCoercion { expected: String, found: String },

    #[error("insertion of {key:?} rejected: {reason}")]
    Insertion { key: String, reason: String },

    #[error("subscription misuse: {reason}")]
    SubscriptionMisuse { reason: String },

    #[error("unknown constructor parameter {name:?}")]
    UnknownParameter { name: String },
}

impl CellError {
    #[must_use]
    pub fn not_writable(key: impl Into<String>) -> Self {
        Self::NotWritable { key: key.into() }
    }

    #[must_use]
    pub fn coercion(expected: impl Into<String>, found: impl std::fmt::Display) -> Self {
        Self::TypeCoercion {
            expected: expected.into(),
            found: found.to_string(),
        }
    }

    #[must_use]
    pub fn insertion(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Insertion {
            key: key.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn misuse(reason: impl Into<String>) -> Self {
        Self::SubscriptionMisuse {
            reason: reason.into(),
        }
    }
}
