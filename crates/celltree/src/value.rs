#![forbid(unsafe_code)]

//! Dynamically typed cell values.
//!
//! A [`Value`] is either a scalar leaf (the things that can be persisted as
//! JSON) or a reference to a nested [`BlockRef`].
//!
//! # Invariants
//!
//! 1. Equality is what the poller uses for change detection, so it must be
//!    reflexive: `Float(NaN) == Float(NaN)`, otherwise a NaN-valued cell
//!    would fire on every tick.
//! 2. `Int(n) == Float(n as f64)` when the float is exact, matching how
//!    numbers round-trip through JSON.
//! 3. Blocks compare by identity, never by content.

use std::fmt;

use serde_json::Number;

use crate::error::{CellError, Result};
use crate::state::BlockRef;

/// A value read from or written to a cell.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Block(BlockRef),
}

impl Value {
    /// Short name of the variant, used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Block(_) => "block",
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view of the value; ints widen.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_block(&self) -> Option<&BlockRef> {
        match self {
            Self::Block(b) => Some(b),
            _ => None,
        }
    }

    /// Convert a leaf to JSON.
    ///
    /// Returns `None` for blocks, which serialize through their own state.
    /// Non-finite floats have no JSON representation and become `null`.
    #[must_use]
    pub fn to_json(&self) -> Option<serde_json::Value> {
        Some(match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(n) => serde_json::Value::Number((*n).into()),
            Self::Float(x) => Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Block(_) => return None,
        })
    }

    /// Convert scalar JSON to a value.
    ///
    /// Arrays and objects are not leaf values and yield `None`.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Str(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => int_eq_float(*a, *b),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Block(a), Self::Block(b)) => a == b,
            _ => false,
        }
    }
}

/// Exact comparison; no rounding of either side.
fn int_eq_float(a: i64, b: f64) -> bool {
    b.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&b) && b as i64 == a
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(n) => write!(f, "Int({n})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::Block(b) => write!(f, "Block({b:?})"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Block(b) => write!(f, "{b:?}"),
        }
    }
}

// ─── Conversions ─────────────────────────────────────────────────────────────

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<BlockRef> for Value {
    fn from(b: BlockRef) -> Self {
        Self::Block(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl TryFrom<Value> for bool {
    type Error = CellError;

    fn try_from(v: Value) -> Result<Self> {
        v.as_bool().ok_or_else(|| CellError::coercion("bool", &v))
    }
}

impl TryFrom<Value> for i64 {
    type Error = CellError;

    fn try_from(v: Value) -> Result<Self> {
        v.as_i64().ok_or_else(|| CellError::coercion("int", &v))
    }
}

impl TryFrom<Value> for f64 {
    type Error = CellError;

    fn try_from(v: Value) -> Result<Self> {
        v.as_f64().ok_or_else(|| CellError::coercion("float", &v))
    }
}

impl TryFrom<Value> for String {
    type Error = CellError;

    fn try_from(v: Value) -> Result<Self> {
        match v {
            Value::Str(s) => Ok(s),
            other => Err(CellError::coercion("string", &other)),
        }
    }
}

impl TryFrom<Value> for BlockRef {
    type Error = CellError;

    fn try_from(v: Value) -> Result<Self> {
        match v {
            Value::Block(b) => Ok(b),
            other => Err(CellError::coercion("block", &other)),
        }
    }
}
