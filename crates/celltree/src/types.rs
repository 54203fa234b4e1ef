#![forbid(unsafe_code)]

//! Semantic value types and write-time coercion.
//!
//! Every cell carries a [`ValueType`]. Writes pass through
//! [`ValueType::coerce`] before reaching the owner, so setters only ever see
//! values of their declared shape.
//!
//! # Coercion rules
//!
//! | type | accepts | conversion |
//! |---|---|---|
//! | `Int` | int, float, bool, numeric string | floats truncate toward zero |
//! | `Float` | int, float, numeric string | ints widen |
//! | `Bool` | bool, int | ints map `!= 0` |
//! | `Str` | string, number, bool | scalars format with `Display` |
//! | `Range` | anything `Float` accepts | optional clamp and rounding |
//! | `Enum` | string | strict enums reject unknown keys |
//! | `Constant` | nothing | read-only by construction |
//! | `Reference` | block | identity |
//! | `Any` | everything | identity |

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CellError, Result};
use crate::value::Value;

/// The semantic type of a cell's value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ValueType {
    #[default]
    Any,
    Bool,
    Int,
    Float,
    Str,
    Range(Range),
    Enum(EnumType),
    Constant(Value),
    /// A nested block; cells of this type are walked, not serialized as leaves.
    Reference,
}

impl ValueType {
    /// Convert `value` to this type, or explain why it cannot be.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        match self {
            Self::Any => Ok(value),
            Self::Bool => match value {
                Value::Bool(_) => Ok(value),
                Value::Int(n) => Ok(Value::Bool(n != 0)),
                other => Err(CellError::coercion("bool", &other)),
            },
            Self::Int => coerce_int(value),
            Self::Float => coerce_float(value).map(Value::Float),
            Self::Str => match value {
                Value::Str(_) => Ok(value),
                Value::Bool(_) | Value::Int(_) | Value::Float(_) => {
                    Ok(Value::Str(value.to_string()))
                }
                other => Err(CellError::coercion("string", &other)),
            },
            Self::Range(range) => range.coerce(value),
            Self::Enum(e) => e.coerce(value),
            Self::Constant(_) => Err(CellError::coercion("constant", &value)),
            Self::Reference => match value {
                Value::Block(_) => Ok(value),
                other => Err(CellError::coercion("block", &other)),
            },
        }
    }

    /// Whether cells of this type hold nested blocks.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Str => f.write_str("string"),
            Self::Range(r) => write!(f, "range{r}"),
            Self::Enum(_) => f.write_str("enum"),
            Self::Constant(v) => write!(f, "constant({v})"),
            Self::Reference => f.write_str("reference"),
        }
    }
}

fn coerce_int(value: Value) -> Result<Value> {
    match value {
        Value::Int(_) => Ok(value),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        // i64::MAX as f64 rounds up to 2^63, which is already out of range.
        Value::Float(x) if (i64::MIN as f64..i64::MAX as f64).contains(&x.trunc()) => {
            Ok(Value::Int(x.trunc() as i64))
        }
        Value::Str(ref s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| CellError::coercion("int", &value)),
        other => Err(CellError::coercion("int", &other)),
    }
}

fn coerce_float(value: Value) -> Result<f64> {
    match value {
        Value::Int(n) => Ok(n as f64),
        Value::Float(x) => Ok(x),
        Value::Str(ref s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| CellError::coercion("float", &value)),
        other => Err(CellError::coercion("float", &other)),
    }
}

// ─── Range ───────────────────────────────────────────────────────────────────

/// A union of closed numeric intervals.
///
/// Intervals are kept sorted by lower bound. When `strict`, values that fall
/// outside every interval clamp to the nearest endpoint; when `integer`,
/// values round to the nearest whole number after clamping.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    intervals: Vec<(f64, f64)>,
    strict: bool,
    integer: bool,
}

impl Range {
    /// Build a strict, non-integer range from `(min, max)` pairs.
    ///
    /// Pairs given as `(max, min)` are normalized.
    #[must_use]
    pub fn new(intervals: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let mut intervals: Vec<(f64, f64)> = intervals
            .into_iter()
            .map(|(a, b)| if a <= b { (a, b) } else { (b, a) })
            .collect();
        intervals.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self {
            intervals,
            strict: true,
            integer: false,
        }
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn integer(mut self, integer: bool) -> Self {
        self.integer = integer;
        self
    }

    #[must_use]
    pub fn intervals(&self) -> &[(f64, f64)] {
        &self.intervals
    }

    #[must_use]
    pub fn min(&self) -> Option<f64> {
        self.intervals.first().map(|r| r.0)
    }

    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.intervals.iter().map(|r| r.1).reduce(f64::max)
    }

    fn coerce(&self, value: Value) -> Result<Value> {
        let mut x = coerce_float(value)?;
        if self.strict {
            x = self.clamp(x);
        }
        if self.integer {
            x = x.round();
        }
        Ok(Value::Float(x))
    }

    fn clamp(&self, x: f64) -> f64 {
        if x.is_nan() {
            return x;
        }
        let mut best = x;
        let mut best_distance = f64::INFINITY;
        for &(lo, hi) in &self.intervals {
            if (lo..=hi).contains(&x) {
                return x;
            }
            let candidate = if x < lo { lo } else { hi };
            let distance = (candidate - x).abs();
            if distance < best_distance {
                best = candidate;
                best_distance = distance;
            }
        }
        best
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (lo, hi)) in self.intervals.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{lo}..={hi}")?;
        }
        f.write_str("]")
    }
}

// ─── Enum ────────────────────────────────────────────────────────────────────

/// A set of named string values with optional descriptions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnumType {
    values: BTreeMap<String, String>,
    strict: bool,
}

impl EnumType {
    /// A strict enum over `keys` with empty descriptions.
    #[must_use]
    pub fn new<K: Into<String>>(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            values: keys.into_iter().map(|k| (k.into(), String::new())).collect(),
            strict: true,
        }
    }

    #[must_use]
    pub fn describe(mut self, key: impl Into<String>, description: impl Into<String>) -> Self {
        self.values.insert(key.into(), description.into());
        self
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Known keys with their descriptions, in key order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, d)| (k.as_str(), d.as_str()))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn coerce(&self, value: Value) -> Result<Value> {
        match value {
            Value::Str(ref s) if !self.strict || self.contains(s) => Ok(value),
            other => Err(CellError::coercion("enum member", &other)),
        }
    }
}
