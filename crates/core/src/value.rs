//! Column value type
//!
//! Tuples store one [`Value`] per column. Values are typed; the schema of a
//! table fixes the type of every column and writes of the wrong type are
//! rejected.
//!
//! ## Delta Updates
//!
//! Numeric columns support in-place increments ([`Value::apply_delta`]).
//! A staged delta is added to whatever value the column holds at apply
//! time rather than overwriting it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A single column value
///
/// ## Equality Rules
///
/// - Different types are never equal (`Int(1) != Float(1.0)`)
/// - Float uses IEEE-754 equality: `NaN != NaN`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent / unset column
    #[default]
    Null,

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit IEEE-754 floating point
    Float(f64),

    /// UTF-8 encoded string
    String(String),

    /// Arbitrary binary data
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns the type name as a string (for error messages)
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bytes slice
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Add `delta` to this value in place
    ///
    /// Only `Int + Int` and `Float + Float` are defined. Integer addition
    /// wraps, matching the two's-complement counters workloads keep in
    /// balance columns.
    pub fn apply_delta(&mut self, delta: &Value) -> Result<()> {
        match (self, delta) {
            (Value::Int(cur), Value::Int(d)) => {
                *cur = cur.wrapping_add(*d);
                Ok(())
            }
            (Value::Float(cur), Value::Float(d)) => {
                *cur += *d;
                Ok(())
            }
            (cur, d) => Err(Error::TypeMismatch {
                expected: cur.type_name(),
                actual: d.type_name(),
            }),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}
