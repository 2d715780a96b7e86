//! Tuples: fixed-schema columnar value storage
//!
//! A [`Tuple`] is owned by exactly one record. The engine only touches it
//! through the owning protocol's write path, so implementations need no
//! synchronisation of their own.

use crate::error::{Error, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Column index within a tuple
pub type ColumnId = usize;

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Float,
    /// UTF-8 string
    String,
    /// Raw bytes
    Bytes,
}

impl ColumnType {
    /// Whether `value` may be stored in a column of this type
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ColumnType::Int, Value::Int(_))
                | (ColumnType::Float, Value::Float(_))
                | (ColumnType::String, Value::String(_))
                | (ColumnType::Bytes, Value::Bytes(_))
        )
    }

    fn name(&self) -> &'static str {
        match self {
            ColumnType::Int => "Int",
            ColumnType::Float => "Float",
            ColumnType::String => "String",
            ColumnType::Bytes => "Bytes",
        }
    }
}

/// Ordered list of column types for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnType>,
}

impl Schema {
    /// Create a schema from column types
    pub fn new(columns: Vec<ColumnType>) -> Self {
        Self { columns }
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Type of column `col`
    pub fn column(&self, col: ColumnId) -> Result<ColumnType> {
        self.columns
            .get(col)
            .copied()
            .ok_or(Error::ColumnOutOfRange { column: col, columns: self.columns.len() })
    }

    /// Whether `value` may be stored in column `col`
    pub fn check(&self, col: ColumnId, value: &Value) -> Result<()> {
        let ty = self.column(col)?;
        if ty.accepts(value) {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                expected: ty.name(),
                actual: value.type_name(),
            })
        }
    }
}

/// Columnar value storage behind a record
///
/// Every accessor is column-addressed. `delta_value` adds in place rather
/// than overwriting.
pub trait Tuple: Send + Sync + std::fmt::Debug {
    /// Read column `col`
    fn get_value(&self, col: ColumnId) -> Result<Value>;

    /// Overwrite column `col`
    fn set_value(&mut self, col: ColumnId, value: Value) -> Result<()>;

    /// Add `delta` to column `col` in place
    fn delta_value(&mut self, col: ColumnId, delta: &Value) -> Result<()>;

    /// Number of columns
    fn column_count(&self) -> usize;

    /// Whether `value` could be written to column `col`
    ///
    /// The default compares against the type currently stored.
    fn check_value(&self, col: ColumnId, value: &Value) -> Result<()> {
        let cur = self.get_value(col)?;
        if cur.is_null() || cur.type_name() == value.type_name() {
            Ok(())
        } else {
            Err(Error::TypeMismatch { expected: cur.type_name(), actual: value.type_name() })
        }
    }

    /// Copy of every column, in order
    fn snapshot(&self) -> Vec<Value> {
        (0..self.column_count())
            .map(|c| self.get_value(c).unwrap_or_default())
            .collect()
    }
}

/// Default [`Tuple`] implementation: one [`Value`] per schema column
#[derive(Debug, Clone)]
pub struct ColumnTuple {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl ColumnTuple {
    /// Build a tuple, checking every value against the schema
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(Error::ColumnOutOfRange {
                column: values.len(),
                columns: schema.len(),
            });
        }
        for (col, v) in values.iter().enumerate() {
            schema.check(col, v)?;
        }
        Ok(Self { schema, values })
    }

    /// The tuple's schema
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

impl Tuple for ColumnTuple {
    fn get_value(&self, col: ColumnId) -> Result<Value> {
        self.values
            .get(col)
            .cloned()
            .ok_or(Error::ColumnOutOfRange { column: col, columns: self.values.len() })
    }

    fn set_value(&mut self, col: ColumnId, value: Value) -> Result<()> {
        self.schema.check(col, &value)?;
        self.values[col] = value;
        Ok(())
    }

    fn delta_value(&mut self, col: ColumnId, delta: &Value) -> Result<()> {
        self.schema.check(col, delta)?;
        self.values[col].apply_delta(delta)
    }

    fn column_count(&self) -> usize {
        self.values.len()
    }

    fn check_value(&self, col: ColumnId, value: &Value) -> Result<()> {
        self.schema.check(col, value)
    }

    fn snapshot(&self) -> Vec<Value> {
        self.values.clone()
    }
}
