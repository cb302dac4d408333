//! Result and statement types.
//!
//! Defines the raw tabular result produced by a runner, the values it holds,
//! and the SQL statement (text plus positional binds) handed to a runner.

use super::cast::ColumnType;
use crate::error::{Result, StructError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The raw output of a single SQL execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TabularResult {
    /// Column metadata for the result set, in select order.
    pub columns: Vec<ColumnInfo>,

    /// Rows of raw values, each as wide as `columns`.
    pub rows: Vec<Row>,

    /// Casters that replace the declared-type caster for a column.
    #[serde(default)]
    pub type_overrides: HashMap<String, ColumnType>,
}

impl TabularResult {
    /// Creates a result, rejecting rows whose width differs from the column count.
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Result<Self> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(StructError::internal(format!(
                "Row {index} has {} values but the result has {} columns",
                row.len(),
                columns.len()
            )));
        }

        Ok(Self {
            columns,
            rows,
            type_overrides: HashMap::new(),
        })
    }

    /// Creates an empty result with the given columns.
    pub fn empty(columns: Vec<ColumnInfo>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            type_overrides: HashMap::new(),
        }
    }

    /// Overrides the caster used for the named column.
    pub fn with_type_override(mut self, column: impl Into<String>, ty: ColumnType) -> Self {
        self.type_overrides.insert(column.into(), ty);
        self
    }

    /// Returns the column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the caster for a column: its override, else its declared type.
    pub fn column_type(&self, index: usize) -> ColumnType {
        let Some(column) = self.columns.get(index) else {
            return ColumnType::Identity;
        };
        self.type_overrides
            .get(&column.name)
            .cloned()
            .unwrap_or_else(|| ColumnType::from_declared(&column.data_type))
    }

    /// Casts a single raw value using the caster of the named column.
    ///
    /// Unknown columns cast through the identity caster.
    pub fn cast(&self, column_name: &str, value: Value) -> Value {
        match self.columns.iter().position(|c| c.name == column_name) {
            Some(index) => self.column_type(index).cast(value),
            None => value,
        }
    }

    /// Returns every row with each value cast by its column's caster.
    ///
    /// Rows are always returned at full width; collapsing single-column
    /// rows into scalars is the caller's decision.
    pub fn cast_values(&self) -> Vec<Row> {
        let types: Vec<ColumnType> = (0..self.columns.len())
            .map(|i| self.column_type(i))
            .collect();

        self.rows
            .iter()
            .map(|row| {
                types
                    .iter()
                    .zip(row.iter())
                    .map(|(ty, value)| ty.cast(value.clone()))
                    .collect()
            })
            .collect()
    }
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Declared column type as reported by the driver.
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A row of data from a query result.
pub type Row = Vec<Value>;

/// Represents a single value from a database query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// One-dimensional array.
    Array(Vec<Value>),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the variant name, used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
        }
    }

    /// Attempts to convert the value to a string representation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_display_string).collect();
                format!("{{{}}}", parts.join(","))
            }
        }
    }

    /// Converts the value into plain JSON (bytes become an array of numbers).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::from(b.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

// Conversion implementations for common types
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
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

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// SQL text with ordered positional binds.
///
/// Placeholders are written as `?`; runners for databases with numbered
/// placeholders rewrite them before execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlStatement {
    pub sql: String,
    pub binds: Vec<Value>,
}

impl SqlStatement {
    /// Creates a statement without binds.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    /// Appends a positional bind.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.binds.push(value.into());
        self
    }

    /// Key identifying this statement in a result cache.
    pub(crate) fn cache_key(&self) -> String {
        format!("{}\u{0}{:?}", self.sql, self.binds)
    }
}

impl From<&str> for SqlStatement {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for SqlStatement {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

impl From<&SqlStatement> for SqlStatement {
    fn from(statement: &SqlStatement) -> Self {
        statement.clone()
    }
}

impl<S, V> From<(S, Vec<V>)> for SqlStatement
where
    S: Into<String>,
    V: Into<Value>,
{
    fn from((sql, binds): (S, Vec<V>)) -> Self {
        Self {
            sql: sql.into(),
            binds: binds.into_iter().map(Into::into).collect(),
        }
    }
}
