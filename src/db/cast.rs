//! Column type casting.
//!
//! Raw values come back from the drivers in whatever representation the
//! driver decoded (SQLite in particular hands back untyped text and integers).
//! A `ColumnType` derived from the declared column type normalizes them.
//! Casting is lenient: a value that does not convert is returned unchanged.

use super::types::Value;
use serde::{Deserialize, Serialize};

/// Caster applied to every value of a column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Values pass through unchanged.
    #[default]
    Identity,
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    /// One-dimensional array whose elements are cast with the inner type.
    Array(Box<ColumnType>),
}

impl ColumnType {
    /// Maps a declared SQL type name (PostgreSQL or SQLite spelling) to a caster.
    pub fn from_declared(type_name: &str) -> Self {
        let upper = type_name.trim().to_uppercase();

        if let Some(inner) = upper.strip_suffix("[]") {
            return Self::Array(Box::new(Self::from_declared(inner)));
        }
        // Postgres reports array types of the pg_catalog as _int4, _text, ...
        if let Some(inner) = upper.strip_prefix('_') {
            return Self::Array(Box::new(Self::from_declared(inner)));
        }

        match upper.as_str() {
            "BOOL" | "BOOLEAN" => Self::Bool,
            "INT2" | "INT4" | "INT8" | "SMALLINT" | "INT" | "INTEGER" | "BIGINT" => Self::Int,
            "FLOAT4" | "FLOAT8" | "REAL" | "DOUBLE" | "DOUBLE PRECISION" => Self::Float,
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "CHARACTER VARYING" | "CITEXT" => {
                Self::Text
            }
            "BYTEA" | "BLOB" => Self::Bytes,
            _ if upper.starts_with("VARCHAR(") || upper.starts_with("CHARACTER VARYING(") => {
                Self::Text
            }
            _ => Self::Identity,
        }
    }

    /// Casts a raw value. NULL is never converted.
    pub fn cast(&self, value: Value) -> Value {
        if value.is_null() {
            return value;
        }

        match self {
            Self::Identity | Self::Bytes => value,
            Self::Bool => cast_bool(value),
            Self::Int => cast_int(value),
            Self::Float => cast_float(value),
            Self::Text => cast_text(value),
            Self::Array(inner) => match value {
                Value::Array(items) => {
                    Value::Array(items.into_iter().map(|v| inner.cast(v)).collect())
                }
                other => other,
            },
        }
    }
}

fn cast_bool(value: Value) -> Value {
    match value {
        Value::Int(0) => Value::Bool(false),
        Value::Int(1) => Value::Bool(true),
        Value::String(ref s) => match s.to_lowercase().as_str() {
            "t" | "true" | "1" => Value::Bool(true),
            "f" | "false" | "0" => Value::Bool(false),
            _ => value,
        },
        other => other,
    }
}

fn cast_int(value: Value) -> Value {
    match value {
        Value::Bool(b) => Value::Int(b as i64),
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Value::Int(f as i64),
        Value::String(ref s) => s.trim().parse().map(Value::Int).unwrap_or(value),
        other => other,
    }
}

fn cast_float(value: Value) -> Value {
    match value {
        Value::Int(i) => Value::Float(i as f64),
        Value::String(ref s) => s.trim().parse().map(Value::Float).unwrap_or(value),
        other => other,
    }
}

fn cast_text(value: Value) -> Value {
    match value {
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => Value::String(value.to_display_string()),
        other => other,
    }
}
