//! Result extraction rules.
//!
//! Pure transforms from an executed `TabularResult` to records, plucked
//! values, scalars and tuples. Nothing here touches a runner.

use crate::db::{Row, TabularResult, Value};
use crate::error::{Result, StructError};
use crate::record::ShapeDescriptor;
use std::collections::HashSet;

/// A value plucked from one row: the bare value for single-column results,
/// the full row otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Plucked {
    Scalar(Value),
    Tuple(Vec<Value>),
}

impl Plucked {
    /// Collapses a cast row: one column yields a scalar.
    fn from_row(mut row: Row, width: usize) -> Self {
        if width == 1 {
            Self::Scalar(row.pop().unwrap_or_default())
        } else {
            Self::Tuple(row)
        }
    }

    /// Returns the scalar, if this is one.
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Tuple(_) => None,
        }
    }

    /// Returns the tuple, if this is one.
    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Self::Scalar(_) => None,
            Self::Tuple(values) => Some(values),
        }
    }

    /// Returns the values; a scalar becomes a one-element vector.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Self::Scalar(value) => vec![value],
            Self::Tuple(values) => values,
        }
    }
}

/// Fails unless every column name is distinct.
pub fn ensure_unique_columns(result: &TabularResult) -> Result<()> {
    let mut seen = HashSet::with_capacity(result.columns.len());
    let duplicates: Vec<String> = result
        .columns
        .iter()
        .filter(|column| !seen.insert(column.name.as_str()))
        .map(|column| column.name.clone())
        .collect();

    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(StructError::DuplicateColumns {
            columns: duplicates,
        })
    }
}

/// Fails unless the column names equal the shape's fields, in order.
pub fn ensure_shape(result: &TabularResult, shape: &ShapeDescriptor) -> Result<()> {
    let columns = result.column_names();
    if shape.matches(&columns) {
        Ok(())
    } else {
        Err(StructError::ShapeMismatch {
            expected: shape.fields().to_vec(),
            found: columns.into_iter().map(String::from).collect(),
        })
    }
}

/// Validates the result against `shape` and builds one record per row.
pub fn map_records<R, F>(result: &TabularResult, shape: &ShapeDescriptor, build: F) -> Result<Vec<R>>
where
    F: FnMut(Vec<Value>) -> Result<R>,
{
    ensure_unique_columns(result)?;
    ensure_shape(result, shape)?;
    result.cast_values().into_iter().map(build).collect()
}

/// Builds one record per row matching columns to fields by position only.
///
/// Column names are not compared with field names, so aliased columns
/// (`economic_schools.name AS school_name`) can fill differently named fields.
pub fn map_positional<R, F>(result: &TabularResult, field_count: usize, build: F) -> Result<Vec<R>>
where
    F: FnMut(Vec<Value>) -> Result<R>,
{
    if result.columns.len() != field_count {
        return Err(StructError::FieldCountMismatch {
            expected: field_count,
            found: result.columns.len(),
        });
    }
    ensure_unique_columns(result)?;
    result.cast_values().into_iter().map(build).collect()
}

/// Returns one entry per row: scalars for single-column results, tuples otherwise.
pub fn pluck(result: &TabularResult) -> Vec<Plucked> {
    let width = result.columns.len();
    result
        .cast_values()
        .into_iter()
        .map(|row| Plucked::from_row(row, width))
        .collect()
}

/// Returns the single value of a single-column result with at most one row.
pub fn scalar(result: &TabularResult) -> Result<Option<Value>> {
    if result.columns.len() != 1 {
        return Err(StructError::ColumnCount {
            found: result.columns.len(),
        });
    }

    Ok(single_row(result)?.and_then(|mut row| row.pop()))
}

/// Returns the single row of a result with at most one row, collapsed to a
/// scalar when there is exactly one column.
pub fn tuple(result: &TabularResult) -> Result<Option<Plucked>> {
    let width = result.columns.len();
    Ok(single_row(result)?.map(|row| Plucked::from_row(row, width)))
}

fn single_row(result: &TabularResult) -> Result<Option<Row>> {
    match result.row_count() {
        0 => Ok(None),
        1 => Ok(result.cast_values().pop()),
        found => Err(StructError::Cardinality { found }),
    }
}
