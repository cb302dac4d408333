//! Result mapping over a SQL runner.
//!
//! `ResultMapper` executes SQL through a [`SqlRunner`] and maps the tabular
//! result into records, plucked values, scalars or tuples. Every operation
//! except relation loading forces `CacheMode::Bypass`, so non-deterministic
//! SQL is re-executed even inside a query cache scope.

pub mod extract;

pub use extract::Plucked;

use crate::db::{CacheMode, SqlRunner, SqlStatement, TabularResult, Value};
use crate::error::{Result, StructError};
use crate::record::{FromValue, MappedRecord, Record, ShapeDescriptor};
use crate::relation::SelectQuery;
use std::time::Instant;
use tracing::debug;

const STRUCTS_LOAD: &str = "Structs SQL Load";
const PLUCK_LOAD: &str = "Pluck SQL Load";
const VALUE_LOAD: &str = "Value SQL Load";
const RUN_SQL: &str = "Run SQL";
const RELATION_LOAD: &str = "Relation Structs Load";

/// Executes SQL and maps results into fixed-shape values.
pub struct ResultMapper<'a> {
    runner: &'a dyn SqlRunner,
}

impl<'a> ResultMapper<'a> {
    /// Creates a mapper over the given runner.
    pub fn new(runner: &'a dyn SqlRunner) -> Self {
        Self { runner }
    }

    /// Maps every row into a typed record.
    ///
    /// Column names must be unique and must equal the record's field names
    /// in order.
    pub async fn structs_from_sql<R: Record>(
        &self,
        statement: impl Into<SqlStatement>,
    ) -> Result<Vec<R>> {
        let shape = R::shape()?;
        let result = self.load(statement.into(), STRUCTS_LOAD).await?;
        extract::map_records(&result, &shape, R::from_values)
    }

    /// Maps every row into a record of a runtime shape.
    pub async fn records_from_sql(
        &self,
        shape: &ShapeDescriptor,
        statement: impl Into<SqlStatement>,
    ) -> Result<Vec<MappedRecord>> {
        let result = self.load(statement.into(), STRUCTS_LOAD).await?;
        extract::map_records(&result, shape, |values| {
            MappedRecord::new(shape.clone(), values)
        })
    }

    /// Returns one entry per row: a scalar for single-column results, the
    /// full tuple otherwise.
    pub async fn pluck_from_sql(&self, statement: impl Into<SqlStatement>) -> Result<Vec<Plucked>> {
        let result = self.load(statement.into(), PLUCK_LOAD).await?;
        Ok(extract::pluck(&result))
    }

    /// Returns the single value selected, or `None` when no row matched.
    ///
    /// A NULL in the single row is `Some(Value::Null)`.
    pub async fn value_from_sql(&self, statement: impl Into<SqlStatement>) -> Result<Option<Value>> {
        let result = self.load(statement.into(), VALUE_LOAD).await?;
        extract::scalar(&result)
    }

    /// Typed variant of [`value_from_sql`](Self::value_from_sql).
    pub async fn value_as<T: FromValue>(
        &self,
        statement: impl Into<SqlStatement>,
    ) -> Result<Option<T>> {
        let result = self.load(statement.into(), VALUE_LOAD).await?;
        let field = result
            .columns
            .first()
            .map(|c| c.name.clone())
            .unwrap_or_default();
        extract::scalar(&result)?
            .map(|value| T::from_value(value, &field))
            .transpose()
    }

    /// Returns the single row selected, or `None` when no row matched.
    /// A single-column row is returned as a bare scalar.
    pub async fn tuple_from_sql(
        &self,
        statement: impl Into<SqlStatement>,
    ) -> Result<Option<Plucked>> {
        let result = self.load(statement.into(), VALUE_LOAD).await?;
        extract::tuple(&result)
    }

    /// Executes a statement without building a result set and returns the
    /// number of affected rows.
    pub async fn run_sql(&self, statement: impl Into<SqlStatement>) -> Result<u64> {
        let statement = statement.into();
        let start = Instant::now();
        let count = self
            .runner
            .execute_for_count(&statement, RUN_SQL, CacheMode::Bypass)
            .await?;
        debug!(
            sql = %statement.sql,
            rows_affected = count,
            elapsed = ?start.elapsed(),
            "{RUN_SQL}"
        );
        Ok(count)
    }

    /// Loads a relation into typed records, matching columns to fields by
    /// position.
    ///
    /// The relation must have an explicit select list. Relation loads use
    /// the runner's default caching.
    pub async fn to_structs<R: Record>(&self, relation: &SelectQuery) -> Result<Vec<R>> {
        if relation.select_values().is_empty() {
            return Err(StructError::MissingSelect);
        }
        let statement = relation.to_statement();
        let result = self
            .execute(&statement, RELATION_LOAD, CacheMode::Default)
            .await?;
        extract::map_positional(&result, R::fields().len(), R::from_values)
    }

    async fn load(&self, statement: SqlStatement, label: &str) -> Result<TabularResult> {
        self.execute(&statement, label, CacheMode::Bypass).await
    }

    async fn execute(
        &self,
        statement: &SqlStatement,
        label: &str,
        cache: CacheMode,
    ) -> Result<TabularResult> {
        let start = Instant::now();
        let result = self.runner.select_all(statement, label, cache).await?;
        debug!(
            sql = %statement.sql,
            binds = statement.binds.len(),
            rows = result.row_count(),
            columns = result.columns.len(),
            elapsed = ?start.elapsed(),
            "{label}"
        );
        Ok(result)
    }
}
