//! PostgreSQL runner implementation.
//!
//! Provides the `PostgresRunner` struct that implements the `SqlRunner` trait
//! for PostgreSQL databases using sqlx.

use crate::config::{ConnectionConfig, RunnerConfig};
use crate::db::{CacheMode, ColumnInfo, Row, SqlRunner, SqlStatement, TabularResult, Value};
use crate::error::{Result, StructError};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, JsonValue, Uuid};
use sqlx::{Column as SqlxColumn, Connection, Executor, Row as SqlxRow, Statement, TypeInfo};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// PostgreSQL runner backed by a connection pool.
#[derive(Debug)]
pub struct PostgresRunner {
    pool: PgPool,
    query_timeout: Duration,
}

impl PostgresRunner {
    /// Creates a runner from an existing connection pool.
    pub fn from_pool(pool: PgPool, runner_config: &RunnerConfig) -> Self {
        Self {
            pool,
            query_timeout: runner_config.query_timeout(),
        }
    }

    /// Connects to the configured database, retrying transient failures
    /// with exponential backoff.
    pub async fn connect(config: &ConnectionConfig, runner_config: &RunnerConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(runner_config.max_connections)
                .acquire_timeout(runner_config.acquire_timeout())
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    info!("Connected to {}", config.display_string());
                    return Ok(Self::from_pool(pool, runner_config));
                }
                Err(e) if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                    warn!(
                        "Connection attempt {} failed (transient error), retrying in {:?}",
                        attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2; // Exponential backoff
                    attempt += 1;
                }
                Err(e) => return Err(map_connection_error(e, config)),
            }
        }
    }

    /// Builds a query with numbered placeholders and all binds applied.
    fn build_query<'q>(
        sql: &'q str,
        statement: &SqlStatement,
        cache: CacheMode,
    ) -> Result<PgQuery<'q>> {
        let mut query = sqlx::query(sql).persistent(!cache.is_bypass());
        for value in &statement.binds {
            query = bind_value(query, value)?;
        }
        Ok(query)
    }

    /// Fetches column metadata for a query that returned no rows.
    ///
    /// Best effort: statements that cannot be prepared without bind types
    /// yield no columns. With `CacheMode::Bypass` the connection's statement
    /// cache is cleared afterwards so the described statement is not kept.
    async fn fetch_column_metadata(&self, sql: &str, cache: CacheMode) -> Vec<ColumnInfo> {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                debug!("Could not describe empty result: {e}");
                return Vec::new();
            }
        };

        let columns = match (&mut *conn).prepare(sql).await {
            Ok(prepared) => prepared
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            Err(e) => {
                debug!("Could not describe empty result: {e}");
                Vec::new()
            }
        };

        if cache.is_bypass() {
            if let Err(e) = conn.clear_cached_statements().await {
                warn!("Could not release described statement: {e}");
            }
        }
        columns
    }
}

#[async_trait]
impl SqlRunner for PostgresRunner {
    async fn select_all(
        &self,
        statement: &SqlStatement,
        label: &str,
        cache: CacheMode,
    ) -> Result<TabularResult> {
        let sql = numbered_placeholders(&statement.sql);
        let query = Self::build_query(&sql, statement, cache)?;
        let start = Instant::now();

        let rows = tokio::time::timeout(self.query_timeout, query.fetch_all(&self.pool))
            .await
            .map_err(|_| {
                StructError::query(format!(
                    "Query timed out after {} seconds",
                    self.query_timeout.as_secs()
                ))
            })?
            .map_err(|e| StructError::query(format_query_error(e)))?;

        debug!(
            "{label} returned {} rows in {:?}",
            rows.len(),
            start.elapsed()
        );

        let columns: Vec<ColumnInfo> = match rows.first() {
            Some(first_row) => first_row
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            None => self.fetch_column_metadata(&sql, cache).await,
        };

        let rows = rows.iter().map(convert_row).collect::<Result<Vec<Row>>>()?;
        TabularResult::new(columns, rows)
    }

    async fn execute_for_count(
        &self,
        statement: &SqlStatement,
        label: &str,
        cache: CacheMode,
    ) -> Result<u64> {
        let sql = numbered_placeholders(&statement.sql);
        let query = Self::build_query(&sql, statement, cache)?;

        let done = tokio::time::timeout(self.query_timeout, query.execute(&self.pool))
            .await
            .map_err(|_| {
                StructError::query(format!(
                    "Query timed out after {} seconds",
                    self.query_timeout.as_secs()
                ))
            })?
            .map_err(|e| StructError::query(format_query_error(e)))?;

        debug!("{label} affected {} rows", done.rows_affected());
        Ok(done.rows_affected())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Rewrites `?` placeholders into PostgreSQL's `$1, $2, ...`.
///
/// Question marks inside quoted literals or identifiers are left alone, and
/// `??` produces a literal `?` (for the jsonb operators).
pub(crate) fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;
    let mut index = 0;

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' if chars.peek() == Some(&'?') => {
                    chars.next();
                    out.push('?');
                }
                '?' => {
                    index += 1;
                    out.push('$');
                    out.push_str(&index.to_string());
                }
                _ => out.push(c),
            },
        }
    }

    out
}

/// Binds a single value onto the query.
fn bind_value<'q>(query: PgQuery<'q>, value: &Value) -> Result<PgQuery<'q>> {
    Ok(match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::Array(items) => bind_array(query, items)?,
    })
}

/// Binds a homogeneous array; NULL elements are allowed in any position.
fn bind_array<'q>(query: PgQuery<'q>, items: &[Value]) -> Result<PgQuery<'q>> {
    let all = |f: fn(&Value) -> bool| items.iter().all(|v| v.is_null() || f(v));

    if all(|v| matches!(v, Value::Int(_))) {
        let values: Vec<Option<i64>> = items
            .iter()
            .map(|v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .collect();
        Ok(query.bind(values))
    } else if all(|v| matches!(v, Value::String(_))) {
        let values: Vec<Option<String>> = items
            .iter()
            .map(|v| match v {
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        Ok(query.bind(values))
    } else if all(|v| matches!(v, Value::Float(_))) {
        let values: Vec<Option<f64>> = items
            .iter()
            .map(|v| match v {
                Value::Float(f) => Some(*f),
                _ => None,
            })
            .collect();
        Ok(query.bind(values))
    } else if all(|v| matches!(v, Value::Bool(_))) {
        let values: Vec<Option<bool>> = items
            .iter()
            .map(|v| match v {
                Value::Bool(b) => Some(*b),
                _ => None,
            })
            .collect();
        Ok(query.bind(values))
    } else {
        Err(StructError::query(
            "Cannot bind an array with mixed element types",
        ))
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Result<Row> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

fn decode_error(
    row: &PgRow,
    index: usize,
    type_name: &str,
    error: impl std::fmt::Display,
) -> StructError {
    let column = row.columns().get(index).map(|c| c.name()).unwrap_or("?");
    StructError::query(format!(
        "Cannot decode column '{column}' of type {type_name}: {error}"
    ))
}

/// Decodes an optional value of type `T`. NULL becomes `Value::Null`; a
/// value the driver cannot decode is an error.
fn decode<'r, T, F>(row: &'r PgRow, index: usize, type_name: &str, wrap: F) -> Result<Value>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    F: FnOnce(T) -> Value,
{
    row.try_get::<Option<T>, _>(index)
        .map(|value| value.map(wrap).unwrap_or(Value::Null))
        .map_err(|e| decode_error(row, index, type_name, e))
}

/// Decodes an array column, keeping NULL elements.
fn decode_array<'r, T, F>(row: &'r PgRow, index: usize, type_name: &str, wrap: F) -> Result<Value>
where
    T: for<'a> sqlx::Decode<'a, Postgres> + sqlx::Type<Postgres> + sqlx::postgres::PgHasArrayType,
    F: Fn(T) -> Value,
{
    decode::<Vec<Option<T>>, _>(row, index, type_name, |items| {
        Value::Array(
            items
                .into_iter()
                .map(|item| item.map(&wrap).unwrap_or(Value::Null))
                .collect(),
        )
    })
}

fn text<T: ToString>(value: T) -> Value {
    Value::String(value.to_string())
}

/// Converts a single column value from a PgRow to our Value type.
///
/// Exact numerics, temporal types, UUIDs and JSON come back as their
/// canonical text form.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Result<Value> {
    let upper = type_name.to_uppercase();
    match upper.as_str() {
        "BOOL" | "BOOLEAN" => decode::<bool, _>(row, index, type_name, Value::Bool),
        "INT2" | "SMALLINT" => decode::<i16, _>(row, index, type_name, |v| Value::Int(v as i64)),
        "INT4" | "INT" | "INTEGER" => {
            decode::<i32, _>(row, index, type_name, |v| Value::Int(v as i64))
        }
        "INT8" | "BIGINT" => decode::<i64, _>(row, index, type_name, Value::Int),
        "FLOAT4" | "REAL" => decode::<f32, _>(row, index, type_name, |v| Value::Float(v as f64)),
        "FLOAT8" | "DOUBLE PRECISION" => decode::<f64, _>(row, index, type_name, Value::Float),
        "BYTEA" => decode::<Vec<u8>, _>(row, index, type_name, Value::Bytes),
        "NUMERIC" => decode::<Decimal, _>(row, index, type_name, text),
        "DATE" => decode::<NaiveDate, _>(row, index, type_name, text),
        "TIME" => decode::<NaiveTime, _>(row, index, type_name, text),
        "TIMESTAMP" => decode::<NaiveDateTime, _>(row, index, type_name, text),
        "TIMESTAMPTZ" => decode::<DateTime<Utc>, _>(row, index, type_name, |v| {
            Value::String(v.to_rfc3339())
        }),
        "UUID" => decode::<Uuid, _>(row, index, type_name, text),
        "JSON" | "JSONB" => decode::<JsonValue, _>(row, index, type_name, text),

        "BOOL[]" => decode_array::<bool, _>(row, index, type_name, Value::Bool),
        "INT2[]" => decode_array::<i16, _>(row, index, type_name, |v| Value::Int(v as i64)),
        "INT4[]" => decode_array::<i32, _>(row, index, type_name, |v| Value::Int(v as i64)),
        "INT8[]" => decode_array::<i64, _>(row, index, type_name, Value::Int),
        "FLOAT4[]" => decode_array::<f32, _>(row, index, type_name, |v| Value::Float(v as f64)),
        "FLOAT8[]" => decode_array::<f64, _>(row, index, type_name, Value::Float),
        "TEXT[]" | "VARCHAR[]" | "NAME[]" | "BPCHAR[]" => {
            decode_array::<String, _>(row, index, type_name, Value::String)
        }
        "NUMERIC[]" => decode_array::<Decimal, _>(row, index, type_name, text),
        "DATE[]" => decode_array::<NaiveDate, _>(row, index, type_name, text),
        "UUID[]" => decode_array::<Uuid, _>(row, index, type_name, text),

        _ if upper.ends_with("[]") => Err(decode_error(
            row,
            index,
            type_name,
            "unsupported array type",
        )),

        // Text-like and user-defined types (enums, citext, ...) are sent as text.
        _ => row
            .try_get_unchecked::<Option<String>, _>(index)
            .map(|value| value.map(Value::String).unwrap_or(Value::Null))
            .map_err(|e| decode_error(row, index, type_name, e)),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    if matches!(error, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) {
        return true;
    }

    let error_str = error.to_string().to_lowercase();

    // Authentication and database-not-found errors are not transient
    if error_str.contains("authentication failed")
        || error_str.contains("does not exist")
        || error_str.contains("ssl")
        || error_str.contains("tls")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> StructError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        StructError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        StructError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        StructError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        StructError::connection(
            "Server requires SSL. Add '?sslmode=require' to connection string.",
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        StructError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        StructError::connection(error.to_string())
    }
}

/// Formats a query error with the PostgreSQL detail fields when available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        let fields = [
            ("DETAIL", pg_error.detail()),
            ("HINT", pg_error.hint()),
            ("TABLE", pg_error.table()),
            ("COLUMN", pg_error.column()),
            ("CONSTRAINT", pg_error.constraint()),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                result.push_str(&format!("\n  {name}: {value}"));
            }
        }
    }

    result
}
