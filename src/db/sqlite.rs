//! SQLite runner implementation.
//!
//! Provides the `SqliteRunner` struct that implements the `SqlRunner` trait
//! for SQLite files and in-memory databases using sqlx.

use crate::config::{ConnectionConfig, RunnerConfig};
use crate::db::{CacheMode, ColumnInfo, Row, SqlRunner, SqlStatement, TabularResult, Value};
use crate::error::{Result, StructError};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, Statement, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Database name that selects a private in-memory database.
const MEMORY_DATABASE: &str = ":memory:";

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite runner backed by a connection pool.
#[derive(Debug)]
pub struct SqliteRunner {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl SqliteRunner {
    /// Creates a runner from an existing connection pool.
    pub fn from_pool(pool: SqlitePool, runner_config: &RunnerConfig) -> Self {
        Self {
            pool,
            query_timeout: runner_config.query_timeout(),
        }
    }

    /// Opens the configured database file, creating it if missing.
    ///
    /// `:memory:` opens a private in-memory database on a single connection
    /// that is never recycled, so its contents live as long as the runner.
    pub async fn connect(config: &ConnectionConfig, runner_config: &RunnerConfig) -> Result<Self> {
        let database = config
            .database
            .as_deref()
            .ok_or_else(|| StructError::config("SQLite database path is required"))?;

        let result = if database == MEMORY_DATABASE {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| StructError::config(format!("Invalid database path: {e}")))?;
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .acquire_timeout(runner_config.acquire_timeout())
                .connect_with(options)
                .await
        } else {
            let options = SqliteConnectOptions::new()
                .filename(database)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5))
                .create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(runner_config.max_connections)
                .acquire_timeout(runner_config.acquire_timeout())
                .connect_with(options)
                .await
        };
        let pool = result
            .map_err(|e| StructError::connection(format!("Failed to open {database}: {e}")))?;

        info!("Opened SQLite database {database}");
        Ok(Self::from_pool(pool, runner_config))
    }

    /// Opens a private in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let config = ConnectionConfig::sqlite(MEMORY_DATABASE);
        Self::connect(&config, &RunnerConfig::default()).await
    }

    fn build_query<'q>(
        statement: &'q SqlStatement,
        cache: CacheMode,
    ) -> Result<SqliteQuery<'q>> {
        let mut query = sqlx::query(&statement.sql).persistent(!cache.is_bypass());
        for value in &statement.binds {
            query = bind_value(query, value)?;
        }
        Ok(query)
    }

    /// Fetches column metadata for a query that returned no rows.
    async fn fetch_column_metadata(&self, sql: &str) -> Vec<ColumnInfo> {
        match (&self.pool).prepare(sql).await {
            Ok(prepared) => prepared
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            Err(e) => {
                debug!("Could not describe empty result: {e}");
                Vec::new()
            }
        }
    }

    fn timeout_error(&self) -> StructError {
        StructError::query(format!(
            "Query timed out after {} seconds",
            self.query_timeout.as_secs()
        ))
    }
}

#[async_trait]
impl SqlRunner for SqliteRunner {
    async fn select_all(
        &self,
        statement: &SqlStatement,
        label: &str,
        cache: CacheMode,
    ) -> Result<TabularResult> {
        let query = Self::build_query(statement, cache)?;
        let start = Instant::now();

        let rows = tokio::time::timeout(self.query_timeout, query.fetch_all(&self.pool))
            .await
            .map_err(|_| self.timeout_error())?
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
            None => self.fetch_column_metadata(&statement.sql).await,
        };

        let rows: Vec<Row> = rows.iter().map(convert_row).collect();
        TabularResult::new(columns, rows)
    }

    async fn execute_for_count(
        &self,
        statement: &SqlStatement,
        label: &str,
        cache: CacheMode,
    ) -> Result<u64> {
        let query = Self::build_query(statement, cache)?;

        let done = tokio::time::timeout(self.query_timeout, query.execute(&self.pool))
            .await
            .map_err(|_| self.timeout_error())?
            .map_err(|e| StructError::query(format_query_error(e)))?;

        debug!("{label} affected {} rows", done.rows_affected());
        Ok(done.rows_affected())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Binds a single value onto the query. SQLite has no array type.
fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> Result<SqliteQuery<'q>> {
    Ok(match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::Array(_) => {
            return Err(StructError::query("SQLite does not support array binds"));
        }
    })
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Converts a single value using its storage class rather than the declared
/// column type, since SQLite columns are dynamically typed.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if !raw.is_null() => raw.type_info().name().to_uppercase(),
        _ => return Value::Null,
    };

    let value = match storage.as_str() {
        "INTEGER" => row.try_get::<i64, _>(index).map(Value::Int),
        "REAL" => row.try_get::<f64, _>(index).map(Value::Float),
        "BOOLEAN" => row.try_get::<bool, _>(index).map(Value::Bool),
        "BLOB" => row.try_get::<Vec<u8>, _>(index).map(Value::Bytes),
        _ => row.try_get::<String, _>(index).map(Value::String),
    };

    value.unwrap_or(Value::Null)
}

fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => format!("ERROR: {}", db_error.message()),
        None => error.to_string(),
    }
}
