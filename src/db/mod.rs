//! SQL runner abstraction.
//!
//! Provides a trait-based interface for executing SQL, allowing the mapper
//! to work against any backend: the sqlx-based PostgreSQL and SQLite
//! runners, the in-memory mock, or a caching wrapper around either.

mod cache;
mod cast;
mod mock;
mod postgres;
mod sqlite;
mod types;

pub use cache::CachingRunner;
pub use cast::ColumnType;
pub use mock::{CallKind, FailingRunner, MockRunner, RecordedCall};
pub use postgres::PostgresRunner;
pub use sqlite::SqliteRunner;
pub use types::{ColumnInfo, Row, SqlStatement, TabularResult, Value};

use crate::config::{ConnectionConfig, RunnerConfig};
use crate::error::Result;
use async_trait::async_trait;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    Sqlite,
}

impl DatabaseBackend {
    /// Returns the backend name as written in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Returns the default port for this backend, if it listens on one.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Postgres => Some(5432),
            Self::Sqlite => None,
        }
    }
}

/// Whether a call may be served from, or recorded into, a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// The runner may use whatever caching it applies by default.
    #[default]
    Default,
    /// The statement must be executed against the database and its result
    /// must not be memoized.
    Bypass,
}

impl CacheMode {
    /// Returns true when caching must be skipped.
    pub fn is_bypass(&self) -> bool {
        matches!(self, Self::Bypass)
    }
}

/// Creates a runner for the configured backend.
///
/// This is the central factory function for database connections.
pub async fn connect(
    config: &ConnectionConfig,
    runner_config: &RunnerConfig,
) -> Result<Box<dyn SqlRunner>> {
    match config.backend {
        DatabaseBackend::Postgres => {
            let runner = PostgresRunner::connect(config, runner_config).await?;
            Ok(Box::new(runner))
        }
        DatabaseBackend::Sqlite => {
            let runner = SqliteRunner::connect(config, runner_config).await?;
            Ok(Box::new(runner))
        }
    }
}

/// Trait defining the interface the mapper executes SQL through.
///
/// `label` names the kind of load for logging. Runner failures are returned
/// as `Query` or `Connection` errors and are never reinterpreted by the mapper.
#[async_trait]
pub trait SqlRunner: Send + Sync {
    /// Executes a statement and returns the full tabular result.
    async fn select_all(
        &self,
        statement: &SqlStatement,
        label: &str,
        cache: CacheMode,
    ) -> Result<TabularResult>;

    /// Executes a statement and returns only the number of affected rows.
    async fn execute_for_count(
        &self,
        statement: &SqlStatement,
        label: &str,
        cache: CacheMode,
    ) -> Result<u64>;

    /// Closes the underlying connection(s).
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl<T: SqlRunner + ?Sized> SqlRunner for Box<T> {
    async fn select_all(
        &self,
        statement: &SqlStatement,
        label: &str,
        cache: CacheMode,
    ) -> Result<TabularResult> {
        (**self).select_all(statement, label, cache).await
    }

    async fn execute_for_count(
        &self,
        statement: &SqlStatement,
        label: &str,
        cache: CacheMode,
    ) -> Result<u64> {
        (**self).execute_for_count(statement, label, cache).await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}
