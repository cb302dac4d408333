//! relation-to-struct - map SQL results into fixed-shape records.
//!
//! Executes raw SQL through a [`SqlRunner`] and maps the result into typed
//! records, plucked values, single scalars or single tuples, validating the
//! column set against the target shape. Result-mapping calls always bypass
//! any query cache.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mapper;
pub mod record;
pub mod relation;

pub use config::{Config, ConnectionConfig, RunnerConfig};
pub use db::{
    CacheMode, CachingRunner, ColumnInfo, ColumnType, DatabaseBackend, SqlRunner, SqlStatement,
    TabularResult, Value,
};
pub use error::{Result, StructError};
pub use mapper::{Plucked, ResultMapper};
pub use record::{FromValue, MappedRecord, Record, ShapeDescriptor};
pub use relation::SelectQuery;
