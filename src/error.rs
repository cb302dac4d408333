//! Error types for relation-to-struct.
//!
//! Defines the error enum shared by the mapper, the runners and the
//! configuration layer.

use thiserror::Error;

/// Main error type for mapping and execution operations.
#[derive(Error, Debug)]
pub enum StructError {
    /// Result column names are not pairwise distinct.
    #[error("Expected column names to be unique")]
    DuplicateColumns { columns: Vec<String> },

    /// Result column names (or their order) differ from the target shape.
    #[error("Expected column names (and their order) to match struct attribute names")]
    ShapeMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Relation load selected a different number of columns than the record has fields.
    #[error("Expected struct fields and columns lengths to be equal")]
    FieldCountMismatch { expected: usize, found: usize },

    /// Scalar extraction against a result that does not have exactly one column.
    #[error("Expected exactly one column to be selected")]
    ColumnCount { found: usize },

    /// More than one row where zero or one is required.
    #[error("Expected only a single result to be returned")]
    Cardinality { found: usize },

    /// Relation load without an explicit select list.
    #[error("Expected select_values to be present")]
    MissingSelect,

    /// Shape descriptor with no fields.
    #[error("Expected at least one struct attribute")]
    EmptyShape,

    /// A cast value could not be converted into the record field's type.
    #[error("Cannot convert {found} to {expected} for field '{field}'")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: String,
    },

    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, constraint violations, timeouts, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (invalid config file, bad connection string, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (malformed results, poisoned locks, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StructError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Creates a type mismatch error for a record field.
    pub fn type_mismatch(
        field: impl Into<String>,
        expected: &'static str,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected,
            found: found.into(),
        }
    }

    /// Returns true for errors raised by result validation rather than by the runner.
    pub fn is_mapping_error(&self) -> bool {
        !matches!(
            self,
            Self::Connection(_) | Self::Query(_) | Self::Config(_) | Self::Internal(_)
        )
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::DuplicateColumns { .. }
            | Self::ShapeMismatch { .. }
            | Self::FieldCountMismatch { .. }
            | Self::EmptyShape => "Shape Error",
            Self::ColumnCount { .. } | Self::Cardinality { .. } => "Cardinality Error",
            Self::MissingSelect => "Relation Error",
            Self::TypeMismatch { .. } => "Type Error",
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using StructError.
pub type Result<T> = std::result::Result<T, StructError>;
