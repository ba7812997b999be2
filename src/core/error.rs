use std::fmt;

use thiserror::Error;

use crate::jdbc::SqlException;

/// The family of integrity constraint a database rejected a statement for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
    Other,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unique => "unique",
            Self::ForeignKey => "foreign_key",
            Self::NotNull => "not_null",
            Self::Check => "check",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Row was updated or deleted by another transaction: [{entity}#{id}]")]
    StaleState { entity: String, id: String },

    #[error(
        "Unexpected row count for statement at batch position {batch_position}: expected {expected}, actual {actual} [{sql}]"
    )]
    UnexpectedRowCount {
        expected: u64,
        actual: u64,
        batch_position: usize,
        sql: String,
    },

    #[error(
        "{message}: {kind} constraint [{}] violated [{sql}]",
        .constraint_name.as_deref().unwrap_or("<unknown>")
    )]
    ConstraintViolation {
        kind: ConstraintKind,
        constraint_name: Option<String>,
        message: String,
        sql: String,
        source: SqlException,
    },

    #[error("{message}: could not acquire lock [{sql}]")]
    LockAcquisition {
        message: String,
        sql: String,
        source: SqlException,
    },

    #[error("{message}: pessimistic lock not available [{sql}]")]
    PessimisticLock {
        message: String,
        sql: String,
        source: SqlException,
    },

    #[error("{message}: statement timed out [{sql}]")]
    QueryTimeout {
        message: String,
        sql: String,
        source: SqlException,
    },

    #[error("{message} [{source}] [{sql}]")]
    Jdbc {
        message: String,
        sql: String,
        source: SqlException,
    },

    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl PersistError {
    /// Optimistic-locking failures: the row the statement targeted was gone
    /// or no longer matched the restrictions.
    pub fn is_stale_state(&self) -> bool {
        matches!(self, Self::StaleState { .. })
    }

    pub fn constraint_name(&self) -> Option<&str> {
        match self {
            Self::ConstraintViolation {
                constraint_name, ..
            } => constraint_name.as_deref(),
            _ => None,
        }
    }

    /// The underlying driver exception, when this error wraps one.
    pub fn sql_exception(&self) -> Option<&SqlException> {
        match self {
            Self::ConstraintViolation { source, .. }
            | Self::LockAcquisition { source, .. }
            | Self::PessimisticLock { source, .. }
            | Self::QueryTimeout { source, .. }
            | Self::Jdbc { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;

impl<T> From<std::sync::PoisonError<T>> for PersistError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for PersistError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}
