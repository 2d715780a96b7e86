//! Unified error type for the adaptcc facade.
//!
//! Wraps the engine's error and presents the distinctions callers act on:
//! retry, give up, or fix the request.

use adaptcc_core::error::AbortReason;
use thiserror::Error;

/// All adaptcc errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Key, table, or partition does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Key already present or reserved by this transaction
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Transaction aborted on a conflict; retry with a fresh transaction
    #[error("conflict: {0}")]
    Conflict(AbortReason),

    /// Retry budget spent
    #[error("gave up after {attempts} attempts (last conflict: {last})")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Last abort reason
        last: AbortReason,
    },

    /// Value does not fit the column
    #[error("wrong type: expected {expected}, got {actual}")]
    WrongType {
        /// Expected type
        expected: String,
        /// Actual type
        actual: String,
    },

    /// Request outside the schema or the configured shape
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Rejected configuration
    #[error("invalid config: {0}")]
    Config(String),

    /// Transaction already committed or aborted
    #[error("transaction closed")]
    Closed,
}

/// Result type for adaptcc operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether re-running the transaction may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Whether this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether this is a conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Abort reason, for conflicts and exhausted retries
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            Error::Conflict(r) => Some(*r),
            Error::RetriesExhausted { last, .. } => Some(*last),
            _ => None,
        }
    }
}

impl From<adaptcc_core::Error> for Error {
    fn from(e: adaptcc_core::Error) -> Self {
        use adaptcc_core::Error as CoreError;
        match e {
            CoreError::NoSuchKey { table, key } => Error::NotFound(format!("key {} in table {}", key, table)),
            CoreError::UnknownTable(t) => Error::NotFound(format!("table {}", t)),
            CoreError::UnknownPartition(p) => Error::NotFound(format!("partition {}", p)),
            CoreError::DuplicateKey { table, key } => Error::Duplicate(format!("key {} in table {}", key, table)),
            CoreError::Conflict(reason) => Error::Conflict(reason),
            CoreError::RetriesExhausted { attempts, last } => Error::RetriesExhausted { attempts, last },
            CoreError::TypeMismatch { expected, actual } => Error::WrongType {
                expected: expected.to_string(),
                actual: actual.to_string(),
            },
            CoreError::ColumnOutOfRange { column, columns } => {
                Error::ConstraintViolation(format!("column {} out of range ({} columns)", column, columns))
            }
            CoreError::InvalidConfig(msg) => Error::Config(msg),
            e @ (CoreError::WorkerOutOfRange(_) | CoreError::WorkerInUse(_)) => Error::Config(e.to_string()),
            CoreError::TransactionClosed => Error::Closed,
        }
    }
}
