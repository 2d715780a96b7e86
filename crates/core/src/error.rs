//! Error types for the transaction engine
//!
//! ## Error Classes
//!
//! | Class | Variants | Transaction state after |
//! |-------|----------|-------------------------|
//! | Missing data | `NoSuchKey`, `DuplicateKey` | Still active; caller decides |
//! | Conflict | `Conflict(AbortReason)` | Fully aborted, retryable |
//! | Usage | `ColumnOutOfRange`, `TypeMismatch`, `Unknown*`, `Worker*`, `TransactionClosed` | Unchanged |
//! | Budget | `RetriesExhausted` | Aborted, permanent failure |
//!
//! Calling a concurrency surface a record variant does not have is not an
//! `Error`: it is a [`ProtocolMisuse`], which is fatal.

use crate::types::{Key, PartitionId, TableId, WorkerId};
use thiserror::Error;

/// Why a transaction was aborted
///
/// One variant per place a conflict can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortReason {
    /// OCC read found the record write-locked
    ReadLocked,
    /// OCC validation found a newer version than the one read
    ReadChanged,
    /// OCC validation found the record locked by another transaction
    ReadWriteConflict,
    /// OCC commit-time lock failed under the no-wait policy
    CommitLock,
    /// 2PL shared lock could not be acquired
    ReadLock,
    /// 2PL exclusive lock could not be acquired
    WriteLock,
    /// 2PL shared-to-exclusive upgrade failed
    Upgrade,
    /// Another transaction holds an insert reservation on the key
    InsertReserved,
    /// Another transaction holds a delete reservation on the key
    DeleteReserved,
    /// The record left the store while this transaction waited for it
    Removed,
}

impl AbortReason {
    /// Number of reasons
    pub const COUNT: usize = 10;

    /// All reasons, in counter order
    pub const ALL: [AbortReason; Self::COUNT] = [
        AbortReason::ReadLocked,
        AbortReason::ReadChanged,
        AbortReason::ReadWriteConflict,
        AbortReason::CommitLock,
        AbortReason::ReadLock,
        AbortReason::WriteLock,
        AbortReason::Upgrade,
        AbortReason::InsertReserved,
        AbortReason::DeleteReserved,
        AbortReason::Removed,
    ];

    /// Dense index, stable across releases
    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// Short name used in logs
    pub const fn name(&self) -> &'static str {
        match self {
            AbortReason::ReadLocked => "read_locked",
            AbortReason::ReadChanged => "read_changed",
            AbortReason::ReadWriteConflict => "read_write_conflict",
            AbortReason::CommitLock => "commit_lock",
            AbortReason::ReadLock => "read_lock",
            AbortReason::WriteLock => "write_lock",
            AbortReason::Upgrade => "upgrade",
            AbortReason::InsertReserved => "insert_reserved",
            AbortReason::DeleteReserved => "delete_reserved",
            AbortReason::Removed => "removed",
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine error type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Record absent from the store
    #[error("no such key {key} in table {table}")]
    NoSuchKey {
        /// Table searched
        table: TableId,
        /// Missing key
        key: Key,
    },

    /// Insert of a key that already exists
    #[error("duplicate key {key} in table {table}")]
    DuplicateKey {
        /// Target table
        table: TableId,
        /// Existing key
        key: Key,
    },

    /// Transaction aborted on a concurrency conflict; retry with a fresh
    /// transaction
    #[error("transaction aborted: {0}")]
    Conflict(AbortReason),

    /// Column index past the end of the tuple
    #[error("column {column} out of range ({columns} columns)")]
    ColumnOutOfRange {
        /// Requested column
        column: usize,
        /// Columns in the tuple
        columns: usize,
    },

    /// Value type does not match the column type
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Column / current value type
        expected: &'static str,
        /// Offered value type
        actual: &'static str,
    },

    /// Table index not configured
    #[error("unknown table {0}")]
    UnknownTable(TableId),

    /// Partition index not configured
    #[error("unknown partition {0}")]
    UnknownPartition(PartitionId),

    /// Configuration rejected by validation
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Worker id past [`MAX_WORKERS`](crate::types::MAX_WORKERS)
    #[error("worker id {0} out of range")]
    WorkerOutOfRange(WorkerId),

    /// Worker id already held by a live worker
    #[error("worker id {0} already in use")]
    WorkerInUse(WorkerId),

    /// Operation on a transaction that already committed or aborted
    #[error("transaction already closed")]
    TransactionClosed,

    /// Retry budget spent; the last attempt failed with `last`
    #[error("gave up after {attempts} attempts, last: {last}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Reason of the final abort
        last: AbortReason,
    },
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable.
    ///
    /// Retryable errors (conflicts) may succeed on retry with a fresh
    /// transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Check if this is a conflict error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NoSuchKey { .. })
    }

    /// Abort reason, if this is a conflict
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            Error::Conflict(r) => Some(*r),
            Error::RetriesExhausted { last, .. } => Some(*last),
            _ => None,
        }
    }
}

/// A concurrency surface invoked on a record variant that lacks it
///
/// This means the router handed a record to the wrong protocol: a
/// configuration bug, never a transaction-level condition. Callers escalate
/// it with [`ProtocolMisuse::fatal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{variant} record does not support {surface} operations")]
pub struct ProtocolMisuse {
    /// Record variant name
    pub variant: &'static str,
    /// Surface requested ("occ" or "locking")
    pub surface: &'static str,
}

impl ProtocolMisuse {
    /// Terminate: a misrouted protocol cannot be recovered from
    #[cold]
    pub fn fatal(self) -> ! {
        panic!("protocol misuse: {}", self)
    }
}
