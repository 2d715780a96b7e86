//! Core types for the adaptive transaction engine
//!
//! This crate defines the vocabulary shared by every layer:
//! - Keys, TIDs and dense ids ([`types`])
//! - Protocols and system modes ([`protocol`])
//! - Column values and tuples ([`value`], [`tuple`])
//! - Errors and abort reasons ([`error`])
//! - Engine configuration ([`config`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod tuple;
pub mod types;
pub mod value;

pub use config::EngineConfig;
pub use error::{AbortReason, Error, ProtocolMisuse, Result};
pub use protocol::{OccLockPolicy, Protocol, SystemMode, TwoPlPolicy};
pub use tuple::{ColumnId, ColumnTuple, ColumnType, Schema, Tuple};
pub use types::{Key, PartitionId, TableId, Tid, WorkerId, KEY_LEN, MAX_WORKERS};
pub use value::Value;
