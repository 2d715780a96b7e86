//! Public types for the adaptcc facade.
//!
//! Re-exports from the internal crates under one path.

// Keys, versions, identifiers
pub use adaptcc_core::{Key, PartitionId, TableId, Tid, WorkerId, KEY_LEN};

// Values and tuples
pub use adaptcc_core::{ColumnId, ColumnTuple, ColumnType, Schema, Tuple, Value};

// Protocols and policies
pub use adaptcc_core::{AbortReason, EngineConfig, OccLockPolicy, Protocol, SystemMode, TwoPlPolicy};

// Engine
pub use adaptcc_engine::{
    FixedController, MixedTransaction, ProtocolController, RoutingTable, StatsSnapshot, ThresholdController,
    TransactionManager, TransactionStatus, Worker, WorkloadFeatures,
};

// Storage
pub use adaptcc_storage::{MemStore, Record, Store};
