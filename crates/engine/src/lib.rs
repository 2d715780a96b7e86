//! Adaptive mixed-protocol transaction engine
//!
//! Each partition runs PCC, OCC, or 2PL, chosen per epoch; one transaction
//! may span partitions under different protocols and still commits
//! atomically.
//!
//! # Layout
//!
//! - [`router`]: partition → protocol tables and the epoch gate
//! - [`controller`]: epoch-boundary protocol choice
//! - [`worker`]: per-thread TID source, statistics, retry loop
//! - [`transaction`]: read/write dispatch, commit, abort
//! - [`manager`]: engine construction and epoch switching
//!
//! # Example
//!
//! ```
//! use adaptcc_core::{ColumnTuple, ColumnType, EngineConfig, Key, Schema, Value};
//! use adaptcc_engine::TransactionManager;
//! use adaptcc_storage::MemStore;
//! use std::sync::Arc;
//!
//! let config = EngineConfig::default();
//! let store = Arc::new(MemStore::from_config(&config));
//! let schema = Arc::new(Schema::new(vec![ColumnType::Int]));
//! let row = ColumnTuple::new(schema, vec![Value::Int(10)]).unwrap();
//! store.load(0, Key::from_u64(1), 0, Box::new(row)).unwrap();
//!
//! let manager = TransactionManager::new(config, store).unwrap();
//! let mut worker = manager.worker(0).unwrap();
//! let mut txn = worker.begin().unwrap();
//! txn.delta(0, &Key::from_u64(1), 0, 0, Value::Int(5)).unwrap();
//! txn.commit().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controller;
pub mod manager;
pub mod router;
pub mod transaction;
pub mod worker;

pub use controller::{FixedController, ProtocolController, ThresholdController, WorkloadFeatures};
pub use manager::{EngineShared, TransactionManager};
pub use router::{EpochGate, ProtocolRouter, RoutingTable};
pub use transaction::{MixedTransaction, Mutation, TransactionStatus};
pub use worker::{StatsSnapshot, TidGenerator, Worker, WorkerStats};
