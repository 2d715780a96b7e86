//! # adaptcc
//!
//! Adaptive mixed-protocol transaction engine.
//!
//! Every partition runs one of three concurrency-control protocols,
//! chosen per epoch:
//!
//! - **PCC**: the owning worker has the partition to itself
//! - **OCC**: unguarded reads, validated against versions at commit
//! - **2PL**: shared/exclusive record locks held to commit, with bounded
//!   spinning or wait-die
//!
//! A single transaction may touch partitions under different protocols and
//! still commits atomically.
//!
//! ## Quick Start
//!
//! ```
//! use adaptcc::prelude::*;
//! use std::sync::Arc;
//!
//! let bed = Testbed::builder().partitions(1).protocol(Protocol::Occ).build()?;
//! let schema = Arc::new(Schema::new(vec![ColumnType::Int]));
//! let row = ColumnTuple::new(schema, vec![Value::Int(1)])?;
//! bed.load(0, Key::from_u64(7), 0, Box::new(row))?;
//!
//! let mut worker = bed.worker(0).unwrap();
//! let mut txn = worker.begin()?;
//! let v = txn.read(0, &Key::from_u64(7), 0, 0)?;
//! txn.write(0, &Key::from_u64(7), 0, 0, Value::Int(v.as_int().unwrap_or(0) + 1))?;
//! txn.commit()?;
//!
//! assert_eq!(bed.value(0, &Key::from_u64(7), 0, 0)?, Value::Int(2));
//! # Ok::<(), adaptcc::Error>(())
//! ```
//!
//! ## Crates
//!
//! - `adaptcc-core`: keys, TIDs, values, tuples, config, errors
//! - `adaptcc-concurrency`: spinlocks, versioned mutex, wait-die lock
//! - `adaptcc-storage`: record variants and the store
//! - `adaptcc-engine`: routing, workers, transactions, epoch switching

#![warn(missing_docs)]

mod error;
mod testbed;
mod types;

pub mod prelude;

pub use error::{Error, Result};
pub use testbed::{Testbed, TestbedBuilder};
pub use types::*;
