//! Convenient imports for adaptcc.
//!
//! ```
//! use adaptcc::prelude::*;
//!
//! let bed = Testbed::builder().partitions(2).build().unwrap();
//! assert_eq!(bed.config().partitions, 2);
//! ```

// Entry point
pub use crate::testbed::{Testbed, TestbedBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Core types
pub use crate::types::{Key, Protocol, SystemMode, Tid, Value};

// Tuples
pub use crate::types::{ColumnTuple, ColumnType, Schema};

// Policies
pub use crate::types::{OccLockPolicy, TwoPlPolicy};
