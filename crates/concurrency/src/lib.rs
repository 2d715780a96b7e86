//! Synchronization primitives for the transaction engine
//!
//! - [`Spinlock`] / [`RwSpinlock`]: blocking, spin-then-yield
//! - [`WdSpinlock`] / [`WdRwSpinlock`]: bounded-trial, fail instead of block
//! - [`VersionedMutex`]: lock bit packed with a TID, the OCC record word
//! - [`WaitDieLock`]: owner/waiter queues with wait-die ordering
//! - [`CacheAligned`]: cache-line padding for hot words

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache_aligned;
pub mod spinlock;
pub mod versioned;
pub mod wait_die;
pub mod wd_spinlock;

pub use cache_aligned::{CacheAligned, CACHE_LINE_BYTES};
pub use spinlock::{Backoff, RwSpinlock, Spinlock};
pub use versioned::VersionedMutex;
pub use wait_die::{LockMode, LockOutcome, WaitDieLock, Waiter};
pub use wd_spinlock::{WdRwSpinlock, WdSpinlock};
