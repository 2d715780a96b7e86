//! Engine Integration Tests
//!
//! End-to-end behaviour of mixed-protocol transactions: conflicts, wait-die,
//! abort unwinding, TID ordering, cross-protocol atomicity, and epoch
//! switches under load.

mod common;

mod abort_unwind;
mod cross_protocol;
mod epoch_switch;
mod occ_conflicts;
mod serializability;
mod tid_monotonic;
mod wait_die;
