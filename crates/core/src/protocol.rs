//! Concurrency-control protocol enumeration
//!
//! ## The Three Protocols
//!
//! | Protocol | Guard | Validation |
//! |----------|-------|------------|
//! | Partition | Single owner per partition | None |
//! | Occ | Versioned mutex, locked at commit | Version compare |
//! | Locking | Shared/exclusive locks before use | None |
//!
//! [`SystemMode`] adds `Adaptive`, where each partition runs whichever
//! protocol its router entry names and may change between epochs.

use serde::{Deserialize, Serialize};

/// A concurrency-control discipline for one partition
///
/// The router maps every partition to exactly one of these. Within an
/// epoch the mapping is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Partition-based serial execution (PCC)
    Partition,
    /// Optimistic concurrency control
    Occ,
    /// Two-phase locking
    Locking,
}

impl Protocol {
    /// All protocols (for iteration)
    pub const ALL: [Protocol; 3] = [Protocol::Partition, Protocol::Occ, Protocol::Locking];

    /// Short name used in logs
    pub const fn name(&self) -> &'static str {
        match self {
            Protocol::Partition => "pcc",
            Protocol::Occ => "occ",
            Protocol::Locking => "2pl",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// System-wide execution mode
///
/// Decides which record variant the store materialises. A pure mode pins
/// every partition to one protocol; `Adaptive` builds records that carry
/// both OCC and 2PL metadata so partitions can switch at epoch boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemMode {
    /// Every partition runs PCC
    Partition,
    /// Every partition runs OCC
    Occ,
    /// Every partition runs 2PL
    Locking,
    /// Per-partition protocol, switchable between epochs
    Adaptive,
}

impl SystemMode {
    /// Whether `protocol` may be routed to under this mode
    pub fn admits(&self, protocol: Protocol) -> bool {
        match self {
            SystemMode::Adaptive => true,
            SystemMode::Partition => protocol == Protocol::Partition,
            SystemMode::Occ => protocol == Protocol::Occ,
            SystemMode::Locking => protocol == Protocol::Locking,
        }
    }

    /// The only protocol a pure mode admits
    pub fn pinned(&self) -> Option<Protocol> {
        match self {
            SystemMode::Partition => Some(Protocol::Partition),
            SystemMode::Occ => Some(Protocol::Occ),
            SystemMode::Locking => Some(Protocol::Locking),
            SystemMode::Adaptive => None,
        }
    }
}

/// What an OCC committer does when a write-set record is already locked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccLockPolicy {
    /// Spin (then yield) until the lock is acquired. Safe because commit
    /// locks are always taken in one global key order.
    Wait,
    /// A single failed attempt aborts the transaction
    NoWait,
}

/// How 2PL acquires record locks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoPlPolicy {
    /// Bounded reader/writer spinlock; exhausting the trial budget aborts
    BoundedSpin,
    /// Wait-die lock manager: older requests queue, younger ones die
    WaitDie,
    /// Lock manager without queueing: every conflict dies
    NoWait,
}
