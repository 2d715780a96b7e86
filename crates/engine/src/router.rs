//! Protocol routing and epoch switching
//!
//! A [`RoutingTable`] maps every partition to the protocol that governs it.
//! Tables are immutable; the [`ProtocolRouter`] publishes a new one (with a
//! higher generation) only at an epoch boundary.
//!
//! ## Epoch boundaries
//!
//! ```text
//! worker:   enter ─ snapshot table ─ ... reads/writes ... ─ commit ─ exit
//! switcher:                 close ── wait for drain ── swap ── open
//! ```
//!
//! Transactions hold the [`EpochGate`] shared for their whole life, so a
//! switch waits for every in-flight transaction to finish and no
//! transaction ever sees two generations.

use adaptcc_concurrency::RwSpinlock;
use adaptcc_core::error::{Error, Result};
use adaptcc_core::protocol::{Protocol, SystemMode};
use adaptcc_core::types::PartitionId;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Immutable partition → protocol map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    generation: u64,
    protocols: Vec<Protocol>,
}

impl RoutingTable {
    /// Generation-zero table
    pub fn new(protocols: Vec<Protocol>) -> Self {
        Self { generation: 0, protocols }
    }

    /// Every partition on one protocol
    pub fn uniform(protocol: Protocol, partitions: usize) -> Self {
        Self::new(vec![protocol; partitions])
    }

    /// Protocol governing `partition`
    #[inline]
    pub fn protocol(&self, partition: PartitionId) -> Result<Protocol> {
        self.protocols
            .get(partition)
            .copied()
            .ok_or(Error::UnknownPartition(partition))
    }

    /// Monotonic switch counter
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// All assignments, by partition
    pub fn protocols(&self) -> &[Protocol] {
        &self.protocols
    }

    /// Number of partitions
    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    /// Whether the table routes no partitions
    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}

/// Barrier between transactions and epoch switches
#[derive(Debug)]
pub struct EpochGate {
    lock: RwSpinlock,
}

impl EpochGate {
    /// Open gate
    pub fn new(spin_trial: u32) -> Self {
        Self { lock: RwSpinlock::new(spin_trial) }
    }

    /// A transaction starts; blocks while a switch is in progress
    pub fn enter(&self) {
        self.lock.rlock();
    }

    /// A transaction finished
    pub fn exit(&self) {
        self.lock.runlock();
    }

    /// Transactions currently inside
    pub fn active(&self) -> usize {
        self.lock.reader_count()
    }

    /// Whether a switch holds or is draining the gate
    pub fn is_closing(&self) -> bool {
        self.lock.is_write_locked()
    }

    /// Turn new transactions away and wait for the current ones to drain
    fn close(&self) {
        self.lock.lock();
    }

    fn open(&self) {
        self.lock.unlock();
    }
}

/// Publishes routing tables and guards their replacement
#[derive(Debug)]
pub struct ProtocolRouter {
    mode: SystemMode,
    current: RwLock<Arc<RoutingTable>>,
    gate: EpochGate,
}

impl ProtocolRouter {
    /// Router starting from `initial`
    pub fn new(mode: SystemMode, initial: Vec<Protocol>, spin_trial: u32) -> Result<Self> {
        check_admitted(mode, &initial)?;
        Ok(Self {
            mode,
            current: RwLock::new(Arc::new(RoutingTable::new(initial))),
            gate: EpochGate::new(spin_trial),
        })
    }

    /// Current table
    pub fn snapshot(&self) -> Arc<RoutingTable> {
        Arc::clone(&self.current.read())
    }

    /// Enter the gate and take the table for a new transaction
    pub fn enter(&self) -> Arc<RoutingTable> {
        self.gate.enter();
        self.snapshot()
    }

    /// Leave the gate
    pub fn exit(&self) {
        self.gate.exit();
    }

    /// The epoch gate
    pub fn gate(&self) -> &EpochGate {
        &self.gate
    }

    /// System mode routes are checked against
    pub fn mode(&self) -> SystemMode {
        self.mode
    }

    /// Publish a new assignment at an epoch boundary
    ///
    /// Blocks until in-flight transactions drain. Must not be called from a
    /// thread that holds an open transaction. Returns the new generation.
    pub fn switch(&self, protocols: Vec<Protocol>) -> Result<u64> {
        let old = self.snapshot();
        if protocols.len() != old.len() {
            return Err(Error::InvalidConfig(format!(
                "routing table has {} partitions, expected {}",
                protocols.len(),
                old.len()
            )));
        }
        check_admitted(self.mode, &protocols)?;

        self.gate.close();
        let generation = {
            let mut current = self.current.write();
            let next = RoutingTable { generation: current.generation + 1, protocols };
            let generation = next.generation;
            for (partition, (from, to)) in current.protocols.iter().zip(&next.protocols).enumerate() {
                if from != to {
                    info!(partition, from = %from, to = %to, generation, "partition switches protocol");
                }
            }
            *current = Arc::new(next);
            generation
        };
        self.gate.open();
        info!(generation, "epoch switched");
        Ok(generation)
    }
}

fn check_admitted(mode: SystemMode, protocols: &[Protocol]) -> Result<()> {
    match protocols.iter().find(|p| !mode.admits(**p)) {
        Some(p) => Err(Error::InvalidConfig(format!("protocol {} not available in {:?} mode", p, mode))),
        None => Ok(()),
    }
}
