//! Testbed: an engine plus its in-memory store.
//!
//! This module provides [`Testbed`], the entry point for running
//! transactions, and [`TestbedBuilder`] for configuring one.

use crate::error::{Error, Result};
use adaptcc_core::config::EngineConfig;
use adaptcc_core::protocol::{OccLockPolicy, Protocol, SystemMode, TwoPlPolicy};
use adaptcc_core::tuple::{ColumnId, Tuple};
use adaptcc_core::types::{Key, PartitionId, TableId, WorkerId};
use adaptcc_core::value::Value;
use adaptcc_engine::{ProtocolController, RoutingTable, StatsSnapshot, TransactionManager, Worker, WorkloadFeatures};
use adaptcc_storage::{MemStore, Store};
use std::sync::Arc;
use std::time::Duration;

/// An engine over an in-memory store.
///
/// # Example
///
/// ```
/// use adaptcc::prelude::*;
/// use std::sync::Arc;
///
/// let bed = Testbed::builder()
///     .partitions(2)
///     .partition_protocols(vec![Protocol::Occ, Protocol::Locking])
///     .build()
///     .unwrap();
///
/// let schema = Arc::new(Schema::new(vec![ColumnType::Int]));
/// for p in 0..2 {
///     let row = ColumnTuple::new(Arc::clone(&schema), vec![Value::Int(10)]).unwrap();
///     bed.load(0, Key::from_u64(1), p, Box::new(row)).unwrap();
/// }
///
/// // move 3 from partition 0 to partition 1, OCC on one side, 2PL on the other
/// let mut worker = bed.worker(0).unwrap();
/// worker
///     .run(|txn| {
///         txn.delta(0, &Key::from_u64(1), 0, 0, Value::Int(-3))?;
///         txn.delta(0, &Key::from_u64(1), 1, 0, Value::Int(3))
///     })
///     .unwrap();
/// assert_eq!(bed.value(0, &Key::from_u64(1), 1, 0).unwrap(), Value::Int(13));
/// ```
#[derive(Debug, Clone)]
pub struct Testbed {
    manager: Arc<TransactionManager>,
    store: Arc<MemStore>,
}

impl Testbed {
    /// Testbed with the given configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let store = Arc::new(MemStore::from_config(&config));
        let manager = TransactionManager::new(config, Arc::clone(&store) as Arc<dyn Store>)?;
        Ok(Self { manager: Arc::new(manager), store })
    }

    /// Create a builder for testbed configuration.
    pub fn builder() -> TestbedBuilder {
        TestbedBuilder::new()
    }

    /// Load a record outside any transaction.
    pub fn load(&self, table: TableId, key: Key, partition: PartitionId, tuple: Box<dyn Tuple>) -> Result<()> {
        self.store.load(table, key, partition, tuple).map_err(Error::from)
    }

    /// Committed value of one column.
    pub fn value(&self, table: TableId, key: &Key, partition: PartitionId, col: ColumnId) -> Result<Value> {
        self.store.peek(table, key, partition, col).map_err(Error::from)
    }

    /// Whether a committed record exists.
    pub fn contains(&self, table: TableId, key: &Key, partition: PartitionId) -> bool {
        self.store.contains(table, key, partition)
    }

    /// Sum of an integer column over a whole table.
    pub fn sum_int(&self, table: TableId, col: ColumnId) -> Result<i64> {
        let mut total = 0i64;
        for p in 0..self.store.partitions() {
            for key in self.store.keys(table, p) {
                if let Some(v) = self.value(table, &key, p, col)?.as_int() {
                    total = total.wrapping_add(v);
                }
            }
        }
        Ok(total)
    }

    /// A new worker.
    ///
    /// Fails if `id` is out of range or held by a live worker.
    pub fn worker(&self, id: WorkerId) -> Result<Worker> {
        self.manager.worker(id).map_err(Error::from)
    }

    /// Run `f` on `workers` threads, one [`Worker`] each, and collect the
    /// results in worker order.
    ///
    /// Every worker is claimed before any thread starts.
    pub fn run_parallel<T, F>(&self, workers: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&mut Worker) -> T + Sync,
    {
        let pool = (0..workers).map(|id| self.worker(id)).collect::<Result<Vec<_>>>()?;
        Ok(std::thread::scope(|scope| {
            let handles: Vec<_> = pool
                .into_iter()
                .map(|mut worker| {
                    let f = &f;
                    scope.spawn(move || f(&mut worker))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(v) => v,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        }))
    }

    /// Install a new partition → protocol table; returns its generation.
    pub fn switch_protocols(&self, protocols: Vec<Protocol>) -> Result<u64> {
        self.manager.switch_protocols(protocols).map_err(Error::from)
    }

    /// Let `controller` pick the next protocol for `partitions`.
    pub fn run_epoch(&self, controller: &dyn ProtocolController, partitions: &[PartitionId]) -> Result<u64> {
        let features = self.manager.features();
        self.manager.run_epoch(controller, &features, partitions).map_err(Error::from)
    }

    /// Current routing table.
    pub fn routes(&self) -> Arc<RoutingTable> {
        self.manager.routes()
    }

    /// Summed worker statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.manager.collect_stats()
    }

    /// Worker statistics since the last protocol switch.
    pub fn epoch_stats(&self) -> StatsSnapshot {
        self.manager.epoch_stats()
    }

    /// Workload features derived from [`Testbed::epoch_stats`].
    pub fn features(&self) -> WorkloadFeatures {
        self.manager.features()
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        self.manager.config()
    }

    /// The transaction manager.
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// The store.
    pub fn store(&self) -> &Arc<MemStore> {
        &self.store
    }
}

/// Builder for testbed configuration.
///
/// # Example
///
/// ```
/// use adaptcc::prelude::*;
///
/// let bed = Testbed::builder()
///     .mode(SystemMode::Locking)
///     .two_pl_policy(TwoPlPolicy::WaitDie)
///     .wait_die_timeout(std::time::Duration::from_millis(50))
///     .build()
///     .unwrap();
/// assert_eq!(bed.routes().protocols(), &[Protocol::Locking]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TestbedBuilder {
    config: EngineConfig,
}

impl TestbedBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a TOML document.
    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(Self { config: EngineConfig::from_toml_str(s)? })
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of partitions.
    pub fn partitions(mut self, n: usize) -> Self {
        self.config.partitions = n;
        self
    }

    /// Number of tables.
    pub fn tables(mut self, n: usize) -> Self {
        self.config.tables = n;
        self
    }

    /// Record variant and admissible protocols.
    pub fn mode(mut self, mode: SystemMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Protocol every partition starts on.
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.initial_protocol = protocol;
        self
    }

    /// Starting protocol per partition; also sets the partition count.
    pub fn partition_protocols(mut self, protocols: Vec<Protocol>) -> Self {
        self.config.partitions = protocols.len();
        self.config.partition_protocols = Some(protocols);
        self
    }

    /// Trial budget for bounded 2PL locks.
    pub fn lock_trial(mut self, trial: u32) -> Self {
        self.config.lock_trial = trial;
        self
    }

    /// Spins before a blocking spinlock yields.
    pub fn spin_trial(mut self, trial: u32) -> Self {
        self.config.spin_trial = trial;
        self
    }

    /// OCC commit-time lock behaviour.
    pub fn occ_lock_policy(mut self, policy: OccLockPolicy) -> Self {
        self.config.occ_lock_policy = policy;
        self
    }

    /// 2PL acquisition discipline.
    pub fn two_pl_policy(mut self, policy: TwoPlPolicy) -> Self {
        self.config.two_pl_policy = policy;
        self
    }

    /// How long a wait-die request may wait.
    pub fn wait_die_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_die_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Attempts [`Worker::run`] makes before giving up.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<Testbed> {
        Testbed::new(self.config)
    }
}
