//! Engine entry point
//!
//! [`TransactionManager`] ties a validated [`EngineConfig`], a [`Store`],
//! and the [`ProtocolRouter`] together, hands out [`Worker`]s, and runs
//! epoch switches.
//!
//! ## Epoch cycle
//!
//! ```text
//! workers run ─► collect_stats ─► WorkloadFeatures ─► controller.recommend
//!      ▲                                                      │
//!      └──────────── switch_protocols (drains workers) ◄──────┘
//! ```

use crate::controller::{ProtocolController, WorkloadFeatures};
use crate::router::{ProtocolRouter, RoutingTable};
use crate::worker::{StatsSnapshot, Worker, WorkerStats};
use adaptcc_core::config::EngineConfig;
use adaptcc_core::error::{Error, Result};
use adaptcc_core::protocol::Protocol;
use adaptcc_core::types::{PartitionId, WorkerId, MAX_WORKERS};
use adaptcc_storage::Store;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// State every worker of one engine shares
pub struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) router: ProtocolRouter,
    pub(crate) workers: Mutex<WorkerRegistry>,
}

/// One slot per worker id
///
/// An id is live while its [`Worker`] exists. Dropping the worker folds
/// its counters into `retired` and remembers where its TID counter
/// stopped, so a later worker with the same id never reissues a TID.
#[derive(Debug)]
pub(crate) struct WorkerRegistry {
    live: Vec<Option<Arc<WorkerStats>>>,
    resume: Vec<u64>,
    retired: StatsSnapshot,
    epoch_start: StatsSnapshot,
}

impl WorkerRegistry {
    fn new() -> Self {
        Self {
            live: vec![None; MAX_WORKERS],
            resume: vec![1; MAX_WORKERS],
            retired: StatsSnapshot::default(),
            epoch_start: StatsSnapshot::default(),
        }
    }

    /// Take `id`, returning its stats block and first TID counter
    fn claim(&mut self, id: WorkerId) -> Result<(Arc<WorkerStats>, u64)> {
        let slot = self.live.get_mut(id).ok_or(Error::WorkerOutOfRange(id))?;
        if slot.is_some() {
            return Err(Error::WorkerInUse(id));
        }
        let stats = Arc::new(WorkerStats::default());
        *slot = Some(Arc::clone(&stats));
        Ok((stats, self.resume[id]))
    }

    /// Release `id`; `next` is the counter its next TID would have used
    pub(crate) fn retire(&mut self, id: WorkerId, next: u64) {
        if let Some(stats) = self.live.get_mut(id).and_then(Option::take) {
            self.retired.merge(&stats.snapshot());
            self.resume[id] = self.resume[id].max(next);
        }
    }

    fn totals(&self) -> StatsSnapshot {
        let mut total = self.retired;
        for stats in self.live.iter().flatten() {
            total.merge(&stats.snapshot());
        }
        total
    }

    fn live_count(&self) -> usize {
        self.live.iter().filter(|s| s.is_some()).count()
    }
}

impl std::fmt::Debug for EngineShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineShared")
            .field("config", &self.config)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

/// Creates workers and drives protocol switches
#[derive(Debug)]
pub struct TransactionManager {
    shared: Arc<EngineShared>,
}

impl TransactionManager {
    /// Build an engine over `store`
    ///
    /// Fails if the config is invalid or the store's shape disagrees with it.
    pub fn new(config: EngineConfig, store: Arc<dyn Store>) -> Result<Self> {
        config.validate()?;
        if store.mode() != config.mode {
            return Err(Error::InvalidConfig(format!(
                "store holds {:?} records, config wants {:?}",
                store.mode(),
                config.mode
            )));
        }
        if store.partitions() != config.partitions || store.tables() != config.tables {
            return Err(Error::InvalidConfig(format!(
                "store is {}x{} (tables x partitions), config is {}x{}",
                store.tables(),
                store.partitions(),
                config.tables,
                config.partitions
            )));
        }
        let router = ProtocolRouter::new(config.mode, config.initial_protocols(), config.spin_trial)?;
        info!(
            mode = ?config.mode,
            partitions = config.partitions,
            tables = config.tables,
            "transaction manager ready"
        );
        Ok(Self {
            shared: Arc::new(EngineShared {
                config,
                store,
                router,
                workers: Mutex::new(WorkerRegistry::new()),
            }),
        })
    }

    /// A new worker; each worker must stay on one thread at a time
    ///
    /// `id` must be below [`MAX_WORKERS`] and not held by a live worker.
    /// The id is free again once the returned worker is dropped.
    pub fn worker(&self, id: WorkerId) -> Result<Worker> {
        let (stats, next_tid) = self.shared.workers.lock().claim(id)?;
        debug!(worker = id, next_tid, "worker claimed");
        Ok(Worker::new(id, Arc::clone(&self.shared), stats, next_tid))
    }

    /// Workers currently alive
    pub fn live_workers(&self) -> usize {
        self.shared.workers.lock().live_count()
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Backing store
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.shared.store
    }

    /// Protocol router
    pub fn router(&self) -> &ProtocolRouter {
        &self.shared.router
    }

    /// Current routing table
    pub fn routes(&self) -> Arc<RoutingTable> {
        self.shared.router.snapshot()
    }

    /// Install a new partition → protocol table
    ///
    /// Waits for in-flight transactions to finish. Must not be called by a
    /// thread holding an open transaction. A successful switch starts a new
    /// stats epoch for [`TransactionManager::epoch_stats`].
    pub fn switch_protocols(&self, protocols: Vec<Protocol>) -> Result<u64> {
        let generation = self.shared.router.switch(protocols)?;
        let mut workers = self.shared.workers.lock();
        let totals = workers.totals();
        workers.epoch_start = totals;
        Ok(generation)
    }

    /// Ask `controller` for the next protocol of `partitions` and switch
    ///
    /// Partitions not listed keep their current protocol. Returns the new
    /// routing generation.
    pub fn run_epoch(
        &self,
        controller: &dyn ProtocolController,
        features: &WorkloadFeatures,
        partitions: &[PartitionId],
    ) -> Result<u64> {
        let protocol = controller.recommend(features);
        let mut next = self.routes().protocols().to_vec();
        for &p in partitions {
            let slot = next.get_mut(p).ok_or(Error::UnknownPartition(p))?;
            *slot = protocol;
        }
        info!(protocol = %protocol, partitions = partitions.len(), "controller recommendation");
        self.switch_protocols(next)
    }

    /// Sum of every worker's counters since the engine started
    pub fn collect_stats(&self) -> StatsSnapshot {
        self.shared.workers.lock().totals()
    }

    /// Counters since the last protocol switch
    pub fn epoch_stats(&self) -> StatsSnapshot {
        let workers = self.shared.workers.lock();
        workers.totals().since(&workers.epoch_start)
    }

    /// Features of the current epoch's workload
    pub fn features(&self) -> WorkloadFeatures {
        WorkloadFeatures::from_stats(&self.epoch_stats())
    }
}
