//! Epoch-boundary protocol selection
//!
//! A [`ProtocolController`] turns one epoch's [`WorkloadFeatures`] into the
//! protocol the next epoch should run. The engine only ever calls
//! `recommend`; how the decision is made is the controller's business.

use crate::worker::StatsSnapshot;
use adaptcc_core::protocol::Protocol;
use serde::{Deserialize, Serialize};

/// Workload summary for one epoch
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkloadFeatures {
    /// Mean partitions touched per transaction
    pub mean_partitions: f64,
    /// Variance of partitions touched per transaction
    pub var_partitions: f64,
    /// Variance of records touched per transaction
    pub var_length: f64,
    /// Mean records touched per transaction
    pub mean_records: f64,
    /// Aborts per attempted transaction
    pub conflict_rate: f64,
    /// Fraction of accesses served from the transaction's own sets
    pub cache_hit_rate: f64,
    /// Reads over reads plus writes
    pub read_ratio: f64,
}

impl WorkloadFeatures {
    /// Derive features from aggregated worker counters
    pub fn from_stats(stats: &StatsSnapshot) -> Self {
        let txns = stats.txns as f64;
        let (mean_partitions, var_partitions) = moments(stats.partitions_sum, stats.partitions_sq_sum, txns);
        let (mean_records, var_length) = moments(stats.records_sum, stats.records_sq_sum, txns);
        let accesses = (stats.reads + stats.writes) as f64;
        Self {
            mean_partitions,
            var_partitions,
            var_length,
            mean_records,
            conflict_rate: stats.conflict_rate(),
            cache_hit_rate: ratio(stats.local_hits as f64, accesses),
            read_ratio: ratio(stats.reads as f64, accesses),
        }
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn moments(sum: u64, sq_sum: u64, n: f64) -> (f64, f64) {
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mean = sum as f64 / n;
    let var = (sq_sum as f64 / n - mean * mean).max(0.0);
    (mean, var)
}

/// Chooses the protocol for the next epoch
pub trait ProtocolController: Send + Sync {
    /// Protocol to run given the last epoch's features
    fn recommend(&self, features: &WorkloadFeatures) -> Protocol;
}

/// Always recommends the same protocol
#[derive(Debug, Clone, Copy)]
pub struct FixedController(pub Protocol);

impl ProtocolController for FixedController {
    fn recommend(&self, _features: &WorkloadFeatures) -> Protocol {
        self.0
    }
}

/// Rule-based controller
///
/// - transactions that stay on one partition run PCC
/// - high conflict rates run 2PL
/// - everything else runs OCC
#[derive(Debug, Clone, Copy)]
pub struct ThresholdController {
    /// Mean partitions per transaction at or below which PCC is chosen
    pub single_partition: f64,
    /// Conflict rate at or above which 2PL is chosen
    pub high_conflict: f64,
}

impl Default for ThresholdController {
    fn default() -> Self {
        Self { single_partition: 1.05, high_conflict: 0.1 }
    }
}

impl ProtocolController for ThresholdController {
    fn recommend(&self, features: &WorkloadFeatures) -> Protocol {
        if features.mean_partitions > 0.0 && features.mean_partitions <= self.single_partition {
            Protocol::Partition
        } else if features.conflict_rate >= self.high_conflict {
            Protocol::Locking
        } else {
            Protocol::Occ
        }
    }
}
