//! Engine configuration
//!
//! [`EngineConfig`] is plain data: it can be built in code, deserialised
//! from TOML, and validated once before an engine is constructed.
//!
//! ```
//! use adaptcc_core::config::EngineConfig;
//! use adaptcc_core::protocol::{OccLockPolicy, SystemMode};
//!
//! let cfg = EngineConfig::from_toml_str(
//!     r#"
//!     partitions = 4
//!     tables = 2
//!     mode = "adaptive"
//!     occ_lock_policy = "no_wait"
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(cfg.mode, SystemMode::Adaptive);
//! assert_eq!(cfg.occ_lock_policy, OccLockPolicy::NoWait);
//! assert_eq!(cfg.lock_trial, 10);
//! ```

use crate::error::{Error, Result};
use crate::protocol::{OccLockPolicy, Protocol, SystemMode, TwoPlPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Spin attempts before a bounded 2PL lock gives up
pub const DEFAULT_LOCK_TRIAL: u32 = 10;

/// Spin attempts before a blocking spinlock yields the scheduler
pub const DEFAULT_SPIN_TRIAL: u32 = 500;

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of partitions (and worker threads)
    pub partitions: usize,

    /// Number of tables
    pub tables: usize,

    /// Which record variant the store builds
    pub mode: SystemMode,

    /// Protocol every partition starts on in adaptive mode
    pub initial_protocol: Protocol,

    /// Per-partition starting protocols; overrides `initial_protocol`
    pub partition_protocols: Option<Vec<Protocol>>,

    /// Trial budget for bounded 2PL lock/rlock/upgrade
    pub lock_trial: u32,

    /// Spins before a blocking spinlock yields
    pub spin_trial: u32,

    /// OCC commit-time lock behaviour
    pub occ_lock_policy: OccLockPolicy,

    /// 2PL lock acquisition discipline
    pub two_pl_policy: TwoPlPolicy,

    /// Longest a wait-die waiter blocks before giving up
    pub wait_die_timeout_ms: u64,

    /// Attempts `Worker::run` makes before reporting a permanent failure
    pub max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            partitions: 1,
            tables: 1,
            mode: SystemMode::Adaptive,
            initial_protocol: Protocol::Occ,
            partition_protocols: None,
            lock_trial: DEFAULT_LOCK_TRIAL,
            spin_trial: DEFAULT_SPIN_TRIAL,
            occ_lock_policy: OccLockPolicy::Wait,
            two_pl_policy: TwoPlPolicy::BoundedSpin,
            wait_die_timeout_ms: 100,
            max_retries: 64,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: EngineConfig =
            toml::from_str(s).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(Error::InvalidConfig("partitions must be at least 1".into()));
        }
        if self.partitions > 256 {
            // worker ids occupy one byte of a TID
            return Err(Error::InvalidConfig("at most 256 partitions".into()));
        }
        if self.tables == 0 {
            return Err(Error::InvalidConfig("tables must be at least 1".into()));
        }
        if self.lock_trial == 0 || self.spin_trial == 0 {
            return Err(Error::InvalidConfig("trial budgets must be non-zero".into()));
        }
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig("max_retries must be at least 1".into()));
        }
        if self.two_pl_policy != TwoPlPolicy::BoundedSpin && self.mode != SystemMode::Locking {
            // adaptive records lock through their bounded spinlock only
            return Err(Error::InvalidConfig(format!(
                "two_pl_policy {:?} requires locking mode",
                self.two_pl_policy
            )));
        }
        let initial = self.initial_protocols();
        if initial.len() != self.partitions {
            return Err(Error::InvalidConfig(format!(
                "partition_protocols has {} entries for {} partitions",
                initial.len(),
                self.partitions
            )));
        }
        if let Some(p) = initial.iter().find(|p| !self.mode.admits(**p)) {
            return Err(Error::InvalidConfig(format!(
                "protocol {} not available in {:?} mode",
                p, self.mode
            )));
        }
        Ok(())
    }

    /// Starting protocol of every partition
    pub fn initial_protocols(&self) -> Vec<Protocol> {
        if let Some(pinned) = self.mode.pinned() {
            return vec![pinned; self.partitions];
        }
        match &self.partition_protocols {
            Some(list) => list.clone(),
            None => vec![self.initial_protocol; self.partitions],
        }
    }

    /// Wait-die waiter timeout
    pub fn wait_die_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_die_timeout_ms)
    }
}
