use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

/// Bounded capacities for an [`Engine`](crate::engine::Engine). These are
/// chosen when the engine is constructed, not negotiated at runtime; there
/// is no on-disk or environment-driven config loading here, that belongs to
/// an embedding application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of transaction slots. Bounds how many transactions may be
    /// concurrently live.
    pub max_transactions: usize,

    /// Number of lock/bucket slots. Keys hash into this space; two keys
    /// landing in the same bucket share a lock (safe, but over-serializes).
    pub max_keys: usize,

    /// Bound on key byte length.
    pub key_length_max: usize,

    /// Write-set capacity per transaction.
    pub max_writes_per_txn: usize,

    /// Bounded wake period used while a transaction waits on a lock. This is
    /// what bounds deadlock-resolution latency (see `Lock::acquire`).
    pub wait_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_transactions: 32,
            max_keys: 128,
            key_length_max: 64,
            max_writes_per_txn: 64,
            wait_poll_interval: Duration::from_millis(200),
        }
    }
}

impl EngineConfig {
    pub fn with_max_transactions(mut self, max_transactions: usize) -> Self {
        self.max_transactions = max_transactions;
        self
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    pub fn with_key_length_max(mut self, key_length_max: usize) -> Self {
        self.key_length_max = key_length_max;
        self
    }

    pub fn with_max_writes_per_txn(mut self, max_writes_per_txn: usize) -> Self {
        self.max_writes_per_txn = max_writes_per_txn;
        self
    }

    pub fn with_wait_poll_interval(mut self, wait_poll_interval: Duration) -> Self {
        self.wait_poll_interval = wait_poll_interval;
        self
    }
}
