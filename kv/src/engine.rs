use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_derive::Serialize;

use crate::config::EngineConfig;
use crate::error::{CResult, Error};
use crate::kvmap::KvMap;
use crate::lock::LockManager;
use crate::txn::{Transaction, TxnState};

struct Shared {
    config: EngineConfig,
    kv: KvMap,
    locks: LockManager,
    slots: Mutex<Vec<Option<Arc<TxnState>>>>,
    next_seq: AtomicU64,
}

/// The shared, thread-safe context behind every [`Transaction`]: the
/// transaction-slot table, the per-key lock array and its wait-for graph, and
/// the KV map. Cloning an `Engine` is cheap and shares all of this state,
/// mirroring the handle-around-`Arc`-state pattern a caller would spin up
/// once per process and hand out to worker threads.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

/// Point-in-time counts, useful for tests and for an embedding application's
/// own diagnostics. Not part of any invariant the engine itself relies on.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EngineStatus {
    pub live_transactions: usize,
    pub max_transactions: usize,
    pub keys: usize,
    pub max_keys: usize,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let slots = (0..config.max_transactions).map(|_| None).collect();
        let shared = Shared {
            locks: LockManager::new(config.max_keys, config.max_transactions),
            kv: KvMap::new(config.max_keys),
            slots: Mutex::new(slots),
            next_seq: AtomicU64::new(0),
            config,
        };
        Engine { shared: Arc::new(shared) }
    }

    /// Claims a free transaction slot and returns a handle bound to it.
    /// Fails with [`Error::NoSlot`] if every slot is currently occupied.
    pub fn begin(&self) -> CResult<Transaction> {
        let mut slots = self.shared.slots.lock().unwrap();
        let slot = slots.iter().position(Option::is_none).ok_or(Error::NoSlot)?;
        let start_seq = self.shared.next_seq.fetch_add(1, Ordering::SeqCst);
        let state = TxnState::new(slot, start_seq);
        slots[slot] = Some(state.clone());
        drop(slots);
        Ok(Transaction::new(self.clone(), slot, state))
    }

    /// Current counts, for introspection.
    pub fn status(&self) -> EngineStatus {
        let live = self.shared.slots.lock().unwrap().iter().filter(|s| s.is_some()).count();
        EngineStatus {
            live_transactions: live,
            max_transactions: self.shared.config.max_transactions,
            keys: self.shared.kv.len(),
            max_keys: self.shared.config.max_keys,
        }
    }

    pub(crate) fn check_key_length(&self, key: &[u8]) -> CResult<()> {
        if key.len() > self.shared.config.key_length_max {
            return Err(Error::KeyTooLong(key.len()));
        }
        Ok(())
    }

    pub(crate) fn max_writes_per_txn(&self) -> usize {
        self.shared.config.max_writes_per_txn
    }

    pub(crate) fn acquire(&self, txn: &Arc<TxnState>, key: &[u8]) -> CResult<()> {
        let poll_interval = self.shared.config.wait_poll_interval;
        self.shared.locks.acquire(txn, key, poll_interval, &|id| self.slot_lookup(id))
    }

    pub(crate) fn kv_read(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.shared.kv.read(key)
    }

    pub(crate) fn kv_replace(&self, key: &[u8], value: Vec<u8>) {
        self.shared.kv.replace(key, value)
    }

    /// Releases every lock the transaction holds and frees its slot. Called
    /// exactly once per transaction, from `commit`, `abort`, or `Drop` --
    /// whichever comes first.
    pub(crate) fn finish(&self, txn: &TxnState, slot: usize) {
        self.shared.locks.release_all(txn);
        self.shared.slots.lock().unwrap()[slot] = None;
    }

    fn slot_lookup(&self, id: usize) -> Option<Arc<TxnState>> {
        self.shared.slots.lock().unwrap().get(id).cloned().flatten()
    }
}
