use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::{CResult, Error};
use crate::graph::WaitForGraph;
use crate::hash::bucket_of;
use crate::txn::TxnState;

struct LockState {
    holder: Option<usize>,
}

/// One exclusive lock per key bucket, re-entrant for the current holder.
struct Lock {
    state: Mutex<LockState>,
    cond: Condvar,
}

impl Lock {
    fn new() -> Self {
        Lock { state: Mutex::new(LockState { holder: None }), cond: Condvar::new() }
    }
}

/// Owns the fixed array of per-bucket locks and the wait-for graph they
/// drive. Keys hash into the same bucket space the [`KvMap`](crate::kvmap::KvMap)
/// uses, via [`bucket_of`].
pub struct LockManager {
    locks: Vec<Lock>,
    graph: WaitForGraph,
}

impl LockManager {
    pub fn new(max_keys: usize, max_transactions: usize) -> Self {
        LockManager {
            locks: (0..max_keys).map(|_| Lock::new()).collect(),
            graph: WaitForGraph::new(max_transactions),
        }
    }

    pub fn graph(&self) -> &WaitForGraph {
        &self.graph
    }

    /// Acquires the lock for `key` on behalf of `txn`, blocking under the
    /// target lock's mutex with a bounded-timeout wait while it is held by
    /// someone else. `slot_lookup` resolves a transaction slot id to its
    /// live state, used both for cycle detection's liveness check and for
    /// marking a chosen victim aborted -- the lock manager never reaches
    /// into a slot table directly, keeping that table owned by the engine.
    pub fn acquire(
        &self,
        txn: &Arc<TxnState>,
        key: &[u8],
        poll_interval: Duration,
        slot_lookup: &dyn Fn(usize) -> Option<Arc<TxnState>>,
    ) -> CResult<()> {
        let bucket = bucket_of(key, self.locks.len());
        let lock = &self.locks[bucket];
        let mut guard = lock.state.lock().unwrap();

        loop {
            if guard.holder.is_none() || guard.holder == Some(txn.id) {
                guard.holder = Some(txn.id);
                drop(guard);
                txn.held_locks.lock().unwrap().insert(bucket);
                self.graph.clear_outgoing(txn.id);
                return Ok(());
            }

            // Blocked: record that we wait for the current holder and let
            // the graph decide whether this closes a cycle.
            let holder = guard.holder.unwrap();
            self.graph.add_edge(txn.id, holder);
            if let Some(victim_id) =
                self.graph.find_victim(|id| slot_lookup(id).map(|t| t.start_seq))
            {
                if let Some(victim) = slot_lookup(victim_id) {
                    if !victim.aborted.swap(true, Ordering::SeqCst) {
                        log::info!(
                            "deadlock detected, aborting txn {} (start_seq {}) as youngest member of the cycle",
                            victim.id,
                            victim.start_seq
                        );
                    }
                }
            }

            let (next_guard, _timeout) =
                lock.cond.wait_timeout(guard, poll_interval).unwrap();
            guard = next_guard;

            // Wake can be the broadcast on release, the poll timeout, or
            // spurious; in every case we just re-check our own state.
            if txn.aborted.load(Ordering::SeqCst) {
                self.graph.clear_outgoing(txn.id);
                return Err(Error::Aborted);
            }
        }
    }

    /// Releases every lock `txn` holds, clearing its holder slot and waking
    /// any waiters. Also drops every wait-for edge pointing at `txn`, since
    /// nobody should keep waiting for a transaction that is going away.
    pub fn release_all(&self, txn: &TxnState) {
        self.graph.remove_incoming(txn.id);

        let held: Vec<usize> = txn.held_locks.lock().unwrap().drain().collect();
        for bucket in held {
            let lock = &self.locks[bucket];
            let mut guard = lock.state.lock().unwrap();
            if guard.holder == Some(txn.id) {
                guard.holder = None;
            }
            drop(guard);
            lock.cond.notify_all();
        }
    }
}
