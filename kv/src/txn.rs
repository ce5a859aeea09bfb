use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::engine::Engine;
use crate::error::{CResult, Error};

/// The live entity behind one transaction slot. Shared (via `Arc`) between
/// the `Transaction` handle its owning thread holds and the engine's slot
/// table, so that a deadlock detector running on a completely different
/// thread can flip `aborted` without going through the handle at all.
pub(crate) struct TxnState {
    pub(crate) id: usize,
    pub(crate) start_seq: u64,
    pub(crate) aborted: AtomicBool,
    pub(crate) held_locks: Mutex<HashSet<usize>>,
    pub(crate) write_set: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
}

impl TxnState {
    pub(crate) fn new(id: usize, start_seq: u64) -> Arc<Self> {
        Arc::new(TxnState {
            id,
            start_seq,
            aborted: AtomicBool::new(false),
            held_locks: Mutex::new(HashSet::new()),
            write_set: Mutex::new(Vec::new()),
        })
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

/// A handle to one in-flight transaction. `get`/`put` may be called from the
/// owning thread as the transaction makes progress; `commit`/`abort` consume
/// the handle. A handle dropped without an explicit `commit`/`abort` is
/// treated as an abort, so that locks are never leaked by a caller that
/// propagates an error with `?` before reaching a cleanup call.
pub struct Transaction {
    engine: Engine,
    slot: usize,
    state: Arc<TxnState>,
    finished: bool,
}

impl Transaction {
    pub(crate) fn new(engine: Engine, slot: usize, state: Arc<TxnState>) -> Self {
        Transaction { engine, slot, state, finished: false }
    }

    /// Returns a copy of the current value for `key`, or `None` if it has
    /// never been written. Read-your-own-writes: if this transaction has
    /// already buffered a write to `key`, the most recently buffered value
    /// is returned without acquiring anything -- the prior `put` already
    /// holds the lock, and keeps holding it until commit/abort.
    pub fn get(&self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        if self.state.is_aborted() {
            return Err(Error::Aborted);
        }
        self.engine.check_key_length(key)?;

        if let Some(value) = self.buffered_value(key) {
            return Ok(Some(value));
        }

        self.engine.acquire(&self.state, key)?;
        Ok(self.engine.kv_read(key))
    }

    /// Buffers a write to `key`. The write is not visible to other
    /// transactions until `commit`. Duplicates are permitted; the most
    /// recent one wins both for read-your-own-writes and at commit time.
    pub fn put(&self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        if self.state.is_aborted() {
            return Err(Error::Aborted);
        }
        self.engine.check_key_length(key)?;

        self.engine.acquire(&self.state, key)?;

        let mut write_set = self.state.write_set.lock().unwrap();
        if write_set.len() >= self.engine.max_writes_per_txn() {
            return Err(Error::WriteSetFull);
        }
        write_set.push((key.to_vec(), value));
        Ok(())
    }

    /// Applies the buffered writes to the KV map, in order, then releases
    /// all locks and frees the slot. Every touched key is still exclusively
    /// locked throughout, so the whole write set becomes visible as one
    /// atomic unit.
    pub fn commit(mut self) -> CResult<()> {
        self.finished = true;
        if self.state.is_aborted() {
            self.engine.finish(&self.state, self.slot);
            return Err(Error::Aborted);
        }

        for (key, value) in self.state.write_set.lock().unwrap().drain(..) {
            self.engine.kv_replace(&key, value);
        }
        self.engine.finish(&self.state, self.slot);
        Ok(())
    }

    /// Marks the transaction aborted, releases its locks, and frees its
    /// slot. Never fails.
    pub fn abort(mut self) {
        self.finished = true;
        self.state.aborted.store(true, Ordering::SeqCst);
        self.engine.finish(&self.state, self.slot);
    }

    fn buffered_value(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state
            .write_set
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            self.state.aborted.store(true, Ordering::SeqCst);
            self.engine.finish(&self.state, self.slot);
        }
    }
}
