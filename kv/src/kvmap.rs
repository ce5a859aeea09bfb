use std::sync::Mutex;

use crate::hash::bucket_of;

/// The black-box associative container behind the engine: key -> value,
/// guarded by a single mutex. `read` and `replace` are each atomic on their
/// own, but multi-key atomicity is entirely the transaction layer's job
/// (holding the right locks before calling in here) -- this map offers no
/// cross-call guarantees.
///
/// Buckets are chained (a `Vec` of pairs per bucket) and share the same
/// hash/bucket-count as the lock manager, so a key's lock and its map
/// bucket are always the same index.
pub struct KvMap {
    buckets: Mutex<Vec<Vec<(Vec<u8>, Vec<u8>)>>>,
    bucket_count: usize,
}

impl KvMap {
    pub fn new(bucket_count: usize) -> Self {
        KvMap { buckets: Mutex::new(vec![Vec::new(); bucket_count]), bucket_count }
    }

    /// Atomically returns a copy of the current value, or `None` if the key
    /// has never been written. Never fails.
    pub fn read(&self, key: &[u8]) -> Option<Vec<u8>> {
        let buckets = self.buckets.lock().unwrap();
        let bucket = &buckets[bucket_of(key, self.bucket_count)];
        bucket.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    /// Atomically creates or overwrites the value for `key`. Never fails
    /// (bounded only by host memory).
    pub fn replace(&self, key: &[u8], value: Vec<u8>) {
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = &mut buckets[bucket_of(key, self.bucket_count)];
        match bucket.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => bucket.push((key.to_vec(), value)),
        }
    }

    /// Number of live keys, for [`EngineStatus`](crate::engine::EngineStatus).
    pub fn len(&self) -> usize {
        self.buckets.lock().unwrap().iter().map(Vec::len).sum()
    }
}
