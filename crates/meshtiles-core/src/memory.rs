//! Memory Management
//!
//! Keyed object pool for scratch resources that are expensive to allocate,
//! such as atlas pixel buffers of a given resolution.
//! - Objects are grouped by key (typically their size)
//! - Released objects are kept up to a per-key limit
//! - Usage statistics for build reports

use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;

/// Pool usage statistics
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Objects built because none was available
    pub created: AtomicUsize,
    /// Acquisitions served from released objects
    pub reused: AtomicUsize,
    /// Objects handed back to the pool
    pub released: AtomicUsize,
}

impl PoolStats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn reused(&self) -> usize {
        self.reused.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }
}

/// Object pool keyed by `K`
///
/// The free lists are behind a mutex, so a pool can be shared between threads
/// without any extra acquire/release discipline.
pub struct Pool<K, T> {
    free: Mutex<AHashMap<K, Vec<T>>>,
    max_per_key: usize,
    stats: PoolStats,
}

impl<K, T> Pool<K, T>
where
    K: Eq + Hash,
{
    /// Create a pool keeping at most `max_per_key` released objects per key
    pub fn new(max_per_key: usize) -> Self {
        Self {
            free: Mutex::new(AHashMap::new()),
            max_per_key,
            stats: PoolStats::default(),
        }
    }

    /// Take a released object for `key`, or build one with `create`
    pub fn acquire<F>(&self, key: K, create: F) -> T
    where
        F: FnOnce(&K) -> T,
    {
        let reused = self.free.lock().get_mut(&key).and_then(Vec::pop);
        match reused {
            Some(item) => {
                self.stats.reused.fetch_add(1, Ordering::Relaxed);
                item
            }
            None => {
                self.stats.created.fetch_add(1, Ordering::Relaxed);
                create(&key)
            }
        }
    }

    /// Hand an object back; it is dropped if the key's free list is full
    pub fn release(&self, key: K, item: T) {
        self.stats.released.fetch_add(1, Ordering::Relaxed);
        let mut free = self.free.lock();
        let list = free.entry(key).or_default();
        if list.len() < self.max_per_key {
            list.push(item);
        }
    }

    /// Number of released objects waiting for `key`
    pub fn available(&self, key: &K) -> usize {
        self.free.lock().get(key).map_or(0, Vec::len)
    }

    /// Get pool statistics
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

impl<K, T> Default for Pool<K, T>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new(4)
    }
}
