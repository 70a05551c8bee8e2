use std::hash::Hash;

use moka::sync::Cache;

/// Fixed-capacity, insertion-ordered set used to suppress redundant index
/// writes for recently-seen row keys and metric-name/row-time pairs.
///
/// Built on `moka`, the same crate the wider codebase reaches for in-memory
/// caching with. `cache_item` uses moka's `entry().or_insert()`, which
/// computes the "was this key already present" answer atomically even under
/// concurrent callers - that's the whole correctness contract this type
/// exists to provide: exactly one caller "wins" a new key.
///
/// Eviction policy (moka's approximate-LRU W-TinyLFU) is not part of the
/// observable contract - only write amplification depends on it.
#[derive(Clone)]
pub struct BoundedCache<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    cache: Cache<K, ()>,
    capacity: u64,
}

impl<K> BoundedCache<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(capacity).build(),
            capacity,
        }
    }

    /// Returns `None` if `key` was newly inserted by this call, or `Some(key)`
    /// if it was already present. Linearizable per instance: concurrent
    /// callers racing on the same key see at most one `None`.
    pub fn cache_item(&self, key: K) -> Option<K> {
        let entry = self.cache.entry(key.clone()).or_insert(());
        if entry.is_fresh() {
            None
        } else {
            Some(key)
        }
    }

    /// Removes `key` unconditionally, whether or not it was present.
    pub fn remove_key(&self, key: &K) {
        self.cache.invalidate(key);
    }

    /// Approximate current size - moka applies eviction and bookkeeping on a
    /// background schedule, so this can lag slightly under concurrent load.
    pub fn size(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}
