use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Process-local key → value map with a freshness window.
///
/// Writes lock only the shard holding the key, so concurrent updates to
/// different keys never contend.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Latest value regardless of age.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|e| e.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Stores `value` unless `keep(existing, is_fresh)` says the current
    /// entry should stay.
    ///
    /// The check and the write happen under the key's lock. Returns the
    /// kept value, or `None` when `value` was stored.
    pub fn replace_unless(
        &self,
        key: K,
        value: V,
        keep: impl FnOnce(&V, bool) -> bool,
    ) -> Option<V> {
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let fresh = current.stored_at.elapsed() < self.ttl;
                if keep(&current.value, fresh) {
                    return Some(current.value.clone());
                }
                occupied.insert(CacheEntry {
                    value,
                    stored_at: Instant::now(),
                });
                None
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry {
                    value,
                    stored_at: Instant::now(),
                });
                None
            }
        }
    }

    /// Drops every entry older than the TTL.
    pub fn purge_stale(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.stored_at.elapsed() < ttl);
    }

}
