use dashmap::DashMap;
use std::borrow::Borrow;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    expires_at: Instant,
    value: V,
}

/// TTL (time to live) cache
///
/// An entry expires a fixed time after it was written, reads do not extend it.
/// Expired entries are dropped lazily on read and in bulk by [`TtlCache::purge_expired`].
pub struct TtlCache<K, V> {
    map: DashMap<K, Entry<V>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> TtlCache<K, V> {
        TtlCache {
            map: DashMap::new(),
            ttl,
        }
    }

    pub fn get<Q>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        {
            let entry = self.map.get(k)?;
            if entry.expires_at > Instant::now() {
                return Some(entry.value.clone());
            }
        }
        // the read guard must be released before removing
        self.remove_expired(k);
        None
    }

    /// Removes `k` only if it is still expired, so a value rewritten since the
    /// caller's read survives.
    fn remove_expired<Q>(&self, k: &Q)
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.remove_if(k, |_, entry| entry.expires_at <= Instant::now());
    }

    pub fn insert(&self, k: K, v: V) {
        self.map.insert(
            k,
            Entry {
                expires_at: Instant::now() + self.ttl,
                value: v,
            },
        );
    }

    pub fn remove<Q>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.remove(k).map(|(_, entry)| entry.value)
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let previous_len = self.map.len();
        let now = Instant::now();
        self.map.retain(|_, entry| entry.expires_at > now);
        let current_len = self.map.len();
        tracing::debug!(
            "Cache cleanup: before = {}, after = {}, removed = {}",
            previous_len,
            current_len,
            previous_len.saturating_sub(current_len)
        );
        previous_len.saturating_sub(current_len)
    }
}
