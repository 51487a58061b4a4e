//! Expiring key/value map shared by the dedup cache, throttle cache and abuse records.
//!
//! Entries carry their own deadline. Reads evict lazily: an expired entry is removed
//! the first time it is looked at, and [`TtlMap::prune`] sweeps the rest from the
//! housekeeping tick so idle senders do not accumulate.
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
pub struct TtlMap<K, V> {
    entries: HashMap<K, Slot<V>>,
}

impl<K: Eq + Hash, V> Default for TtlMap<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> TtlMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`, live for `ttl` from `now`.
    pub fn insert(&mut self, key: K, value: V, ttl: Duration, now: Instant) {
        self.entries.insert(
            key,
            Slot {
                value,
                expires_at: now + ttl,
            },
        );
    }

    /// Live value for `key`; an expired entry is evicted and reported as absent.
    pub fn get(&mut self, key: &K, now: Instant) -> Option<&V> {
        self.evict_if_expired(key, now);
        self.entries.get(key).map(|s| &s.value)
    }

    pub fn get_mut(&mut self, key: &K, now: Instant) -> Option<&mut V> {
        self.evict_if_expired(key, now);
        self.entries.get_mut(key).map(|s| &mut s.value)
    }

    pub fn contains(&mut self, key: &K, now: Instant) -> bool {
        self.get(key, now).is_some()
    }

    /// Move the deadline of a live entry. Returns false when the entry is gone.
    pub fn set_expiry(&mut self, key: &K, expires_at: Instant, now: Instant) -> bool {
        self.evict_if_expired(key, now);
        match self.entries.get_mut(key) {
            Some(slot) => {
                slot.expires_at = expires_at;
                true
            }
            None => false,
        }
    }

    /// Remaining lifetime of a live entry.
    pub fn remaining(&mut self, key: &K, now: Instant) -> Option<Duration> {
        self.evict_if_expired(key, now);
        self.entries
            .get(key)
            .map(|s| s.expires_at.saturating_duration_since(now))
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|s| s.value)
    }

    /// Live entries, without evicting the expired ones.
    pub fn iter_live(&self, now: Instant) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.entries
            .iter()
            .filter(move |(_, s)| s.expires_at > now)
            .map(|(k, s)| (k, &s.value))
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, s| s.expires_at > now);
        before - self.entries.len()
    }

    /// Number of stored entries, including expired ones not yet pruned.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_if_expired(&mut self, key: &K, now: Instant) {
        let expired = self
            .entries
            .get(key)
            .map(|s| s.expires_at <= now)
            .unwrap_or(false);
        if expired {
            self.entries.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazily_evicts_on_read() {
        let now = Instant::now();
        let mut map = TtlMap::new();
        map.insert("a", 1, Duration::from_secs(5), now);
        assert_eq!(map.get(&"a", now + Duration::from_secs(4)), Some(&1));
        assert_eq!(map.get(&"a", now + Duration::from_secs(5)), None);
        assert!(map.is_empty());
    }

    #[test]
    fn prune_counts_expired() {
        let now = Instant::now();
        let mut map = TtlMap::new();
        map.insert(1, (), Duration::from_secs(1), now);
        map.insert(2, (), Duration::from_secs(10), now);
        assert_eq!(map.prune(now + Duration::from_secs(2)), 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn set_expiry_extends_live_entry_only() {
        let now = Instant::now();
        let mut map = TtlMap::new();
        map.insert("k", 0u8, Duration::from_secs(1), now);
        assert!(map.set_expiry(&"k", now + Duration::from_secs(60), now));
        assert_eq!(
            map.remaining(&"k", now + Duration::from_secs(30)),
            Some(Duration::from_secs(30))
        );
        assert!(!map.set_expiry(&"gone", now + Duration::from_secs(60), now));
    }
}
