use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::Serialize;
use tracing::debug;

use stockwatch_core::SharedClock;

use crate::error::CacheError;

/// A stored value plus its bookkeeping.
///
/// Owned by the cache; [`TtlCache::entry`] hands out copies.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub hit_count: u64,
}

impl<V> CacheEntry<V> {
    pub fn expires_at(&self) -> DateTime<Utc> {
        i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Live while `now - created_at < ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Live entries dropped to make room.
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed.
    pub expirations: u64,
    pub max_size: usize,
}

#[derive(Debug)]
struct Inner<V> {
    entries: LruCache<String, CacheEntry<V>>,
    /// `(expires_at, key)` for every stored entry, earliest first.
    expiry_index: BTreeSet<(DateTime<Utc>, String)>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    #[cfg(test)]
    index_visits: u64,
}

impl<V> Inner<V> {
    fn new(cap: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(cap),
            expiry_index: BTreeSet::new(),
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
            #[cfg(test)]
            index_visits: 0,
        }
    }

    fn unindex(&mut self, entry: &CacheEntry<V>) {
        self.expiry_index.remove(&(entry.expires_at(), entry.key.clone()));
    }

    /// Remove `key` from both the entries and the expiry index.
    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.pop(key)?;
        self.unindex(&entry);
        Some(entry)
    }

    /// Pop expired entries off the front of the expiry index. Only expired
    /// entries plus one live head are visited.
    fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        loop {
            #[cfg(test)]
            {
                self.index_visits += 1;
            }
            match self.expiry_index.first() {
                Some((expires_at, _)) if *expires_at <= now => {}
                _ => break,
            }
            if let Some((_, key)) = self.expiry_index.pop_first() {
                self.entries.pop(&key);
                removed += 1;
            }
        }
        self.expirations += removed as u64;
        removed
    }

    /// Insert honouring the eviction policy: purge expired, then evict LRU.
    fn insert(&mut self, entry: CacheEntry<V>, now: DateTime<Utc>) {
        if !self.entries.contains(&entry.key) && self.entries.len() >= self.entries.cap().get() {
            self.purge_expired(now);
            if self.entries.len() >= self.entries.cap().get() {
                if let Some((evicted, old)) = self.entries.pop_lru() {
                    self.unindex(&old);
                    self.evictions += 1;
                    debug!(key = %evicted, "cache evicted least recently used entry");
                }
            }
        }
        let indexed = (entry.expires_at(), entry.key.clone());
        if let Some(old) = self.entries.put(entry.key.clone(), entry) {
            self.unindex(&old);
        }
        self.expiry_index.insert(indexed);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.expiry_index.clear();
    }
}

/// Thread-safe TTL cache with LRU capacity eviction.
///
/// All operations take one short mutex hold. Expiry is tracked in an index
/// ordered by expiry time, so purging touches only the entries it removes and
/// costs O(log n) per entry.
#[derive(Debug)]
pub struct TtlCache<V> {
    inner: Mutex<Inner<V>>,
    clock: SharedClock,
    default_ttl_seconds: u64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_size: usize, default_ttl_seconds: u64, clock: SharedClock) -> Result<Self, CacheError> {
        let cap = NonZeroUsize::new(max_size).ok_or(CacheError::ZeroCapacity)?;
        Ok(Self {
            inner: Mutex::new(Inner::new(cap)),
            clock,
            default_ttl_seconds,
        })
    }

    // Every mutation leaves `Inner` consistent; poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn default_ttl_seconds(&self) -> u64 {
        self.default_ttl_seconds
    }

    pub fn max_size(&self) -> usize {
        self.lock().entries.cap().get()
    }

    /// Insert or overwrite `key`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl_seconds: u64) {
        let now = self.now();
        let key = key.into();
        debug!(key = %key, ttl_seconds, "cache set");
        self.lock().insert(
            CacheEntry {
                key,
                value,
                created_at: now,
                ttl_seconds,
                hit_count: 0,
            },
            now,
        );
    }

    /// Insert with the cache's default TTL.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.set(key, value, self.default_ttl_seconds);
    }

    /// Re-insert an entry with its original timestamps (snapshot restore).
    pub(crate) fn restore(&self, entry: CacheEntry<V>) {
        let now = self.now();
        self.lock().insert(entry, now);
    }

    /// Live value for `key`, promoting it to most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.peek(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                inner.misses += 1;
                return None;
            }
        };

        if expired {
            inner.remove(key);
            inner.expirations += 1;
            inner.misses += 1;
            debug!(key, "cache entry expired");
            return None;
        }

        let entry = inner.entries.get_mut(key)?;
        entry.hit_count += 1;
        let value = entry.value.clone();
        inner.hits += 1;
        Some(value)
    }

    /// Like [`get`](Self::get) without touching recency or counters.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.now();
        self.lock()
            .entries
            .peek(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Copy of the live entry for `key`, for diagnostics.
    pub fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
        let now = self.now();
        self.lock()
            .entries
            .peek(key)
            .filter(|e| !e.is_expired(now))
            .cloned()
    }

    /// Remove `key` unconditionally. Returns whether something was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.lock().remove(key).is_some();
        if removed {
            debug!(key, "cache entry invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Drop every expired entry now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        self.lock().purge_expired(now)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
            max_size: inner.entries.cap().get(),
        }
    }

    /// Copies of every live entry, least recently used first.
    pub fn live_entries(&self) -> Vec<CacheEntry<V>> {
        let now = self.now();
        self.lock()
            .entries
            .iter()
            .rev()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(_, e)| e.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;
    use stockwatch_core::ManualClock;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 10, 1, 8, 0, 0).unwrap()))
    }

    fn cache(max_size: usize, clock: &Arc<ManualClock>) -> TtlCache<String> {
        TtlCache::new(max_size, 300, clock.clone()).unwrap()
    }

    #[test]
    fn get_after_set_returns_value() {
        let clock = clock();
        let cache = cache(4, &clock);
        cache.set("k", "v".to_string(), 60);
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let clock = clock();
        let cache = cache(4, &clock);
        cache.set("k", "v".to_string(), 60);

        clock.advance_secs(59);
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        clock.advance_secs(1);
        assert_eq!(cache.get("k"), None);
        // Lazy expiry removed it.
        assert_eq!(cache.len(), 0);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn zero_ttl_is_never_served() {
        let clock = clock();
        let cache = cache(4, &clock);
        cache.set("k", "v".to_string(), 0);
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn overwrite_resets_creation_time() {
        let clock = clock();
        let cache = cache(4, &clock);
        cache.set("k", "old".to_string(), 60);
        clock.advance_secs(50);
        cache.set("k", "new".to_string(), 60);
        clock.advance_secs(50);
        assert_eq!(cache.get("k").as_deref(), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn hit_count_tracks_successful_gets() {
        let clock = clock();
        let cache = cache(4, &clock);
        cache.insert("k", "v".to_string());
        cache.get("k");
        cache.get("k");
        cache.get("missing");
        assert_eq!(cache.entry("k").unwrap().hit_count, 2);
        assert_eq!(cache.entry("k").unwrap().ttl_seconds, 300);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (2, 1));
    }

    #[test]
    fn evicts_least_recently_used_when_full() {
        let clock = clock();
        let cache = cache(2, &clock);
        cache.set("a", "1".to_string(), 600);
        cache.set("b", "2".to_string(), 600);
        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get("a").is_some());
        cache.set("c", "3".to_string(), 600);

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn expired_entries_are_purged_before_lru_eviction() {
        let clock = clock();
        let cache = cache(2, &clock);
        cache.set("short", "1".to_string(), 10);
        cache.set("long", "2".to_string(), 600);
        // "long" is now least recently used, but "short" has expired.
        assert!(cache.get("short").is_some());
        clock.advance_secs(11);

        cache.set("new", "3".to_string(), 600);

        assert!(cache.contains("long"));
        assert!(cache.contains("new"));
        let stats = cache.stats();
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.entries, 2);
    }

    #[test]
    fn purge_at_capacity_visits_only_expired_entries() {
        let clock = clock();
        let capacity = 2_000;
        let cache = cache(capacity, &clock);
        for i in 0..capacity {
            cache.set(format!("k{i}"), "v".to_string(), 1_000 + i as u64);
        }

        // One entry expires per second from here on.
        clock.advance_secs(1_000);
        for round in 0..200 {
            let before = cache.lock().index_visits;
            cache.set(format!("new{round}"), "v".to_string(), 100_000);
            let visited = cache.lock().index_visits - before;
            assert!(visited <= 2, "round {round} visited {visited} index entries");
            clock.advance_secs(1);
        }

        let stats = cache.stats();
        assert_eq!(stats.expirations, 200);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.entries, capacity);
        assert_eq!(cache.lock().expiry_index.len(), capacity);
    }

    #[test]
    fn expiry_index_tracks_every_removal_path() {
        let clock = clock();
        let cache = cache(2, &clock);
        let index_len = |c: &TtlCache<String>| c.lock().expiry_index.len();

        // Overwrite at the same instant with the same TTL.
        cache.set("a", "1".to_string(), 60);
        cache.set("a", "2".to_string(), 60);
        assert_eq!(index_len(&cache), 1);

        cache.set("b", "1".to_string(), 10);
        cache.set("c", "1".to_string(), 600);
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(index_len(&cache), cache.len());

        clock.advance_secs(10);
        assert_eq!(cache.get("b"), None);
        assert!(cache.invalidate("c"));
        assert_eq!(index_len(&cache), cache.len());

        cache.insert("d", "1".to_string());
        cache.clear();
        assert_eq!(index_len(&cache), 0);
    }

    #[test]
    fn invalidate_removes_and_is_noop_when_absent() {
        let clock = clock();
        let cache = cache(2, &clock);
        cache.insert("k", "v".to_string());
        assert!(cache.invalidate("k"));
        assert!(!cache.invalidate("k"));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn purge_expired_reports_removed_count() {
        let clock = clock();
        let cache = cache(8, &clock);
        cache.set("a", "1".to_string(), 5);
        cache.set("b", "2".to_string(), 5);
        cache.set("c", "3".to_string(), 500);
        assert_eq!(cache.purge_expired(), 0);
        clock.advance_secs(5);
        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn stats_report_capacity() {
        let clock = clock();
        let cache = cache(16, &clock);
        cache.insert("a", "1".to_string());
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.max_size, 16);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let clock = clock();
        let err = TtlCache::<String>::new(0, 60, clock).unwrap_err();
        assert!(matches!(err, CacheError::ZeroCapacity));
    }

    #[test]
    fn concurrent_set_and_get_are_safe() {
        let clock = clock();
        let cache = Arc::new(cache(64, &clock));

        std::thread::scope(|s| {
            for t in 0..4 {
                let cache = cache.clone();
                s.spawn(move || {
                    for i in 0..100 {
                        let key = format!("k{}", i % 32);
                        cache.set(key.clone(), format!("{t}-{i}"), 60);
                        let _ = cache.get(&key);
                    }
                });
            }
        });

        let stats = cache.stats();
        assert!(stats.entries <= 64);
        assert_eq!(stats.hits + stats.misses, 400);
    }
}
