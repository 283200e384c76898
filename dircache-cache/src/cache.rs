//! In-memory bounded TTL cache for lookup results.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use dircache_core::config::CacheConfig;
use dircache_core::error::{DirCacheError, Result};
use dircache_core::types::{is_expired, CacheEntry, CacheKey, ResultRecord, Snapshot};

use crate::clock::{Clock, SystemClock};

/// Stored value. Records are shared so snapshots copy pointers under the lock.
#[derive(Clone)]
struct StoredEntry {
    value: Arc<ResultRecord>,
    created_at: DateTime<Utc>,
}

/// Map plus an age index ordered by `(created_at, key)`.
///
/// The index head is always the next eviction victim, and because expiry is
/// monotone in `created_at`, expired entries always form a prefix of it.
#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, StoredEntry>,
    by_age: BTreeSet<(DateTime<Utc>, CacheKey)>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl Inner {
    fn insert(&mut self, key: CacheKey, entry: StoredEntry) {
        let created_at = entry.created_at;
        if let Some(old) = self.entries.insert(key, entry) {
            self.by_age.remove(&(old.created_at, key));
        }
        // After the removal: an overwrite may carry the same timestamp
        self.by_age.insert((created_at, key));
    }

    fn remove(&mut self, key: &CacheKey) -> Option<StoredEntry> {
        let entry = self.entries.remove(key)?;
        self.by_age.remove(&(entry.created_at, *key));
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<CacheKey> {
        let (_, key) = self.by_age.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }

    fn expired_prefix(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<CacheKey> {
        self.by_age
            .iter()
            .take_while(|(created_at, _)| is_expired(*created_at, now, ttl))
            .map(|(_, key)| *key)
            .collect()
    }

    fn purge_expired(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let expired = self.expired_prefix(now, ttl);
        for key in &expired {
            self.remove(key);
        }
        self.expirations += expired.len() as u64;
        expired.len()
    }
}

/// Thread-safe, size-bounded, time-expiring result cache.
///
/// - `get` treats entries aged `>= ttl` as absent and deletes them lazily.
/// - `put` of a new key at capacity drops expired entries, then evicts the
///   oldest insertion (ties broken by key order). Overwrites never evict.
/// - `len() <= max_entries` holds after every operation.
///
/// All operations take one short exclusive lock. `snapshot` clones `Arc`
/// handles under the lock and copies records after releasing it.
pub struct ResultCache {
    inner: Mutex<Inner>,
    max_entries: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ResultCache {
    /// Creates a cache using the system clock.
    ///
    /// # Errors
    /// Returns a configuration error if `max_entries` or `ttl` is zero.
    pub fn new(max_entries: usize, ttl: Duration) -> Result<Self> {
        Self::with_clock(max_entries, ttl, Arc::new(SystemClock))
    }

    /// Creates a cache with a custom clock.
    pub fn with_clock(max_entries: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        if max_entries == 0 {
            return Err(DirCacheError::ConfigError("max_entries must be positive".into()));
        }
        if ttl.is_zero() {
            return Err(DirCacheError::ConfigError("ttl must be positive".into()));
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(max_entries.min(4096)),
                ..Default::default()
            }),
            max_entries,
            ttl,
            clock,
        })
    }

    /// Creates a cache from configuration.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::new(config.max_entries, config.ttl())
    }

    /// Gets a cached record.
    ///
    /// Returns None if not cached or expired. An expired entry is removed.
    pub fn get(&self, key: &CacheKey) -> Option<ResultRecord> {
        let now = self.clock.now();

        let value = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let found = inner
                .entries
                .get(key)
                .map(|e| (e.created_at, Arc::clone(&e.value)));

            match found {
                None => {
                    inner.misses += 1;
                    return None;
                }
                Some((created_at, _)) if is_expired(created_at, now, self.ttl) => {
                    inner.remove(key);
                    inner.expirations += 1;
                    inner.misses += 1;
                    return None;
                }
                Some((_, value)) => {
                    inner.hits += 1;
                    value
                }
            }
        };

        Some((*value).clone())
    }

    /// Inserts or overwrites a record, stamping it with the current time.
    pub fn put(&self, key: CacheKey, value: ResultRecord) {
        let now = self.clock.now();
        let entry = StoredEntry {
            value: Arc::new(value),
            created_at: now,
        };

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_entries {
            inner.purge_expired(now, self.ttl);
            while inner.entries.len() >= self.max_entries {
                if inner.evict_oldest().is_none() {
                    break;
                }
                inner.evictions += 1;
            }
        }

        inner.insert(key, entry);
    }

    /// Removes an entry. Returns true if it was present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Copies all live entries.
    ///
    /// Expired entries are purged rather than copied, so a restored snapshot
    /// never resurrects stale data.
    pub fn snapshot(&self) -> Snapshot {
        let now = self.clock.now();

        let live: Vec<(CacheKey, Arc<ResultRecord>, DateTime<Utc>)> = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            inner.purge_expired(now, self.ttl);
            inner
                .by_age
                .iter()
                .filter_map(|(created_at, key)| {
                    inner
                        .entries
                        .get(key)
                        .map(|e| (*key, Arc::clone(&e.value), *created_at))
                })
                .collect()
        };

        Snapshot::from_entries(
            live.into_iter()
                .map(|(key, value, created_at)| CacheEntry::new(key, (*value).clone(), created_at))
                .collect(),
        )
    }

    /// Replaces the cache contents with a snapshot.
    ///
    /// Entries already expired by the current clock are dropped, duplicate
    /// keys keep their newest entry, and if more live entries remain than
    /// `max_entries` the oldest are discarded. Intended to run once, at
    /// startup, before traffic.
    pub fn restore(&self, snapshot: Snapshot) -> RestoreReport {
        let now = self.clock.now();
        let mut report = RestoreReport::default();
        let mut fresh = Inner::default();

        for entry in snapshot.into_entries() {
            if entry.is_expired_at(now, self.ttl) {
                report.expired += 1;
                continue;
            }
            if let Some(existing) = fresh.entries.get(&entry.key) {
                report.duplicates += 1;
                if existing.created_at >= entry.created_at {
                    continue;
                }
            }
            fresh.insert(
                entry.key,
                StoredEntry {
                    value: Arc::new(entry.value),
                    created_at: entry.created_at,
                },
            );
        }

        while fresh.entries.len() > self.max_entries {
            if fresh.evict_oldest().is_none() {
                break;
            }
            report.evicted += 1;
        }
        report.loaded = fresh.entries.len();

        *self.inner.lock() = fresh;

        debug!(
            loaded = report.loaded,
            expired = report.expired,
            evicted = report.evicted,
            duplicates = report.duplicates,
            "Cache restored from snapshot"
        );
        report
    }

    /// Removes all entries.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.by_age.clear();
    }

    /// Removes all expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.inner.lock().purge_expired(now, self.ttl)
    }

    /// Returns the number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Maximum number of entries.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Entry time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let inner = self.inner.lock();
        let expired = inner
            .by_age
            .iter()
            .take_while(|(created_at, _)| is_expired(*created_at, now, self.ttl))
            .count();

        CacheStats {
            total_entries: inner.entries.len(),
            expired_entries: expired,
            valid_entries: inner.entries.len().saturating_sub(expired),
            capacity: self.max_entries,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("len", &self.len())
            .field("max_entries", &self.max_entries)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total entries (including expired)
    pub total_entries: usize,
    /// Expired entries not yet purged
    pub expired_entries: usize,
    /// Valid (non-expired) entries
    pub valid_entries: usize,
    /// Maximum capacity
    pub capacity: usize,
    /// Lookups that returned a record
    pub hits: u64,
    /// Lookups that found nothing or an expired entry
    pub misses: u64,
    /// Live entries removed to make room
    pub evictions: u64,
    /// Expired entries removed
    pub expirations: u64,
}

/// What happened to each snapshot entry during [`ResultCache::restore`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Entries now in the cache
    pub loaded: usize,
    /// Entries dropped because they had already expired
    pub expired: usize,
    /// Entries dropped to fit `max_entries`
    pub evicted: usize,
    /// Repeated keys encountered
    pub duplicates: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use dircache_core::constants::CACHE_KEY_SIZE;
    use dircache_crypto::fingerprint;
    use proptest::prelude::*;

    fn key(b: u8) -> CacheKey {
        CacheKey::from_array([b; CACHE_KEY_SIZE])
    }

    fn record(v: &str) -> ResultRecord {
        ResultRecord::new().with("a", v)
    }

    fn manual_cache(max_entries: usize, ttl_secs: u64) -> (ResultCache, ManualClock) {
        let clock = ManualClock::starting();
        let cache = ResultCache::with_clock(
            max_entries,
            Duration::from_secs(ttl_secs),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (cache, clock)
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(ResultCache::new(0, Duration::from_secs(1)).is_err());
        assert!(ResultCache::new(1, Duration::ZERO).is_err());
    }

    #[test]
    fn test_from_config() {
        let cache = ResultCache::from_config(&CacheConfig::new(7, 30)).unwrap();
        assert_eq!(cache.max_entries(), 7);
        assert_eq!(cache.ttl(), Duration::from_secs(30));
    }

    #[test]
    fn test_put_get() {
        let (cache, _) = manual_cache(10, 60);
        cache.put(key(1), record("1"));
        assert_eq!(cache.get(&key(1)), Some(record("1")));
    }

    #[test]
    fn test_miss() {
        let (cache, _) = manual_cache(10, 60);
        assert!(cache.get(&key(9)).is_none());
    }

    #[test]
    fn test_expired_at_exact_ttl() {
        let (cache, clock) = manual_cache(10, 60);
        cache.put(key(1), record("1"));

        clock.advance(Duration::from_secs(59));
        assert!(cache.get(&key(1)).is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get(&key(1)).is_none());
    }

    #[test]
    fn test_get_purges_expired_entry() {
        let (cache, clock) = manual_cache(10, 60);
        cache.put(key(1), record("1"));
        cache.put(key(2), record("2"));
        clock.advance(Duration::from_secs(60));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(1)).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_eviction_order_oldest_insertion_first() {
        let (cache, clock) = manual_cache(2, 3600);
        cache.put(key(0xA), record("a"));
        clock.advance(Duration::from_secs(1));
        cache.put(key(0xB), record("b"));
        clock.advance(Duration::from_secs(1));
        cache.put(key(0xC), record("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(0xA)).is_none());
        assert!(cache.get(&key(0xB)).is_some());
        assert!(cache.get(&key(0xC)).is_some());
    }

    #[test]
    fn test_eviction_ignores_reads() {
        // Not LRU: reading A does not protect it
        let (cache, clock) = manual_cache(2, 3600);
        cache.put(key(0xA), record("a"));
        clock.advance(Duration::from_secs(1));
        cache.put(key(0xB), record("b"));
        assert!(cache.get(&key(0xA)).is_some());
        clock.advance(Duration::from_secs(1));
        cache.put(key(0xC), record("c"));

        assert!(cache.get(&key(0xA)).is_none());
        assert!(cache.get(&key(0xB)).is_some());
    }

    #[test]
    fn test_eviction_tie_broken_by_key_order() {
        let (cache, _) = manual_cache(2, 3600);
        cache.put(key(5), record("5"));
        cache.put(key(3), record("3"));
        cache.put(key(9), record("9"));

        assert!(cache.get(&key(3)).is_none());
        assert!(cache.get(&key(5)).is_some());
        assert!(cache.get(&key(9)).is_some());
    }

    #[test]
    fn test_overwrite_refreshes_without_eviction() {
        let (cache, clock) = manual_cache(2, 60);
        cache.put(key(1), record("old"));
        clock.advance(Duration::from_secs(1));
        cache.put(key(2), record("2"));
        clock.advance(Duration::from_secs(50));

        cache.put(key(1), record("new"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);

        // key 2 is now the oldest and expires first
        clock.advance(Duration::from_secs(10));
        assert!(cache.get(&key(2)).is_none());
        assert_eq!(cache.get(&key(1)), Some(record("new")));
    }

    #[test]
    fn test_overwrite_at_same_instant_keeps_age_index() {
        let (cache, clock) = manual_cache(1, 60);
        cache.put(key(1), record("a"));
        cache.put(key(1), record("b"));

        // The entry must still be evictable and snapshottable
        assert_eq!(cache.snapshot().len(), 1);
        clock.advance(Duration::from_secs(1));
        cache.put(key(2), record("c"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key(1)).is_none());
    }

    #[test]
    fn test_put_at_capacity_prefers_expired_entries() {
        let (cache, clock) = manual_cache(3, 10);
        cache.put(key(1), record("1"));
        cache.put(key(2), record("2"));
        clock.advance(Duration::from_secs(10));
        cache.put(key(3), record("3"));
        cache.put(key(4), record("4"));

        assert_eq!(cache.len(), 2);
        let stats = cache.stats();
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.expirations, 2);
    }

    #[test]
    fn test_end_to_end_single_slot() {
        let (cache, _) = manual_cache(1, 60);
        let k1 = fingerprint("host", 389, "uid", "k1");
        let k2 = fingerprint("host", 389, "uid", "k2");

        cache.put(k1, record("1"));
        cache.put(k2, record("2"));

        assert!(cache.get(&k1).is_none());
        assert_eq!(cache.get(&k2), Some(record("2")));
    }

    #[test]
    fn test_snapshot_excludes_expired() {
        let (cache, clock) = manual_cache(10, 60);
        cache.put(key(1), record("1"));
        clock.advance(Duration::from_secs(30));
        cache.put(key(2), record("2"));
        clock.advance(Duration::from_secs(30));

        let snapshot = cache.snapshot();
        let keys: Vec<_> = snapshot.keys().copied().collect();
        assert_eq!(keys, vec![key(2)]);
        // Purged as a side effect
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let (cache, _) = manual_cache(10, 60);
        cache.put(key(1), record("1"));
        let snapshot = cache.snapshot();
        cache.clear();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.entries()[0].value, record("1"));
    }

    #[test]
    fn test_restore_reproduces_live_keys() {
        let (cache, clock) = manual_cache(10, 60);
        for b in 1..=5 {
            cache.put(key(b), record(&b.to_string()));
            clock.advance(Duration::from_secs(1));
        }
        let snapshot = cache.snapshot();

        let restored = ResultCache::with_clock(10, Duration::from_secs(60), Arc::new(clock.clone())).unwrap();
        let report = restored.restore(snapshot.clone());

        assert_eq!(report.loaded, 5);
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.get(&key(3)), Some(record("3")));
    }

    #[test]
    fn test_restore_drops_entries_expired_since_snapshot() {
        let (cache, clock) = manual_cache(10, 60);
        cache.put(key(1), record("1"));
        clock.advance(Duration::from_secs(40));
        cache.put(key(2), record("2"));
        let snapshot = cache.snapshot();

        clock.advance(Duration::from_secs(30));
        let restored = ResultCache::with_clock(10, Duration::from_secs(60), Arc::new(clock.clone())).unwrap();
        let report = restored.restore(snapshot);

        assert_eq!(report.loaded, 1);
        assert_eq!(report.expired, 1);
        assert!(restored.get(&key(1)).is_none());
        assert!(restored.get(&key(2)).is_some());
    }

    #[test]
    fn test_restore_trims_to_capacity_keeping_newest() {
        let (big, clock) = manual_cache(10, 3600);
        for b in 1..=5 {
            big.put(key(b), record(&b.to_string()));
            clock.advance(Duration::from_secs(1));
        }

        let small = ResultCache::with_clock(2, Duration::from_secs(3600), Arc::new(clock.clone())).unwrap();
        let report = small.restore(big.snapshot());

        assert_eq!(report.loaded, 2);
        assert_eq!(report.evicted, 3);
        assert!(small.get(&key(4)).is_some());
        assert!(small.get(&key(5)).is_some());
    }

    #[test]
    fn test_restore_duplicate_keeps_newest() {
        let (cache, clock) = manual_cache(10, 3600);
        let t0 = clock.now();
        let t1 = t0 + chrono::Duration::seconds(5);
        let snapshot = Snapshot::from_entries(vec![
            CacheEntry::new(key(1), record("new"), t1),
            CacheEntry::new(key(1), record("old"), t0),
        ]);
        clock.advance(Duration::from_secs(10));

        let report = cache.restore(snapshot);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(cache.get(&key(1)), Some(record("new")));
    }

    #[test]
    fn test_restore_replaces_existing_contents() {
        let (cache, _) = manual_cache(10, 60);
        cache.put(key(1), record("1"));
        cache.restore(Snapshot::new());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clock_moving_backwards_keeps_entries_live() {
        let (cache, clock) = manual_cache(10, 60);
        let start = clock.now();
        cache.put(key(1), record("1"));
        clock.set(start - chrono::Duration::seconds(3600));
        assert!(cache.get(&key(1)).is_some());
    }

    #[test]
    fn test_clear_and_remove() {
        let (cache, _) = manual_cache(10, 60);
        cache.put(key(1), record("1"));
        cache.put(key(2), record("2"));

        assert!(cache.remove(&key(1)));
        assert!(!cache.remove(&key(1)));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        // Index cleared too: refilling to capacity must not panic or miscount
        cache.put(key(3), record("3"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = manual_cache(10, 60);
        cache.put(key(1), record("1"));
        clock.advance(Duration::from_secs(30));
        cache.put(key(2), record("2"));
        clock.advance(Duration::from_secs(30));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key(2)).is_some());
    }

    #[test]
    fn test_stats() {
        let (cache, clock) = manual_cache(10, 60);
        cache.put(key(1), record("1"));
        clock.advance(Duration::from_secs(30));
        cache.put(key(2), record("2"));
        cache.get(&key(1));
        cache.get(&key(7));
        clock.advance(Duration::from_secs(30));

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(stats.valid_entries, 1);
        assert_eq!(stats.capacity, 10);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_concurrent_access_with_snapshots() {
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;
        use std::collections::HashSet;
        use std::thread;

        const MAX: usize = 64;
        const KEYSPACE: u8 = 200;

        let cache = Arc::new(ResultCache::new(MAX, Duration::from_secs(3600)).unwrap());

        let mut handles = Vec::new();
        for t in 0..8u64 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(t);
                for _ in 0..2_000 {
                    let b = rng.gen_range(0..KEYSPACE);
                    if rng.gen_bool(0.5) {
                        cache.put(key(b), record(&b.to_string()));
                    } else if let Some(found) = cache.get(&key(b)) {
                        // A key only ever maps to its own value
                        assert_eq!(found, record(&b.to_string()));
                    }
                }
            }));
        }

        let snapshotter = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = cache.snapshot();
                    assert!(snapshot.len() <= MAX);
                    let unique: HashSet<_> = snapshot.keys().collect();
                    assert_eq!(unique.len(), snapshot.len());
                }
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        snapshotter.join().unwrap();

        assert!(cache.len() <= MAX);
        let valid: HashSet<CacheKey> = (0..KEYSPACE).map(key).collect();
        for entry in cache.snapshot().entries() {
            assert!(valid.contains(&entry.key));
            assert_eq!(entry.value.get("a").map(str::to_owned), Some(entry.key.as_bytes()[0].to_string()));
        }
    }

    proptest! {
        #[test]
        fn prop_size_never_exceeds_max(
            max in 1usize..8,
            ops in proptest::collection::vec((0u8..16, 0u64..3), 1..64),
        ) {
            let (cache, clock) = manual_cache(max, 5);
            for (b, step) in ops {
                cache.put(key(b), record("v"));
                prop_assert!(cache.len() <= max);
                clock.advance(Duration::from_secs(step));
            }
        }

        #[test]
        fn prop_put_then_get_within_ttl(b in any::<u8>(), v in ".{0,16}") {
            let (cache, _) = manual_cache(4, 60);
            cache.put(key(b), record(&v));
            prop_assert_eq!(cache.get(&key(b)), Some(record(&v)));
        }
    }
}
