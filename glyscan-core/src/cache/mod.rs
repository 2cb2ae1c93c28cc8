//! Match cache: TTL- and capacity-bounded lookups in front of the nutrition
//! store.
//!
//! Two independent caches share one policy shape:
//!
//! - the **record cache**, keyed by record id (unbounded by default, swept
//!   by TTL)
//! - the **search cache**, keyed by normalised query text, bounded (100 by
//!   default)
//!
//! Expired entries read as misses but stay in memory until the next sweep.
//! Sweeps run at [`MatchCache::init`] and before any capacity check. When a
//! new key would overflow the bound, the single oldest-inserted entry is
//! evicted (FIFO; reads do not reorder).
//!
//! Every mutation snapshots the affected cache to a [`CacheStore`]. Those
//! writes are best-effort: a failure is logged and the in-memory operation
//! still succeeds. Snapshot-and-save runs under one persistence lock, so the
//! last save always reflects the latest mutation.

pub mod store;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::types::{NutritionRecord, RecordId};

pub use store::{CacheStore, MemoryCacheStore, SqliteCacheStore};

/// Snapshot name of the record cache.
pub const RECORDS_SNAPSHOT: &str = "records";
/// Snapshot name of the search cache.
pub const SEARCHES_SNAPSHOT: &str = "searches";

/// Normalise a search query into a search-cache key.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Time source for TTL decisions.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ---------------------------------------------------------------------------
// TtlCache
// ---------------------------------------------------------------------------

/// A cached value with its write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// Cached value.
    pub value: V,
    /// When the value was last written.
    pub timestamp: DateTime<Utc>,
}

/// Serialised form of one entry, in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry<V> {
    /// Cache key.
    pub key: String,
    /// Cached value.
    pub value: V,
    /// Write time.
    pub timestamp: DateTime<Utc>,
}

/// Single-map TTL cache with FIFO eviction.
#[derive(Debug, Clone)]
pub struct TtlCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    order: VecDeque<String>,
    ttl: Duration,
    capacity: Option<usize>,
}

impl<V: Clone> TtlCache<V> {
    /// Empty cache. `capacity = None` means unbounded.
    #[must_use]
    pub fn new(ttl: Duration, capacity: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            ttl,
            capacity,
        }
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: DateTime<Utc>) -> bool {
        now - entry.timestamp >= self.ttl
    }

    /// Value for `key` unless absent or expired. Never removes anything.
    #[must_use]
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|e| !self.is_expired(e, now))
            .map(|e| &e.value)
    }

    /// Upsert. An existing key gets the new value and timestamp but keeps its
    /// insertion position. Returns the key evicted to make room, if any.
    pub fn put(&mut self, key: String, value: V, now: DateTime<Utc>) -> Option<String> {
        self.insert_at(key, value, now, now)
    }

    fn insert_at(
        &mut self,
        key: String,
        value: V,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.timestamp = timestamp;
            return None;
        }

        let mut evicted = None;
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                return None;
            }
            if self.entries.len() >= capacity {
                self.sweep_expired(now);
            }
            if self.entries.len() >= capacity {
                evicted = self.evict_one();
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, CacheEntry { value, timestamp });
        evicted
    }

    /// Drop the oldest-inserted entry.
    pub fn evict_one(&mut self) -> Option<String> {
        let key = self.order.pop_front()?;
        self.entries.remove(&key);
        Some(key)
    }

    /// Physically remove expired entries. Returns how many were removed.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, e| now - e.timestamp < ttl);
        let entries = &self.entries;
        self.order.retain(|k| entries.contains_key(k));
        before - self.entries.len()
    }

    /// Entries in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PersistedEntry<V>> {
        self.order
            .iter()
            .filter_map(|k| {
                self.entries.get(k).map(|e| PersistedEntry {
                    key: k.clone(),
                    value: e.value.clone(),
                    timestamp: e.timestamp,
                })
            })
            .collect()
    }

    /// Replace contents with `entries`, keeping their order and timestamps.
    /// Expired entries are skipped.
    pub fn restore(&mut self, entries: Vec<PersistedEntry<V>>, now: DateTime<Utc>) {
        self.clear();
        for entry in entries {
            if now - entry.timestamp < self.ttl {
                self.insert_at(entry.key, entry.value, entry.timestamp, now);
            }
        }
    }

    /// Whether `key` is physically present (expired or not).
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Physically present entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

// ---------------------------------------------------------------------------
// MatchCache
// ---------------------------------------------------------------------------

/// Which of the two caches an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Record id → record.
    Records,
    /// Normalised query → result list.
    Searches,
}

/// Entry counts of both caches (physically present, expired or not).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Record-cache entries.
    pub records: usize,
    /// Search-cache entries.
    pub searches: usize,
}

/// The record cache and the search cache, with durable snapshots.
///
/// Each method locks one map for the duration of a synchronous operation.
/// No lock is held across an await point.
#[derive(Debug)]
pub struct MatchCache {
    records: Mutex<TtlCache<NutritionRecord>>,
    searches: Mutex<TtlCache<Vec<NutritionRecord>>>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    /// Held across snapshot and save. Always taken before a map lock.
    persist: Mutex<()>,
}

impl MatchCache {
    /// Empty cache backed by `store`, using wall-clock time.
    ///
    /// Call [`MatchCache::init`] to load persisted entries.
    #[must_use]
    pub fn new(config: &CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Empty cache with an explicit time source.
    #[must_use]
    pub fn with_clock(
        config: &CacheConfig,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = config.ttl();
        Self {
            records: Mutex::new(TtlCache::new(ttl, config.record_capacity)),
            searches: Mutex::new(TtlCache::new(ttl, Some(config.search_capacity))),
            store,
            clock,
            persist: Mutex::new(()),
        }
    }

    /// Cache with a non-durable in-process store.
    #[must_use]
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::new(config, Arc::new(MemoryCacheStore::new()))
    }

    /// Load both snapshots, drop expired entries and write back the result.
    ///
    /// A missing, unreadable or corrupt snapshot yields an empty cache.
    pub fn init(&self) -> CacheStats {
        let now = self.clock.now();

        let records: Vec<PersistedEntry<NutritionRecord>> = self.load_snapshot(RECORDS_SNAPSHOT);
        let searches: Vec<PersistedEntry<Vec<NutritionRecord>>> =
            self.load_snapshot(SEARCHES_SNAPSHOT);
        let loaded = records.len() + searches.len();

        {
            let mut map = self.records.lock();
            map.restore(
                records.into_iter().filter(|e| !e.value.is_provisional()).collect(),
                now,
            );
        }
        self.searches.lock().restore(searches, now);

        let stats = self.stats();
        info!(
            loaded,
            records = stats.records,
            searches = stats.searches,
            "match cache initialised"
        );
        if stats.records + stats.searches != loaded {
            self.persist();
        }
        stats
    }

    fn load_snapshot<V: DeserializeOwned>(&self, name: &str) -> Vec<PersistedEntry<V>> {
        match self.store.load(name) {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(snapshot = name, error = %e, "corrupt cache snapshot, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(snapshot = name, error = %e, "cache snapshot unreadable, starting empty");
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Record cache
    // ------------------------------------------------------------------

    /// Cached record for `id`, unless absent or expired.
    #[must_use]
    pub fn get_record(&self, id: &RecordId) -> Option<NutritionRecord> {
        let now = self.clock.now();
        let hit = self.records.lock().get(id.as_str(), now).cloned();
        debug!(record = %id, hit = hit.is_some(), "record cache lookup");
        hit
    }

    /// Upsert a record. Provisional records are refused (returns `false`).
    pub fn put_record(&self, record: NutritionRecord) -> bool {
        if record.is_provisional() {
            debug!(record = %record.id, "refusing provisional record");
            return false;
        }
        let now = self.clock.now();
        {
            let mut map = self.records.lock();
            map.put(record.id.0.clone(), record, now);
        }
        self.persist_kind(CacheKind::Records);
        true
    }

    /// Upsert several records with a single snapshot write.
    pub fn put_records<'a>(&self, records: impl IntoIterator<Item = &'a NutritionRecord>) {
        let now = self.clock.now();
        let mut written = 0usize;
        {
            let mut map = self.records.lock();
            for record in records.into_iter().filter(|r| !r.is_provisional()) {
                map.put(record.id.0.clone(), record.clone(), now);
                written += 1;
            }
        }
        if written > 0 {
            self.persist_kind(CacheKind::Records);
        }
    }

    // ------------------------------------------------------------------
    // Search cache
    // ------------------------------------------------------------------

    /// Cached results for `query` (normalised), unless absent or expired.
    #[must_use]
    pub fn get_search(&self, query: &str) -> Option<Vec<NutritionRecord>> {
        let key = normalize_query(query);
        let now = self.clock.now();
        let hit = self.searches.lock().get(&key, now).cloned();
        debug!(query = %key, hit = hit.is_some(), "search cache lookup");
        hit
    }

    /// Upsert results for `query` (normalised). Provisional records are
    /// filtered out.
    pub fn put_search(&self, query: &str, results: &[NutritionRecord]) {
        let key = normalize_query(query);
        let results: Vec<NutritionRecord> = results
            .iter()
            .filter(|r| !r.is_provisional())
            .cloned()
            .collect();
        let now = self.clock.now();
        let evicted = self.searches.lock().put(key.clone(), results, now);
        if let Some(old) = evicted {
            debug!(query = %key, evicted = %old, "search cache full, evicted oldest entry");
        }
        self.persist_kind(CacheKind::Searches);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Remove expired entries from both caches. Returns how many went.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let records = self.records.lock().sweep_expired(now);
        let searches = self.searches.lock().sweep_expired(now);
        if records > 0 {
            self.persist_kind(CacheKind::Records);
        }
        if searches > 0 {
            self.persist_kind(CacheKind::Searches);
        }
        records + searches
    }

    /// Evict the oldest-inserted entry of one cache.
    pub fn evict_one(&self, kind: CacheKind) -> Option<String> {
        let evicted = match kind {
            CacheKind::Records => self.records.lock().evict_one(),
            CacheKind::Searches => self.searches.lock().evict_one(),
        };
        if evicted.is_some() {
            self.persist_kind(kind);
        }
        evicted
    }

    /// Write both snapshots. Failures are logged, never returned.
    pub fn persist(&self) {
        self.persist_kind(CacheKind::Records);
        self.persist_kind(CacheKind::Searches);
    }

    fn persist_kind(&self, kind: CacheKind) {
        let _guard = self.persist.lock();
        let (name, bytes) = match kind {
            CacheKind::Records => {
                let snapshot = self.records.lock().snapshot();
                (RECORDS_SNAPSHOT, serde_json::to_vec(&snapshot))
            }
            CacheKind::Searches => {
                let snapshot = self.searches.lock().snapshot();
                (SEARCHES_SNAPSHOT, serde_json::to_vec(&snapshot))
            }
        };
        let result = bytes
            .map_err(crate::GlyscanError::from)
            .and_then(|b| self.store.save(name, &b));
        if let Err(e) = result {
            warn!(snapshot = name, error = %e, "failed to persist cache snapshot");
        }
    }

    /// Clear both caches and their durable snapshots.
    pub fn invalidate_all(&self) {
        let _guard = self.persist.lock();
        self.records.lock().clear();
        self.searches.lock().clear();
        for name in [RECORDS_SNAPSHOT, SEARCHES_SNAPSHOT] {
            if let Err(e) = self.store.remove(name) {
                warn!(snapshot = name, error = %e, "failed to remove cache snapshot");
            }
        }
        info!("match cache invalidated");
    }

    /// Entry counts.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            records: self.records.lock().len(),
            searches: self.searches.lock().len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FoodCategory;

    fn apple() -> NutritionRecord {
        NutritionRecord::new("apple", "사과", "Apple", 36.0, 14.0, 100.0, FoodCategory::Fruit)
    }

    fn fixture() -> (MatchCache, Arc<MemoryCacheStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryCacheStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = MatchCache::with_clock(&CacheConfig::default(), store.clone(), clock.clone());
        (cache, store, clock)
    }

    #[test]
    fn ttl_cache_reads_expired_as_miss_without_removing() {
        let t0 = Utc::now();
        let mut cache: TtlCache<u32> = TtlCache::new(Duration::hours(24), None);
        cache.put("a".into(), 1, t0);
        assert_eq!(cache.get("a", t0 + Duration::hours(23)), Some(&1));
        assert_eq!(cache.get("a", t0 + Duration::hours(24)), None);
        assert!(cache.contains_key("a"));
        assert_eq!(cache.sweep_expired(t0 + Duration::hours(25)), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn ttl_cache_evicts_oldest_inserted() {
        let t0 = Utc::now();
        let mut cache: TtlCache<u32> = TtlCache::new(Duration::hours(24), Some(2));
        cache.put("a".into(), 1, t0);
        cache.put("b".into(), 2, t0);
        // Reading and rewriting "a" does not move it to the back.
        let _ = cache.get("a", t0);
        cache.put("a".into(), 10, t0);
        let evicted = cache.put("c".into(), 3, t0);
        assert_eq!(evicted.as_deref(), Some("a"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn capacity_check_sweeps_expired_first() {
        let t0 = Utc::now();
        let mut cache: TtlCache<u32> = TtlCache::new(Duration::hours(1), Some(2));
        cache.put("old".into(), 1, t0);
        cache.put("fresh".into(), 2, t0 + Duration::minutes(90));
        let evicted = cache.put("new".into(), 3, t0 + Duration::minutes(90));
        assert!(evicted.is_none());
        assert!(!cache.contains_key("old"));
        assert!(cache.contains_key("fresh"));
    }

    #[test]
    fn upsert_refreshes_timestamp() {
        let (cache, _store, clock) = fixture();
        cache.put_search("사과", &[apple()]);
        clock.advance(Duration::hours(20));
        cache.put_search("사과", &[apple()]);
        clock.advance(Duration::hours(20));
        assert!(cache.get_search("사과").is_some());
    }

    #[test]
    fn search_keys_are_normalised() {
        let (cache, _store, _clock) = fixture();
        cache.put_search("  Apple ", &[apple()]);
        assert_eq!(cache.get_search("apple").map(|r| r.len()), Some(1));
    }

    #[test]
    fn provisional_records_are_refused() {
        let (cache, _store, _clock) = fixture();
        let mut placeholder = apple();
        placeholder.id = RecordId::new("provisional_1");
        assert!(!cache.put_record(placeholder.clone()));
        assert!(cache.get_record(&placeholder.id).is_none());

        cache.put_search("x", &[placeholder, apple()]);
        assert_eq!(cache.get_search("x").map(|r| r.len()), Some(1));
    }

    #[test]
    fn persistence_failure_does_not_fail_the_write() {
        let (cache, store, _clock) = fixture();
        store.set_fail_writes(true);
        assert!(cache.put_record(apple()));
        assert!(cache.get_record(&RecordId::new("apple")).is_some());
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn init_restores_and_drops_expired() {
        let store = Arc::new(MemoryCacheStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        {
            let cache = MatchCache::with_clock(&CacheConfig::default(), store.clone(), clock.clone());
            cache.put_search("old", &[apple()]);
            clock.advance(Duration::hours(12));
            cache.put_search("new", &[apple()]);
            cache.put_record(apple());
        }
        clock.advance(Duration::hours(13));
        let cache = MatchCache::with_clock(&CacheConfig::default(), store, clock);
        let stats = cache.init();
        assert_eq!(stats, CacheStats { records: 1, searches: 1 });
        assert!(cache.get_search("old").is_none());
        assert!(cache.get_search("new").is_some());
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let (cache, store, _clock) = fixture();
        store.insert_raw(SEARCHES_SNAPSHOT, b"{not json".to_vec());
        assert_eq!(cache.init(), CacheStats::default());
    }

    #[test]
    fn invalidate_all_clears_maps_and_store() {
        let (cache, store, _clock) = fixture();
        cache.put_record(apple());
        cache.put_search("사과", &[apple()]);
        cache.invalidate_all();
        assert_eq!(cache.stats(), CacheStats::default());
        assert!(store.load(RECORDS_SNAPSHOT).expect("load").is_none());
        assert!(store.load(SEARCHES_SNAPSHOT).expect("load").is_none());
    }

    #[test]
    fn evict_one_targets_one_cache() {
        let (cache, _store, _clock) = fixture();
        cache.put_search("a", &[]);
        cache.put_search("b", &[]);
        assert_eq!(cache.evict_one(CacheKind::Searches).as_deref(), Some("a"));
        assert_eq!(cache.evict_one(CacheKind::Records), None);
    }

    #[test]
    fn concurrent_writers_leave_the_latest_snapshot() {
        let config = CacheConfig::default();
        for round in 0..50 {
            let store = Arc::new(MemoryCacheStore::new());
            let cache = MatchCache::new(&config, store.clone());
            std::thread::scope(|scope| {
                for worker in 0..8 {
                    let cache = &cache;
                    scope.spawn(move || {
                        for i in 0..5 {
                            cache.put_search(&format!("w{worker}-q{i}"), &[apple()]);
                        }
                    });
                }
            });
            assert_eq!(cache.stats().searches, 40);

            let reloaded = MatchCache::new(&config, store).init();
            assert_eq!(reloaded.searches, 40, "round {round}: persisted snapshot is stale");
        }
    }
}
