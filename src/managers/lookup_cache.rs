//! Lookup Cache
//!
//! Two bounded LRU maps shared by every request: `token -> entries` and
//! `token -> decomposition`. Keys are exact token text. An empty vector is a
//! real cached value (the token was checked and has no entries).

use crate::dictionary::DictionaryEntry;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Recency-ordered map. `order` maps a monotonically increasing tick to the
/// key last touched at that tick, so its first entry is the LRU key.
struct LruMap<V> {
    capacity: usize,
    tick: u64,
    map: HashMap<String, (V, u64)>,
    order: BTreeMap<u64, String>,
}

impl<V: Clone> LruMap<V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tick: 0,
            map: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn get(&mut self, key: &str) -> Option<V> {
        let tick = self.next_tick();
        let (value, last_used) = self.map.get_mut(key)?;
        self.order.remove(&*last_used);
        *last_used = tick;
        self.order.insert(tick, key.to_string());
        Some(value.clone())
    }

    /// Inserts `value`, returning how many keys were evicted.
    fn insert(&mut self, key: &str, value: V) -> u64 {
        if self.capacity == 0 {
            return 0;
        }
        let tick = self.next_tick();
        if let Some((_, last_used)) = self.map.insert(key.to_string(), (value, tick)) {
            self.order.remove(&last_used);
        }
        self.order.insert(tick, key.to_string());

        let mut evicted = 0;
        while self.map.len() > self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.map.remove(&oldest);
            evicted += 1;
        }
        evicted
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_evictions(&self, count: u64) {
        if count > 0 {
            self.evictions.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LookupCacheStats {
    pub entries: CacheStatsSnapshot,
    pub decompositions: CacheStatsSnapshot,
}

pub struct LookupCache {
    entries: Mutex<LruMap<Vec<DictionaryEntry>>>,
    decompositions: Mutex<LruMap<Vec<String>>>,
    entry_stats: CacheStats,
    decomposition_stats: CacheStats,
}

impl LookupCache {
    /// A capacity of 0 disables caching for that map.
    pub fn new(entry_capacity: usize, decomposition_capacity: usize) -> Self {
        debug!(
            "Creating lookup cache (entries: {}, decompositions: {})",
            entry_capacity, decomposition_capacity
        );
        Self {
            entries: Mutex::new(LruMap::new(entry_capacity)),
            decompositions: Mutex::new(LruMap::new(decomposition_capacity)),
            entry_stats: CacheStats::default(),
            decomposition_stats: CacheStats::default(),
        }
    }

    /// Cached entries for `token`, computing them with `load` on a miss.
    /// `load` runs without the lock held.
    pub fn get_or_insert_entries<F>(&self, token: &str, load: F) -> Vec<DictionaryEntry>
    where
        F: FnOnce() -> Vec<DictionaryEntry>,
    {
        get_or_insert(&self.entries, &self.entry_stats, token, load)
    }

    /// The cached decomposition of `token`, counted as a hit or a miss.
    pub fn decomposition(&self, token: &str) -> Option<Vec<String>> {
        get(&self.decompositions, &self.decomposition_stats, token)
    }

    pub fn insert_decomposition(&self, token: &str, pieces: Vec<String>) {
        insert(&self.decompositions, &self.decomposition_stats, token, pieces);
    }

    pub fn cached_entries(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn cached_decompositions(&self) -> usize {
        self.decompositions.lock().unwrap().len()
    }

    /// Empties both maps. Statistics are kept.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
        self.decompositions.lock().unwrap().clear();
        debug!("Lookup cache cleared");
    }

    pub fn stats(&self) -> LookupCacheStats {
        LookupCacheStats {
            entries: self.entry_stats.snapshot(),
            decompositions: self.decomposition_stats.snapshot(),
        }
    }
}

fn get_or_insert<V, F>(map: &Mutex<LruMap<V>>, stats: &CacheStats, token: &str, load: F) -> V
where
    V: Clone,
    F: FnOnce() -> V,
{
    if let Some(value) = get(map, stats, token) {
        return value;
    }
    let value = load();
    insert(map, stats, token, value.clone());
    value
}

fn get<V: Clone>(map: &Mutex<LruMap<V>>, stats: &CacheStats, token: &str) -> Option<V> {
    let value = map.lock().unwrap().get(token);
    match value {
        Some(_) => stats.record_hit(),
        None => stats.record_miss(),
    }
    value
}

fn insert<V: Clone>(map: &Mutex<LruMap<V>>, stats: &CacheStats, token: &str, value: V) {
    let evicted = map.lock().unwrap().insert(token, value);
    stats.record_evictions(evicted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn decomposition(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = LookupCache::new(10, 10);
        let calls = Cell::new(0);
        let load = || {
            calls.set(calls.get() + 1);
            Vec::new()
        };

        assert!(cache.get_or_insert_entries("你好吗", load).is_empty());
        assert!(cache.get_or_insert_entries("你好吗", load).is_empty());
        assert_eq!(calls.get(), 1);

        let stats = cache.stats().entries;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_empty_result_is_cached() {
        let cache = LookupCache::new(10, 10);
        let calls = Cell::new(0);
        for _ in 0..3 {
            let entries = cache.get_or_insert_entries("不存在", || {
                calls.set(calls.get() + 1);
                Vec::new()
            });
            assert!(entries.is_empty());
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache = LookupCache::new(10, 2);
        cache.insert_decomposition("a", decomposition(&["a"]));
        cache.insert_decomposition("b", decomposition(&["b"]));
        // Touch "a" so "b" becomes least recently used.
        assert!(cache.decomposition("a").is_some());
        cache.insert_decomposition("c", decomposition(&["c"]));

        assert_eq!(cache.cached_decompositions(), 2);
        assert_eq!(cache.stats().decompositions.evictions, 1);
        assert!(cache.decomposition("a").is_some());
        assert!(cache.decomposition("b").is_none());
    }

    #[test]
    fn test_zero_capacity_disables_caching() {
        let cache = LookupCache::new(0, 0);
        let calls = Cell::new(0);
        for _ in 0..2 {
            cache.get_or_insert_entries("好", || {
                calls.set(calls.get() + 1);
                Vec::new()
            });
        }
        assert_eq!(calls.get(), 2);
        assert_eq!(cache.cached_entries(), 0);
    }

    #[test]
    fn test_keys_are_exact() {
        let cache = LookupCache::new(10, 10);
        cache.insert_decomposition("Ab", decomposition(&["Ab"]));
        assert!(cache.decomposition("ab").is_none());
        assert!(cache.decomposition("Ab ").is_none());
    }

    #[test]
    fn test_explicit_decomposition_get_and_insert() {
        let cache = LookupCache::new(10, 1);
        assert!(cache.decomposition("人民").is_none());
        cache.insert_decomposition("人民", decomposition(&["人民"]));
        assert_eq!(cache.decomposition("人民"), Some(decomposition(&["人民"])));
        cache.insert_decomposition("共和国", decomposition(&["共和国"]));

        let stats = cache.stats().decompositions;
        assert_eq!((stats.hits, stats.misses, stats.evictions), (1, 1, 1));
        assert_eq!(cache.cached_decompositions(), 1);
    }

    #[test]
    fn test_clear_keeps_stats() {
        let cache = LookupCache::new(10, 10);
        cache.get_or_insert_entries("好", Vec::new);
        cache.get_or_insert_entries("好", Vec::new);
        cache.clear();
        assert_eq!(cache.cached_entries(), 0);
        assert_eq!(cache.stats().entries.hits, 1);
    }
}
