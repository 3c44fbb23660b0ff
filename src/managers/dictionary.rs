//! Dictionary Manager
//!
//! Process-wide, cache-backed access to the entry store. Serves the
//! dictionary-click path (lookup with decomposition fallback) and supplies
//! dictionary word readings to the pronunciation analyzer.

use crate::dictionary::{DictionaryEntry, EntryStore};
use crate::managers::lookup_cache::{LookupCache, LookupCacheStats};
use crate::pronunciation::{Lexicon, Syllable};
use crate::segmentation::{Membership, SegmentationResolver};
use log::debug;
use serde::Serialize;
use std::sync::Arc;

/// Response of a dictionary-click lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupResponse {
    pub entries: Vec<DictionaryEntry>,
    /// Present only when the token had no direct entry and was decomposed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decomposition: Option<Vec<String>>,
}

pub struct DictionaryManager {
    store: Arc<dyn EntryStore>,
    cache: Arc<LookupCache>,
}

impl DictionaryManager {
    pub fn new(store: Arc<dyn EntryStore>, cache: Arc<LookupCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<LookupCache> {
        &self.cache
    }

    pub fn cache_stats(&self) -> LookupCacheStats {
        self.cache.stats()
    }

    pub fn entry_count(&self) -> usize {
        self.store.entry_count()
    }

    /// Entries for the exact token text. Never fails.
    pub fn lookup(&self, token: &str) -> Vec<DictionaryEntry> {
        if token.is_empty() {
            return Vec::new();
        }
        self.cache
            .get_or_insert_entries(token, || self.store.lookup(token))
    }

    pub fn contains(&self, token: &str) -> bool {
        !self.lookup(token).is_empty()
    }

    /// Greedy longest-prefix decomposition, memoized in the shared cache
    /// together with every suffix on a piece boundary.
    pub fn decompose(&self, token: &str) -> Vec<String> {
        SegmentationResolver::new(self, self.cache.as_ref()).decompose(token)
    }

    /// Direct entries for `token`, or, when there are none, the entries of
    /// each decomposition piece together with the decomposition itself.
    /// `None` when nothing at all was found.
    pub fn lookup_with_decomposition(&self, token: &str) -> Option<LookupResponse> {
        let direct = self.lookup(token);
        if !direct.is_empty() {
            return Some(LookupResponse {
                entries: direct,
                decomposition: None,
            });
        }

        let pieces = self.decompose(token);
        let entries: Vec<DictionaryEntry> =
            pieces.iter().flat_map(|piece| self.lookup(piece)).collect();
        debug!(
            "No direct entry for '{}', decomposed into {:?} ({} entries)",
            token,
            pieces,
            entries.len()
        );

        if entries.is_empty() {
            return None;
        }
        Some(LookupResponse {
            entries,
            decomposition: Some(pieces),
        })
    }
}

impl Membership for DictionaryManager {
    fn contains(&self, token: &str) -> bool {
        DictionaryManager::contains(self, token)
    }
}

impl Lexicon for DictionaryManager {
    /// The reading of a multi-character word, only when every entry agrees.
    ///
    /// Reads the store directly: sentence analysis tries every window of a
    /// sentence and would otherwise flood the lookup cache with misses.
    fn word_reading(&self, word: &str) -> Option<Vec<Syllable>> {
        let entries = self.store.lookup(word);
        let mut readings = entries
            .iter()
            .map(|e| e.pronunciation.to_lowercase())
            .filter(|p| !p.is_empty());
        let first = readings.next()?;
        if readings.any(|other| other != first) {
            return None;
        }
        first.split_whitespace().map(Syllable::parse).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::MemoryEntryStore;
    use crate::pronunciation::{PinyinAnalyzer, SentenceAnalyzer};

    fn entry(id: i64, word: &str, pinyin: &str) -> DictionaryEntry {
        DictionaryEntry {
            id,
            simplified: word.to_string(),
            traditional: word.to_string(),
            pronunciation: pinyin.to_string(),
            definitions: Vec::new(),
        }
    }

    fn manager() -> DictionaryManager {
        let store = MemoryEntryStore::from_entries(vec![
            entry(1, "你好", "ni3 hao3"),
            entry(2, "吗", "ma5"),
            entry(3, "你", "ni3"),
            entry(4, "好", "hao3"),
            entry(5, "好", "hao4"),
            entry(6, "银行", "yin2 hang2"),
        ]);
        DictionaryManager::new(Arc::new(store), Arc::new(LookupCache::new(100, 100)))
    }

    #[test]
    fn test_direct_lookup_has_no_decomposition() {
        let response = manager().lookup_with_decomposition("你好").unwrap();
        assert_eq!(response.entries.len(), 1);
        assert!(response.decomposition.is_none());
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("decomposition").is_none());
    }

    #[test]
    fn test_decomposition_fallback() {
        let response = manager().lookup_with_decomposition("你好吗").unwrap();
        assert_eq!(
            response.decomposition,
            Some(vec!["你好".to_string(), "吗".to_string()])
        );
        let ids: Vec<i64> = response.entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_not_found() {
        assert!(manager().lookup_with_decomposition("abc").is_none());
        assert!(manager().lookup_with_decomposition("").is_none());
    }

    #[test]
    fn test_decomposition_is_cached() {
        let manager = manager();
        manager.decompose("你好吗");
        manager.decompose("你好吗");
        let stats = manager.cache_stats().decompositions;
        // 你好吗 and the 吗 suffix miss once; the repeat hits.
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_decomposition_suffixes_are_cached() {
        let manager = manager();
        manager.decompose("你好吗吗");
        assert_eq!(manager.cache().cached_decompositions(), 3);
        assert_eq!(
            manager.cache().decomposition("吗吗"),
            Some(vec!["吗".to_string(), "吗".to_string()])
        );
    }

    #[test]
    fn test_word_reading_bypasses_cache() {
        let manager = Arc::new(manager());
        let analyzer = PinyinAnalyzer::new().with_lexicon(manager.clone());
        analyzer.analyze("我去银行取钱然后回家吃饭").unwrap();
        assert!(manager.word_reading("银行").is_some());

        let stats = manager.cache_stats().entries;
        assert_eq!((stats.hits, stats.misses), (0, 0));
        assert_eq!(manager.cache().cached_entries(), 0);
    }

    #[test]
    fn test_word_reading_requires_agreement() {
        let manager = manager();
        let reading = manager.word_reading("银行").unwrap();
        assert_eq!(reading, vec![Syllable::new("yin", 2), Syllable::new("hang", 2)]);
        // 好 has two readings
        assert!(manager.word_reading("好").is_none());
        assert!(manager.word_reading("不在").is_none());
    }
}
