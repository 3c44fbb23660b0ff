//! Read-only dictionary entry stores.
//!
//! Entries are keyed by their exact simplified or traditional form. A token
//! may map to several entries (one per reading). Stores are never mutated
//! after opening.

use crate::pronunciation::normalize_pronunciation;
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Table layout expected by [`SqliteEntryStore`].
pub const SQLITE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY,
    simplified TEXT NOT NULL,
    traditional TEXT NOT NULL,
    pinyin TEXT NOT NULL,
    definitions TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entries_simplified ON entries(simplified);
CREATE INDEX IF NOT EXISTS idx_entries_traditional ON entries(traditional);";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub id: i64,
    pub simplified: String,
    pub traditional: String,
    #[serde(alias = "pinyin")]
    pub pronunciation: String,
    #[serde(default)]
    pub definitions: Vec<String>,
}

impl DictionaryEntry {
    fn normalized(mut self) -> Self {
        self.pronunciation = normalize_pronunciation(&self.pronunciation);
        self
    }
}

pub trait EntryStore: Send + Sync {
    /// Entries whose simplified or traditional form equals `token`, ordered by id.
    /// Never fails; an unreadable store behaves as an empty one.
    fn lookup(&self, token: &str) -> Vec<DictionaryEntry>;

    fn entry_count(&self) -> usize;
}

/// In-memory store, loaded from a JSON array or built directly.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: BTreeMap<i64, DictionaryEntry>,
    index: HashMap<String, Vec<i64>>,
}

impl MemoryEntryStore {
    pub fn from_entries(entries: impl IntoIterator<Item = DictionaryEntry>) -> Self {
        let mut store = Self::default();
        for entry in entries {
            if entry.simplified.is_empty() || entry.traditional.is_empty() {
                warn!("Skipping dictionary entry {} with an empty form", entry.id);
                continue;
            }
            let entry = entry.normalized();
            if let Some(previous) = store.entries.insert(entry.id, entry.clone()) {
                warn!("Duplicate dictionary entry id {}, keeping the last", entry.id);
                store.unindex(&previous);
            }
            store.index_form(&entry.simplified, entry.id);
            if entry.traditional != entry.simplified {
                store.index_form(&entry.traditional, entry.id);
            }
        }
        store
    }

    pub fn from_json_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dictionary file {}", path.display()))?;
        let entries: Vec<DictionaryEntry> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse dictionary file {}", path.display()))?;
        let store = Self::from_entries(entries);
        info!(
            "Loaded {} dictionary entries from {}",
            store.entry_count(),
            path.display()
        );
        Ok(store)
    }

    fn index_form(&mut self, form: &str, id: i64) {
        let ids = self.index.entry(form.to_string()).or_default();
        if let Err(pos) = ids.binary_search(&id) {
            ids.insert(pos, id);
        }
    }

    fn unindex(&mut self, entry: &DictionaryEntry) {
        for form in [&entry.simplified, &entry.traditional] {
            if let Some(ids) = self.index.get_mut(form.as_str()) {
                ids.retain(|&id| id != entry.id);
            }
        }
    }
}

impl EntryStore for MemoryEntryStore {
    fn lookup(&self, token: &str) -> Vec<DictionaryEntry> {
        self.index
            .get(token)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.entries.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// Read-only SQLite store.
pub struct SqliteEntryStore {
    conn: Mutex<Connection>,
    entry_count: usize,
}

impl SqliteEntryStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open dictionary database {}", path.display()))?;

        let table: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'entries'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to inspect dictionary schema")?;
        if table.is_none() {
            bail!("Dictionary database {} has no entries table", path.display());
        }

        let entry_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .context("Failed to count dictionary entries")?;

        info!(
            "Opened dictionary database {} ({} entries)",
            path.display(),
            entry_count
        );

        Ok(Self {
            conn: Mutex::new(conn),
            entry_count: entry_count.max(0) as usize,
        })
    }

    fn query(&self, token: &str) -> rusqlite::Result<Vec<DictionaryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, simplified, traditional, pinyin, definitions FROM entries
             WHERE simplified = ?1 OR traditional = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([token], |row| {
            let definitions: String = row.get(4)?;
            Ok(DictionaryEntry {
                id: row.get(0)?,
                simplified: row.get(1)?,
                traditional: row.get(2)?,
                pronunciation: row.get(3)?,
                definitions: parse_definitions(&definitions),
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.normalized());
        }
        Ok(entries)
    }
}

impl EntryStore for SqliteEntryStore {
    fn lookup(&self, token: &str) -> Vec<DictionaryEntry> {
        match self.query(token) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Dictionary query for '{}' failed: {}", token, e);
                Vec::new()
            }
        }
    }

    fn entry_count(&self) -> usize {
        self.entry_count
    }
}

/// Definitions are stored as a JSON array; CEDICT-style `/a/b/` text is
/// accepted as well.
fn parse_definitions(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
            return list;
        }
        debug!("Definitions column is not a JSON string array: {}", trimmed);
    }
    trimmed
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Opens the store at `path`: `.json` files load into memory, anything else
/// is opened as SQLite. A missing file is an error.
pub fn open_entry_store(path: &Path) -> Result<Arc<dyn EntryStore>> {
    if !path.exists() {
        bail!("Dictionary not found at {}", path.display());
    }
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        Ok(Arc::new(MemoryEntryStore::from_json_path(path)?))
    } else {
        Ok(Arc::new(SqliteEntryStore::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;
    use tempfile::TempDir;

    fn entry(id: i64, simplified: &str, traditional: &str, pinyin: &str) -> DictionaryEntry {
        DictionaryEntry {
            id,
            simplified: simplified.to_string(),
            traditional: traditional.to_string(),
            pronunciation: pinyin.to_string(),
            definitions: vec![format!("definition {}", id)],
        }
    }

    fn sample_entries() -> Vec<DictionaryEntry> {
        vec![
            entry(1, "你好", "你好", "ni3 hao3"),
            entry(2, "中国", "中國", "Zhong1 guo2"),
            entry(3, "行", "行", "xing2"),
            entry(4, "行", "行", "hang2"),
            entry(5, "绿", "綠", "lǜ"),
        ]
    }

    #[test]
    fn test_memory_lookup_by_either_form() {
        let store = MemoryEntryStore::from_entries(sample_entries());
        assert_eq!(store.lookup("中国")[0].id, 2);
        assert_eq!(store.lookup("中國")[0].id, 2);
        assert!(store.lookup("中").is_empty());
    }

    #[test]
    fn test_memory_dedup_when_forms_coincide() {
        let store = MemoryEntryStore::from_entries(sample_entries());
        let results = store.lookup("你好");
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_memory_polyphones_ordered_by_id() {
        let store = MemoryEntryStore::from_entries(sample_entries());
        let readings: Vec<_> = store
            .lookup("行")
            .into_iter()
            .map(|e| e.pronunciation)
            .collect();
        assert_eq!(readings, vec!["xing2", "hang2"]);
    }

    #[test]
    fn test_pronunciation_normalized_on_load() {
        let store = MemoryEntryStore::from_entries(sample_entries());
        assert_eq!(store.lookup("绿")[0].pronunciation, "lu:4");
    }

    #[test]
    fn test_empty_forms_skipped() {
        let store = MemoryEntryStore::from_entries(vec![entry(9, "", "x", "x1")]);
        assert_eq!(store.entry_count(), 0);
    }

    #[test]
    fn test_json_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dict.json");
        std::fs::write(
            &path,
            r#"[{"id": 1, "simplified": "吗", "traditional": "嗎", "pinyin": "ma5", "definitions": ["question particle"]}]"#,
        )
        .unwrap();

        let store = open_entry_store(&path).unwrap();
        assert_eq!(store.entry_count(), 1);
        let results = store.lookup("嗎");
        assert_eq!(results[0].pronunciation, "ma5");
        assert_eq!(results[0].definitions, vec!["question particle"]);
    }

    #[test]
    fn test_sqlite_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dict.sqlite");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(SQLITE_SCHEMA).unwrap();
            for e in sample_entries() {
                conn.execute(
                    "INSERT INTO entries (id, simplified, traditional, pinyin, definitions)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        e.id,
                        e.simplified,
                        e.traditional,
                        e.pronunciation,
                        serde_json::to_string(&e.definitions).unwrap()
                    ],
                )
                .unwrap();
            }
            conn.execute(
                "INSERT INTO entries (id, simplified, traditional, pinyin, definitions)
                 VALUES (6, '好', '好', 'hao3', '/good/well/')",
                [],
            )
            .unwrap();
        }

        let store = open_entry_store(&path).unwrap();
        assert_eq!(store.entry_count(), 6);
        assert_eq!(store.lookup("中國")[0].simplified, "中国");
        assert_eq!(store.lookup("行").len(), 2);
        assert_eq!(store.lookup("绿")[0].pronunciation, "lu:4");
        assert_eq!(store.lookup("好")[0].definitions, vec!["good", "well"]);
        assert!(store.lookup("不存在").is_empty());
    }

    #[test]
    fn test_sqlite_without_table_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.sqlite");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE other (x INTEGER);")
            .unwrap();
        assert!(SqliteEntryStore::open(&path).is_err());
    }

    #[test]
    fn test_missing_dictionary_fails() {
        let dir = TempDir::new().unwrap();
        assert!(open_entry_store(&dir.path().join("nope.sqlite")).is_err());
    }
}
