//! Announcement Cache: "card X for record Y lives at location Z".
//!
//! The presence of an entry is the only thing that stops a record from being
//! announced again, so the map must survive restarts. It is held in memory,
//! loaded once from a [`CacheStore`] at startup, and written back in full by
//! [`AnnouncementCache::flush`] (once per watcher tick, and after a decision
//! evicts an entry).
//!
//! Two backends:
//! - [`JsonFileCache`]: a single JSON document
//!   `{ "<record id>": { "locationId": "...", "messageId": "..." } }`,
//!   guarded by an exclusive advisory lock on `<path>.lock`;
//! - [`RedbCache`]: one redb table keyed by record id, for deployments that
//!   would rather not rewrite a file.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::config::CacheBackendKind;
use crate::context::MessageRef;
use crate::error::{RelayError, Result};
use crate::io;

// ---------------------------------------------------------------------------
// CacheEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub location_id: String,
    pub message_id: String,
}

impl CacheEntry {
    pub fn new(location_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            location_id: location_id.into(),
            message_id: message_id.into(),
        }
    }

    /// Entries missing either half cannot be edited and are dropped.
    pub fn is_complete(&self) -> bool {
        !self.location_id.trim().is_empty() && !self.message_id.trim().is_empty()
    }

    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            location_id: self.location_id.clone(),
            message_id: self.message_id.clone(),
        }
    }
}

impl From<MessageRef> for CacheEntry {
    fn from(m: MessageRef) -> Self {
        Self {
            location_id: m.location_id,
            message_id: m.message_id,
        }
    }
}

pub type CacheMap = BTreeMap<String, CacheEntry>;

// ---------------------------------------------------------------------------
// CacheStore
// ---------------------------------------------------------------------------

/// Durable representation behind the in-memory cache.
pub trait CacheStore: Send {
    fn load(&self) -> Result<CacheMap>;
    fn persist(&self, entries: &CacheMap) -> Result<()>;
}

// ---------------------------------------------------------------------------
// JsonFileCache
// ---------------------------------------------------------------------------

pub struct JsonFileCache {
    path: PathBuf,
    /// Holds the flock; released on drop.
    _lock: File,
}

impl JsonFileCache {
    /// Take ownership of the document at `path`.
    ///
    /// The lock lives on a sibling `<path>.lock` file; every flush renames a
    /// new document over `path`. A second owner, in this process or another,
    /// gets [`RelayError::CacheLocked`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path(&path))?;
        match lock.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                return Err(RelayError::CacheLocked(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Self { path, _lock: lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for JsonFileCache {
    fn load(&self) -> Result<CacheMap> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CacheMap::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(CacheMap::new());
        }
        match serde_json::from_str(&content) {
            Ok(map) => Ok(map),
            Err(e) => {
                let moved = io::quarantine(&self.path)?;
                tracing::warn!(
                    path = %self.path.display(),
                    moved_to = %moved.display(),
                    error = %e,
                    "announcement cache unreadable; starting empty"
                );
                Ok(CacheMap::new())
            }
        }
    }

    fn persist(&self, entries: &CacheMap) -> Result<()> {
        let data = serde_json::to_vec_pretty(entries)?;
        io::atomic_write(&self.path, &data)
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut p = path.as_os_str().to_owned();
    p.push(".lock");
    PathBuf::from(p)
}

// ---------------------------------------------------------------------------
// RedbCache
// ---------------------------------------------------------------------------

/// Key: record id. Value: JSON-encoded `CacheEntry`.
const ANNOUNCEMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("announcements");

fn db_err(e: impl std::fmt::Display) -> RelayError {
    RelayError::CacheDb(e.to_string())
}

pub struct RedbCache {
    db: Database,
}

impl RedbCache {
    /// Open or create the redb database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path).map_err(db_err)?;
        // Ensure the table exists before any reads
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(ANNOUNCEMENTS).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }
}

impl CacheStore for RedbCache {
    fn load(&self) -> Result<CacheMap> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(ANNOUNCEMENTS).map_err(db_err)?;
        let mut map = CacheMap::new();
        for entry in table.iter().map_err(db_err)? {
            let (k, v) = entry.map_err(db_err)?;
            let value: CacheEntry = serde_json::from_slice(v.value())?;
            map.insert(k.value().to_string(), value);
        }
        Ok(map)
    }

    /// Replace the whole table in one write transaction.
    fn persist(&self, entries: &CacheMap) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        wt.delete_table(ANNOUNCEMENTS).map_err(db_err)?;
        {
            let mut table = wt.open_table(ANNOUNCEMENTS).map_err(db_err)?;
            for (id, entry) in entries {
                let value = serde_json::to_vec(entry)?;
                table
                    .insert(id.as_str(), value.as_slice())
                    .map_err(db_err)?;
            }
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }
}

/// Keeps nothing. Backs dry runs, where rehearsed posts must never become
/// durable entries.
pub struct DiscardCacheStore;

impl CacheStore for DiscardCacheStore {
    fn load(&self) -> Result<CacheMap> {
        Ok(CacheMap::new())
    }

    fn persist(&self, _entries: &CacheMap) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AnnouncementCache
// ---------------------------------------------------------------------------

pub struct AnnouncementCache {
    entries: CacheMap,
    backend: Box<dyn CacheStore>,
    dirty: bool,
}

impl AnnouncementCache {
    /// Load the full cache from `backend`.
    pub fn load(backend: Box<dyn CacheStore>) -> Result<Self> {
        let entries = backend.load()?;
        Ok(Self {
            entries,
            backend,
            dirty: false,
        })
    }

    /// Open the configured backend at `path` and load it.
    pub fn open(kind: CacheBackendKind, path: &Path) -> Result<Self> {
        let backend: Box<dyn CacheStore> = match kind {
            CacheBackendKind::Json => Box::new(JsonFileCache::open(path)?),
            CacheBackendKind::Redb => Box::new(RedbCache::open(path)?),
        };
        Self::load(backend)
    }

    /// Keep the loaded entries but stop writing them anywhere. Dropping the
    /// old backend releases its lock.
    pub fn detach(mut self) -> Self {
        self.backend = Box::new(DiscardCacheStore);
        self
    }

    pub fn get(&self, id: &str) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn put(&mut self, id: impl Into<String>, entry: CacheEntry) {
        self.entries.insert(id.into(), entry);
        self.dirty = true;
    }

    pub fn remove(&mut self, id: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Snapshot of every entry, ordered by record id.
    pub fn entries(&self) -> Vec<(String, CacheEntry)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn ids(&self) -> std::collections::HashSet<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the full map to the backend if anything changed since the last
    /// flush. Returns whether a write happened.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.backend.persist(&self.entries)?;
        self.dirty = false;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn reopen(kind: CacheBackendKind, path: &Path) -> AnnouncementCache {
        AnnouncementCache::open(kind, path).unwrap()
    }

    #[test]
    fn missing_json_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let cache = reopen(CacheBackendKind::Json, &dir.path().join("cache.json"));
        assert!(cache.is_empty());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn json_document_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = reopen(CacheBackendKind::Json, &path);
        cache.put("4821", CacheEntry::new("thread-1", "msg-9"));
        cache.flush().unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["4821"]["locationId"], "thread-1");
        assert_eq!(doc["4821"]["messageId"], "msg-9");
    }

    #[test]
    fn entries_survive_reopen() {
        for kind in [CacheBackendKind::Json, CacheBackendKind::Redb] {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("cache.store");
            {
                let mut cache = reopen(kind, &path);
                cache.put("a", CacheEntry::new("c1", "m1"));
                cache.put("b", CacheEntry::new("c2", "m2"));
                cache.flush().unwrap();
            }
            let cache = reopen(kind, &path);
            assert_eq!(cache.len(), 2, "{kind:?}");
            assert_eq!(cache.get("b"), Some(&CacheEntry::new("c2", "m2")));
        }
    }

    #[test]
    fn removals_are_persisted_on_flush() {
        for kind in [CacheBackendKind::Json, CacheBackendKind::Redb] {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("cache.store");
            let mut cache = reopen(kind, &path);
            cache.put("a", CacheEntry::new("c1", "m1"));
            cache.put("b", CacheEntry::new("c2", "m2"));
            cache.flush().unwrap();
            cache.remove("a");
            cache.flush().unwrap();
            drop(cache);

            let cache = reopen(kind, &path);
            assert!(!cache.contains("a"), "{kind:?}");
            assert!(cache.contains("b"), "{kind:?}");
        }
    }

    #[test]
    fn unflushed_changes_are_not_durable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = reopen(CacheBackendKind::Json, &path);
        cache.put("a", CacheEntry::new("c1", "m1"));
        drop(cache);
        assert!(reopen(CacheBackendKind::Json, &path).is_empty());
    }

    #[test]
    fn flush_is_a_noop_when_clean() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = reopen(CacheBackendKind::Json, &path);
        assert!(!cache.flush().unwrap());
        assert!(!path.exists());
        assert!(cache.remove("nothing").is_none());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn corrupt_json_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();
        let cache = reopen(CacheBackendKind::Json, &path);
        assert!(cache.is_empty());
        assert!(dir.path().join("cache.json.corrupt").exists());
    }

    #[test]
    fn detached_cache_keeps_entries_but_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        {
            let mut cache = reopen(CacheBackendKind::Json, &path);
            cache.put("a", CacheEntry::new("c1", "m1"));
            cache.flush().unwrap();
        }
        let mut detached = reopen(CacheBackendKind::Json, &path).detach();
        assert!(detached.contains("a"));
        detached.put("b", CacheEntry::new("c2", "m2"));
        assert!(detached.flush().unwrap());

        let cache = reopen(CacheBackendKind::Json, &path);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn json_cache_has_a_single_owner() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let owner = reopen(CacheBackendKind::Json, &path);

        let err = AnnouncementCache::open(CacheBackendKind::Json, &path)
            .err()
            .expect("second owner must be refused");
        assert!(matches!(err, RelayError::CacheLocked(_)), "{err}");

        drop(owner);
        assert!(AnnouncementCache::open(CacheBackendKind::Json, &path).is_ok());
    }

    #[test]
    fn detaching_releases_the_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let _rehearsal = reopen(CacheBackendKind::Json, &path).detach();
        assert!(AnnouncementCache::open(CacheBackendKind::Json, &path).is_ok());
    }

    #[test]
    fn incomplete_entries_are_detected() {
        assert!(CacheEntry::new("c", "m").is_complete());
        assert!(!CacheEntry::new("", "m").is_complete());
        assert!(!CacheEntry::new("c", " ").is_complete());
    }
}
