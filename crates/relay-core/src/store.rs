//! State Store Accessor.
//!
//! The data store owns record state. The relay reads pending pages and point
//! states, and changes state only through [`RecordStore::conditional_set_state`],
//! a single `UPDATE … WHERE id = ? AND state = ?`. That statement is the only
//! guard against two reviewers resolving the same record, and it holds across
//! processes because the database serialises writers, not this code.
//!
//! # Table
//!
//! ```text
//! records(id TEXT PK, subject TEXT, state INTEGER, submitted_at INTEGER,
//!         profile_ref TEXT NULL, attributes TEXT (JSON), reviewed_by TEXT NULL,
//!         updated_at INTEGER NULL)
//! ```

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::warn;

use crate::error::{RelayError, Result};
use crate::record::{Attribute, PendingRecord, RecordState, SubjectRef};

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

pub trait RecordStore: Send + Sync {
    /// Up to `limit` records in `pending`, newest submission first. A row
    /// that cannot be decoded is logged and left out.
    fn list_pending(&self, limit: usize) -> Result<Vec<PendingRecord>>;

    /// Current state, or `None` if the record no longer exists.
    fn state(&self, id: &str) -> Result<Option<RecordState>>;

    /// Full point-in-time read of one record.
    fn get(&self, id: &str) -> Result<Option<PendingRecord>>;

    /// Move `id` from `from` to `to` only if it is still in `from`.
    /// Returns the number of rows changed (0 or 1).
    fn conditional_set_state(&self, id: &str, from: RecordState, to: RecordState)
        -> Result<usize>;

    /// Same guarded transition, also recording who made it. Stores without
    /// a place for the reviewer only change state.
    fn conditional_resolve(
        &self,
        id: &str,
        from: RecordState,
        to: RecordState,
        reviewer: &str,
    ) -> Result<usize> {
        let _ = reviewer;
        self.conditional_set_state(id, from, to)
    }
}

// ---------------------------------------------------------------------------
// SqliteRecordStore
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    id           TEXT PRIMARY KEY,
    subject      TEXT NOT NULL,
    state        INTEGER NOT NULL,
    submitted_at INTEGER NOT NULL,
    profile_ref  TEXT,
    attributes   TEXT NOT NULL DEFAULT '[]',
    reviewed_by  TEXT,
    updated_at   INTEGER
);
CREATE INDEX IF NOT EXISTS records_state_submitted
    ON records (state, submitted_at DESC);
";

const SELECT_COLUMNS: &str =
    "id, subject, state, submitted_at, profile_ref, attributes, reviewed_by";

type RawRow = (String, String, i64, i64, Option<String>, String, Option<String>);

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open or create the store at `path`.
    ///
    /// Several processes may open the same file; writers wait up to five
    /// seconds for each other instead of failing.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves nothing half-applied in SQLite.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a freshly produced record. Used by producers and fixtures.
    pub fn insert(&self, record: &PendingRecord) -> Result<()> {
        let attributes = serde_json::to_string(&record.attributes)?;
        let res = self.conn().execute(
            "INSERT INTO records (id, subject, state, submitted_at, profile_ref, attributes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.subject.as_str(),
                record.state.code(),
                record.submitted_at.timestamp(),
                record.profile_ref,
                attributes,
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(RelayError::RecordExists(record.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Unconditional state write, the way an administrative tool changes a
    /// record behind the relay's back. Returns rows changed.
    pub fn force_state(&self, id: &str, state: RecordState) -> Result<usize> {
        let n = self.conn().execute(
            "UPDATE records SET state = ?1, reviewed_by = NULL, updated_at = ?2 WHERE id = ?3",
            params![state.code(), Utc::now().timestamp(), id],
        )?;
        Ok(n)
    }

    fn decode(raw: RawRow) -> Result<PendingRecord> {
        let (id, subject, state, submitted_at, profile_ref, attributes, reviewed_by) = raw;
        let submitted_at = DateTime::<Utc>::from_timestamp(submitted_at, 0).ok_or_else(|| {
            RelayError::CorruptRecord {
                id: id.clone(),
                reason: format!("submitted_at {submitted_at} out of range"),
            }
        })?;
        let attributes: Vec<Attribute> =
            serde_json::from_str(&attributes).map_err(|e| RelayError::CorruptRecord {
                id: id.clone(),
                reason: format!("attributes: {e}"),
            })?;
        Ok(PendingRecord {
            id,
            subject: SubjectRef(subject),
            state: RecordState::from_code(state),
            submitted_at,
            profile_ref,
            attributes,
            reviewed_by,
        })
    }
}

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

impl RecordStore for SqliteRecordStore {
    fn list_pending(&self, limit: usize) -> Result<Vec<PendingRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM records
             WHERE state = ?1
             ORDER BY submitted_at DESC, id DESC"
        ))?;
        let mut rows = stmt.query(params![RecordState::Pending.code()])?;

        // Unreadable rows are skipped and do not use up the page
        let mut page = Vec::new();
        while page.len() < limit {
            let Some(row) = rows.next()? else { break };
            let raw = raw_row(row)?;
            let id = raw.0.clone();
            match Self::decode(raw) {
                Ok(record) => page.push(record),
                Err(e) => warn!(record_id = %id, error = %e, "skipping unreadable pending record"),
            }
        }
        Ok(page)
    }

    fn state(&self, id: &str) -> Result<Option<RecordState>> {
        let code: Option<i64> = self
            .conn()
            .query_row("SELECT state FROM records WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(code.map(RecordState::from_code))
    }

    fn get(&self, id: &str) -> Result<Option<PendingRecord>> {
        let raw = self
            .conn()
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM records WHERE id = ?1"),
                params![id],
                raw_row,
            )
            .optional()?;
        raw.map(Self::decode).transpose()
    }

    fn conditional_set_state(
        &self,
        id: &str,
        from: RecordState,
        to: RecordState,
    ) -> Result<usize> {
        let n = self.conn().execute(
            "UPDATE records SET state = ?1, updated_at = ?2 WHERE id = ?3 AND state = ?4",
            params![to.code(), Utc::now().timestamp(), id, from.code()],
        )?;
        Ok(n)
    }

    fn conditional_resolve(
        &self,
        id: &str,
        from: RecordState,
        to: RecordState,
        reviewer: &str,
    ) -> Result<usize> {
        let n = self.conn().execute(
            "UPDATE records SET state = ?1, reviewed_by = ?2, updated_at = ?3
             WHERE id = ?4 AND state = ?5",
            params![to.code(), reviewer, Utc::now().timestamp(), id, from.code()],
        )?;
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AttributeValue;
    use chrono::Duration as CDur;
    use std::sync::{Arc, Barrier};
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, SqliteRecordStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteRecordStore::open(&dir.path().join("records.db")).unwrap();
        (dir, store)
    }

    fn submitted(id: &str, minutes_ago: i64) -> PendingRecord {
        PendingRecord::new(id, SubjectRef::new("1042"), Utc::now() - CDur::minutes(minutes_ago))
    }

    #[test]
    fn list_pending_is_newest_first_and_bounded() {
        let (_dir, store) = open_tmp();
        store.insert(&submitted("old", 30)).unwrap();
        store.insert(&submitted("new", 1)).unwrap();
        store.insert(&submitted("mid", 10)).unwrap();

        let page = store.list_pending(2).unwrap();
        let ids: Vec<_> = page.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    fn insert_unreadable(store: &SqliteRecordStore, id: &str, state: RecordState) {
        store
            .conn()
            .execute(
                "INSERT INTO records (id, subject, state, submitted_at, attributes)
                 VALUES (?1, '77', ?2, ?3, 'not json')",
                params![id, state.code(), Utc::now().timestamp()],
            )
            .unwrap();
    }

    #[test]
    fn unreadable_rows_are_left_out_of_the_page() {
        let (_dir, store) = open_tmp();
        store.insert(&submitted("good-old", 30)).unwrap();
        store.insert(&submitted("good-new", 1)).unwrap();
        insert_unreadable(&store, "bad", RecordState::Pending);

        let page = store.list_pending(2).unwrap();
        let ids: Vec<_> = page.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["good-new", "good-old"]);
    }

    #[test]
    fn state_is_readable_when_the_payload_is_not() {
        let (_dir, store) = open_tmp();
        insert_unreadable(&store, "bad", RecordState::Deleted);

        assert_eq!(store.state("bad").unwrap(), Some(RecordState::Deleted));
        let err = store.get("bad").unwrap_err();
        assert!(matches!(err, RelayError::CorruptRecord { ref id, .. } if id == "bad"), "{err}");
    }

    #[test]
    fn list_pending_skips_resolved() {
        let (_dir, store) = open_tmp();
        store.insert(&submitted("a", 5)).unwrap();
        store.insert(&submitted("b", 4)).unwrap();
        store.force_state("a", RecordState::Deleted).unwrap();

        let page = store.list_pending(50).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "b");
    }

    #[test]
    fn get_roundtrips_attributes_and_profile() {
        let (_dir, store) = open_tmp();
        let record = submitted("r1", 2)
            .with_profile("1234567")
            .with_attribute(Attribute {
                name: "Time".into(),
                value: AttributeValue::Minutes(75),
                inline: true,
            });
        store.insert(&record).unwrap();

        let loaded = store.get("r1").unwrap().unwrap();
        assert_eq!(loaded.profile_ref.as_deref(), Some("1234567"));
        assert_eq!(loaded.attributes, record.attributes);
        assert_eq!(loaded.submitted_at.timestamp(), record.submitted_at.timestamp());
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn state_of_missing_record_is_none() {
        let (_dir, store) = open_tmp();
        assert_eq!(store.state("ghost").unwrap(), None);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let (_dir, store) = open_tmp();
        store.insert(&submitted("r1", 2)).unwrap();
        let err = store.insert(&submitted("r1", 1)).unwrap_err();
        assert!(matches!(err, RelayError::RecordExists(id) if id == "r1"));
    }

    #[test]
    fn conditional_write_only_applies_once() {
        let (_dir, store) = open_tmp();
        store.insert(&submitted("r1", 2)).unwrap();

        let first = store
            .conditional_set_state("r1", RecordState::Pending, RecordState::Accepted)
            .unwrap();
        let second = store
            .conditional_set_state("r1", RecordState::Pending, RecordState::Rejected)
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(store.state("r1").unwrap(), Some(RecordState::Accepted));
    }

    #[test]
    fn conditional_write_on_missing_record_changes_nothing() {
        let (_dir, store) = open_tmp();
        let n = store
            .conditional_set_state("ghost", RecordState::Pending, RecordState::Accepted)
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn concurrent_writers_on_separate_connections_resolve_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.db");
        let seed = SqliteRecordStore::open(&path).unwrap();
        seed.insert(&submitted("r1", 2)).unwrap();

        // Two independent connections stand in for two relay processes.
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [RecordState::Accepted, RecordState::Rejected]
            .into_iter()
            .map(|target| {
                let path = path.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let store = SqliteRecordStore::open(&path).unwrap();
                    barrier.wait();
                    store
                        .conditional_set_state("r1", RecordState::Pending, target)
                        .unwrap()
                })
            })
            .collect();

        let changed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(changed, 1);
        let final_state = seed.state("r1").unwrap().unwrap();
        assert!(matches!(
            final_state,
            RecordState::Accepted | RecordState::Rejected
        ));
    }

    #[test]
    fn reviewer_is_recorded_only_by_the_winning_write() {
        let (_dir, store) = open_tmp();
        store.insert(&submitted("r1", 2)).unwrap();

        let won = store
            .conditional_resolve("r1", RecordState::Pending, RecordState::Rejected, "Alex")
            .unwrap();
        let lost = store
            .conditional_resolve("r1", RecordState::Pending, RecordState::Accepted, "Sam")
            .unwrap();

        assert_eq!((won, lost), (1, 0));
        let record = store.get("r1").unwrap().unwrap();
        assert_eq!(record.state, RecordState::Rejected);
        assert_eq!(record.reviewed_by.as_deref(), Some("Alex"));

        store.force_state("r1", RecordState::Deleted).unwrap();
        assert!(store.get("r1").unwrap().unwrap().reviewed_by.is_none());
    }

    #[test]
    fn unknown_state_codes_survive() {
        let (_dir, store) = open_tmp();
        store.insert(&submitted("r1", 2)).unwrap();
        store.force_state("r1", RecordState::Other(9)).unwrap();
        assert_eq!(store.state("r1").unwrap(), Some(RecordState::Other(9)));
    }
}
