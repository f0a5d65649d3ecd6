#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use relay_core::cache::{AnnouncementCache, DiscardCacheStore};
use relay_core::config::{CacheBackendKind, Config};
use relay_core::context::MessageRef;
use relay_core::record::{Attribute, PendingRecord, RecordState, SubjectRef};
use relay_core::review::{Actor, ReviewAction, ReviewDecision};
use relay_core::store::SqliteRecordStore;
use relay_server::transport::{ChannelInfo, ChannelKind, MemoryTransport};
use relay_server::AppState;
use tempfile::TempDir;

pub const PARENT: &str = "parent-1";
pub const FALLBACK: &str = "fallback-1";
pub const REVIEWER_ROLE: &str = "staff";
pub const PING: &str = "<@&900>";

/// A relay wired to a temp SQLite store, a JSON cache file and an
/// in-memory transport.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<SqliteRecordStore>,
    pub transport: Arc<MemoryTransport>,
    pub config: Config,
    pub state: AppState,
}

pub fn config() -> Config {
    let mut config = Config::default();
    config.context.parent_channel_id = Some(PARENT.into());
    config.context.fallback_channel_id = Some(FALLBACK.into());
    config.context.thread_ping = Some(PING.into());
    config.review.reviewer_roles = vec![REVIEWER_ROLE.into()];
    config.card.record_base_url = "https://records.example.com/r".into();
    config
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(config())
    }

    pub fn with_config(config: Config) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteRecordStore::open(&dir.path().join("records.db")).unwrap());
        let transport = Arc::new(MemoryTransport::new());
        transport.add_channel(ChannelInfo::text(FALLBACK, "pending-reviews"));
        let cache = AnnouncementCache::open(CacheBackendKind::Json, &cache_path(&dir)).unwrap();
        let state = AppState::new(&config, store.clone(), cache, transport.clone()).unwrap();
        Self {
            dir,
            store,
            transport,
            config,
            state,
        }
    }

    /// A fresh process over the same store, cache file and transport.
    pub fn restart(&mut self) {
        // The old process lets go of the cache file first
        *self.state.cache() = AnnouncementCache::load(Box::new(DiscardCacheStore)).unwrap();
        let cache =
            AnnouncementCache::open(CacheBackendKind::Json, &cache_path(&self.dir)).unwrap();
        self.state = AppState::new(
            &self.config,
            self.store.clone(),
            cache,
            self.transport.clone(),
        )
        .unwrap();
    }

    pub fn submit(&self, id: &str, subject: &str, minutes_ago: i64) {
        let record = PendingRecord::new(
            id,
            SubjectRef::new(subject),
            Utc::now() - Duration::minutes(minutes_ago),
        )
        .with_attribute(Attribute::text("Route", "KJFK → KBOS").inline());
        self.store.insert(&record).unwrap();
    }

    /// Overwrite a record's payload with something no decoder accepts, the
    /// way a producer bug or a hand edit would, and set its state.
    pub fn corrupt(&self, id: &str, state: RecordState) {
        let conn = rusqlite::Connection::open(self.dir.path().join("records.db")).unwrap();
        let n = conn
            .execute(
                "UPDATE records SET attributes = 'not json', state = ?1 WHERE id = ?2",
                rusqlite::params![state.code(), id],
            )
            .unwrap();
        assert_eq!(n, 1, "no record {id}");
    }

    pub fn add_thread(&self, id: &str, subject: &str) -> ChannelInfo {
        let thread = ChannelInfo::thread(
            id,
            format!("Training Case for C{subject}"),
            PARENT,
            ChannelKind::PublicThread,
        );
        self.transport.add_channel(thread.clone());
        thread
    }

    pub fn cached(&self, id: &str) -> Option<MessageRef> {
        self.state.cache().get(id).map(|e| e.message_ref())
    }

    pub fn cache_path(&self) -> PathBuf {
        cache_path(&self.dir)
    }
}

fn cache_path(dir: &TempDir) -> PathBuf {
    dir.path().join("pending_cache.json")
}

pub fn reviewer(name: &str) -> Actor {
    Actor {
        id: format!("id-{name}"),
        name: name.into(),
        roles: vec![REVIEWER_ROLE.into()],
    }
}

pub fn decision(actor: Actor, action: ReviewAction, record_id: &str) -> ReviewDecision {
    ReviewDecision {
        actor,
        action,
        record_id: record_id.into(),
        message: None,
    }
}
