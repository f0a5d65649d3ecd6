use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context as _;
use relay_core::cache::AnnouncementCache;
use relay_core::card::CardRenderer;
use relay_core::config::Config;
use relay_core::store::{RecordStore, SqliteRecordStore};
use relay_core::{RelayError, Result};
use tokio::sync::{watch, OwnedMutexGuard};

use crate::resolver::ContextResolver;
use crate::transport::{DiscordTransport, MemoryTransport, Transport, TransportError};

pub type SharedCache = Arc<Mutex<AnnouncementCache>>;

/// Shared state for the watcher, the decision handler, and the HTTP routes.
///
/// Store calls are blocking and run on the blocking pool. The cache mutex is
/// never held across an `.await`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub cache: SharedCache,
    pub transport: Arc<dyn Transport>,
    pub resolver: Arc<ContextResolver>,
    pub renderer: Arc<CardRenderer>,
    pub reviewer_roles: Arc<Vec<String>>,
    pub thread_ping: Option<String>,
    pub page_size: usize,
    /// Posts go nowhere durable, so decisions are refused rather than
    /// written to the live store.
    pub dry_run: bool,
    tick_lock: Arc<tokio::sync::Mutex<()>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn RecordStore>,
        cache: AnnouncementCache,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let renderer = CardRenderer::new(&config.card)?;
        let resolver = ContextResolver::new(
            transport.clone(),
            config.context.parent_channel_id.clone(),
            config.context.naming(),
            config.context.fallback_channel_id.clone(),
        );
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            store,
            cache: Arc::new(Mutex::new(cache)),
            transport,
            resolver: Arc::new(resolver),
            renderer: Arc::new(renderer),
            reviewer_roles: Arc::new(config.review.reviewer_roles.clone()),
            thread_ping: config
                .context
                .thread_ping
                .clone()
                .filter(|p| !p.trim().is_empty()),
            page_size: config.watcher.page_size,
            dry_run: false,
            tick_lock: Arc::new(tokio::sync::Mutex::new(())),
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    /// Open the store, cache and transport named by `config`.
    ///
    /// A dry run talks to an in-memory transport and detaches the cache, so
    /// nothing it posts is remembered. The store is still the real one, so a
    /// dry-run state refuses decisions.
    pub fn from_config(config: &Config, config_path: &Path, dry_run: bool) -> anyhow::Result<Self> {
        let store_path = config.store_path(config_path);
        let store = SqliteRecordStore::open(&store_path)
            .with_context(|| format!("opening record store {}", store_path.display()))?;

        let cache_path = config.cache_path(config_path);
        let mut cache = AnnouncementCache::open(config.cache.backend, &cache_path)
            .with_context(|| format!("opening announcement cache {}", cache_path.display()))?;

        let transport: Arc<dyn Transport> = if dry_run {
            cache = cache.detach();
            Arc::new(MemoryTransport::permissive())
        } else {
            let token = config
                .discord_token()
                .ok_or_else(|| TransportError::MissingToken(config.discord.token_env.clone()))?;
            Arc::new(DiscordTransport::new(
                config.discord.api_base.clone(),
                token,
                config.discord.guild_id.clone(),
            )?)
        };

        let mut state = Self::new(config, Arc::new(store), cache, transport)?;
        state.dry_run = dry_run;
        Ok(state)
    }

    // -----------------------------------------------------------------------
    // Store and cache access
    // -----------------------------------------------------------------------

    /// Run a store call on the blocking pool.
    pub async fn store_call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RecordStore) -> Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| RelayError::Io(std::io::Error::other(format!("store task failed: {e}"))))?
    }

    pub fn cache(&self) -> MutexGuard<'_, AnnouncementCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write the cache to its backend if it changed.
    pub async fn flush_cache(&self) -> Result<bool> {
        let cache = self.cache.clone();
        tokio::task::spawn_blocking(move || {
            cache.lock().unwrap_or_else(|e| e.into_inner()).flush()
        })
        .await
        .map_err(|e| RelayError::Io(std::io::Error::other(format!("cache flush task failed: {e}"))))?
    }

    // -----------------------------------------------------------------------
    // Tick single-flight and shutdown
    // -----------------------------------------------------------------------

    /// `None` while another tick holds the guard.
    pub fn try_begin_tick(&self) -> Option<OwnedMutexGuard<()>> {
        self.tick_lock.clone().try_lock_owned().ok()
    }

    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn shutdown_requested(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn shutdown_signal(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        // Err means the sender is gone, which only happens with the state itself
        let _ = rx.wait_for(|stop| *stop).await;
    }
}
