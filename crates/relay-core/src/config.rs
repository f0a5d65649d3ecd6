use crate::context::ThreadNaming;
use crate::error::{RelayError, Result};
use crate::paths;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lowest allowed poll interval; bounds the external call rate.
pub const MIN_POLL_SECONDS: u64 = 30;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// WatcherConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_poll_seconds() -> u64 {
    60
}

fn default_page_size() -> usize {
    50
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_seconds: default_poll_seconds(),
            page_size: default_page_size(),
        }
    }
}

impl WatcherConfig {
    /// Poll interval with the floor applied.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_seconds.max(MIN_POLL_SECONDS))
    }
}

// ---------------------------------------------------------------------------
// StoreConfig / CacheConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(paths::STORE_FILE)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    #[default]
    Json,
    Redb,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackendKind,
    /// Defaults to a backend-specific file name next to the config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl CacheConfig {
    pub fn file(&self) -> PathBuf {
        match (&self.path, self.backend) {
            (Some(p), _) => p.clone(),
            (None, CacheBackendKind::Json) => PathBuf::from(paths::JSON_CACHE_FILE),
            (None, CacheBackendKind::Redb) => PathBuf::from(paths::REDB_CACHE_FILE),
        }
    }
}

// ---------------------------------------------------------------------------
// DiscordConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Name of the environment variable holding the bot token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default)]
    pub guild_id: String,
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_token_env() -> String {
    "DISCORD_TOKEN".to_string()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_env: default_token_env(),
            guild_id: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ContextConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Channel whose threads hold per-subject conversations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_channel_id: Option<String>,
    #[serde(default = "default_thread_template")]
    pub thread_name_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_channel_id: Option<String>,
    /// Text sent alongside a card posted into a subject's thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ping: Option<String>,
}

fn default_thread_template() -> String {
    "Training Case for C{subject}".to_string()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            parent_channel_id: None,
            thread_name_template: default_thread_template(),
            fallback_channel_id: None,
            thread_ping: None,
        }
    }
}

impl ContextConfig {
    pub fn naming(&self) -> ThreadNaming {
        ThreadNaming::new(self.thread_name_template.clone())
    }
}

// ---------------------------------------------------------------------------
// CardConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardConfig {
    #[serde(default = "default_card_title")]
    pub title: String,
    /// Base of the "View" link; the record id is appended.
    #[serde(default = "default_record_base_url")]
    pub record_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_base_url: Option<String>,
    #[serde(default = "default_profile_id_pattern")]
    pub profile_id_pattern: String,
}

fn default_card_title() -> String {
    "🕓 Pending Submission (Approval Required)".to_string()
}

fn default_record_base_url() -> String {
    "https://example.invalid/records".to_string()
}

fn default_profile_id_pattern() -> String {
    r"^\d{6,8}$".to_string()
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            title: default_card_title(),
            record_base_url: default_record_base_url(),
            profile_base_url: None,
            profile_id_pattern: default_profile_id_pattern(),
        }
    }
}

// ---------------------------------------------------------------------------
// ReviewConfig / ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Holding any one of these roles authorizes a decision.
    #[serde(default)]
    pub reviewer_roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3142
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub card: CardConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RelayError::NotInitialized(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// SQLite store location, resolved against the config file's directory.
    pub fn store_path(&self, config_path: &Path) -> PathBuf {
        paths::resolve(&paths::config_base_dir(config_path), &self.store.path)
    }

    pub fn cache_path(&self, config_path: &Path) -> PathBuf {
        paths::resolve(&paths::config_base_dir(config_path), &self.cache.file())
    }

    /// Bot token from the environment variable named in `discord.token_env`.
    pub fn discord_token(&self) -> Option<String> {
        std::env::var(&self.discord.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.watcher.poll_seconds < MIN_POLL_SECONDS {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "watcher.poll_seconds={} is below the {MIN_POLL_SECONDS}s floor and will be raised",
                    self.watcher.poll_seconds
                ),
            });
        }

        if self.watcher.page_size == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "watcher.page_size is 0: no pending record would ever be announced"
                    .to_string(),
            });
        }

        if self.review.reviewer_roles.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "review.reviewer_roles is empty: every decision will be refused"
                    .to_string(),
            });
        }

        if self.context.parent_channel_id.is_none() && self.context.fallback_channel_id.is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "neither context.parent_channel_id nor context.fallback_channel_id is set: \
                          no record can be announced"
                    .to_string(),
            });
        }

        if self.context.parent_channel_id.is_some() && self.discord.guild_id.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "discord.guild_id is empty: active threads cannot be listed".to_string(),
            });
        }

        if !self.context.naming().has_placeholder() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "context.thread_name_template '{}' has no {{subject}} placeholder: \
                     every subject maps to the same thread",
                    self.context.thread_name_template
                ),
            });
        }

        if let Err(e) = Regex::new(&self.card.profile_id_pattern) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("card.profile_id_pattern is not a valid regex: {e}"),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn usable() -> Config {
        let mut cfg = Config::default();
        cfg.discord.guild_id = "g1".into();
        cfg.context.parent_channel_id = Some("training".into());
        cfg.review.reviewer_roles = vec!["instructor".into()];
        cfg
    }

    #[test]
    fn minimal_yaml_uses_defaults() {
        let cfg: Config = serde_yaml::from_str("review:\n  reviewer_roles: [ip]\n").unwrap();
        assert_eq!(cfg.watcher.poll_seconds, 60);
        assert_eq!(cfg.watcher.page_size, 50);
        assert_eq!(cfg.cache.backend, CacheBackendKind::Json);
        assert_eq!(cfg.discord.token_env, "DISCORD_TOKEN");
        assert_eq!(cfg.context.thread_name_template, "Training Case for C{subject}");
        assert_eq!(cfg.review.reviewer_roles, vec!["ip".to_string()]);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.yaml");
        let mut cfg = usable();
        cfg.cache.backend = CacheBackendKind::Redb;
        cfg.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.cache.backend, CacheBackendKind::Redb);
        assert_eq!(loaded.context.parent_channel_id.as_deref(), Some("training"));
    }

    #[test]
    fn load_missing_file_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("relay.yaml")).unwrap_err();
        assert!(matches!(err, RelayError::NotInitialized(_)));
    }

    #[test]
    fn interval_applies_floor() {
        let w = WatcherConfig {
            poll_seconds: 5,
            page_size: 50,
        };
        assert_eq!(w.interval(), std::time::Duration::from_secs(30));
        let w = WatcherConfig {
            poll_seconds: 90,
            page_size: 50,
        };
        assert_eq!(w.interval(), std::time::Duration::from_secs(90));
    }

    #[test]
    fn paths_resolve_next_to_config() {
        let cfg = Config::default();
        let config_path = Path::new("/srv/relay/relay.yaml");
        assert_eq!(cfg.store_path(config_path), PathBuf::from("/srv/relay/records.db"));
        assert_eq!(
            cfg.cache_path(config_path),
            PathBuf::from("/srv/relay/pending_cache.json")
        );
    }

    #[test]
    fn redb_backend_gets_its_own_default_file() {
        let cache = CacheConfig {
            backend: CacheBackendKind::Redb,
            path: None,
        };
        assert_eq!(cache.file(), PathBuf::from("pending_cache.redb"));
    }

    #[test]
    fn validate_usable_config_no_warnings() {
        assert!(usable().validate().is_empty());
    }

    #[test]
    fn validate_flags_low_poll_and_empty_roles() {
        let mut cfg = usable();
        cfg.watcher.poll_seconds = 10;
        cfg.review.reviewer_roles.clear();
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("poll_seconds=10")));
        assert!(warnings.iter().any(|w| w.message.contains("reviewer_roles is empty")));
    }

    #[test]
    fn validate_flags_missing_context_source() {
        let mut cfg = usable();
        cfg.context.parent_channel_id = None;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("no record can be announced")));
    }

    #[test]
    fn validate_flags_bad_pattern_and_template() {
        let mut cfg = usable();
        cfg.card.profile_id_pattern = "(".into();
        cfg.context.thread_name_template = "Reviews".into();
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("profile_id_pattern")));
        assert!(warnings.iter().any(|w| w.message.contains("no {subject} placeholder")));
    }

    #[test]
    fn optional_sections_not_serialized_when_unset() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        assert!(!yaml.contains("fallback_channel_id"));
        assert!(!yaml.contains("profile_base_url"));
    }
}
