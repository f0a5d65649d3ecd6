use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File name defaults
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "relay.yaml";
pub const STORE_FILE: &str = "records.db";
pub const JSON_CACHE_FILE: &str = "pending_cache.json";
pub const REDB_CACHE_FILE: &str = "pending_cache.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn default_config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Directory that relative paths inside a config file are resolved against.
pub fn config_base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
