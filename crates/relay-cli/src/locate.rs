use relay_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the config file.
///
/// Priority:
/// 1. `--config` flag / `RELAY_CONFIG` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `relay.yaml`
/// 3. `relay.yaml` in `cwd`
pub fn resolve_config(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd).unwrap_or_else(|| paths::default_config_path(&cwd))
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(paths::default_config_path)
        .find(|candidate| candidate.is_file())
}
