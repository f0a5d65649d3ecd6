pub mod cache;
pub mod config;
pub mod decide;
pub mod init;
pub mod record;
pub mod serve;
pub mod tick;

use anyhow::Context;
use relay_core::config::{Config, WarnLevel};
use std::path::Path;

/// Load the config and refuse to continue on validation errors.
pub fn load_checked(config_path: &Path) -> anyhow::Result<Config> {
    let config = Config::load(config_path).context("failed to load config")?;
    let warnings = config.validate();
    for w in &warnings {
        match w.level {
            WarnLevel::Warning => tracing::warn!("{}", w.message),
            WarnLevel::Error => tracing::error!("{}", w.message),
        }
    }
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config has errors; run `relay config validate` for details");
    }
    Ok(config)
}
