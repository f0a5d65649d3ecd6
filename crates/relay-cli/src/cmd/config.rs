use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use relay_core::config::{Config, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate the config for common mistakes
    Validate,

    /// Print the effective config with defaults filled in
    Show,
}

pub fn run(config_path: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Validate => validate(config_path, json),
        ConfigSubcommand::Show => show(config_path, json),
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("failed to load config")?;
    if json {
        return print_json(&config);
    }
    println!("config:    {}", config_path.display());
    println!("store:     {}", config.store_path(config_path).display());
    println!(
        "cache:     {} ({:?})",
        config.cache_path(config_path).display(),
        config.cache.backend
    );
    println!("poll:      every {}s", config.watcher.interval().as_secs());
    println!("page size: {}", config.watcher.page_size);
    println!(
        "context:   parent={} fallback={}",
        config.context.parent_channel_id.as_deref().unwrap_or("-"),
        config.context.fallback_channel_id.as_deref().unwrap_or("-")
    );
    println!("reviewers: {}", config.review.reviewer_roles.join(", "));
    println!(
        "token:     ${} {}",
        config.discord.token_env,
        if config.discord_token().is_some() {
            "(set)"
        } else {
            "(not set)"
        }
    );
    Ok(())
}
