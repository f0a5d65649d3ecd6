use anyhow::Context;
use relay_core::config::Config;
use std::path::Path;

pub fn run(config_path: &Path) -> anyhow::Result<()> {
    if config_path.exists() {
        println!("  exists:  {}", config_path.display());
        return Ok(());
    }
    Config::default()
        .save(config_path)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    println!("  created: {}", config_path.display());
    println!("Next: set context.parent_channel_id or context.fallback_channel_id and");
    println!("review.reviewer_roles, then export the bot token before `relay serve`.");
    Ok(())
}
