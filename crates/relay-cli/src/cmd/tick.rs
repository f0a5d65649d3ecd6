use relay_server::{watcher, AppState};
use std::path::Path;

use super::load_checked;
use crate::output::print_json;

pub fn run(config_path: &Path, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let config = load_checked(config_path)?;
    let state = AppState::from_config(&config, config_path, dry_run)?;

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(watcher::tick(&state));

    if json {
        return print_json(&report);
    }

    let r = &report.reconcile;
    println!(
        "reconciled: {} checked, {} closed, {} still pending",
        r.checked,
        r.evicted(),
        r.still_pending
    );
    println!(
        "pending:    {} seen, {} already announced, {} announced ({} via fallback)",
        report.pending_seen, report.already_announced, report.announced, report.rerouted
    );
    if report.unresolved + report.render_failed + report.post_failed > 0 {
        println!(
            "retrying:   {} unresolved, {} unrenderable, {} failed posts",
            report.unresolved, report.render_failed, report.post_failed
        );
    }
    if let Some(e) = &report.store_error {
        anyhow::bail!("store unavailable: {e}");
    }
    if let Some(e) = &report.flush_error {
        anyhow::bail!("cache not persisted: {e}");
    }
    Ok(())
}
