use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use relay_core::config::Config;
use relay_core::record::RecordState;
use relay_core::store::{RecordStore, SqliteRecordStore};
use relay_core::RelayError;
use std::path::Path;

#[derive(Subcommand)]
pub enum RecordSubcommand {
    /// List pending records, newest first
    List {
        /// Maximum rows (default: watcher.page_size)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Set a record's state directly, bypassing the decision controls
    ForceState {
        /// Record id
        id: String,
        /// pending, accepted, rejected, deleted, or a numeric code
        state: String,
    },
}

pub fn run(config_path: &Path, subcmd: RecordSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("failed to load config")?;
    let path = config.store_path(config_path);
    let store = SqliteRecordStore::open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    match subcmd {
        RecordSubcommand::List { limit } => {
            let records = store.list_pending(limit.unwrap_or(config.watcher.page_size))?;
            if json {
                return print_json(&records);
            }
            if records.is_empty() {
                println!("No pending records.");
                return Ok(());
            }
            let rows = records
                .into_iter()
                .map(|r| {
                    vec![
                        r.id,
                        r.subject.to_string(),
                        r.submitted_at.format("%Y-%m-%d %H:%M UTC").to_string(),
                        r.attributes.len().to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "SUBJECT", "SUBMITTED", "FIELDS"], rows);
            Ok(())
        }
        RecordSubcommand::ForceState { id, state } => {
            let state: RecordState = state.parse()?;
            if store.force_state(&id, state)? == 0 {
                return Err(RelayError::RecordNotFound(id).into());
            }
            if json {
                print_json(&serde_json::json!({ "id": id, "state": state }))
            } else {
                println!("{id} → {state}");
                Ok(())
            }
        }
    }
}
