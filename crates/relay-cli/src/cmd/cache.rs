use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use relay_core::cache::AnnouncementCache;
use relay_core::config::Config;
use relay_core::RelayError;
use std::path::Path;

#[derive(Subcommand)]
pub enum CacheSubcommand {
    /// List announced records and where their cards live
    List,

    /// Forget an announcement; the record is announced again next tick if
    /// still pending
    Evict {
        /// Record id
        id: String,
    },
}

pub fn run(config_path: &Path, subcmd: CacheSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("failed to load config")?;
    let path = config.cache_path(config_path);
    let mut cache = AnnouncementCache::open(config.cache.backend, &path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    match subcmd {
        CacheSubcommand::List => {
            let entries = cache.entries();
            if json {
                let list: Vec<_> = entries
                    .iter()
                    .map(|(id, e)| {
                        serde_json::json!({
                            "record_id": id,
                            "location_id": e.location_id,
                            "message_id": e.message_id,
                        })
                    })
                    .collect();
                return print_json(&list);
            }
            if entries.is_empty() {
                println!("No announcements.");
                return Ok(());
            }
            let rows = entries
                .into_iter()
                .map(|(id, e)| vec![id, e.location_id, e.message_id])
                .collect();
            print_table(&["RECORD", "LOCATION", "MESSAGE"], rows);
            Ok(())
        }
        CacheSubcommand::Evict { id } => {
            if cache.remove(&id).is_none() {
                return Err(RelayError::AnnouncementNotFound(id).into());
            }
            cache.flush()?;
            if json {
                print_json(&serde_json::json!({ "evicted": id }))
            } else {
                println!("Evicted announcement for {id}.");
                Ok(())
            }
        }
    }
}
