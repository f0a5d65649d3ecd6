mod cmd;
mod locate;
mod output;

use clap::{Parser, Subcommand};
use cmd::{
    cache::CacheSubcommand, config::ConfigSubcommand, record::RecordSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "relay",
    about = "Announce pending records to reviewers and apply their decisions",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest relay.yaml upward from the current directory)
    #[arg(long, global = true, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default relay.yaml if none exists
    Init,

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Run the watcher loop and HTTP surface until Ctrl-C
    Serve {
        /// Port to listen on (default: server.port from the config; 0 = OS-assigned)
        #[arg(long)]
        port: Option<u16>,

        /// Post into an in-memory transport, keep the cache in memory and
        /// refuse decisions
        #[arg(long)]
        dry_run: bool,
    },

    /// Run exactly one watcher tick and print its report
    Tick {
        /// Post into an in-memory transport and keep the cache in memory
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect or edit the announcement cache
    Cache {
        #[command(subcommand)]
        subcommand: CacheSubcommand,
    },

    /// Inspect records or change their state out of band
    Record {
        #[command(subcommand)]
        subcommand: RecordSubcommand,
    },

    /// Apply a reviewer's decision to a record
    Decide {
        /// Record id
        id: String,

        /// accept or reject
        action: String,

        /// Reviewer name recorded on the card
        #[arg(long)]
        actor: String,

        /// Roles the reviewer holds (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let config_path = locate::resolve_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&config_path),
        Commands::Config { subcommand } => cmd::config::run(&config_path, subcommand, cli.json),
        Commands::Serve { port, dry_run } => cmd::serve::run(&config_path, port, dry_run),
        Commands::Tick { dry_run } => cmd::tick::run(&config_path, dry_run, cli.json),
        Commands::Cache { subcommand } => cmd::cache::run(&config_path, subcommand, cli.json),
        Commands::Record { subcommand } => cmd::record::run(&config_path, subcommand, cli.json),
        Commands::Decide {
            id,
            action,
            actor,
            roles,
        } => cmd::decide::run(&config_path, &id, &action, &actor, roles, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
