use relay_server::AppState;
use std::path::Path;

use super::load_checked;

pub fn run(config_path: &Path, port: Option<u16>, dry_run: bool) -> anyhow::Result<()> {
    let config = load_checked(config_path)?;
    let state = AppState::from_config(&config, config_path, dry_run)?;
    let port = port.unwrap_or(config.server.port);
    let interval = config.watcher.interval();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        let actual_port = listener.local_addr()?.port();
        println!(
            "relay → http://localhost:{actual_port}  (tick every {}s{})",
            interval.as_secs(),
            if dry_run { ", dry run" } else { "" }
        );

        let stopper = state.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; finishing the current record");
                stopper.request_shutdown();
            }
        });

        relay_server::serve_on(state, listener, interval).await
    })
}
