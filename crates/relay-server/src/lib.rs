pub mod decision;
pub mod error;
pub mod reconcile;
pub mod resolver;
pub mod routes;
pub mod state;
pub mod transport;
pub mod watcher;

use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::health))
        // Decisions
        .route("/api/decisions", post(routes::decisions::submit_decision))
        // Announcement cache
        .route("/api/cache", get(routes::cache::list_cache))
        .route("/api/cache/{id}", delete(routes::cache::evict_cache_entry))
        // Watcher
        .route("/api/tick", post(routes::tick::trigger_tick))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Run the watcher loop and the HTTP surface until shutdown is requested.
pub async fn serve(app_state: AppState, port: u16, interval: Duration) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener, interval).await
}

/// Like `serve`, on a pre-bound listener so the caller can read the actual
/// port first (useful when `port = 0`).
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
    interval: Duration,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    tracing::info!("relay listening on http://localhost:{actual_port}");

    let watcher = tokio::spawn(watcher::run_watcher(app_state.clone(), interval));

    let shutdown = {
        let s = app_state.clone();
        async move { s.shutdown_signal().await }
    };
    let served = axum::serve(listener, build_router(app_state.clone()))
        .with_graceful_shutdown(shutdown)
        .await;

    // The watcher finishes its current record before returning
    app_state.request_shutdown();
    if let Err(e) = watcher.await {
        tracing::error!(error = %e, "watcher task panicked");
    }
    served?;
    Ok(())
}
