use axum::{extract::State, Json};

use crate::state::AppState;

/// GET /api/health
pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "announcements": app.cache().len(),
        "shutting_down": app.shutdown_requested(),
    }))
}
