use axum::{extract::State, Json};

use crate::error::AppError;
use crate::state::AppState;
use crate::watcher;

/// POST /api/tick: run a watcher tick now; 409 while one is running
pub async fn trigger_tick(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let report = watcher::tick(&app).await;
    if report.skipped {
        return Err(AppError::conflict("a tick is already running"));
    }
    Ok(Json(serde_json::to_value(&report)?))
}
