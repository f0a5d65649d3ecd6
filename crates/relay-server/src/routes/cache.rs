use axum::{
    extract::{Path, State},
    Json,
};
use relay_core::RelayError;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/cache: current announcements, ordered by record id
pub async fn list_cache(State(app): State<AppState>) -> Json<serde_json::Value> {
    let entries = app.cache().entries();
    let list: Vec<serde_json::Value> = entries
        .into_iter()
        .map(|(id, e)| {
            serde_json::json!({
                "record_id": id,
                "location_id": e.location_id,
                "message_id": e.message_id,
            })
        })
        .collect();
    Json(serde_json::json!(list))
}

/// DELETE /api/cache/{id}: forget an announcement so the record can be
/// announced again
pub async fn evict_cache_entry(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let removed = app.cache().remove(&id);
    let Some(entry) = removed else {
        return Err(RelayError::AnnouncementNotFound(id).into());
    };
    app.flush_cache().await?;
    tracing::info!(record_id = %id, "announcement evicted by request");
    Ok(Json(serde_json::json!({
        "record_id": id,
        "location_id": entry.location_id,
        "message_id": entry.message_id,
    })))
}
