use axum::{extract::State, http::StatusCode, Json};
use relay_core::context::MessageRef;
use relay_core::review::{parse_control_id, Actor, ReviewAction, ReviewDecision};
use relay_core::RelayError;
use serde::Deserialize;

use crate::decision::{handle_decision, DecisionOutcome};
use crate::error::AppError;
use crate::state::AppState;

/// A control activation as the hosting layer reports it.
///
/// Either `control_id` (`review:<action>:<record id>`) or both `record_id`
/// and `action` must be present.
#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub actor_id: String,
    pub actor_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub control_id: Option<String>,
    pub record_id: Option<String>,
    pub action: Option<String>,
    pub location_id: Option<String>,
    pub message_id: Option<String>,
}

impl DecisionBody {
    pub fn into_decision(self) -> Result<ReviewDecision, RelayError> {
        let (action, record_id) = match (self.control_id, self.record_id, self.action) {
            (Some(control), _, _) => parse_control_id(&control)?,
            (None, Some(id), Some(action)) if !id.trim().is_empty() => {
                (action.parse::<ReviewAction>()?, id)
            }
            _ => {
                return Err(RelayError::InvalidControlId(
                    "missing control_id or record_id + action".to_string(),
                ))
            }
        };
        let message = match (self.location_id, self.message_id) {
            (Some(location_id), Some(message_id)) => Some(MessageRef {
                location_id,
                message_id,
            }),
            _ => None,
        };
        Ok(ReviewDecision {
            actor: Actor {
                id: self.actor_id,
                name: self.actor_name,
                roles: self.roles,
            },
            action,
            record_id,
            message,
        })
    }
}

/// POST /api/decisions: apply a reviewer's accept/reject
pub async fn submit_decision(
    State(app): State<AppState>,
    Json(body): Json<DecisionBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    if app.dry_run {
        return Err(AppError::conflict(
            "decisions are disabled during a dry run: the record store is live",
        ));
    }
    let decision = body.into_decision()?;
    let record_id = decision.record_id.clone();
    let outcome = handle_decision(&app, decision).await;

    let status = match outcome {
        DecisionOutcome::Unauthorized => StatusCode::FORBIDDEN,
        DecisionOutcome::StoreFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    let mut json = serde_json::to_value(&outcome)?;
    json["record_id"] = serde_json::json!(record_id);
    json["reply"] = serde_json::json!(outcome.reply(&record_id));
    Ok((status, Json(json)))
}
