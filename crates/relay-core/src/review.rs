//! Typed review decisions and the control ids that carry them.
//!
//! Controls on a card are identified by `review:<action>:<record id>`. That
//! string form exists only at the trigger boundary; everything past
//! [`parse_control_id`] works with [`ReviewDecision`].

use crate::context::MessageRef;
use crate::error::{RelayError, Result};
use crate::record::RecordState;
use serde::{Deserialize, Serialize};

pub const CONTROL_PREFIX: &str = "review";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Accept,
    Reject,
}

impl ReviewAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewAction::Accept => "accept",
            ReviewAction::Reject => "reject",
        }
    }

    /// The terminal state the conditional write moves a pending record to.
    pub fn target_state(self) -> RecordState {
        match self {
            ReviewAction::Accept => RecordState::Accepted,
            ReviewAction::Reject => RecordState::Rejected,
        }
    }
}

impl std::fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReviewAction {
    type Err = RelayError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "accept" | "approve" => Ok(ReviewAction::Accept),
            "reject" | "deny" => Ok(ReviewAction::Reject),
            _ => Err(RelayError::InvalidAction(s.to_string())),
        }
    }
}

/// The person who activated a control, as resolved by the hosting layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    /// Display name recorded on the card for audit.
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Actor {
    pub fn has_any_role(&self, allowed: &[String]) -> bool {
        self.roles.iter().any(|r| allowed.iter().any(|a| a == r))
    }
}

/// One reviewer's accept/reject on one record. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub actor: Actor,
    pub action: ReviewAction,
    pub record_id: String,
    /// The card the control was attached to, when the trigger knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageRef>,
}

// ---------------------------------------------------------------------------
// Control ids
// ---------------------------------------------------------------------------

pub fn control_id(action: ReviewAction, record_id: &str) -> String {
    format!("{CONTROL_PREFIX}:{}:{record_id}", action.as_str())
}

/// Parse `review:<accept|reject>:<record id>`.
///
/// The record id is everything after the second separator, so ids that
/// themselves contain `:` survive.
pub fn parse_control_id(raw: &str) -> Result<(ReviewAction, String)> {
    let invalid = || RelayError::InvalidControlId(raw.to_string());
    let mut parts = raw.splitn(3, ':');
    if parts.next() != Some(CONTROL_PREFIX) {
        return Err(invalid());
    }
    let action: ReviewAction = parts
        .next()
        .ok_or_else(invalid)?
        .parse()
        .map_err(|_| invalid())?;
    let record_id = parts.next().filter(|id| !id.is_empty()).ok_or_else(invalid)?;
    Ok((action, record_id.to_string()))
}
