//! Pending records as the relay sees them.
//!
//! A record is produced elsewhere and owned by the data store; the relay only
//! ever holds a point-in-time copy. State changes happen through the
//! conditional write in [`crate::store::RecordStore`] or out-of-band.

use crate::error::{RelayError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RecordState
// ---------------------------------------------------------------------------

/// Lifecycle state of a record.
///
/// The integer codes match the ones the upstream data store writes. Unknown
/// codes are preserved as `Other` and, like every non-pending value, count as
/// resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RecordState {
    Pending,
    Accepted,
    Rejected,
    Deleted,
    Other(i64),
}

impl RecordState {
    pub fn code(self) -> i64 {
        match self {
            RecordState::Pending => 1,
            RecordState::Accepted => 2,
            RecordState::Deleted => 4,
            RecordState::Rejected => 6,
            RecordState::Other(code) => code,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => RecordState::Pending,
            2 => RecordState::Accepted,
            4 => RecordState::Deleted,
            6 => RecordState::Rejected,
            other => RecordState::Other(other),
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, RecordState::Pending)
    }

    /// Human label used on cards.
    pub fn label(self) -> String {
        match self {
            RecordState::Pending => "Pending".to_string(),
            RecordState::Accepted => "Approved".to_string(),
            RecordState::Rejected => "Rejected".to_string(),
            RecordState::Deleted => "Deleted".to_string(),
            RecordState::Other(code) => format!("State {code}"),
        }
    }
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordState::Pending => f.write_str("pending"),
            RecordState::Accepted => f.write_str("accepted"),
            RecordState::Rejected => f.write_str("rejected"),
            RecordState::Deleted => f.write_str("deleted"),
            RecordState::Other(code) => write!(f, "{code}"),
        }
    }
}

impl std::str::FromStr for RecordState {
    type Err = RelayError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "pending" => Ok(RecordState::Pending),
            "accepted" => Ok(RecordState::Accepted),
            "rejected" => Ok(RecordState::Rejected),
            "deleted" => Ok(RecordState::Deleted),
            other => other
                .parse::<i64>()
                .map(RecordState::from_code)
                .map_err(|_| RelayError::InvalidState(s.to_string())),
        }
    }
}

impl From<RecordState> for String {
    fn from(state: RecordState) -> Self {
        state.to_string()
    }
}

impl TryFrom<String> for RecordState {
    type Error = RelayError;
    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

// ---------------------------------------------------------------------------
// SubjectRef
// ---------------------------------------------------------------------------

/// Whose work a record is. Used to find the conversational context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectRef(pub String);

impl SubjectRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Text(String),
    /// Elapsed time in whole minutes, shown as `HH:MM`.
    Minutes(i64),
    /// Nautical miles; `None` when the producer did not record one.
    DistanceNm(Option<f64>),
    Link(String),
}

/// One named display value on a record's card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
    #[serde(default)]
    pub inline: bool,
}

impl Attribute {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: AttributeValue::Text(value.into()),
            inline: false,
        }
    }

    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }
}

// ---------------------------------------------------------------------------
// PendingRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRecord {
    pub id: String,
    pub subject: SubjectRef,
    pub state: RecordState,
    pub submitted_at: DateTime<Utc>,
    /// External profile id of the subject, if one is on file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_ref: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    /// Reviewer whose decision resolved the record, if it went through a card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
}

impl PendingRecord {
    pub fn new(id: impl Into<String>, subject: SubjectRef, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            subject,
            state: RecordState::Pending,
            submitted_at,
            profile_ref: None,
            attributes: Vec::new(),
            reviewed_by: None,
        }
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_profile(mut self, profile_ref: impl Into<String>) -> Self {
        self.profile_ref = Some(profile_ref.into());
        self
    }
}
