//! Decision cards.
//!
//! Rendering is pure: a record plus the card settings always produce the same
//! [`Card`]. A pending card carries exactly two decision controls (accept and
//! reject) and one read-only link. Resolved cards carry none.

use crate::config::CardConfig;
use crate::error::{RelayError, Result};
use crate::record::{AttributeValue, PendingRecord, RecordState};
use crate::review::{control_id, ReviewAction};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_FIELDS: usize = 25;
pub const MAX_FIELD_VALUE: usize = 1024;

pub const COLOR_PENDING: u32 = 0xf39c12;
pub const COLOR_ACCEPTED: u32 = 0x2ecc71;
pub const COLOR_REJECTED: u32 = 0xe74c3c;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Control {
    Decision {
        action: ReviewAction,
        label: String,
        control_id: String,
    },
    Link {
        label: String,
        url: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub title: String,
    pub color: u32,
    pub fields: Vec<CardField>,
    pub footer: String,
    pub controls: Vec<Control>,
}

impl Card {
    pub fn is_read_only(&self) -> bool {
        self.controls.is_empty()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("record has an empty id")]
    MissingId,

    #[error("card would have {0} fields (limit {MAX_FIELDS})")]
    TooManyFields(usize),

    #[error("field '{name}' is {len} characters (limit {MAX_FIELD_VALUE})")]
    FieldTooLong { name: String, len: usize },

    #[error("attribute '{0}' has an empty name")]
    EmptyFieldName(usize),

    #[error("link '{0}' is not an http(s) URL")]
    InvalidLink(String),
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// `95` → `01:35`. Negative values clamp to zero.
pub fn format_minutes_hhmm(total_minutes: i64) -> String {
    let m = total_minutes.max(0);
    format!("{:02}:{:02}", m / 60, m % 60)
}

pub fn format_distance_nm(distance: Option<f64>) -> String {
    match distance {
        Some(d) if d.is_finite() => format!("{d:.0} NM"),
        _ => "—".to_string(),
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

fn join_url(base: &str, tail: &str) -> String {
    format!("{}/{tail}", base.trim_end_matches('/'))
}

/// Terminal title for a resolved card.
pub fn resolved_title(state: RecordState) -> String {
    match state {
        RecordState::Accepted => "✅ Approved".to_string(),
        RecordState::Rejected => "⛔ Rejected".to_string(),
        RecordState::Deleted => "🗑️ Deleted".to_string(),
        other => format!("✅ Resolved — {}", other.label()),
    }
}

pub fn resolved_color(state: RecordState) -> u32 {
    if state == RecordState::Accepted {
        COLOR_ACCEPTED
    } else {
        COLOR_REJECTED
    }
}

fn footer(record_id: &str, reviewer: Option<&str>) -> String {
    match reviewer {
        Some(name) => format!("Record: {record_id} • Reviewed by {name}"),
        None => format!("Record: {record_id}"),
    }
}

// ---------------------------------------------------------------------------
// CardRenderer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CardRenderer {
    title: String,
    record_base_url: String,
    profile_base_url: Option<String>,
    profile_id_pattern: Regex,
}

impl CardRenderer {
    pub fn new(config: &CardConfig) -> Result<Self> {
        let profile_id_pattern = Regex::new(&config.profile_id_pattern).map_err(|e| {
            RelayError::InvalidConfig(format!("card.profile_id_pattern: {e}"))
        })?;
        Ok(Self {
            title: config.title.clone(),
            record_base_url: config.record_base_url.clone(),
            profile_base_url: config.profile_base_url.clone(),
            profile_id_pattern,
        })
    }

    pub fn record_url(&self, record_id: &str) -> String {
        join_url(&self.record_base_url, record_id)
    }

    /// Profile link, only for a reference that looks like a real profile id.
    pub fn profile_url(&self, profile_ref: Option<&str>) -> Option<String> {
        let base = self.profile_base_url.as_deref()?;
        let id = profile_ref.map(str::trim).filter(|id| !id.is_empty())?;
        self.profile_id_pattern
            .is_match(id)
            .then(|| join_url(base, id))
    }

    /// Pending card with its decision controls.
    pub fn render(&self, record: &PendingRecord) -> std::result::Result<Card, RenderError> {
        let fields = self.fields(record)?;
        let view_url = self.record_url(&record.id);
        if !is_http_url(&view_url) {
            return Err(RenderError::InvalidLink(view_url));
        }
        Ok(Card {
            title: self.title.clone(),
            color: COLOR_PENDING,
            fields,
            footer: footer(&record.id, None),
            controls: vec![
                Control::Decision {
                    action: ReviewAction::Accept,
                    label: "Approve".to_string(),
                    control_id: control_id(ReviewAction::Accept, &record.id),
                },
                Control::Decision {
                    action: ReviewAction::Reject,
                    label: "Deny".to_string(),
                    control_id: control_id(ReviewAction::Reject, &record.id),
                },
                Control::Link {
                    label: "View".to_string(),
                    url: view_url,
                },
            ],
        })
    }

    /// Read-only terminal variant of a record's card.
    ///
    /// `state` is the resolved state to show, which may differ from the
    /// state in `record` when the caller knows better (e.g. right after its
    /// own write).
    pub fn render_resolved(
        &self,
        record: &PendingRecord,
        state: RecordState,
        reviewer: Option<&str>,
    ) -> std::result::Result<Card, RenderError> {
        Ok(Card {
            title: resolved_title(state),
            color: resolved_color(state),
            fields: self.fields(record)?,
            footer: footer(&record.id, reviewer),
            controls: Vec::new(),
        })
    }

    /// Terminal card for a record that can no longer be read from the store.
    pub fn resolved_stub(&self, record_id: &str, state: RecordState, reviewer: Option<&str>) -> Card {
        Card {
            title: resolved_title(state),
            color: resolved_color(state),
            fields: Vec::new(),
            footer: footer(record_id, reviewer),
            controls: Vec::new(),
        }
    }

    fn fields(&self, record: &PendingRecord) -> std::result::Result<Vec<CardField>, RenderError> {
        if record.id.trim().is_empty() {
            return Err(RenderError::MissingId);
        }

        // attributes + Submitted + Links
        let total = record.attributes.len() + 2;
        if total > MAX_FIELDS {
            return Err(RenderError::TooManyFields(total));
        }

        let mut fields = Vec::with_capacity(total);
        for (idx, attr) in record.attributes.iter().enumerate() {
            if attr.name.trim().is_empty() {
                return Err(RenderError::EmptyFieldName(idx));
            }
            let value = match &attr.value {
                AttributeValue::Text(t) if t.trim().is_empty() => "Unknown".to_string(),
                AttributeValue::Text(t) => format!("**{t}**"),
                AttributeValue::Minutes(m) => format!("**{}**", format_minutes_hhmm(*m)),
                AttributeValue::DistanceNm(d) => format!("**{}**", format_distance_nm(*d)),
                AttributeValue::Link(url) => {
                    if !is_http_url(url) {
                        return Err(RenderError::InvalidLink(url.clone()));
                    }
                    url.clone()
                }
            };
            fields.push(CardField {
                name: attr.name.clone(),
                value,
                inline: attr.inline,
            });
        }

        let ts = record.submitted_at.timestamp();
        fields.push(CardField {
            name: "Submitted".to_string(),
            value: format!("<t:{ts}:F>  (<t:{ts}:R>)"),
            inline: false,
        });

        let mut links = format!("• View: {}", self.record_url(&record.id));
        if self.profile_base_url.is_some() {
            let profile = self
                .profile_url(record.profile_ref.as_deref())
                .unwrap_or_else(|| "Not on file".to_string());
            links.push_str(&format!("\n• Profile: {profile}"));
        }
        fields.push(CardField {
            name: "Links".to_string(),
            value: links,
            inline: false,
        });

        if let Some(long) = fields.iter().find(|f| f.value.chars().count() > MAX_FIELD_VALUE) {
            return Err(RenderError::FieldTooLong {
                name: long.name.clone(),
                len: long.value.chars().count(),
            });
        }
        Ok(fields)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
