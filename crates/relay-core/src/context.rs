//! Conversational contexts cards are posted into, and the naming rule that
//! ties a subject to its thread.

use crate::record::SubjectRef;
use serde::{Deserialize, Serialize};

pub const SUBJECT_PLACEHOLDER: &str = "{subject}";

/// Where a posted card lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub location_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// The subject's own thread.
    Thread,
    /// The configured broadcast location.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub location_id: String,
    pub name: String,
    pub kind: ContextKind,
    pub locked: bool,
}

impl Context {
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_thread(&self) -> bool {
        self.kind == ContextKind::Thread
    }
}

/// Deterministic subject → thread name rule, e.g. `Training Case for C{subject}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadNaming {
    template: String,
}

impl ThreadNaming {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn thread_name(&self, subject: &SubjectRef) -> String {
        self.template.replace(SUBJECT_PLACEHOLDER, subject.as_str())
    }

    pub fn has_placeholder(&self) -> bool {
        self.template.contains(SUBJECT_PLACEHOLDER)
    }
}
