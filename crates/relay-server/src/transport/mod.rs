//! Transport boundary: how cards reach reviewers.
//!
//! The relay needs four things from a chat platform: fetch a channel or
//! thread by id, list threads under a parent, post a message, and edit a
//! message. [`Transport`] is that surface; [`discord::DiscordTransport`]
//! speaks the Discord REST API and [`memory::MemoryTransport`] keeps
//! everything in process for tests and dry runs.

pub mod discord;
pub mod memory;

use async_trait::async_trait;
use relay_core::card::Card;
use relay_core::context::MessageRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use discord::DiscordTransport;
pub use memory::MemoryTransport;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("bot token missing: set the {0} environment variable")]
    MissingToken(String),
}

// ---------------------------------------------------------------------------
// Channel model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    PublicThread,
    PrivateThread,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub kind: ChannelKind,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub locked: bool,
}

impl ChannelInfo {
    pub fn text(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            kind: ChannelKind::Text,
            archived: false,
            locked: false,
        }
    }

    pub fn thread(
        id: impl Into<String>,
        name: impl Into<String>,
        parent_id: impl Into<String>,
        kind: ChannelKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: Some(parent_id.into()),
            kind,
            archived: false,
            locked: false,
        }
    }

    pub fn archived(mut self) -> Self {
        self.archived = true;
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn is_thread(&self) -> bool {
        matches!(self.kind, ChannelKind::PublicThread | ChannelKind::PrivateThread)
    }

    pub fn is_text_capable(&self) -> bool {
        !matches!(self.kind, ChannelKind::Other)
    }
}

/// Which thread listing to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadScope {
    Active,
    ArchivedPublic,
    ArchivedPrivate,
}

impl std::fmt::Display for ThreadScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadScope::Active => f.write_str("active"),
            ThreadScope::ArchivedPublic => f.write_str("archived-public"),
            ThreadScope::ArchivedPrivate => f.write_str("archived-private"),
        }
    }
}

/// A card plus optional plain text sent alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub card: Card,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch a channel or thread by id. `Ok(None)` if it does not exist.
    async fn fetch_channel(&self, id: &str) -> Result<Option<ChannelInfo>, TransportError>;

    /// Threads under `parent_id` in the given listing.
    async fn list_threads(
        &self,
        parent_id: &str,
        scope: ThreadScope,
    ) -> Result<Vec<ChannelInfo>, TransportError>;

    async fn unarchive_thread(&self, thread_id: &str) -> Result<(), TransportError>;

    async fn post_message(
        &self,
        location_id: &str,
        message: &OutgoingMessage,
    ) -> Result<MessageRef, TransportError>;

    /// Replace the card on an existing message. Controls not present on
    /// `card` are removed.
    async fn edit_message(&self, message: &MessageRef, card: &Card) -> Result<(), TransportError>;
}
