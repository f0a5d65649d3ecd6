//! Discord REST transport.
//!
//! Cards become a single embed; decision controls become buttons in one
//! action row. Only the handful of endpoints the relay needs are spoken.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::card::{Card, Control};
use relay_core::context::MessageRef;
use relay_core::review::ReviewAction;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ChannelInfo, ChannelKind, OutgoingMessage, ThreadScope, Transport, TransportError};

/// Archived listings return at most this many threads per call.
pub const ARCHIVED_PAGE_LIMIT: u32 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// Discord channel type codes
const GUILD_TEXT: u8 = 0;
const GUILD_ANNOUNCEMENT: u8 = 5;
const ANNOUNCEMENT_THREAD: u8 = 10;
const PUBLIC_THREAD: u8 = 11;
const PRIVATE_THREAD: u8 = 12;

// Component codes
const ACTION_ROW: u8 = 1;
const BUTTON: u8 = 2;
const STYLE_SUCCESS: u8 = 3;
const STYLE_DANGER: u8 = 4;
const STYLE_LINK: u8 = 5;

pub struct DiscordTransport {
    client: Client,
    api_base: String,
    token: String,
    guild_id: String,
}

impl DiscordTransport {
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        guild_id: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("relay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            guild_id: guild_id.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.api_base))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response, TransportError> {
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => TransportError::NotFound(what.to_string()),
            StatusCode::FORBIDDEN => TransportError::Forbidden(what.to_string()),
            _ => TransportError::Status {
                status: status.as_u16(),
                body,
            },
        })
    }

    async fn json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, TransportError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireChannel {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    thread_metadata: Option<WireThreadMetadata>,
}

#[derive(Debug, Deserialize)]
struct WireThreadMetadata {
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    locked: bool,
}

#[derive(Debug, Deserialize)]
struct WireThreadList {
    #[serde(default)]
    threads: Vec<WireChannel>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    channel_id: String,
}

impl From<WireChannel> for ChannelInfo {
    fn from(c: WireChannel) -> Self {
        let kind = match c.kind {
            GUILD_TEXT | GUILD_ANNOUNCEMENT => ChannelKind::Text,
            PUBLIC_THREAD | ANNOUNCEMENT_THREAD => ChannelKind::PublicThread,
            PRIVATE_THREAD => ChannelKind::PrivateThread,
            _ => ChannelKind::Other,
        };
        let (archived, locked) = c
            .thread_metadata
            .map(|m| (m.archived, m.locked))
            .unwrap_or((false, false));
        ChannelInfo {
            id: c.id,
            name: c.name.unwrap_or_default(),
            parent_id: c.parent_id,
            kind,
            archived,
            locked,
        }
    }
}

/// Embed JSON for a card.
pub fn embed_json(card: &Card) -> Value {
    let fields: Vec<Value> = card
        .fields
        .iter()
        .map(|f| json!({ "name": f.name, "value": f.value, "inline": f.inline }))
        .collect();
    json!({
        "title": card.title,
        "color": card.color,
        "fields": fields,
        "footer": { "text": card.footer },
    })
}

/// Component rows for a card. Read-only cards produce an empty list, which
/// strips any buttons from an edited message.
pub fn components_json(card: &Card) -> Value {
    if card.controls.is_empty() {
        return json!([]);
    }
    let buttons: Vec<Value> = card
        .controls
        .iter()
        .map(|control| match control {
            Control::Decision {
                action,
                label,
                control_id,
            } => json!({
                "type": BUTTON,
                "style": match action {
                    ReviewAction::Accept => STYLE_SUCCESS,
                    ReviewAction::Reject => STYLE_DANGER,
                },
                "label": label,
                "custom_id": control_id,
            }),
            Control::Link { label, url } => json!({
                "type": BUTTON,
                "style": STYLE_LINK,
                "label": label,
                "url": url,
            }),
        })
        .collect();
    json!([{ "type": ACTION_ROW, "components": buttons }])
}

// ---------------------------------------------------------------------------
// Transport impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Transport for DiscordTransport {
    async fn fetch_channel(&self, id: &str) -> Result<Option<ChannelInfo>, TransportError> {
        let req = self.request(Method::GET, &format!("/channels/{id}"));
        match self.send(req, &format!("channel {id}")).await {
            Ok(resp) => Ok(Some(Self::json::<WireChannel>(resp).await?.into())),
            Err(TransportError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_threads(
        &self,
        parent_id: &str,
        scope: ThreadScope,
    ) -> Result<Vec<ChannelInfo>, TransportError> {
        let req = match scope {
            // Active threads are listed guild-wide
            ThreadScope::Active => self.request(
                Method::GET,
                &format!("/guilds/{}/threads/active", self.guild_id),
            ),
            ThreadScope::ArchivedPublic => self
                .request(
                    Method::GET,
                    &format!("/channels/{parent_id}/threads/archived/public"),
                )
                .query(&[("limit", ARCHIVED_PAGE_LIMIT)]),
            ThreadScope::ArchivedPrivate => self
                .request(
                    Method::GET,
                    &format!("/channels/{parent_id}/threads/archived/private"),
                )
                .query(&[("limit", ARCHIVED_PAGE_LIMIT)]),
        };
        let resp = self.send(req, &format!("{scope} threads of {parent_id}")).await?;
        let list: WireThreadList = Self::json(resp).await?;
        Ok(list
            .threads
            .into_iter()
            .filter(|t| t.parent_id.as_deref() == Some(parent_id))
            .map(ChannelInfo::from)
            .collect())
    }

    async fn unarchive_thread(&self, thread_id: &str) -> Result<(), TransportError> {
        let req = self
            .request(Method::PATCH, &format!("/channels/{thread_id}"))
            .json(&json!({ "archived": false }));
        self.send(req, &format!("thread {thread_id}")).await?;
        Ok(())
    }

    async fn post_message(
        &self,
        location_id: &str,
        message: &OutgoingMessage,
    ) -> Result<MessageRef, TransportError> {
        let mut body = json!({
            "embeds": [embed_json(&message.card)],
            "components": components_json(&message.card),
        });
        if let Some(content) = &message.content {
            body["content"] = json!(content);
        }
        let req = self
            .request(Method::POST, &format!("/channels/{location_id}/messages"))
            .json(&body);
        let resp = self.send(req, &format!("channel {location_id}")).await?;
        let posted: WireMessage = Self::json(resp).await?;
        Ok(MessageRef {
            location_id: posted.channel_id,
            message_id: posted.id,
        })
    }

    async fn edit_message(&self, message: &MessageRef, card: &Card) -> Result<(), TransportError> {
        let body = json!({
            "embeds": [embed_json(card)],
            "components": components_json(card),
        });
        let req = self
            .request(
                Method::PATCH,
                &format!(
                    "/channels/{}/messages/{}",
                    message.location_id, message.message_id
                ),
            )
            .json(&body);
        self.send(
            req,
            &format!("message {} in {}", message.message_id, message.location_id),
        )
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
