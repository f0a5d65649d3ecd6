//! In-process transport used by dry runs and tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use relay_core::card::Card;
use relay_core::context::MessageRef;

use super::{ChannelInfo, ChannelKind, OutgoingMessage, ThreadScope, Transport, TransportError};

/// A message as the memory transport holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub location_id: String,
    pub content: Option<String>,
    pub card: Card,
    pub edits: usize,
}

#[derive(Default)]
struct Inner {
    channels: BTreeMap<String, ChannelInfo>,
    messages: BTreeMap<String, StoredMessage>,
    next_message: u64,
    failing_posts: HashSet<String>,
    failing_listings: HashSet<String>,
    fail_edits: bool,
    post_log: Vec<MessageRef>,
}

/// Channels and messages kept in memory.
///
/// With `permissive` set, any channel id that is asked for exists as a
/// plain text channel. Dry runs use that so every card lands somewhere.
#[derive(Default)]
pub struct MemoryTransport {
    inner: Mutex<Inner>,
    permissive: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permissive() -> Self {
        Self {
            inner: Mutex::default(),
            permissive: true,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_channel(&self, channel: ChannelInfo) {
        self.lock().channels.insert(channel.id.clone(), channel);
    }

    pub fn channel(&self, id: &str) -> Option<ChannelInfo> {
        self.lock().channels.get(id).cloned()
    }

    /// Make every post into `location_id` fail.
    pub fn fail_posts_in(&self, location_id: &str) {
        self.lock().failing_posts.insert(location_id.to_string());
    }

    /// Make every thread listing under `parent_id` fail.
    pub fn fail_listings_under(&self, parent_id: &str) {
        self.lock().failing_listings.insert(parent_id.to_string());
    }

    pub fn set_fail_edits(&self, fail: bool) {
        self.lock().fail_edits = fail;
    }

    pub fn message(&self, message: &MessageRef) -> Option<StoredMessage> {
        self.lock()
            .messages
            .get(&message.message_id)
            .filter(|m| m.location_id == message.location_id)
            .cloned()
    }

    /// Every successful post, in order.
    pub fn posts(&self) -> Vec<MessageRef> {
        self.lock().post_log.clone()
    }

    pub fn post_count(&self) -> usize {
        self.lock().post_log.len()
    }

    pub fn messages_in(&self, location_id: &str) -> Vec<StoredMessage> {
        self.lock()
            .messages
            .values()
            .filter(|m| m.location_id == location_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn fetch_channel(&self, id: &str) -> Result<Option<ChannelInfo>, TransportError> {
        let mut inner = self.lock();
        if let Some(c) = inner.channels.get(id) {
            return Ok(Some(c.clone()));
        }
        if self.permissive && !id.is_empty() {
            let channel = ChannelInfo::text(id, format!("dry-run-{id}"));
            inner.channels.insert(id.to_string(), channel.clone());
            return Ok(Some(channel));
        }
        Ok(None)
    }

    async fn list_threads(
        &self,
        parent_id: &str,
        scope: ThreadScope,
    ) -> Result<Vec<ChannelInfo>, TransportError> {
        let inner = self.lock();
        if inner.failing_listings.contains(parent_id) {
            return Err(TransportError::Status {
                status: 500,
                body: format!("listing {scope} threads under {parent_id} failed"),
            });
        }
        Ok(inner
            .channels
            .values()
            .filter(|c| c.parent_id.as_deref() == Some(parent_id))
            .filter(|c| match scope {
                ThreadScope::Active => c.is_thread() && !c.archived,
                ThreadScope::ArchivedPublic => c.kind == ChannelKind::PublicThread && c.archived,
                ThreadScope::ArchivedPrivate => c.kind == ChannelKind::PrivateThread && c.archived,
            })
            .cloned()
            .collect())
    }

    async fn unarchive_thread(&self, thread_id: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();
        let thread = inner
            .channels
            .get_mut(thread_id)
            .ok_or_else(|| TransportError::NotFound(format!("thread {thread_id}")))?;
        if thread.locked {
            return Err(TransportError::Forbidden(format!("thread {thread_id} is locked")));
        }
        thread.archived = false;
        Ok(())
    }

    async fn post_message(
        &self,
        location_id: &str,
        message: &OutgoingMessage,
    ) -> Result<MessageRef, TransportError> {
        let mut inner = self.lock();
        if inner.failing_posts.contains(location_id) {
            return Err(TransportError::Status {
                status: 500,
                body: format!("post into {location_id} failed"),
            });
        }
        let known = inner.channels.get(location_id).cloned();
        match known {
            Some(c) if c.locked => {
                return Err(TransportError::Forbidden(format!("{location_id} is locked")))
            }
            Some(_) => {}
            None if self.permissive => {
                inner.channels.insert(
                    location_id.to_string(),
                    ChannelInfo::text(location_id, format!("dry-run-{location_id}")),
                );
            }
            None => return Err(TransportError::NotFound(format!("channel {location_id}"))),
        }

        inner.next_message += 1;
        let message_id = format!("msg-{}", inner.next_message);
        inner.messages.insert(
            message_id.clone(),
            StoredMessage {
                location_id: location_id.to_string(),
                content: message.content.clone(),
                card: message.card.clone(),
                edits: 0,
            },
        );
        let posted = MessageRef {
            location_id: location_id.to_string(),
            message_id,
        };
        inner.post_log.push(posted.clone());
        Ok(posted)
    }

    async fn edit_message(&self, message: &MessageRef, card: &Card) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if inner.fail_edits {
            return Err(TransportError::Status {
                status: 500,
                body: "edit failed".to_string(),
            });
        }
        let stored = inner
            .messages
            .get_mut(&message.message_id)
            .filter(|m| m.location_id == message.location_id)
            .ok_or_else(|| TransportError::NotFound(format!("message {}", message.message_id)))?;
        stored.card = card.clone();
        stored.edits += 1;
        Ok(())
    }
}
