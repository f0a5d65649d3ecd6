//! Context Resolver: subject → the conversation its card belongs in.
//!
//! Stages, each tried only when the previous one found nothing:
//! 1. an active thread under the parent channel named by the naming rule;
//! 2. an archived public thread with that name;
//! 3. an archived private thread with that name, reactivated before use;
//! 4. the configured fallback channel.
//!
//! A locked thread found at any stage ends thread resolution and sends the
//! card to the fallback; locked contexts are never posted into.

use std::sync::Arc;

use relay_core::context::{Context, ContextKind, ThreadNaming};
use relay_core::record::SubjectRef;
use tracing::{debug, warn};

use crate::transport::{ChannelInfo, ThreadScope, Transport};

const THREAD_STAGES: [ThreadScope; 3] = [
    ThreadScope::Active,
    ThreadScope::ArchivedPublic,
    ThreadScope::ArchivedPrivate,
];

enum ThreadLookup {
    Found(ChannelInfo),
    Locked(ChannelInfo),
    Missing,
}

pub struct ContextResolver {
    transport: Arc<dyn Transport>,
    parent_channel_id: Option<String>,
    naming: ThreadNaming,
    fallback_channel_id: Option<String>,
}

impl ContextResolver {
    pub fn new(
        transport: Arc<dyn Transport>,
        parent_channel_id: Option<String>,
        naming: ThreadNaming,
        fallback_channel_id: Option<String>,
    ) -> Self {
        Self {
            transport,
            parent_channel_id: parent_channel_id.filter(|id| !id.trim().is_empty()),
            naming,
            fallback_channel_id: fallback_channel_id.filter(|id| !id.trim().is_empty()),
        }
    }

    /// Where a card for `subject` should be posted, or `None` if nothing
    /// resolves (the caller retries next tick).
    pub async fn resolve(&self, subject: &SubjectRef) -> Option<Context> {
        match self.find_thread(subject).await {
            ThreadLookup::Found(thread) => {
                if thread.archived {
                    if let Err(e) = self.transport.unarchive_thread(&thread.id).await {
                        warn!(thread_id = %thread.id, error = %e, "could not unarchive thread; posting anyway");
                    }
                }
                return Some(Context {
                    location_id: thread.id,
                    name: thread.name,
                    kind: ContextKind::Thread,
                    locked: false,
                });
            }
            ThreadLookup::Locked(thread) => {
                debug!(thread_id = %thread.id, subject = %subject, "thread is locked; using fallback");
            }
            ThreadLookup::Missing => {}
        }
        self.fallback().await
    }

    /// The fallback location, if configured and still a usable channel.
    pub async fn fallback(&self) -> Option<Context> {
        let id = self.fallback_channel_id.as_deref()?;
        match self.transport.fetch_channel(id).await {
            Ok(Some(channel)) if channel.is_text_capable() && !channel.locked => Some(Context {
                location_id: channel.id,
                name: channel.name,
                kind: ContextKind::Fallback,
                locked: false,
            }),
            Ok(Some(channel)) => {
                warn!(channel_id = %channel.id, kind = ?channel.kind, "fallback channel cannot take cards");
                None
            }
            Ok(None) => {
                warn!(channel_id = %id, "fallback channel not found");
                None
            }
            Err(e) => {
                warn!(channel_id = %id, error = %e, "could not fetch fallback channel");
                None
            }
        }
    }

    async fn find_thread(&self, subject: &SubjectRef) -> ThreadLookup {
        let Some(parent) = self.parent_channel_id.as_deref() else {
            return ThreadLookup::Missing;
        };
        let name = self.naming.thread_name(subject);
        for scope in THREAD_STAGES {
            let threads = match self.transport.list_threads(parent, scope).await {
                Ok(threads) => threads,
                Err(e) => {
                    debug!(parent_id = %parent, %scope, error = %e, "thread listing failed; trying next stage");
                    continue;
                }
            };
            if let Some(thread) = threads.into_iter().find(|t| t.name == name) {
                if thread.locked {
                    return ThreadLookup::Locked(thread);
                }
                return ThreadLookup::Found(thread);
            }
        }
        ThreadLookup::Missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelKind, MemoryTransport};

    const PARENT: &str = "parent";
    const FALLBACK: &str = "fallback";

    fn setup() -> (Arc<MemoryTransport>, ContextResolver) {
        let transport = Arc::new(MemoryTransport::new());
        transport.add_channel(ChannelInfo::text(FALLBACK, "pending-reviews"));
        let resolver = ContextResolver::new(
            transport.clone(),
            Some(PARENT.into()),
            ThreadNaming::new("Training Case for C{subject}"),
            Some(FALLBACK.into()),
        );
        (transport, resolver)
    }

    fn subject() -> SubjectRef {
        SubjectRef::new("1234")
    }

    fn thread(id: &str, kind: ChannelKind) -> ChannelInfo {
        ChannelInfo::thread(id, "Training Case for C1234", PARENT, kind)
    }

    #[tokio::test]
    async fn active_thread_wins() {
        let (t, r) = setup();
        t.add_channel(thread("active", ChannelKind::PublicThread));
        t.add_channel(thread("old", ChannelKind::PublicThread).archived());
        let ctx = r.resolve(&subject()).await.unwrap();
        assert_eq!(ctx.location_id, "active");
        assert!(ctx.is_thread());
    }

    #[tokio::test]
    async fn archived_private_thread_is_reactivated() {
        let (t, r) = setup();
        t.add_channel(thread("priv", ChannelKind::PrivateThread).archived());
        let ctx = r.resolve(&subject()).await.unwrap();
        assert_eq!(ctx.location_id, "priv");
        assert!(!t.channel("priv").unwrap().archived);
    }

    #[tokio::test]
    async fn locked_thread_falls_back() {
        let (t, r) = setup();
        t.add_channel(thread("priv", ChannelKind::PrivateThread).archived().locked());
        let ctx = r.resolve(&subject()).await.unwrap();
        assert_eq!(ctx.location_id, FALLBACK);
        assert_eq!(ctx.kind, ContextKind::Fallback);
        assert!(t.channel("priv").unwrap().archived);
    }

    #[tokio::test]
    async fn other_subjects_threads_are_ignored() {
        let (t, r) = setup();
        t.add_channel(ChannelInfo::thread(
            "x",
            "Training Case for C999",
            PARENT,
            ChannelKind::PublicThread,
        ));
        assert_eq!(r.resolve(&subject()).await.unwrap().location_id, FALLBACK);
    }

    #[tokio::test]
    async fn listing_failure_still_reaches_fallback() {
        let (t, r) = setup();
        t.fail_listings_under(PARENT);
        assert_eq!(r.resolve(&subject()).await.unwrap().location_id, FALLBACK);
    }

    #[tokio::test]
    async fn nothing_resolves_without_fallback() {
        let transport = Arc::new(MemoryTransport::new());
        let r = ContextResolver::new(
            transport,
            Some(PARENT.into()),
            ThreadNaming::new("C{subject}"),
            Some("gone".into()),
        );
        assert!(r.resolve(&subject()).await.is_none());
    }
}
