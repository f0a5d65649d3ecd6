//! Watcher Loop.
//!
//! A tick reconciles first, then announces every pending record that has no
//! cache entry: resolve its context, render its card, post, and remember
//! where the card went. The cache is flushed once, after the last record.
//! Ticks are single-flight; a tick asked for while one is running is
//! skipped, not queued.

use std::time::Duration;

use relay_core::cache::CacheEntry;
use relay_core::card::Card;
use relay_core::context::{Context, MessageRef};
use relay_core::record::PendingRecord;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::reconcile::{reconcile, ReconcileReport};
use crate::state::AppState;
use crate::transport::{OutgoingMessage, TransportError};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Another tick was already running; nothing was done.
    pub skipped: bool,
    pub reconcile: ReconcileReport,
    pub pending_seen: usize,
    pub already_announced: usize,
    pub announced: usize,
    /// Posted to the fallback after the subject's thread refused the card.
    pub rerouted: usize,
    pub unresolved: usize,
    pub render_failed: usize,
    pub post_failed: usize,
    /// Shutdown was requested part way through the page.
    pub interrupted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush_error: Option<String>,
}

enum Announcement {
    Posted { entry: CacheEntry, rerouted: bool },
    Unresolved,
    RenderFailed,
    PostFailed,
}

/// Run one tick.
pub async fn tick(state: &AppState) -> TickReport {
    let Some(_guard) = state.try_begin_tick() else {
        debug!("tick already running; skipping");
        return TickReport {
            skipped: true,
            ..TickReport::default()
        };
    };

    let mut report = TickReport {
        reconcile: reconcile(state).await,
        ..TickReport::default()
    };

    // Taken after reconciliation: a decision that evicts an entry from here
    // on must not make its record look unannounced within this tick.
    let announced_before = state.cache().ids();

    let limit = state.page_size;
    match state.store_call(move |s| s.list_pending(limit)).await {
        Ok(pending) => {
            report.pending_seen = pending.len();
            for record in pending {
                if state.shutdown_requested() {
                    info!("shutdown requested; leaving the rest of the page for next start");
                    report.interrupted = true;
                    break;
                }
                if announced_before.contains(&record.id) {
                    report.already_announced += 1;
                    continue;
                }
                match announce(state, &record).await {
                    Announcement::Posted { entry, rerouted } => {
                        info!(
                            record_id = %record.id,
                            location_id = %entry.location_id,
                            message_id = %entry.message_id,
                            "announced"
                        );
                        state.cache().put(record.id.clone(), entry);
                        report.announced += 1;
                        if rerouted {
                            report.rerouted += 1;
                        }
                    }
                    Announcement::Unresolved => report.unresolved += 1,
                    Announcement::RenderFailed => report.render_failed += 1,
                    Announcement::PostFailed => report.post_failed += 1,
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "could not list pending records; retrying next tick");
            report.store_error = Some(e.to_string());
        }
    }

    // Flushed even after a listing failure so reconciliation evictions stick
    if let Err(e) = state.flush_cache().await {
        error!(error = %e, "could not persist announcement cache");
        report.flush_error = Some(e.to_string());
    }

    report
}

async fn announce(state: &AppState, record: &PendingRecord) -> Announcement {
    let card = match state.renderer.render(record) {
        Ok(card) => card,
        Err(e) => {
            warn!(record_id = %record.id, error = %e, "card did not render; skipping this tick");
            return Announcement::RenderFailed;
        }
    };

    let Some(context) = state.resolver.resolve(&record.subject).await else {
        warn!(record_id = %record.id, subject = %record.subject, "no context for subject; retrying next tick");
        return Announcement::Unresolved;
    };
    if context.is_locked() {
        warn!(record_id = %record.id, location_id = %context.location_id, "context is locked; retrying next tick");
        return Announcement::Unresolved;
    }

    match post(state, &context, &card).await {
        Ok(posted) => Announcement::Posted {
            entry: posted.into(),
            rerouted: false,
        },
        Err(e) if context.is_thread() => {
            warn!(
                record_id = %record.id,
                location_id = %context.location_id,
                error = %e,
                "post into thread failed; trying fallback"
            );
            let Some(fallback) = state.resolver.fallback().await else {
                return Announcement::PostFailed;
            };
            match post(state, &fallback, &card).await {
                Ok(posted) => Announcement::Posted {
                    entry: posted.into(),
                    rerouted: true,
                },
                Err(e) => {
                    warn!(record_id = %record.id, location_id = %fallback.location_id, error = %e, "post into fallback failed");
                    Announcement::PostFailed
                }
            }
        }
        Err(e) => {
            warn!(record_id = %record.id, location_id = %context.location_id, error = %e, "post failed");
            Announcement::PostFailed
        }
    }
}

async fn post(state: &AppState, context: &Context, card: &Card) -> Result<MessageRef, TransportError> {
    let message = OutgoingMessage {
        content: if context.is_thread() {
            state.thread_ping.clone()
        } else {
            None
        },
        card: card.clone(),
    };
    state.transport.post_message(&context.location_id, &message).await
}

/// Tick now, then every `interval`, until shutdown is requested.
pub async fn run_watcher(state: AppState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = interval.as_secs(), "watcher started");

    loop {
        tokio::select! {
            biased;
            _ = state.shutdown_signal() => break,
            _ = ticker.tick() => {}
        }
        let report = tick(&state).await;
        if !report.skipped {
            info!(
                announced = report.announced,
                reconciled = report.reconcile.evicted(),
                unresolved = report.unresolved,
                post_failed = report.post_failed,
                "tick complete"
            );
        }
        if report.interrupted || state.shutdown_requested() {
            break;
        }
    }
    info!("watcher stopped");
}
