//! Reconciler: bring announced cards in line with the store.
//!
//! For every cached announcement the record's state column is read back;
//! the rest of the row only decorates the terminal card.
//! Pending records are left alone. Anything else (accepted, rejected,
//! deleted, an unknown code, or a record that no longer exists) ends the
//! announcement: the card is edited to its read-only terminal variant where
//! possible and the entry is evicted whether or not the edit worked.

use relay_core::cache::CacheEntry;
use relay_core::card::Card;
use relay_core::record::RecordState;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::state::AppState;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub still_pending: usize,
    pub resolved: usize,
    pub dropped_missing: usize,
    pub dropped_incomplete: usize,
    pub edit_failed: usize,
    pub store_errors: usize,
}

impl ReconcileReport {
    pub fn evicted(&self) -> usize {
        self.resolved + self.dropped_missing + self.dropped_incomplete
    }
}

/// One pass over the cache. Does not flush; the caller's tick does.
pub async fn reconcile(state: &AppState) -> ReconcileReport {
    let entries = state.cache().entries();
    let mut report = ReconcileReport::default();

    for (id, entry) in entries {
        report.checked += 1;

        if !entry.is_complete() {
            warn!(record_id = %id, "cache entry has no location or message; dropping");
            state.cache().remove(&id);
            report.dropped_incomplete += 1;
            continue;
        }

        let lookup = {
            let id = id.clone();
            state.store_call(move |s| s.state(&id)).await
        };
        let current = match lookup {
            Ok(Some(current)) => current,
            Ok(None) => {
                debug!(record_id = %id, "record no longer exists; dropping cache entry");
                state.cache().remove(&id);
                report.dropped_missing += 1;
                continue;
            }
            Err(e) => {
                // Transient: keep the entry and look again next tick
                warn!(record_id = %id, error = %e, "could not read record state");
                report.store_errors += 1;
                continue;
            }
        };

        if current.is_pending() {
            report.still_pending += 1;
            continue;
        }

        let card = terminal_card(state, &id, current).await;
        if !close_card(state, &id, &card, &entry).await {
            report.edit_failed += 1;
        }
        state.cache().remove(&id);
        report.resolved += 1;
        info!(record_id = %id, state = %current, "resolved outside the card; announcement closed");
    }

    report
}

/// The full terminal card when the record still reads and renders, else
/// the stub. The state column alone decides that the card closes.
async fn terminal_card(state: &AppState, id: &str, current: RecordState) -> Card {
    let lookup = {
        let id = id.to_string();
        state.store_call(move |s| s.get(&id)).await
    };
    match lookup {
        Ok(Some(record)) => {
            let reviewer = record.reviewed_by.as_deref();
            state
                .renderer
                .render_resolved(&record, current, reviewer)
                .unwrap_or_else(|e| {
                    debug!(record_id = %id, error = %e, "full terminal card failed to render; using stub");
                    state.renderer.resolved_stub(id, current, reviewer)
                })
        }
        Ok(None) => state.renderer.resolved_stub(id, current, None),
        Err(e) => {
            warn!(record_id = %id, error = %e, "record payload unreadable; closing card with stub");
            state.renderer.resolved_stub(id, current, None)
        }
    }
}

async fn close_card(state: &AppState, id: &str, card: &Card, entry: &CacheEntry) -> bool {
    match state.transport.edit_message(&entry.message_ref(), card).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                record_id = %id,
                location_id = %entry.location_id,
                message_id = %entry.message_id,
                error = %e,
                "could not edit card; evicting anyway"
            );
            false
        }
    }
}
