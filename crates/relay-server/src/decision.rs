//! Decision Handler.
//!
//! A reviewer's accept/reject becomes exactly one conditional write. If the
//! write changed a row this reviewer resolved the record: the card turns
//! read-only with their name on it and the announcement is evicted. If it
//! changed nothing someone else got there first (another reviewer, an admin
//! tool, or this same reviewer clicking twice) and the card is brought up to
//! date with whatever the store now says, without a second write.

use relay_core::card::Card;
use relay_core::context::MessageRef;
use relay_core::record::RecordState;
use relay_core::review::ReviewDecision;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Unauthorized,
    Applied {
        state: RecordState,
        card_updated: bool,
    },
    /// The conditional write matched no row. `state` is `None` when the
    /// record no longer exists.
    AlreadyResolved {
        state: Option<RecordState>,
        card_updated: bool,
    },
    StoreFailed {
        error: String,
    },
}

impl DecisionOutcome {
    /// Message shown to the reviewer who pressed the control.
    pub fn reply(&self, record_id: &str) -> String {
        match self {
            DecisionOutcome::Unauthorized => {
                "❌ You do not have permission to review submissions.".to_string()
            }
            DecisionOutcome::Applied { state, .. } => match state {
                RecordState::Accepted => format!("✅ Record {record_id} approved."),
                RecordState::Rejected => format!("⛔ Record {record_id} rejected."),
                other => format!("Record {record_id} set to {}.", other.label()),
            },
            DecisionOutcome::AlreadyResolved {
                state: Some(state), ..
            } => format!(
                "ℹ️ Record {record_id} was already resolved ({}).",
                state.label()
            ),
            DecisionOutcome::AlreadyResolved { state: None, .. } => {
                format!("ℹ️ Record {record_id} no longer exists.")
            }
            DecisionOutcome::StoreFailed { .. } => {
                format!("❌ Could not update record {record_id}; please try again.")
            }
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, DecisionOutcome::Applied { .. })
    }
}

pub async fn handle_decision(state: &AppState, decision: ReviewDecision) -> DecisionOutcome {
    let ReviewDecision {
        actor,
        action,
        record_id,
        message,
    } = decision;

    if !actor.has_any_role(&state.reviewer_roles) {
        info!(record_id = %record_id, actor = %actor.id, "decision refused: actor holds no reviewer role");
        return DecisionOutcome::Unauthorized;
    }

    let target = action.target_state();
    let write = {
        let id = record_id.clone();
        let reviewer = actor.name.clone();
        state
            .store_call(move |s| {
                s.conditional_resolve(&id, RecordState::Pending, target, &reviewer)
            })
            .await
    };
    let changed = match write {
        Ok(n) => n,
        Err(e) => {
            error!(record_id = %record_id, error = %e, "conditional write failed");
            return DecisionOutcome::StoreFailed {
                error: e.to_string(),
            };
        }
    };

    // Prefer the card the control came from; fall back to the cache
    let card_ref = message.or_else(|| state.cache().get(&record_id).map(|e| e.message_ref()));

    let current = {
        let id = record_id.clone();
        state.store_call(move |s| s.get(&id)).await
    };

    if changed > 0 {
        evict(state, &record_id).await;
        let card = match &current {
            Ok(Some(record)) => state
                .renderer
                .render_resolved(record, target, Some(&actor.name))
                .unwrap_or_else(|_| {
                    state
                        .renderer
                        .resolved_stub(&record_id, target, Some(&actor.name))
                }),
            _ => state
                .renderer
                .resolved_stub(&record_id, target, Some(&actor.name)),
        };
        let card_updated = edit(state, &record_id, card_ref.as_ref(), &card).await;
        info!(record_id = %record_id, state = %target, reviewer = %actor.name, "decision applied");
        return DecisionOutcome::Applied {
            state: target,
            card_updated,
        };
    }

    match current {
        Ok(Some(record)) if record.state.is_pending() => {
            // Zero rows changed yet the record reads pending: the write did
            // not land for a reason the store did not report
            warn!(record_id = %record_id, "conditional write matched nothing but record is still pending");
            DecisionOutcome::StoreFailed {
                error: "record still pending after write".to_string(),
            }
        }
        Ok(Some(record)) => {
            info!(record_id = %record_id, state = %record.state, actor = %actor.id, "decision on already-resolved record");
            evict(state, &record_id).await;
            // The winner's name comes from the store, so a late edit here
            // cannot erase it from the card
            let reviewer = record.reviewed_by.as_deref();
            let card = state
                .renderer
                .render_resolved(&record, record.state, reviewer)
                .unwrap_or_else(|_| {
                    state
                        .renderer
                        .resolved_stub(&record_id, record.state, reviewer)
                });
            let card_updated = edit(state, &record_id, card_ref.as_ref(), &card).await;
            DecisionOutcome::AlreadyResolved {
                state: Some(record.state),
                card_updated,
            }
        }
        Ok(None) => {
            info!(record_id = %record_id, actor = %actor.id, "decision on missing record");
            evict(state, &record_id).await;
            let card = state
                .renderer
                .resolved_stub(&record_id, RecordState::Deleted, None);
            let card_updated = edit(state, &record_id, card_ref.as_ref(), &card).await;
            DecisionOutcome::AlreadyResolved {
                state: None,
                card_updated,
            }
        }
        Err(e) => {
            // An unreadable payload still has a readable state column
            let lookup = {
                let id = record_id.clone();
                state.store_call(move |s| s.state(&id)).await
            };
            match lookup {
                Ok(Some(current)) if !current.is_pending() => {
                    warn!(record_id = %record_id, error = %e, "record payload unreadable; closing card with stub");
                    evict(state, &record_id).await;
                    let card = state.renderer.resolved_stub(&record_id, current, None);
                    let card_updated = edit(state, &record_id, card_ref.as_ref(), &card).await;
                    DecisionOutcome::AlreadyResolved {
                        state: Some(current),
                        card_updated,
                    }
                }
                _ => {
                    // The reconciler closes the card once the store is readable again
                    warn!(record_id = %record_id, error = %e, "could not read record after stale decision");
                    DecisionOutcome::StoreFailed {
                        error: e.to_string(),
                    }
                }
            }
        }
    }
}

async fn evict(state: &AppState, record_id: &str) {
    if state.cache().remove(record_id).is_none() {
        return;
    }
    if let Err(e) = state.flush_cache().await {
        warn!(record_id = %record_id, error = %e, "could not persist cache eviction");
    }
}

async fn edit(state: &AppState, record_id: &str, target: Option<&MessageRef>, card: &Card) -> bool {
    let Some(target) = target else {
        debug!(record_id = %record_id, "no known card to edit");
        return false;
    };
    match state.transport.edit_message(target, card).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                record_id = %record_id,
                location_id = %target.location_id,
                message_id = %target.message_id,
                error = %e,
                "could not edit card after decision"
            );
            false
        }
    }
}
