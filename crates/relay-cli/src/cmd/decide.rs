use relay_core::review::{Actor, ReviewAction, ReviewDecision};
use relay_server::decision::{handle_decision, DecisionOutcome};
use relay_server::AppState;
use std::path::Path;

use super::load_checked;
use crate::output::print_json;

pub fn run(
    config_path: &Path,
    id: &str,
    action: &str,
    actor: &str,
    roles: Vec<String>,
    json: bool,
) -> anyhow::Result<()> {
    let action: ReviewAction = action.parse()?;
    let config = load_checked(config_path)?;
    // No dry run: the conditional write is the decision
    let state = AppState::from_config(&config, config_path, false)?;

    let decision = ReviewDecision {
        actor: Actor {
            id: format!("cli:{actor}"),
            name: actor.to_string(),
            roles,
        },
        action,
        record_id: id.to_string(),
        message: None,
    };

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(handle_decision(&state, decision));
    let reply = outcome.reply(id);

    if json {
        let mut value = serde_json::to_value(&outcome)?;
        value["reply"] = serde_json::json!(reply);
        print_json(&value)?;
    } else {
        println!("{reply}");
    }

    match outcome {
        DecisionOutcome::Unauthorized => anyhow::bail!("decision refused"),
        DecisionOutcome::StoreFailed { error } => anyhow::bail!("store write failed: {error}"),
        _ => Ok(()),
    }
}
