//! Read-only status check of every stateful item

use crate::context::ApplyContext;
use crate::error::RunError;
use crate::graph::{GraphNode, ItemGraph};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerifyOutcome {
    Correct,
    Incorrect { keys: Vec<String> },
    /// Status needs faults that are not available
    Unavailable { faults: Vec<String> },
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub item_id: String,
    #[serde(flatten)]
    pub outcome: VerifyOutcome,
}

impl VerifyResult {
    pub fn is_correct(&self) -> bool {
        matches!(self.outcome, VerifyOutcome::Correct)
    }
}

/// Compute the status of every item without changing anything
///
/// Actions and tag fillers have no state and are left out. Results are
/// in item id order.
pub fn verify(
    graph: &ItemGraph,
    ctx: &ApplyContext,
    jobs: usize,
) -> Result<Vec<VerifyResult>, RunError> {
    let nodes: Vec<&GraphNode> = graph
        .iter()
        .filter(|n| !n.is_action() && !n.is_tag_filler())
        .collect();
    log::info!("verifying {} items on {}", nodes.len(), graph.node_name);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| RunError::WorkerPool(format!("failed to create thread pool: {e}")))?;

    Ok(pool.install(|| nodes.par_iter().map(|node| verify_item(node, ctx)).collect()))
}

fn verify_item(node: &GraphNode, ctx: &ApplyContext) -> VerifyResult {
    let faults = node.item.unavailable_faults();
    let outcome = if !faults.is_empty() {
        VerifyOutcome::Unavailable { faults }
    } else {
        match node.item.status(ctx) {
            Ok(status) if status.is_correct() => VerifyOutcome::Correct,
            Ok(status) => VerifyOutcome::Incorrect {
                keys: status.keys_to_fix,
            },
            Err(err) => VerifyOutcome::Error {
                error: format!("{err:#}"),
            },
        }
    };
    log::debug!("{}: {outcome:?}", node.id);
    VerifyResult {
        item_id: node.id.clone(),
        outcome,
    }
}
