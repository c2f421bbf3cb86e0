//! Per-item apply sequencing
//!
//! Decides whether an item runs at all, then converges it:
//! skip selector, soft lock, trigger gate, `unless` guard, faults,
//! precedes check, and finally status / fix / status.

use crate::context::ApplyContext;
use crate::error::Result;
use crate::graph::{GraphNode, ItemGraph};
use crate::types::{ApplyOutcome, ExecuteOptions, ItemState, ItemStatus, SkipReason};
use std::collections::BTreeSet;

/// Items excluded from a run before it starts
#[derive(Debug, Clone, Default)]
pub struct SkipPolicy {
    selected: BTreeSet<String>,
    soft_locked: BTreeSet<String>,
}

impl SkipPolicy {
    /// Resolve skip selectors and soft locks against the graph
    ///
    /// Items covered by one of my own locks are never soft locked.
    pub fn new(graph: &ItemGraph, options: &ExecuteOptions) -> Result<Self> {
        let selected = graph.covered_by(&options.skip)?;

        let mine: Vec<String> = options
            .my_soft_locks
            .iter()
            .flat_map(|lock| lock.items.iter().cloned())
            .collect();
        let mine = graph.covered_by(&mine)?;

        let mut soft_locked = BTreeSet::new();
        for lock in &options.other_soft_locks {
            for id in graph.covered_by(&lock.items)? {
                if !mine.contains(&id) {
                    log::debug!("{id} is soft locked by {} ({})", lock.owner, lock.id);
                    soft_locked.insert(id);
                }
            }
        }

        Ok(Self {
            selected,
            soft_locked,
        })
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    pub fn is_soft_locked(&self, id: &str) -> bool {
        self.soft_locked.contains(id)
    }
}

/// Apply one item and report its terminal outcome
///
/// `has_been_triggered` is the queue's trigger flag for the item.
pub fn apply_item(
    graph: &ItemGraph,
    node: &GraphNode,
    has_been_triggered: bool,
    policy: &SkipPolicy,
    ctx: &ApplyContext,
) -> ApplyOutcome {
    if policy.is_selected(&node.id) {
        return ApplyOutcome::skipped(SkipReason::Selected);
    }
    if policy.is_soft_locked(&node.id) {
        return ApplyOutcome::skipped(SkipReason::SoftLocked);
    }
    let waiting_for_trigger = node.triggered && !has_been_triggered;
    if waiting_for_trigger && node.precedes_items.is_empty() {
        log::debug!("skipping {} because it wasn't triggered", node.id);
        return ApplyOutcome::skipped(SkipReason::NotTriggered);
    }

    if let Some(command) = &node.unless {
        match ctx.runner.run(command) {
            Ok(output) if output.success => {
                log::debug!("skipping {} because unless succeeded", node.id);
                return ApplyOutcome::skipped(SkipReason::Unless);
            }
            Ok(_) => {}
            Err(err) => return ApplyOutcome::failed(format!("unless: {err:#}")),
        }
    }

    let missing_faults = node.item.unavailable_faults();
    if !missing_faults.is_empty() {
        let faults = missing_faults.join(", ");
        if node.error_on_missing_fault {
            return ApplyOutcome::failed(format!("unavailable: {faults}"));
        }
        log::debug!("skipping {} because of missing faults: {faults}", node.id);
        return ApplyOutcome::skipped(SkipReason::FaultUnavailable);
    }

    if waiting_for_trigger {
        let mut visited = BTreeSet::new();
        if !precedes_incorrect_item(graph, node, ctx, &mut visited) {
            log::debug!("{} precedes only correct items, nothing to do", node.id);
            return ApplyOutcome::Ok;
        }
    }

    if node.is_action() {
        let status = ItemStatus::compare(ItemState::Absent, ItemState::Absent);
        return match node.item.fix(&status, ctx) {
            Ok(()) => ApplyOutcome::ActionSucceeded,
            Err(err) => ApplyOutcome::failed(format!("{err:#}")),
        };
    }

    converge(node, ctx)
}

fn converge(node: &GraphNode, ctx: &ApplyContext) -> ApplyOutcome {
    let status = match node.item.status(ctx) {
        Ok(status) => status,
        Err(err) => return ApplyOutcome::failed(format!("status: {err:#}")),
    };
    if status.is_correct() {
        return ApplyOutcome::Ok;
    }

    log::debug!("fixing {} ({:?})", node.id, status.keys_to_fix);
    if let Err(err) = node.item.fix(&status, ctx) {
        return ApplyOutcome::failed(format!("{err:#}"));
    }

    match node.item.status(ctx) {
        Ok(after) if after.is_correct() => ApplyOutcome::Fixed,
        Ok(after) => ApplyOutcome::failed(format!(
            "still incorrect after fix: {}",
            after.keys_to_fix.join(", ")
        )),
        Err(err) => ApplyOutcome::failed(format!("status after fix: {err:#}")),
    }
}

/// Whether any item preceded by `node` (transitively) is about to change
///
/// Items held back by their `unless` guard count as correct. Items whose
/// status cannot be determined count as incorrect.
fn precedes_incorrect_item(
    graph: &ItemGraph,
    node: &GraphNode,
    ctx: &ApplyContext,
    visited: &mut BTreeSet<String>,
) -> bool {
    for id in &node.precedes_items {
        if !visited.insert(id.clone()) {
            continue;
        }
        let Some(preceded) = graph.get(id) else {
            continue;
        };
        if precedes_incorrect_item(graph, preceded, ctx, visited) {
            return true;
        }
        if preceded.is_tag_filler() {
            continue;
        }
        if let Some(command) = &preceded.unless
            && ctx.runner.run_status(command).unwrap_or(false)
        {
            continue;
        }
        match preceded.item.status(ctx) {
            Ok(status) if status.is_correct() => {}
            _ => return true,
        }
    }
    false
}
