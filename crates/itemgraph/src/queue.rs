//! Runtime item queue
//!
//! Holds the live items of a run. Items that still wait for dependencies
//! are blocked, items without remaining dependencies are ready, items
//! handed out by [`ItemQueue::pop`] are pending until acknowledged.
//!
//! The queue is not thread-safe; only the coordinating thread mutates it.

use crate::graph::{GraphNode, ItemGraph};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug)]
pub struct ItemQueue<'g> {
    graph: &'g ItemGraph,
    /// Items not handed out yet, with the dependencies they still wait for
    waiting: BTreeMap<String, BTreeSet<String>>,
    pending: BTreeSet<String>,
    triggered: BTreeSet<String>,
}

impl<'g> ItemQueue<'g> {
    pub fn new(graph: &'g ItemGraph) -> Self {
        let waiting = graph
            .iter()
            .map(|node| (node.id.clone(), node.direct_deps.clone()))
            .collect();
        Self {
            graph,
            waiting,
            pending: BTreeSet::new(),
            triggered: BTreeSet::new(),
        }
    }

    /// Take the next ready item
    ///
    /// Returns `None` when no item is ready, or every ready item is of a
    /// type that must not run next to a pending item.
    pub fn pop(&mut self) -> Option<&'g GraphNode> {
        let graph = self.graph;
        let node = self
            .waiting
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .filter_map(|(id, _)| graph.get(id))
            .find(|node| !self.is_concurrency_blocked(node))?;
        self.waiting.remove(&node.id);
        self.pending.insert(node.id.clone());
        log::trace!("handing out {}", node.id);
        Some(node)
    }

    fn is_concurrency_blocked(&self, node: &GraphNode) -> bool {
        self.pending
            .iter()
            .filter_map(|id| self.graph.get(id))
            .any(|running| {
                node.blocks_concurrent.contains(running.type_name)
                    || running.blocks_concurrent.contains(node.type_name)
            })
    }

    /// The item needed no change
    pub fn item_ok(&mut self, id: &str) {
        self.pending.remove(id);
        self.drop_dependency(id);
    }

    /// The item was changed; fire its triggers
    pub fn item_fixed(&mut self, id: &str) {
        self.item_ok(id);
        let Some(node) = self.graph.get(id) else {
            return;
        };
        for target in &node.trigger_targets {
            if self.is_live(target) {
                log::debug!("{id} triggers {target}");
                self.triggered.insert(target.clone());
            } else {
                log::debug!("{id} cannot trigger {target}, it is gone");
            }
        }
    }

    /// The item failed; returns the dependents skipped because of it
    pub fn item_failed(&mut self, id: &str) -> Vec<String> {
        self.pending.remove(id);
        self.cascade(id)
    }

    /// The item was skipped; returns the dependents skipped because of it
    pub fn item_skipped(&mut self, id: &str) -> Vec<String> {
        self.pending.remove(id);
        self.cascade(id)
    }

    fn cascade(&mut self, id: &str) -> Vec<String> {
        if self.graph.get(id).is_some_and(|n| n.cascade_skip) {
            self.remove_dependents(id)
        } else {
            self.drop_dependency(id);
            Vec::new()
        }
    }

    /// Remove everything that (transitively) depends on `dep_id`
    fn remove_dependents(&mut self, dep_id: &str) -> Vec<String> {
        let graph = self.graph;
        let dependents: Vec<String> = self
            .waiting
            .iter()
            .filter(|(_, deps)| deps.contains(dep_id))
            .map(|(id, _)| id.clone())
            .collect();

        let mut removed = Vec::new();
        for id in dependents {
            let ordering_only = graph
                .get(&id)
                .is_some_and(|n| n.concurrency_deps.contains(dep_id));
            if ordering_only || self.has_trigger_path(dep_id, &id) {
                // may still run: another item can trigger it, or it only waited for ordering
                log::debug!("{id} no longer waits for {dep_id}");
                if let Some(deps) = self.waiting.get_mut(&id) {
                    deps.remove(dep_id);
                }
            } else {
                removed.push(id);
            }
        }
        for id in &removed {
            self.waiting.remove(id);
        }

        let mut cascaded = Vec::new();
        for id in &removed {
            if graph.get(id).is_some_and(|n| n.cascade_skip) {
                cascaded.extend(self.remove_dependents(id));
            } else {
                self.drop_dependency(id);
            }
        }
        removed.extend(cascaded);
        removed
    }

    /// Whether `target` can be reached from `from` by following triggers
    /// through items that are still live
    fn has_trigger_path(&self, from: &str, target: &str) -> bool {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([from.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let Some(node) = self.graph.get(&id) else {
                continue;
            };
            for next in &node.trigger_targets {
                if next == target {
                    return true;
                }
                if self.is_live(next) {
                    queue.push_back(next.clone());
                }
            }
        }
        false
    }

    fn drop_dependency(&mut self, id: &str) {
        for deps in self.waiting.values_mut() {
            deps.remove(id);
        }
    }

    fn is_live(&self, id: &str) -> bool {
        self.waiting.contains_key(id) || self.pending.contains(id)
    }

    /// Whether a trigger fired for the item during this run
    pub fn has_been_triggered(&self, id: &str) -> bool {
        self.triggered.contains(id)
    }

    /// Items without remaining dependencies, before concurrency filtering
    pub fn ready_ids(&self) -> Vec<&str> {
        self.waiting
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Items still waiting for dependencies
    pub fn blocked_ids(&self) -> Vec<&str> {
        self.waiting
            .iter()
            .filter(|(_, deps)| !deps.is_empty())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn pending_ids(&self) -> Vec<&str> {
        self.pending.iter().map(String::as_str).collect()
    }

    /// Items handed out or still to be handed out
    pub fn live_count(&self) -> usize {
        self.waiting.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live_count() == 0
    }
}
