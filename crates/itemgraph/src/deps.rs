//! Dependency graph builder
//!
//! [`prepare_dependencies`] runs a fixed sequence of passes over the items
//! of one node. Each pass mutates the working set and relies on the
//! previous passes having completed:
//!
//! 1. structural validation (id format, collisions, loopback needs)
//! 2. canned action synthesis
//! 3. tag filler synthesis
//! 4. tag inheritance
//! 5. tag attribute propagation
//! 6. explicit and automatic `needs`
//! 7. reverse dependencies (`needed_by`)
//! 8. rewriting `triggered_by`/`precedes` onto the opposing item
//! 9. trigger dependencies
//! 10. preceded-by dependencies
//! 11. flattening (transitive closure) and incoming dependencies
//! 12. concurrency daisy-chaining

use crate::builtin::{CommandAction, TagFiller};
use crate::error::{DependencyError, Result};
use crate::graph::{DepSelector, GraphNode, ItemGraph, NodeMap};
use crate::item::{BoxedItem, Item, split_id};
use crate::node::Node;
use crate::selector::resolve_ids;
use std::collections::{BTreeMap, BTreeSet};

/// Build the annotated dependency graph for one node
///
/// Any configuration error aborts graph construction.
pub fn prepare_dependencies(node: &Node, items: Vec<BoxedItem>) -> Result<ItemGraph> {
    log::debug!(
        "preparing dependencies for {} items on node {}",
        items.len(),
        node.name
    );

    let mut nodes = NodeMap::new();
    for item in items {
        check_item_id(item.as_ref())?;
        insert_unique(&mut nodes, GraphNode::new(item, false))?;
    }
    check_loopback_dependencies(&nodes)?;

    inject_canned_actions(&mut nodes)?;
    inject_tag_fillers(&mut nodes, node)?;
    add_inherited_tags(&mut nodes, node);
    inject_tag_attributes(&mut nodes, node);
    inject_dependencies(&mut nodes)?;
    inject_reverse_dependencies(&mut nodes)?;
    inject_reverse_triggers(&mut nodes)?;
    inject_trigger_dependencies(&mut nodes)?;
    inject_preceded_by_dependencies(&mut nodes)?;
    flatten_dependencies(&mut nodes);
    inject_concurrency_blockers(&mut nodes, &node.os, &node.os_version);

    log::debug!("dependency graph for {} has {} items", node.name, nodes.len());

    Ok(ItemGraph {
        node_name: node.name.clone(),
        os: node.os.clone(),
        os_version: node.os_version.clone(),
        nodes,
    })
}

fn check_item_id(item: &dyn Item) -> Result<()> {
    let id = item.id();
    let invalid = |reason: &str| DependencyError::InvalidItemId {
        id: id.clone(),
        bundle: item.bundle().to_string(),
        reason: reason.to_string(),
    };
    let (type_name, name) = split_id(&id).ok_or_else(|| invalid("missing ':'"))?;
    if type_name != item.type_name() {
        return Err(invalid("id does not start with the item type"));
    }
    if name.is_empty() {
        return Err(invalid("empty name"));
    }
    if name.contains(':') {
        return Err(invalid("name must not contain ':'"));
    }
    Ok(())
}

fn insert_unique(nodes: &mut NodeMap, node: GraphNode) -> Result<()> {
    if let Some(existing) = nodes.get(&node.id) {
        return Err(DependencyError::DuplicateItem {
            id: node.id.clone(),
            bundle: node.bundle.clone(),
            other_bundle: existing.bundle.clone(),
        });
    }
    nodes.insert(node.id.clone(), node);
    Ok(())
}

fn check_loopback_dependencies(nodes: &NodeMap) -> Result<()> {
    for node in nodes.values() {
        if node.relations.needs.iter().any(|s| s.selector == node.id) {
            return Err(DependencyError::LoopbackDependency {
                id: node.id.clone(),
                bundle: node.bundle.clone(),
            });
        }
    }
    Ok(())
}

/// Every item may offer triggered actions; add them as items
fn inject_canned_actions(nodes: &mut NodeMap) -> Result<()> {
    let mut actions = Vec::new();
    for node in nodes.values() {
        for (name, spec) in node.item.canned_actions() {
            actions.push(CommandAction::canned(node.item(), &name, spec));
        }
    }
    for action in actions {
        log::trace!("adding canned action {}", action.id());
        insert_unique(nodes, GraphNode::new(Box::new(action), true))?;
    }
    Ok(())
}

/// Declared tags that match nothing get a placeholder item
fn inject_tag_fillers(nodes: &mut NodeMap, node: &Node) -> Result<()> {
    let mut fillers: BTreeMap<String, TagFiller> = BTreeMap::new();
    for (bundle, tag, _) in node.declared_tags() {
        let used = nodes.values().any(|n| n.tags.contains(tag));
        if !used && !fillers.contains_key(tag) {
            fillers.insert(tag.to_string(), TagFiller::new(&bundle.name, tag));
        }
    }
    for (tag, filler) in fillers {
        log::trace!("adding tag filler for '{tag}'");
        insert_unique(nodes, GraphNode::new(Box::new(filler), true))?;
    }
    Ok(())
}

/// Tags implying other tags, applied until nothing changes
fn add_inherited_tags(nodes: &mut NodeMap, node: &Node) {
    loop {
        let mut added = false;
        for (_, tag, definition) in node.declared_tags() {
            for inherited in &definition.tags {
                for item in nodes.values_mut() {
                    if item.tags.contains(tag) && !item.tags.contains(inherited) {
                        log::trace!("{} inherits tag '{inherited}' from '{tag}'", item.id);
                        item.tags.insert(inherited.clone());
                        added = true;
                    }
                }
            }
        }
        if !added {
            break;
        }
    }
}

/// Tag-level relations are merged into every item of the bundle carrying the tag
fn inject_tag_attributes(nodes: &mut NodeMap, node: &Node) {
    for (bundle, tag, definition) in node.declared_tags() {
        let tagged = |selectors: &BTreeSet<String>| -> Vec<DepSelector> {
            selectors
                .iter()
                .map(|s| DepSelector::from_tag(s.as_str(), tag))
                .collect()
        };
        for item in nodes.values_mut() {
            if item.bundle != bundle.name || !item.tags.contains(tag) {
                continue;
            }
            let relations = &mut item.relations;
            relations.needs.extend(tagged(&definition.needs));
            relations.needed_by.extend(tagged(&definition.needed_by));
            relations.precedes.extend(tagged(&definition.precedes));
            relations.preceded_by.extend(tagged(&definition.preceded_by));
            relations.triggers.extend(tagged(&definition.triggers));
            relations.triggered_by.extend(tagged(&definition.triggered_by));
        }
    }
}

/// Resolve a relation selector of `node`, reporting failures in context
fn resolve_relation(
    nodes: &NodeMap,
    node: &GraphNode,
    attribute: &'static str,
    selector: &DepSelector,
) -> Result<Vec<String>> {
    resolve_ids(
        &selector.selector,
        nodes,
        Some(&node.id),
        selector.via_tag.as_deref(),
    )
    .map_err(|err| match err {
        DependencyError::NoSuchItem { .. } => DependencyError::UnresolvedSelector {
            item: node.id.clone(),
            bundle: node.bundle.clone(),
            attribute,
            selector: selector.selector.clone(),
        },
        other => other,
    })
}

/// Resolve `needs` and automatic dependencies into direct dependencies
fn inject_dependencies(nodes: &mut NodeMap) -> Result<()> {
    let mut resolved: Vec<(String, BTreeSet<String>)> = Vec::with_capacity(nodes.len());
    {
        let all_items: Vec<&dyn Item> = nodes.values().map(GraphNode::item).collect();
        for node in nodes.values() {
            let mut deps = BTreeSet::new();
            for selector in &node.relations.needs {
                deps.extend(resolve_relation(nodes, node, "needs", selector)?);
            }
            for selector in node.item.auto_deps(&all_items) {
                let selector = DepSelector::direct(selector);
                deps.extend(resolve_relation(nodes, node, "auto_deps", &selector)?);
            }
            resolved.push((node.id.clone(), deps));
        }
    }
    for (id, deps) in resolved {
        if let Some(node) = nodes.get_mut(&id) {
            log::trace!("{id} needs {deps:?}");
            node.direct_deps.extend(deps);
        }
    }
    Ok(())
}

/// `needed_by` on A adds A as a dependency of each target
fn inject_reverse_dependencies(nodes: &mut NodeMap) -> Result<()> {
    let mut edges = Vec::new();
    for node in nodes.values() {
        for selector in &node.relations.needed_by {
            for target in resolve_relation(nodes, node, "needed_by", selector)? {
                edges.push((target, node.id.clone()));
            }
        }
    }
    for (target, dep) in edges {
        if let Some(node) = nodes.get_mut(&target) {
            node.direct_deps.insert(dep.clone());
            node.reverse_deps.insert(dep);
        }
    }
    Ok(())
}

/// Express `triggered_by` and `precedes` from the opposing side
fn inject_reverse_triggers(nodes: &mut NodeMap) -> Result<()> {
    let mut triggers = Vec::new();
    let mut preceded_by = Vec::new();
    for node in nodes.values() {
        for selector in &node.relations.triggered_by {
            for triggering in resolve_relation(nodes, node, "triggered_by", selector)? {
                triggers.push((triggering, node.id.clone()));
            }
        }
        for selector in &node.relations.precedes {
            for preceded in resolve_relation(nodes, node, "precedes", selector)? {
                preceded_by.push((preceded, node.id.clone()));
            }
        }
    }
    for (triggering, triggered) in triggers {
        if let Some(node) = nodes.get_mut(&triggering) {
            node.relations.triggers.insert(DepSelector::direct(triggered));
        }
    }
    for (preceded, preceding) in preceded_by {
        if let Some(node) = nodes.get_mut(&preceded) {
            node.relations.preceded_by.insert(DepSelector::direct(preceding));
        }
    }
    Ok(())
}

/// Triggered items depend on every item that may trigger them
fn inject_trigger_dependencies(nodes: &mut NodeMap) -> Result<()> {
    let mut edges = Vec::new();
    for node in nodes.values() {
        if node.relations.triggers.iter().any(|s| s.selector == node.id) {
            return Err(DependencyError::SelfTrigger {
                item: node.id.clone(),
                bundle: node.bundle.clone(),
            });
        }
        for selector in &node.relations.triggers {
            for target_id in resolve_relation(nodes, node, "triggers", selector)? {
                let target = &nodes[&target_id];
                if !target.triggered {
                    return Err(DependencyError::NotTriggered {
                        item: node.id.clone(),
                        bundle: node.bundle.clone(),
                        target: target.id.clone(),
                        target_bundle: target.bundle.clone(),
                        relation: "triggered by",
                    });
                }
                edges.push((node.id.clone(), target_id));
            }
        }
    }
    for (triggering, triggered) in edges {
        if let Some(node) = nodes.get_mut(&triggering) {
            node.trigger_targets.insert(triggered.clone());
        }
        if let Some(node) = nodes.get_mut(&triggered) {
            node.direct_deps.insert(triggering);
        }
    }
    Ok(())
}

/// Items depend on the triggered items that precede them
fn inject_preceded_by_dependencies(nodes: &mut NodeMap) -> Result<()> {
    let mut edges = Vec::new();
    for node in nodes.values() {
        if node.relations.preceded_by.is_empty() {
            continue;
        }
        if node.triggered {
            return Err(DependencyError::TriggeredWithPrecededBy {
                item: node.id.clone(),
                bundle: node.bundle.clone(),
            });
        }
        for selector in &node.relations.preceded_by {
            for preceding_id in resolve_relation(nodes, node, "preceded_by", selector)? {
                let preceding = &nodes[&preceding_id];
                if !preceding.triggered {
                    return Err(DependencyError::NotTriggered {
                        item: node.id.clone(),
                        bundle: node.bundle.clone(),
                        target: preceding.id.clone(),
                        target_bundle: preceding.bundle.clone(),
                        relation: "preceding",
                    });
                }
                edges.push((node.id.clone(), preceding_id));
            }
        }
    }
    for (preceded, preceding) in edges {
        if let Some(node) = nodes.get_mut(&preceding) {
            node.precedes_items.insert(preceded.clone());
        }
        if let Some(node) = nodes.get_mut(&preceded) {
            node.direct_deps.insert(preceding);
        }
    }
    Ok(())
}

/// Compute `flattened_deps` and `incoming_deps` for every item
///
/// Cycles are tolerated: an item reached again while it is still being
/// resolved contributes only its direct dependencies.
fn flatten_dependencies(nodes: &mut NodeMap) {
    let mut memo: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut in_progress = BTreeSet::new();
    for id in nodes.keys() {
        flatten_item(id, nodes, &mut memo, &mut in_progress);
    }

    let mut incoming: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (id, deps) in &memo {
        for dep in deps {
            if dep != id {
                incoming.entry(dep.clone()).or_default().insert(id.clone());
            }
        }
    }

    for (id, node) in nodes.iter_mut() {
        node.flattened_deps = memo.remove(id).unwrap_or_default();
        node.incoming_deps = incoming.remove(id).unwrap_or_default();
    }
}

fn flatten_item(
    id: &str,
    nodes: &NodeMap,
    memo: &mut BTreeMap<String, BTreeSet<String>>,
    in_progress: &mut BTreeSet<String>,
) -> BTreeSet<String> {
    if let Some(done) = memo.get(id) {
        return done.clone();
    }
    let Some(node) = nodes.get(id) else {
        return BTreeSet::new();
    };
    if !in_progress.insert(id.to_string()) {
        return node.direct_deps.clone();
    }

    let mut flattened = node.direct_deps.clone();
    for dep in &node.direct_deps {
        flattened.extend(flatten_item(dep, nodes, memo, in_progress));
    }

    in_progress.remove(id);
    memo.insert(id.to_string(), flattened.clone());
    flattened
}

/// Merge overlapping exclusion sets into chain groups
fn chain_groups(type_blocks: BTreeMap<&'static str, BTreeSet<String>>) -> Vec<BTreeSet<String>> {
    let mut groups: Vec<BTreeSet<String>> = Vec::new();
    for (type_name, blocked) in type_blocks {
        let mut group = blocked;
        group.insert(type_name.to_string());
        let (overlapping, rest): (Vec<_>, Vec<_>) = groups
            .into_iter()
            .partition(|existing| !existing.is_disjoint(&group));
        for existing in overlapping {
            group.extend(existing);
        }
        groups = rest;
        groups.push(group);
    }
    groups
}

/// Serialize all items of mutually exclusive types
///
/// Groups are chained one at a time and the graph is re-flattened after
/// each, so every group is ordered with the edges already added.
fn inject_concurrency_blockers(nodes: &mut NodeMap, os: &str, os_version: &[u32]) {
    let mut type_blocks: BTreeMap<&'static str, BTreeSet<String>> = BTreeMap::new();
    for node in nodes.values() {
        if node.is_tag_filler() {
            continue;
        }
        let blocked = node.item.block_concurrent(os, os_version);
        if !blocked.is_empty() {
            type_blocks
                .entry(node.type_name)
                .or_default()
                .extend(blocked);
        }
    }

    for group in chain_groups(type_blocks) {
        log::debug!("serializing item types {group:?}");
        for node in nodes.values_mut() {
            if group.contains(node.type_name) && !node.is_tag_filler() {
                node.blocks_concurrent = group.clone();
            }
        }
        if daisy_chain(nodes, &group) {
            flatten_dependencies(nodes);
        }
    }
}

fn daisy_chain(nodes: &mut NodeMap, group: &BTreeSet<String>) -> bool {
    let in_group = |node: &GraphNode| group.contains(node.type_name) && !node.is_tag_filler();
    let type_items: Vec<String> = nodes
        .values()
        .filter(|n| in_group(n))
        .map(|n| n.id.clone())
        .collect();

    // only same-group dependencies constrain the walk
    let mut remaining: BTreeMap<String, BTreeSet<String>> = type_items
        .iter()
        .map(|id| {
            let deps = nodes[id]
                .flattened_deps
                .iter()
                .filter(|dep| *dep != id && nodes.get(*dep).is_some_and(in_group))
                .cloned()
                .collect();
            (id.clone(), deps)
        })
        .collect();

    let mut processed = BTreeSet::new();
    let mut previous: Option<String> = None;
    let mut added = false;
    while processed.len() < type_items.len() {
        let next = type_items
            .iter()
            .find(|id| !processed.contains(*id) && remaining[*id].is_empty())
            .cloned();
        let Some(next) = next else {
            log::warn!(
                "cannot serialize {} items of types {group:?}: they depend on each other in a loop",
                type_items.len() - processed.len()
            );
            break;
        };
        for deps in remaining.values_mut() {
            deps.remove(&next);
        }
        if let Some(prev) = previous.take()
            && let Some(node) = nodes.get_mut(&next)
            && node.direct_deps.insert(prev.clone())
        {
            log::trace!("{next} waits for {prev} (concurrency)");
            node.concurrency_deps.insert(prev);
            added = true;
        }
        processed.insert(next.clone());
        previous = Some(next);
    }
    added
}
