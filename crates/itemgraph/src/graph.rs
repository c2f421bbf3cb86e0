//! Annotated item graph produced by [`prepare_dependencies`]
//!
//! [`prepare_dependencies`]: crate::deps::prepare_dependencies

use crate::builtin::{ACTION_TYPE, TAG_FILLER_TYPE};
use crate::error::Result;
use crate::item::{BoxedItem, Item};
use crate::selector::{self, Selector};
use std::collections::{BTreeMap, BTreeSet};

/// A selector plus the tag whose attributes contributed it, if any
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepSelector {
    pub selector: String,
    pub via_tag: Option<String>,
}

impl DepSelector {
    pub fn direct(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            via_tag: None,
        }
    }

    pub fn from_tag(selector: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            via_tag: Some(tag.into()),
        }
    }
}

/// Declared relations, mutated by the graph-building passes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relations {
    pub needs: BTreeSet<DepSelector>,
    pub needed_by: BTreeSet<DepSelector>,
    pub triggers: BTreeSet<DepSelector>,
    pub triggered_by: BTreeSet<DepSelector>,
    pub precedes: BTreeSet<DepSelector>,
    pub preceded_by: BTreeSet<DepSelector>,
}

fn direct_set(selectors: &BTreeSet<String>) -> BTreeSet<DepSelector> {
    selectors.iter().map(DepSelector::direct).collect()
}

/// One item plus everything the graph builder learned about it
#[derive(Debug)]
pub struct GraphNode {
    pub item: BoxedItem,
    pub id: String,
    pub type_name: &'static str,
    pub bundle: String,
    pub tags: BTreeSet<String>,
    pub relations: Relations,
    pub triggered: bool,
    pub cascade_skip: bool,
    pub unless: Option<String>,
    pub error_on_missing_fault: bool,
    /// Types this item must not run concurrently with
    pub blocks_concurrent: BTreeSet<String>,
    pub synthetic: bool,

    /// Ids this item depends on directly
    pub direct_deps: BTreeSet<String>,
    /// Subset of `direct_deps` contributed by other items' `needed_by`
    pub reverse_deps: BTreeSet<String>,
    /// Subset of `direct_deps` added only to serialize mutually exclusive types
    pub concurrency_deps: BTreeSet<String>,
    /// Resolved ids of the items this item triggers
    pub trigger_targets: BTreeSet<String>,
    /// Resolved ids of the items this triggered item precedes
    pub precedes_items: BTreeSet<String>,
    /// Transitive closure of `direct_deps`
    pub flattened_deps: BTreeSet<String>,
    /// Ids of the items that (transitively) depend on this one
    pub incoming_deps: BTreeSet<String>,
}

impl GraphNode {
    pub(crate) fn new(item: BoxedItem, synthetic: bool) -> Self {
        let attributes = item.attributes().clone();
        let relations = Relations {
            needs: direct_set(&attributes.needs),
            needed_by: direct_set(&attributes.needed_by),
            triggers: direct_set(&attributes.triggers),
            triggered_by: direct_set(&attributes.triggered_by),
            precedes: direct_set(&attributes.precedes),
            preceded_by: direct_set(&attributes.preceded_by),
        };
        Self {
            id: item.id(),
            type_name: item.type_name(),
            bundle: item.bundle().to_string(),
            tags: attributes.tags.clone(),
            relations,
            triggered: attributes.triggered,
            cascade_skip: attributes.cascade_skip(),
            unless: attributes.unless.clone(),
            error_on_missing_fault: attributes.error_on_missing_fault,
            blocks_concurrent: BTreeSet::new(),
            synthetic,
            direct_deps: BTreeSet::new(),
            reverse_deps: BTreeSet::new(),
            concurrency_deps: BTreeSet::new(),
            trigger_targets: BTreeSet::new(),
            precedes_items: BTreeSet::new(),
            flattened_deps: BTreeSet::new(),
            incoming_deps: BTreeSet::new(),
            item,
        }
    }

    pub fn item(&self) -> &dyn Item {
        self.item.as_ref()
    }

    pub fn is_tag_filler(&self) -> bool {
        self.type_name == TAG_FILLER_TYPE
    }

    pub fn is_action(&self) -> bool {
        self.type_name == ACTION_TYPE || self.item.is_action()
    }

    /// Whether this item depends on `id` for a reason other than serialization
    pub fn has_real_dep_on(&self, id: &str) -> bool {
        self.direct_deps.contains(id) && !self.concurrency_deps.contains(id)
    }
}

/// Working item set keyed by id
pub type NodeMap = BTreeMap<String, GraphNode>;

/// Fully annotated items of one node, ready for execution
#[derive(Debug, Default)]
pub struct ItemGraph {
    pub node_name: String,
    pub os: String,
    pub os_version: Vec<u32>,
    pub(crate) nodes: NodeMap,
}

impl ItemGraph {
    pub fn get(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Iterate nodes in id order
    pub fn iter(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resolve a selector against the final item set
    pub fn resolve(&self, selector: &str) -> Result<Vec<&GraphNode>> {
        selector::resolve(selector, &self.nodes, None, None)
    }

    /// Ids matched by any of the given selectors
    ///
    /// Exact selectors naming missing items match nothing.
    pub fn covered_by(&self, selectors: &[String]) -> Result<BTreeSet<String>> {
        let parsed = selectors
            .iter()
            .map(|s| s.parse::<Selector>())
            .collect::<Result<Vec<_>>>()?;
        Ok(self
            .nodes
            .values()
            .filter(|node| parsed.iter().any(|s| s.matches(node, None)))
            .map(|node| node.id.clone())
            .collect())
    }
}
