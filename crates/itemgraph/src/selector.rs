//! Selector parsing and resolution
//!
//! Grammar: an optional leading `!` negates the match, followed by one of
//! - `type:name` - exactly one item; missing items are an error
//! - `type:` - every item of that type
//! - `tag:name` - every item carrying the tag
//! - `tag:` - every item carrying any tag besides the one being expanded

use crate::error::{DependencyError, Result};
use crate::graph::{GraphNode, NodeMap};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorKind {
    /// Exact item id
    Item(String),
    /// Every item of a type
    Type(String),
    /// Every item carrying a tag
    Tag(String),
    /// Every item carrying any tag
    AnyTag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub negated: bool,
    pub kind: SelectorKind,
}

impl FromStr for Selector {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DependencyError::InvalidSelector {
            selector: s.to_string(),
        };
        let (negated, rest) = match s.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (prefix, name) = rest.split_once(':').ok_or_else(invalid)?;
        if prefix.is_empty() {
            return Err(invalid());
        }
        let kind = match (prefix, name) {
            ("tag", "") => SelectorKind::AnyTag,
            ("tag", tag) => SelectorKind::Tag(tag.to_string()),
            (type_name, "") => SelectorKind::Type(type_name.to_string()),
            _ => SelectorKind::Item(rest.to_string()),
        };
        Ok(Self { negated, kind })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("!")?;
        }
        match &self.kind {
            SelectorKind::Item(id) => f.write_str(id),
            SelectorKind::Type(type_name) => write!(f, "{type_name}:"),
            SelectorKind::Tag(tag) => write!(f, "tag:{tag}"),
            SelectorKind::AnyTag => f.write_str("tag:"),
        }
    }
}

impl Selector {
    /// Whether the selector matches a node
    ///
    /// `originating_tag` is excluded from `tag:` matches.
    pub fn matches(&self, node: &GraphNode, originating_tag: Option<&str>) -> bool {
        let hit = match &self.kind {
            SelectorKind::Item(id) => node.id == *id,
            SelectorKind::Type(type_name) => node.type_name == type_name,
            SelectorKind::Tag(tag) => node.tags.contains(tag),
            SelectorKind::AnyTag => node
                .tags
                .iter()
                .any(|tag| Some(tag.as_str()) != originating_tag),
        };
        hit != self.negated
    }

    /// Exact, non-negated lookups must find their item
    pub fn is_exact(&self) -> bool {
        !self.negated && matches!(self.kind, SelectorKind::Item(_))
    }
}

/// Resolve a selector against a set of items
///
/// The originating item is never part of its own selector's results.
pub fn resolve<'a>(
    selector: &str,
    nodes: &'a NodeMap,
    originating_item: Option<&str>,
    originating_tag: Option<&str>,
) -> Result<Vec<&'a GraphNode>> {
    let parsed: Selector = selector.parse()?;

    if let SelectorKind::Item(id) = &parsed.kind
        && !parsed.negated
    {
        let node = nodes
            .get(id)
            .ok_or_else(|| DependencyError::NoSuchItem { id: id.clone() })?;
        if originating_item == Some(id.as_str()) {
            return Ok(Vec::new());
        }
        return Ok(vec![node]);
    }

    Ok(nodes
        .values()
        .filter(|node| originating_item != Some(node.id.as_str()))
        .filter(|node| parsed.matches(node, originating_tag))
        .collect())
}

/// Resolve to ids, for passes that need to mutate the matched nodes
pub(crate) fn resolve_ids(
    selector: &str,
    nodes: &NodeMap,
    originating_item: Option<&str>,
    originating_tag: Option<&str>,
) -> Result<Vec<String>> {
    Ok(resolve(selector, nodes, originating_item, originating_tag)?
        .into_iter()
        .map(|node| node.id.clone())
        .collect())
}
