//! Node and bundle context consumed by the graph builder

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Relations declared at tag level in a bundle
///
/// Every item of the bundle carrying the tag receives these relations;
/// `tags` makes every item carrying the tag also carry the listed tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagDefinition {
    pub tags: BTreeSet<String>,
    pub needs: BTreeSet<String>,
    pub needed_by: BTreeSet<String>,
    pub precedes: BTreeSet<String>,
    pub preceded_by: BTreeSet<String>,
    pub triggers: BTreeSet<String>,
    pub triggered_by: BTreeSet<String>,
}

/// A named collection of items and tag declarations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    pub name: String,
    pub tags: BTreeMap<String, TagDefinition>,
}

impl Bundle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>, definition: TagDefinition) -> Self {
        self.tags.insert(tag.into(), definition);
        self
    }
}

/// The server being converged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub os: String,
    pub os_version: Vec<u32>,
    pub bundles: Vec<Bundle>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            os: "linux".to_string(),
            os_version: Vec::new(),
            bundles: Vec::new(),
        }
    }

    pub fn with_bundle(mut self, bundle: Bundle) -> Self {
        self.bundles.push(bundle);
        self
    }

    /// Every tag declared by any bundle, with the declaring bundle
    pub fn declared_tags(&self) -> impl Iterator<Item = (&Bundle, &str, &TagDefinition)> {
        self.bundles.iter().flat_map(|bundle| {
            bundle
                .tags
                .iter()
                .map(move |(tag, definition)| (bundle, tag.as_str(), definition))
        })
    }
}
