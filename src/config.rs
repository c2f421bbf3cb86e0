//! Node definition file
//!
//! ```toml
//! [node]
//! name = "web1"
//! os = "debian"
//! os_version = [12]
//!
//! [run]
//! workers = 4
//!
//! [[soft_locks]]
//! id = "a1b2"
//! owner = "alice"
//! items = ["pkg:"]
//!
//! [bundles.nginx.tags.web]
//! needs = ["pkg:nginx"]
//!
//! [bundles.nginx.items."pkg:nginx"]
//!
//! [bundles.nginx.items."file:/etc/nginx/nginx.conf"]
//! content = "..."
//! tags = ["web"]
//! triggers = ["svc:nginx:reload"]
//! ```

use anyhow::{Context, Result};
use itemgraph::{BoxedItem, Bundle, Node, SoftLock, TagDefinition};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::items;

/// Default worker count when neither the flag nor the file sets one
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeFile {
    pub node: NodeSection,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub soft_locks: Vec<SoftLock>,
    #[serde(default)]
    pub bundles: BTreeMap<String, BundleSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSection {
    pub name: String,
    #[serde(default = "default_os")]
    pub os: String,
    #[serde(default)]
    pub os_version: Vec<u32>,
}

fn default_os() -> String {
    "linux".to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    pub workers: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleSection {
    #[serde(default)]
    pub tags: BTreeMap<String, TagDefinition>,
    /// Item tables keyed by item id
    #[serde(default)]
    pub items: BTreeMap<String, toml::Table>,
}

/// A node file turned into library types
pub struct LoadedNode {
    pub node: Node,
    pub items: Vec<BoxedItem>,
    pub workers: Option<usize>,
    pub soft_locks: Vec<SoftLock>,
}

impl LoadedNode {
    /// Read and parse a node file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read node file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid node file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: NodeFile = toml::from_str(content)?;
        file.into_loaded()
    }

    /// Worker count: command line, then node file, then default
    pub fn workers(&self, flag: Option<usize>) -> usize {
        flag.or(self.workers).unwrap_or(DEFAULT_WORKERS).max(1)
    }

    /// Split soft locks into (mine, others) by owner
    pub fn split_soft_locks(&self, owner: Option<&str>) -> (Vec<SoftLock>, Vec<SoftLock>) {
        self.soft_locks
            .iter()
            .cloned()
            .partition(|lock| Some(lock.owner.as_str()) == owner)
    }
}

impl NodeFile {
    fn into_loaded(self) -> Result<LoadedNode> {
        let mut node = Node::new(self.node.name);
        node.os = self.node.os;
        node.os_version = self.node.os_version;

        let mut items = Vec::new();
        for (bundle_name, section) in self.bundles {
            for (id, table) in section.items {
                items.push(items::build_item(&bundle_name, &id, table)?);
            }
            node.bundles.push(Bundle {
                name: bundle_name,
                tags: section.tags,
            });
        }
        log::info!(
            "loaded {} items in {} bundles for {}",
            items.len(),
            node.bundles.len(),
            node.name
        );

        Ok(LoadedNode {
            node,
            items,
            workers: self.run.workers,
            soft_locks: self.soft_locks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::ItemConfigError;
    use std::io::Write;

    const SAMPLE: &str = r#"
[node]
name = "web1"
os = "debian"
os_version = [12]

[run]
workers = 8

[[soft_locks]]
id = "a1"
owner = "alice"
items = ["pkg:"]

[[soft_locks]]
id = "b2"
owner = "bob"
items = ["svc:nginx"]

[bundles.nginx.tags.web]
tags = ["frontend"]
needs = ["pkg:nginx"]

[bundles.nginx.items."pkg:nginx"]

[bundles.nginx.items."svc:nginx"]
needs = ["pkg:nginx"]

[bundles.base.items."action:hello"]
command = "echo hello"
triggered = true
"#;

    #[test]
    fn test_parse_sample() {
        let loaded = LoadedNode::parse(SAMPLE).unwrap();
        assert_eq!(loaded.node.name, "web1");
        assert_eq!(loaded.node.os, "debian");
        assert_eq!(loaded.node.os_version, vec![12]);
        assert_eq!(loaded.workers, Some(8));

        let ids: Vec<String> = loaded.items.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["action:hello", "pkg:nginx", "svc:nginx"]);
        assert_eq!(loaded.items[0].bundle(), "base");

        let nginx = loaded.node.bundles.iter().find(|b| b.name == "nginx").unwrap();
        assert!(nginx.tags["web"].tags.contains("frontend"));
    }

    #[test]
    fn test_defaults() {
        let loaded = LoadedNode::parse("[node]\nname = \"n\"").unwrap();
        assert_eq!(loaded.node.os, "linux");
        assert!(loaded.items.is_empty());
        assert_eq!(loaded.workers(None), DEFAULT_WORKERS);
        assert_eq!(loaded.workers(Some(0)), 1);
    }

    #[test]
    fn test_worker_precedence() {
        let loaded = LoadedNode::parse(SAMPLE).unwrap();
        assert_eq!(loaded.workers(None), 8);
        assert_eq!(loaded.workers(Some(2)), 2);
    }

    #[test]
    fn test_split_soft_locks() {
        let loaded = LoadedNode::parse(SAMPLE).unwrap();
        let (mine, others) = loaded.split_soft_locks(Some("alice"));
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "a1");
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].owner, "bob");

        let (mine, others) = loaded.split_soft_locks(None);
        assert!(mine.is_empty());
        assert_eq!(others.len(), 2);
    }

    #[test]
    fn test_invalid_item_is_reported() {
        let err = LoadedNode::parse("[node]\nname = \"n\"\n[bundles.b.items.\"cron:x\"]")
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<ItemConfigError>(),
            Some(ItemConfigError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        assert!(LoadedNode::parse("[node]\nname = \"n\"\n[extra]\nx = 1").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let loaded = LoadedNode::load(file.path()).unwrap();
        assert_eq!(loaded.items.len(), 3);

        let err = LoadedNode::load(Path::new("/nonexistent/node.toml")).err().unwrap();
        assert!(err.to_string().contains("Could not read node file"));
    }
}
