pub mod apply;
pub mod items;
pub mod plot;
pub mod verify;

use anyhow::{Context as AnyhowContext, Result};
use itemgraph::{ItemGraph, prepare_dependencies};
use std::path::Path;

use crate::config::LoadedNode;
use crate::paths;

/// Load a node file and build its dependency graph
///
/// The returned node has its items moved into the graph.
pub(crate) fn prepare(node_file: Option<&Path>) -> Result<(ItemGraph, LoadedNode)> {
    let path = paths::node_file(node_file)?;
    let mut loaded = LoadedNode::load(&path)?;
    let items = std::mem::take(&mut loaded.items);
    let graph = prepare_dependencies(&loaded.node, items)
        .with_context(|| format!("Could not build dependency graph for {}", loaded.node.name))?;
    Ok((graph, loaded))
}
