//! `converge items`

use anyhow::Result;
use colored::Colorize;
use itemgraph::GraphNode;
use std::collections::BTreeSet;

use crate::Context;
use crate::cli::NodeArgs;
use crate::ui;

pub fn run(ctx: &Context, args: NodeArgs) -> Result<()> {
    let (graph, _) = super::prepare(args.node_file.as_deref())?;

    ui::header(&format!("{} ({} items)", graph.node_name, graph.len()));
    for node in graph.iter() {
        println!();
        println!("{} {}", node.id.bold(), format!("[{}]", node.bundle).dimmed());
        let flags = flags(node);
        if !flags.is_empty() {
            ui::kv("flags", &flags.join(", "));
        }
        for (label, ids) in relations(node, ctx.verbose > 0) {
            ui::kv(label, &ids);
        }
    }
    Ok(())
}

fn flags(node: &GraphNode) -> Vec<&'static str> {
    let mut flags = Vec::new();
    if node.synthetic {
        flags.push("synthesized");
    }
    if node.triggered {
        flags.push("triggered");
    }
    if !node.cascade_skip {
        flags.push("no cascade");
    }
    if node.unless.is_some() {
        flags.push("unless");
    }
    flags
}

/// Non-empty relation lists, labelled for display
fn relations(node: &GraphNode, verbose: bool) -> Vec<(&'static str, String)> {
    let join = |ids: &BTreeSet<String>| ids.iter().cloned().collect::<Vec<_>>().join(", ");
    let needs: BTreeSet<String> = node
        .direct_deps
        .difference(&node.concurrency_deps)
        .cloned()
        .collect();

    let mut lists = vec![
        ("tags", join(&node.tags)),
        ("needs", join(&needs)),
        ("after (concurrency)", join(&node.concurrency_deps)),
        ("triggers", join(&node.trigger_targets)),
        ("precedes", join(&node.precedes_items)),
        ("blocks", join(&node.blocks_concurrent)),
    ];
    if verbose {
        lists.push(("all deps", join(&node.flattened_deps)));
        lists.push(("needed by", join(&node.incoming_deps)));
    }
    lists.retain(|(_, ids)| !ids.is_empty());
    lists
}
