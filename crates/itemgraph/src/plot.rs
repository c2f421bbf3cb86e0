//! Graphviz rendering of an annotated item graph

use crate::graph::{GraphNode, ItemGraph};
use std::collections::BTreeMap;

/// Options for [`to_dot`]
#[derive(Debug, Clone)]
pub struct PlotOptions {
    /// Group items into one cluster per bundle
    pub cluster: bool,
    /// Include tag fillers
    pub show_fillers: bool,
    /// Include edges added only to serialize mutually exclusive types
    pub show_concurrency: bool,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            cluster: true,
            show_fillers: false,
            show_concurrency: true,
        }
    }
}

const NEEDS_COLOR: &str = "#C24948";
const TRIGGER_COLOR: &str = "#FF9A00";
const CONCURRENCY_COLOR: &str = "#714D99";

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Render the graph in DOT format
///
/// Edges point from an item to what it depends on. Trigger edges point
/// from the triggering item to the triggered one.
pub fn to_dot(graph: &ItemGraph, options: &PlotOptions) -> String {
    let visible = |node: &GraphNode| options.show_fillers || !node.is_tag_filler();
    let mut lines = vec![
        format!("digraph {} {{", quote(&graph.node_name)),
        "    rankdir = LR".to_string(),
        "    graph [fontname=\"Helvetica\"]".to_string(),
        "    node [fontname=\"Helvetica\", shape=box]".to_string(),
        "    edge [arrowhead=vee]".to_string(),
    ];

    let mut bundles: BTreeMap<&str, Vec<&GraphNode>> = BTreeMap::new();
    for node in graph.iter().filter(|n| visible(n)) {
        bundles.entry(node.bundle.as_str()).or_default().push(node);
    }
    for (bundle, nodes) in &bundles {
        let indent = if options.cluster {
            lines.push(format!("    subgraph {} {{", quote(&format!("cluster_{bundle}"))));
            lines.push(format!("        label = {}", quote(bundle)));
            "        "
        } else {
            "    "
        };
        for node in nodes {
            lines.push(format!("{indent}{}{}", quote(&node.id), node_style(node)));
        }
        if options.cluster {
            lines.push("    }".to_string());
        }
    }

    for node in graph.iter().filter(|n| visible(n)) {
        for dep_id in &node.direct_deps {
            let Some(dep) = graph.get(dep_id) else {
                continue;
            };
            if !visible(dep) || dep.trigger_targets.contains(&node.id) {
                continue;
            }
            let style = if node.concurrency_deps.contains(dep_id) {
                if !options.show_concurrency {
                    continue;
                }
                format!("color=\"{CONCURRENCY_COLOR}\", style=dotted")
            } else if node.reverse_deps.contains(dep_id) {
                format!("color=\"{NEEDS_COLOR}\", style=dashed")
            } else {
                format!("color=\"{NEEDS_COLOR}\"")
            };
            lines.push(format!("    {} -> {} [{style}]", quote(&node.id), quote(dep_id)));
        }
        for target in &node.trigger_targets {
            lines.push(format!(
                "    {} -> {} [color=\"{TRIGGER_COLOR}\", penwidth=2]",
                quote(&node.id),
                quote(target)
            ));
        }
    }

    lines.push("}".to_string());
    lines.join("\n") + "\n"
}

fn node_style(node: &GraphNode) -> &'static str {
    if node.is_tag_filler() {
        " [style=dotted]"
    } else if node.triggered {
        " [style=dashed]"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::prepare_dependencies;
    use crate::item::BoxedItem;
    use crate::node::{Bundle, Node, TagDefinition};
    use crate::testing::TestItem;

    fn sample() -> ItemGraph {
        let node = Node::new("web1")
            .with_bundle(Bundle::new("nginx").with_tag("empty", TagDefinition::default()));
        let items: Vec<BoxedItem> = vec![
            Box::new(
                TestItem::new("file:/conf")
                    .bundle("nginx")
                    .needs(["pkg:nginx", "tag:empty"])
                    .triggers(["action:reload"]),
            ),
            Box::new(TestItem::new("pkg:nginx").bundle("nginx").blocks(["pkg"])),
            Box::new(TestItem::new("pkg:curl").bundle("base").blocks(["pkg"])),
            Box::new(TestItem::new("action:reload").bundle("nginx").triggered()),
        ];
        prepare_dependencies(&node, items).unwrap()
    }

    #[test]
    fn test_dot_output() {
        let dot = to_dot(&sample(), &PlotOptions::default());
        assert!(dot.starts_with("digraph \"web1\" {"));
        assert!(dot.contains("subgraph \"cluster_nginx\""));
        assert!(dot.contains("\"file:/conf\" -> \"pkg:nginx\" [color=\"#C24948\"]"));
        assert!(dot.contains("\"file:/conf\" -> \"action:reload\" [color=\"#FF9A00\", penwidth=2]"));
        assert!(dot.contains("\"pkg:nginx\" -> \"pkg:curl\" [color=\"#714D99\", style=dotted]"));
        // the dependency created by the trigger is drawn as the trigger edge only
        assert!(!dot.contains("\"action:reload\" -> \"file:/conf\""));
        assert!(!dot.contains("tag_filler"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_dot_options() {
        let options = PlotOptions {
            cluster: false,
            show_fillers: true,
            show_concurrency: false,
        };
        let dot = to_dot(&sample(), &options);
        assert!(!dot.contains("subgraph"));
        assert!(dot.contains("\"tag_filler:empty\" [style=dotted]"));
        assert!(!dot.contains("#714D99"));
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
    }
}
