//! `converge plot`

use anyhow::Result;
use itemgraph::{PlotOptions, to_dot};

use crate::cli::PlotArgs;

pub fn run(args: PlotArgs) -> Result<()> {
    let (graph, _) = super::prepare(args.node.node_file.as_deref())?;
    let options = PlotOptions {
        cluster: !args.no_cluster,
        show_fillers: args.show_fillers,
        show_concurrency: !args.no_concurrency,
    };
    print!("{}", to_dot(&graph, &options));
    Ok(())
}
