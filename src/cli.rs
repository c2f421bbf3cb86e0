use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge a node towards its declared configuration items", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply every item of the node, fixing what is incorrect
    Apply(ApplyArgs),

    /// Check every item without changing anything
    Verify(VerifyArgs),

    /// List items with their dependencies and triggers
    Items(NodeArgs),

    /// Print the dependency graph in Graphviz DOT format
    Plot(PlotArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct NodeArgs {
    /// Node definition file (default: ~/.config/converge/node.toml)
    pub node_file: Option<PathBuf>,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub node: NodeArgs,

    /// Number of parallel workers (default: [run] workers, then 4)
    #[arg(short, long, env = "CONVERGE_WORKERS")]
    pub workers: Option<usize>,

    /// Skip items matching this selector (repeatable)
    #[arg(short, long = "skip", value_name = "SELECTOR")]
    pub skip: Vec<String>,

    /// Treat soft locks held by this owner as your own
    #[arg(long, env = "CONVERGE_LOCK_OWNER", value_name = "NAME")]
    pub lock_owner: Option<String>,

    /// Print the result stream as JSON instead of progress output
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub node: NodeArgs,

    /// Number of parallel workers (default: [run] workers, then 4)
    #[arg(short, long, env = "CONVERGE_WORKERS")]
    pub workers: Option<usize>,
}

#[derive(Args)]
pub struct PlotArgs {
    #[command(flatten)]
    pub node: NodeArgs,

    /// Include tag filler items
    #[arg(long)]
    pub show_fillers: bool,

    /// Do not group items by bundle
    #[arg(long)]
    pub no_cluster: bool,

    /// Hide edges that only serialize mutually exclusive item types
    #[arg(long)]
    pub no_concurrency: bool,
}
