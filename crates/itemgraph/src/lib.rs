//! # Itemgraph
//!
//! Dependency resolution and concurrent scheduling for declarative
//! configuration items.
//!
//! A node is described by a set of items, each asserting some desired
//! state. Items declare relations to each other through selectors; this
//! crate turns those declarations into a dependency graph and converges
//! the node by applying items on a pool of worker threads.
//!
//! ## Core Concepts
//!
//! - **Item**: one desired-state assertion with a type, a name and relations
//! - **Selector**: `type:name`, `type:`, `tag:name` or `tag:`, optionally negated with `!`
//! - **ItemGraph**: items annotated with direct, flattened, trigger and concurrency edges
//! - **ItemQueue**: ready/blocked/pending bookkeeping used while a run is in progress
//! - **Trigger**: a triggered item only runs when an item triggering it changed something
//! - **Cascade skip**: a failed or skipped item takes its dependents with it
//!
//! ## Example
//!
//! ```ignore
//! use itemgraph::{
//!     ApplyContext, ExecuteOptions, Item, ItemAttributes, ItemState, ItemStatus, Node,
//!     NoProgress, execute, prepare_dependencies,
//! };
//!
//! #[derive(Debug)]
//! struct Marker { name: String, attributes: ItemAttributes }
//!
//! impl Item for Marker {
//!     fn type_name(&self) -> &'static str { "marker" }
//!     fn name(&self) -> &str { &self.name }
//!     fn bundle(&self) -> &str { "base" }
//!     fn attributes(&self) -> &ItemAttributes { &self.attributes }
//!
//!     fn current_state(&self, _ctx: &ApplyContext) -> anyhow::Result<ItemState> {
//!         Ok(ItemState::Absent)
//!     }
//!
//!     fn fix(&self, _status: &ItemStatus, _ctx: &ApplyContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let graph = prepare_dependencies(&Node::new("web1"), items)?;
//! let report = execute(&graph, &ExecuteOptions::default(), &runner, &mut NoProgress)?;
//! println!("{} changes", report.summary().total_changes());
//! ```
//!
//! ## Provider Traits
//!
//! - [`CommandRunner`]: runs commands on the node (guards, actions, item probes)
//! - [`ProgressCallback`]: receives results as they become available
//!
//! This keeps the core free of any transport or terminal UI.

pub mod apply;
pub mod builtin;
pub mod context;
pub mod deps;
pub mod error;
pub mod executor;
pub mod graph;
pub mod item;
pub mod node;
pub mod plot;
pub mod queue;
pub mod selector;
pub mod types;
pub mod verify;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use apply::{SkipPolicy, apply_item};
pub use builtin::{ACTION_TYPE, CommandAction, TAG_FILLER_TYPE, TagFiller};
pub use context::{ApplyContext, CommandRunner, NoProgress, NoRunner, ProgressCallback};
pub use deps::prepare_dependencies;
pub use error::{DependencyError, RunError};
pub use executor::execute;
pub use graph::{DepSelector, GraphNode, ItemGraph};
pub use item::{BoxedItem, CannedActionSpec, Item, ItemAttributes};
pub use node::{Bundle, Node, TagDefinition};
pub use plot::{PlotOptions, to_dot};
pub use queue::ItemQueue;
pub use selector::{Selector, SelectorKind};
pub use types::{
    ApplyOutcome, CommandOutput, ExecuteOptions, ItemResult, ItemState, ItemStatus, RunReport,
    RunSummary, SkipReason, SoftLock, StateDict,
};
pub use verify::{VerifyOutcome, VerifyResult, verify};
