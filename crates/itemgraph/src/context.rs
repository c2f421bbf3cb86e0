//! Apply context and provider traits
//!
//! These traits keep the scheduling core independent of how commands
//! reach the node and how progress is shown.

use crate::types::{CommandOutput, ItemResult};
use anyhow::Result;

/// Runs commands on the node being converged
///
/// Implementations must be safe to call from several workers at once.
pub trait CommandRunner: Send + Sync {
    /// Run a shell command
    fn run(&self, command: &str) -> Result<CommandOutput>;

    /// Run a command and return just success/failure
    fn run_status(&self, command: &str) -> Result<bool> {
        Ok(self.run(command)?.success)
    }
}

/// Runner for item sets that never execute commands
pub struct NoRunner;

impl CommandRunner for NoRunner {
    fn run(&self, command: &str) -> Result<CommandOutput> {
        anyhow::bail!("no command runner available to run '{command}'")
    }
}

/// Progress callback for execution
///
/// Always invoked from the coordinating thread, never from workers.
pub trait ProgressCallback {
    /// Called once before the first item is handed out
    fn on_run_start(&mut self, total: usize);

    /// Called when an item is handed to a worker
    fn on_item_start(&mut self, id: &str);

    /// Called for every entry of the result stream, including cascaded skips
    fn on_item_complete(&mut self, result: &ItemResult);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_item_start(&mut self, _id: &str) {}
    fn on_item_complete(&mut self, _result: &ItemResult) {}
}

/// Context passed to item status and fix operations
#[derive(Clone, Copy)]
pub struct ApplyContext<'a> {
    /// Runner for commands on the node
    pub runner: &'a dyn CommandRunner,
    /// Name of the node being converged
    pub node_name: &'a str,
}

impl<'a> ApplyContext<'a> {
    /// Create a new apply context
    pub fn new(runner: &'a dyn CommandRunner, node_name: &'a str) -> Self {
        Self { runner, node_name }
    }
}
