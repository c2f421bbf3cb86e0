//! Core types for item convergence

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::process::Output;
use std::time::Duration;

/// Flat key/value view of an item's state
pub type StateDict = BTreeMap<String, String>;

/// Current or desired state of an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    /// Item exists with the given attributes
    Present(StateDict),
    /// Item does not exist
    Absent,
}

impl ItemState {
    /// Check if state represents presence
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Check if state represents absence
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Comparison of current and desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStatus {
    pub current: ItemState,
    pub desired: ItemState,
    /// Keys whose values differ; empty when the item is correct
    pub keys_to_fix: Vec<String>,
}

impl ItemStatus {
    /// Compare two states key by key
    pub fn compare(current: ItemState, desired: ItemState) -> Self {
        let keys_to_fix = match (&current, &desired) {
            (ItemState::Absent, ItemState::Absent) => Vec::new(),
            (ItemState::Absent, ItemState::Present(_)) => vec!["exists".to_string()],
            (ItemState::Present(_), ItemState::Absent) => vec!["exists".to_string()],
            (ItemState::Present(cur), ItemState::Present(want)) => want
                .iter()
                .filter(|(key, value)| cur.get(*key) != Some(*value))
                .map(|(key, _)| key.clone())
                .collect(),
        };
        Self {
            current,
            desired,
            keys_to_fix,
        }
    }

    /// Whether current state already matches desired state
    pub fn is_correct(&self) -> bool {
        self.keys_to_fix.is_empty()
    }

    /// Whether the item has to be created
    pub fn must_create(&self) -> bool {
        self.current.is_absent() && self.desired.is_present()
    }

    /// Whether the item has to be removed
    pub fn must_remove(&self) -> bool {
        self.current.is_present() && self.desired.is_absent()
    }
}

/// Why an item was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Matched an explicit skip selector
    Selected,
    /// Covered by another operator's soft lock
    SoftLocked,
    /// Triggered item that nothing triggered during this run
    NotTriggered,
    /// `unless` guard reported success
    Unless,
    /// Required secret material is unavailable
    FaultUnavailable,
    /// A dependency failed
    DependencyFailed,
    /// A dependency was skipped
    DependencySkipped,
    /// A dependency was skipped because of a soft lock
    DependencySoftLocked,
}

impl SkipReason {
    /// Reason reported for items cascaded from a skipped item
    pub fn cascaded(self) -> Self {
        match self {
            Self::SoftLocked | Self::DependencySoftLocked => Self::DependencySoftLocked,
            _ => Self::DependencySkipped,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Selected => "selected for skip",
            Self::SoftLocked => "soft locked",
            Self::NotTriggered => "not triggered",
            Self::Unless => "unless",
            Self::FaultUnavailable => "fault unavailable",
            Self::DependencyFailed => "dependency failed",
            Self::DependencySkipped => "dependency skipped",
            Self::DependencySoftLocked => "dependency soft locked",
        };
        f.write_str(text)
    }
}

/// Terminal outcome of applying one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// No change was needed
    Ok,
    /// Item was changed and is now correct
    Fixed,
    /// Action command ran successfully
    ActionSucceeded,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: SkipReason },
}

impl ApplyOutcome {
    /// Check if the outcome represents a change that fires triggers
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Fixed | Self::ActionSucceeded)
    }

    /// Check if the outcome is a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub(crate) fn failed(error: impl fmt::Display) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }

    pub(crate) fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Fixed => f.write_str("fixed"),
            Self::ActionSucceeded => f.write_str("action succeeded"),
            Self::Failed { error } => write!(f, "failed: {error}"),
            Self::Skipped { reason } => write!(f, "skipped ({reason})"),
        }
    }
}

/// One entry of the result stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub item_id: String,
    pub outcome: ApplyOutcome,
    pub duration: Duration,
}

/// Summary of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub ok: usize,
    pub fixed: usize,
    pub actions: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.fixed + self.actions
    }

    /// Check if the run was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of items processed
    pub fn total(&self) -> usize {
        self.ok + self.fixed + self.actions + self.skipped + self.failed
    }

    /// Add a result to the summary
    pub fn add_outcome(&mut self, outcome: &ApplyOutcome) {
        match outcome {
            ApplyOutcome::Ok => self.ok += 1,
            ApplyOutcome::Fixed => self.fixed += 1,
            ApplyOutcome::ActionSucceeded => self.actions += 1,
            ApplyOutcome::Failed { .. } => self.failed += 1,
            ApplyOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Everything the executor produced for one node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// Results in the order they became available
    pub results: Vec<ItemResult>,
    pub duration: Duration,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for result in &self.results {
            summary.add_outcome(&result.outcome);
        }
        summary
    }

    /// Look up the result for an item
    pub fn get(&self, item_id: &str) -> Option<&ItemResult> {
        self.results.iter().find(|r| r.item_id == item_id)
    }
}

/// Soft lock held by an operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftLock {
    pub id: String,
    pub owner: String,
    /// Selectors of the items covered by this lock
    #[serde(default)]
    pub items: Vec<String>,
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Number of parallel workers
    pub workers: usize,
    /// Items matching any of these selectors are skipped
    pub skip: Vec<String>,
    /// Locks held by whoever runs this apply; they override other locks
    pub my_soft_locks: Vec<SoftLock>,
    /// Locks held by other operators
    pub other_soft_locks: Vec<SoftLock>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            skip: Vec::new(),
            my_soft_locks: Vec::new(),
            other_soft_locks: Vec::new(),
        }
    }
}

/// Output from a command run on the node
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code, `None` if terminated by a signal
    pub code: Option<i32>,
    pub success: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            code: output.status.code(),
            success: output.status.success(),
        }
    }
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
