//! Error types for graph construction and execution
//!
//! Configuration errors abort a run before any item executes. The only
//! fatal runtime error is a dependency loop detected once the executor
//! has run out of work.

use thiserror::Error;

/// Fatal configuration errors raised while building the dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// Two items share the same id
    #[error("duplicate item '{id}' in bundles '{bundle}' and '{other_bundle}'")]
    DuplicateItem {
        id: String,
        bundle: String,
        other_bundle: String,
    },

    /// Item id is not of the form `type:name` or the name contains a colon
    #[error("invalid item id '{id}' in bundle '{bundle}': {reason}")]
    InvalidItemId {
        id: String,
        bundle: String,
        reason: String,
    },

    /// Item lists its own id in `needs`
    #[error("item '{id}' in bundle '{bundle}' depends on itself")]
    LoopbackDependency { id: String, bundle: String },

    /// Selector string cannot be parsed
    #[error("invalid selector '{selector}'")]
    InvalidSelector { selector: String },

    /// Exact item lookup found nothing
    #[error("no such item: {id}")]
    NoSuchItem { id: String },

    /// A dependency attribute references an item that does not exist
    #[error("'{attribute}' of item '{item}' in bundle '{bundle}' references unknown item '{selector}'")]
    UnresolvedSelector {
        item: String,
        bundle: String,
        attribute: &'static str,
        selector: String,
    },

    /// Item lists itself in `triggers`
    #[error("item '{item}' in bundle '{bundle}' triggers itself")]
    SelfTrigger { item: String, bundle: String },

    /// Trigger or precede target is missing the `triggered` flag
    #[error(
        "item '{target}' in bundle '{target_bundle}' is {relation} '{item}' in bundle '{bundle}', but is missing the 'triggered' attribute"
    )]
    NotTriggered {
        item: String,
        bundle: String,
        target: String,
        target_bundle: String,
        relation: &'static str,
    },

    /// `triggered` items must use trigger chains instead of `preceded_by`
    #[error(
        "triggered item '{item}' in bundle '{bundle}' must not use 'preceded_by' (use chained triggers instead)"
    )]
    TriggeredWithPrecededBy { item: String, bundle: String },
}

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum RunError {
    /// Graph construction failed
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// Items remained blocked after all runnable work was done
    #[error("dependency loop detected among {} items: {}", .items.len(), .items.join(", "))]
    DependencyLoop { items: Vec<String> },

    /// Worker threads could not be started or lost contact with the coordinator
    #[error("worker pool failure: {0}")]
    WorkerPool(String),
}

/// Result type for graph construction
pub type Result<T> = std::result::Result<T, DependencyError>;
