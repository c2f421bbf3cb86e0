//! Item trait for declarative state convergence
//!
//! An Item is one desired-state assertion about a node: a file's content,
//! an installed package, a running service. The scheduling core only sees
//! items through this trait.

use crate::context::ApplyContext;
use crate::types::{ItemState, ItemStatus};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Dependency-related attributes declared for an item
///
/// All relation fields hold selector strings (`type:name`, `type:`,
/// `tag:name`, `tag:`, optionally prefixed with `!`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemAttributes {
    /// Items that must be applied before this one
    pub needs: BTreeSet<String>,
    /// Items that must be applied after this one
    pub needed_by: BTreeSet<String>,
    /// Triggered items that run when this item changes something
    pub triggers: BTreeSet<String>,
    /// Items whose changes trigger this one
    pub triggered_by: BTreeSet<String>,
    /// Items this triggered item runs before, if they need fixing
    pub precedes: BTreeSet<String>,
    /// Triggered items that run before this item, if it needs fixing
    pub preceded_by: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    /// Only apply when triggered by another item
    pub triggered: bool,
    /// Whether dependents are skipped when this item fails or is skipped
    ///
    /// Defaults to true unless the item has an `unless` guard or is triggered.
    pub cascade_skip: Option<bool>,
    /// Command that, when successful, makes applying this item unnecessary
    pub unless: Option<String>,
    /// Fail instead of skip when a fault cannot be resolved
    pub error_on_missing_fault: bool,
}

impl ItemAttributes {
    /// Effective cascade_skip flag
    pub fn cascade_skip(&self) -> bool {
        self.cascade_skip
            .unwrap_or(!(self.unless.is_some() || self.triggered))
    }

    pub fn with_needs<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.needs.extend(selectors.into_iter().map(Into::into));
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn triggered(mut self) -> Self {
        self.triggered = true;
        self
    }
}

/// A triggered action provided by an item type, e.g. a service restart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedActionSpec {
    pub command: String,
    pub expected_return_code: i32,
    /// Extra relations of the action; `triggered` is always forced on
    pub attributes: ItemAttributes,
}

impl CannedActionSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            expected_return_code: 0,
            attributes: ItemAttributes::default(),
        }
    }

    pub fn with_needs<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = self.attributes.with_needs(selectors);
        self
    }
}

/// Core trait for all item types
///
/// Every item type implements this trait, which provides:
/// - Identity (type, name, bundle)
/// - Declared relations (via [`ItemAttributes`])
/// - Capability hooks used while building the graph
/// - State detection and convergence
///
/// # Example
///
/// ```ignore
/// use itemgraph::{ApplyContext, Item, ItemAttributes, ItemState, ItemStatus};
///
/// #[derive(Debug)]
/// struct Marker { name: String, attributes: ItemAttributes }
///
/// impl Item for Marker {
///     fn type_name(&self) -> &'static str { "marker" }
///     fn name(&self) -> &str { &self.name }
///     fn bundle(&self) -> &str { "base" }
///     fn attributes(&self) -> &ItemAttributes { &self.attributes }
///
///     fn desired_state(&self) -> ItemState {
///         ItemState::Present(Default::default())
///     }
///
///     fn current_state(&self, _ctx: &ApplyContext) -> anyhow::Result<ItemState> {
///         Ok(if std::path::Path::new(&self.name).exists() {
///             ItemState::Present(Default::default())
///         } else {
///             ItemState::Absent
///         })
///     }
///
///     fn fix(&self, _status: &ItemStatus, _ctx: &ApplyContext) -> anyhow::Result<()> {
///         std::fs::write(&self.name, "")?;
///         Ok(())
///     }
/// }
/// ```
pub trait Item: Send + Sync + fmt::Debug {
    /// Item type, e.g. "file" or "pkg"
    fn type_name(&self) -> &'static str;

    /// Name within the type; must not contain a colon
    fn name(&self) -> &str;

    /// Unique identifier, `type:name`
    fn id(&self) -> String {
        format!("{}:{}", self.type_name(), self.name())
    }

    /// Bundle that declared this item
    fn bundle(&self) -> &str;

    /// Declared relations and flags
    fn attributes(&self) -> &ItemAttributes;

    /// Human-readable description
    fn description(&self) -> String {
        self.id()
    }

    /// Selectors of items this item implicitly depends on
    ///
    /// Called once per run with every item of the node.
    fn auto_deps(&self, _items: &[&dyn Item]) -> Vec<String> {
        Vec::new()
    }

    /// Triggered actions this item offers, keyed by action name
    fn canned_actions(&self) -> BTreeMap<String, CannedActionSpec> {
        BTreeMap::new()
    }

    /// Item types that must never be applied concurrently with this type
    fn block_concurrent(&self, _os: &str, _os_version: &[u32]) -> Vec<String> {
        Vec::new()
    }

    /// Names of secrets this item needs but cannot resolve
    fn unavailable_faults(&self) -> Vec<String> {
        Vec::new()
    }

    /// Actions have no state; applying them means running them
    fn is_action(&self) -> bool {
        false
    }

    /// Desired state, derived from configuration
    fn desired_state(&self) -> ItemState {
        ItemState::Absent
    }

    /// Query the node for the current state
    fn current_state(&self, _ctx: &ApplyContext) -> Result<ItemState> {
        Ok(ItemState::Absent)
    }

    /// Compare current and desired state
    fn status(&self, ctx: &ApplyContext) -> Result<ItemStatus> {
        Ok(ItemStatus::compare(
            self.current_state(ctx)?,
            self.desired_state(),
        ))
    }

    /// Converge the node towards the desired state
    ///
    /// For actions this runs the action.
    fn fix(&self, status: &ItemStatus, ctx: &ApplyContext) -> Result<()>;
}

/// A boxed item for type-erased storage
pub type BoxedItem = Box<dyn Item>;

/// Split an id into type and name at the first colon
pub fn split_id(id: &str) -> Option<(&str, &str)> {
    id.split_once(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_skip_defaults() {
        let attrs = ItemAttributes::default();
        assert!(attrs.cascade_skip());

        let attrs = ItemAttributes::default().triggered();
        assert!(!attrs.cascade_skip());

        let attrs = ItemAttributes {
            unless: Some("true".into()),
            ..Default::default()
        };
        assert!(!attrs.cascade_skip());

        let attrs = ItemAttributes {
            unless: Some("true".into()),
            cascade_skip: Some(true),
            ..Default::default()
        };
        assert!(attrs.cascade_skip());
    }

    #[test]
    fn test_split_id() {
        assert_eq!(split_id("file:/etc/hosts"), Some(("file", "/etc/hosts")));
        assert_eq!(
            split_id("svc:nginx:restart"),
            Some(("svc", "nginx:restart"))
        );
        assert_eq!(split_id("nocolon"), None);
    }
}
