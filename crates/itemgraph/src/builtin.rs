//! Item types provided by the core
//!
//! - [`CommandAction`]: runs a command; also used for canned actions
//! - [`TagFiller`]: zero-effect anchor for tags no item carries

use crate::context::ApplyContext;
use crate::item::{CannedActionSpec, Item, ItemAttributes};
use crate::types::ItemStatus;
use anyhow::{Result, bail};

/// Item type name of actions
pub const ACTION_TYPE: &str = "action";

/// Item type name of tag fillers
pub const TAG_FILLER_TYPE: &str = "tag_filler";

/// An action that runs a command on the node
#[derive(Debug, Clone)]
pub struct CommandAction {
    id: String,
    name: String,
    bundle: String,
    pub command: String,
    pub expected_return_code: i32,
    attributes: ItemAttributes,
}

impl CommandAction {
    /// A user-declared action, id `action:{name}`
    pub fn new(
        bundle: impl Into<String>,
        name: impl Into<String>,
        command: impl Into<String>,
        attributes: ItemAttributes,
    ) -> Self {
        let name = name.into();
        Self {
            id: format!("{ACTION_TYPE}:{name}"),
            name,
            bundle: bundle.into(),
            command: command.into(),
            expected_return_code: 0,
            attributes,
        }
    }

    /// A canned action of another item, id `{owner_id}:{action_name}`
    pub fn canned(owner: &dyn Item, action_name: &str, spec: CannedActionSpec) -> Self {
        let mut attributes = spec.attributes;
        attributes.triggered = true;
        Self {
            id: format!("{}:{action_name}", owner.id()),
            name: action_name.to_string(),
            bundle: owner.bundle().to_string(),
            command: spec.command,
            expected_return_code: spec.expected_return_code,
            attributes,
        }
    }

    pub fn with_expected_return_code(mut self, code: i32) -> Self {
        self.expected_return_code = code;
        self
    }
}

impl Item for CommandAction {
    fn type_name(&self) -> &'static str {
        ACTION_TYPE
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn bundle(&self) -> &str {
        &self.bundle
    }

    fn attributes(&self) -> &ItemAttributes {
        &self.attributes
    }

    fn description(&self) -> String {
        format!("Run `{}`", self.command)
    }

    fn is_action(&self) -> bool {
        true
    }

    fn fix(&self, _status: &ItemStatus, ctx: &ApplyContext) -> Result<()> {
        let output = ctx.runner.run(&self.command)?;
        if output.code != Some(self.expected_return_code) {
            bail!(
                "{} returned {} (expected {}): {}",
                self.id,
                output
                    .code
                    .map_or_else(|| "no exit code".to_string(), |c| c.to_string()),
                self.expected_return_code,
                output.stderr_str().trim()
            );
        }
        Ok(())
    }
}

/// Zero-effect item carrying a tag that would otherwise match nothing
#[derive(Debug, Clone)]
pub struct TagFiller {
    tag: String,
    bundle: String,
    attributes: ItemAttributes,
}

impl TagFiller {
    pub fn new(bundle: impl Into<String>, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self {
            attributes: ItemAttributes::default().with_tags([tag.clone()]),
            tag,
            bundle: bundle.into(),
        }
    }
}

impl Item for TagFiller {
    fn type_name(&self) -> &'static str {
        TAG_FILLER_TYPE
    }

    fn name(&self) -> &str {
        &self.tag
    }

    fn bundle(&self) -> &str {
        &self.bundle
    }

    fn attributes(&self) -> &ItemAttributes {
        &self.attributes
    }

    fn description(&self) -> String {
        format!("Placeholder for tag '{}'", self.tag)
    }

    fn fix(&self, _status: &ItemStatus, _ctx: &ApplyContext) -> Result<()> {
        Ok(())
    }
}
