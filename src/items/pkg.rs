//! System package managed through shell command templates
//!
//! The templates default to apt; `{name}` is replaced with the package name.

use anyhow::{Result, bail};
use itemgraph::{ApplyContext, Item, ItemAttributes, ItemState, ItemStatus, StateDict};
use serde::Deserialize;

use super::{ItemConfigError, check_command_name, render};

const CHECK: &str = "dpkg-query -W -f='${Status}' {name} 2>/dev/null | grep -q 'ok installed'";
const INSTALL: &str = "DEBIAN_FRONTEND=noninteractive apt-get install -y -q {name}";
const REMOVE: &str = "DEBIAN_FRONTEND=noninteractive apt-get remove -y -q {name}";

fn default_installed() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PkgConfig {
    #[serde(default = "default_installed")]
    installed: bool,
    check: Option<String>,
    install: Option<String>,
    remove: Option<String>,
}

#[derive(Debug)]
pub struct Pkg {
    name: String,
    bundle: String,
    attributes: ItemAttributes,
    installed: bool,
    check: String,
    install: String,
    remove: String,
}

impl Pkg {
    pub fn new(
        bundle: &str,
        name: &str,
        attributes: ItemAttributes,
        config: PkgConfig,
    ) -> Result<Self, ItemConfigError> {
        check_command_name(&format!("pkg:{name}"), name)?;
        Ok(Self {
            name: name.to_string(),
            bundle: bundle.to_string(),
            attributes,
            installed: config.installed,
            check: render(config.check.as_deref().unwrap_or(CHECK), name),
            install: render(config.install.as_deref().unwrap_or(INSTALL), name),
            remove: render(config.remove.as_deref().unwrap_or(REMOVE), name),
        })
    }
}

impl Item for Pkg {
    fn type_name(&self) -> &'static str {
        "pkg"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn bundle(&self) -> &str {
        &self.bundle
    }

    fn attributes(&self) -> &ItemAttributes {
        &self.attributes
    }

    fn description(&self) -> String {
        if self.installed {
            format!("Package {}", self.name)
        } else {
            format!("Package {} (absent)", self.name)
        }
    }

    /// The package database takes a lock, so packages install one at a time
    fn block_concurrent(&self, _os: &str, _os_version: &[u32]) -> Vec<String> {
        vec!["pkg".to_string()]
    }

    fn desired_state(&self) -> ItemState {
        if self.installed {
            ItemState::Present(StateDict::new())
        } else {
            ItemState::Absent
        }
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<ItemState> {
        if ctx.runner.run_status(&self.check)? {
            Ok(ItemState::Present(StateDict::new()))
        } else {
            Ok(ItemState::Absent)
        }
    }

    fn fix(&self, status: &ItemStatus, ctx: &ApplyContext) -> Result<()> {
        let command = if status.must_remove() {
            &self.remove
        } else {
            &self.install
        };
        let output = ctx.runner.run(command)?;
        if !output.success {
            bail!("`{command}` failed: {}", output.stderr_str().trim());
        }
        Ok(())
    }
}
