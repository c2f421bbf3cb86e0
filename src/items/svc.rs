//! Service managed through shell command templates
//!
//! The templates default to systemd; `{name}` is replaced with the unit name.

use anyhow::{Result, bail};
use itemgraph::{ApplyContext, CannedActionSpec, Item, ItemAttributes, ItemState, ItemStatus};
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{ItemConfigError, check_command_name, render, state};

const STATUS: &str = "systemctl is-active --quiet {name}";
const START: &str = "systemctl start {name}";
const STOP: &str = "systemctl stop {name}";
const RESTART: &str = "systemctl restart {name}";
const RELOAD: &str = "systemctl reload {name}";

fn default_running() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SvcConfig {
    #[serde(default = "default_running")]
    running: bool,
    status: Option<String>,
    start: Option<String>,
    stop: Option<String>,
    restart: Option<String>,
    reload: Option<String>,
}

#[derive(Debug)]
pub struct Svc {
    name: String,
    bundle: String,
    attributes: ItemAttributes,
    running: bool,
    status: String,
    start: String,
    stop: String,
    restart: String,
    reload: String,
}

impl Svc {
    pub fn new(
        bundle: &str,
        name: &str,
        attributes: ItemAttributes,
        config: SvcConfig,
    ) -> Result<Self, ItemConfigError> {
        check_command_name(&format!("svc:{name}"), name)?;
        let template = |given: Option<String>, default: &str| {
            render(given.as_deref().unwrap_or(default), name)
        };
        Ok(Self {
            name: name.to_string(),
            bundle: bundle.to_string(),
            attributes,
            running: config.running,
            status: template(config.status, STATUS),
            start: template(config.start, START),
            stop: template(config.stop, STOP),
            restart: template(config.restart, RESTART),
            reload: template(config.reload, RELOAD),
        })
    }

    fn running_state(running: bool) -> ItemState {
        ItemState::Present(state(&[("running", Some(running.to_string()))]))
    }
}

impl Item for Svc {
    fn type_name(&self) -> &'static str {
        "svc"
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
        let wanted = if self.running { "running" } else { "stopped" };
        format!("Service {} ({wanted})", self.name)
    }

    /// `svc:{name}:restart`, `svc:{name}:reload` and `svc:{name}:stop`
    fn canned_actions(&self) -> BTreeMap<String, CannedActionSpec> {
        let id = self.id();
        [
            ("restart", &self.restart),
            ("reload", &self.reload),
            ("stop", &self.stop),
        ]
        .into_iter()
        .map(|(action, command)| {
            (
                action.to_string(),
                CannedActionSpec::new(command.clone()).with_needs([id.clone()]),
            )
        })
        .collect()
    }

    fn desired_state(&self) -> ItemState {
        Self::running_state(self.running)
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<ItemState> {
        Ok(Self::running_state(ctx.runner.run_status(&self.status)?))
    }

    fn fix(&self, _status: &ItemStatus, ctx: &ApplyContext) -> Result<()> {
        let command = if self.running { &self.start } else { &self.stop };
        let output = ctx.runner.run(command)?;
        if !output.success {
            bail!("`{command}` failed: {}", output.stderr_str().trim());
        }
        Ok(())
    }
}
