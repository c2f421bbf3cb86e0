use anyhow::{Context, Result};
use itemgraph::{ApplyContext, Item, ItemAttributes, ItemState, ItemStatus};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use super::{
    ItemConfigError, invalid, item_path, mode_of, parent_deps, parse_mode, path_kind, set_mode,
    state,
};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryConfig {
    mode: Option<String>,
    #[serde(default)]
    delete: bool,
}

#[derive(Debug)]
pub struct Directory {
    name: String,
    bundle: String,
    attributes: ItemAttributes,
    path: PathBuf,
    mode: Option<String>,
    delete: bool,
}

impl Directory {
    pub fn new(
        bundle: &str,
        name: &str,
        attributes: ItemAttributes,
        config: DirectoryConfig,
    ) -> Result<Self, ItemConfigError> {
        let id = format!("directory:{name}");
        if config.delete && config.mode.is_some() {
            return Err(invalid(&id, "'delete' cannot be combined with 'mode'"));
        }
        Ok(Self {
            name: name.to_string(),
            bundle: bundle.to_string(),
            attributes,
            path: item_path(name),
            mode: parse_mode(&id, config.mode.as_deref())?,
            delete: config.delete,
        })
    }
}

impl Item for Directory {
    fn type_name(&self) -> &'static str {
        "directory"
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
        format!("Directory {}", self.path.display())
    }

    fn auto_deps(&self, items: &[&dyn Item]) -> Vec<String> {
        parent_deps(&self.path, items)
    }

    fn desired_state(&self) -> ItemState {
        if self.delete {
            return ItemState::Absent;
        }
        ItemState::Present(state(&[
            ("type", Some("directory".to_string())),
            ("mode", self.mode.clone()),
        ]))
    }

    fn current_state(&self, _ctx: &ApplyContext) -> Result<ItemState> {
        match fs::symlink_metadata(&self.path) {
            Ok(metadata) => Ok(ItemState::Present(state(&[
                ("type", Some(path_kind(&metadata).to_string())),
                ("mode", mode_of(&metadata)),
            ]))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ItemState::Absent),
            Err(e) => Err(e).with_context(|| format!("Failed to stat {}", self.path.display())),
        }
    }

    fn fix(&self, status: &ItemStatus, _ctx: &ApplyContext) -> Result<()> {
        if status.must_remove() {
            let removed = if self.path.is_dir() && !self.path.is_symlink() {
                fs::remove_dir_all(&self.path)
            } else {
                fs::remove_file(&self.path)
            };
            return removed.with_context(|| format!("Failed to remove {}", self.path.display()));
        }

        if status.keys_to_fix.iter().any(|k| k == "type") {
            log::debug!("replacing {} with a directory", self.path.display());
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        if !self.path.is_dir() || self.path.is_symlink() {
            fs::create_dir(&self.path)
                .with_context(|| format!("Failed to create {}", self.path.display()))?;
        }
        if let Some(mode) = &self.mode {
            set_mode(&self.path, mode)?;
        }
        Ok(())
    }
}
