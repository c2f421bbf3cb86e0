use anyhow::{Context, Result, bail};
use itemgraph::{ApplyContext, Item, ItemAttributes, ItemState, ItemStatus};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{ItemConfigError, invalid, item_path, parent_deps, path_kind, state};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymlinkConfig {
    /// What the link points to
    target: Option<String>,
    #[serde(default)]
    delete: bool,
}

#[derive(Debug)]
pub struct Symlink {
    name: String,
    bundle: String,
    attributes: ItemAttributes,
    path: PathBuf,
    target: Option<PathBuf>,
}

impl Symlink {
    pub fn new(
        bundle: &str,
        name: &str,
        attributes: ItemAttributes,
        config: SymlinkConfig,
    ) -> Result<Self, ItemConfigError> {
        let id = format!("symlink:{name}");
        let target = match (config.target, config.delete) {
            (Some(_), true) => {
                return Err(invalid(&id, "'delete' cannot be combined with 'target'"));
            }
            (None, false) => return Err(invalid(&id, "missing 'target'")),
            (target, _) => target.map(|t| item_path(&t)),
        };
        Ok(Self {
            name: name.to_string(),
            bundle: bundle.to_string(),
            attributes,
            path: item_path(name),
            target,
        })
    }
}

fn create_link(target: &Path, path: &Path) -> Result<()> {
    #[cfg(unix)]
    std::os::unix::fs::symlink(target, path).with_context(|| {
        format!(
            "Failed to create symlink: {} -> {}",
            path.display(),
            target.display()
        )
    })?;

    #[cfg(windows)]
    {
        let created = if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, path)
        } else {
            std::os::windows::fs::symlink_file(target, path)
        };
        created.with_context(|| {
            format!(
                "Failed to create symlink: {} -> {}",
                path.display(),
                target.display()
            )
        })?;
    }

    #[cfg(not(any(unix, windows)))]
    bail!("Symlinks not supported on this platform");

    Ok(())
}

impl Item for Symlink {
    fn type_name(&self) -> &'static str {
        "symlink"
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
        match &self.target {
            Some(target) => format!("Symlink {} -> {}", self.path.display(), target.display()),
            None => format!("Remove symlink {}", self.path.display()),
        }
    }

    fn auto_deps(&self, items: &[&dyn Item]) -> Vec<String> {
        parent_deps(&self.path, items)
    }

    fn desired_state(&self) -> ItemState {
        match &self.target {
            Some(target) => ItemState::Present(state(&[
                ("type", Some("symlink".to_string())),
                ("target", Some(target.to_string_lossy().to_string())),
            ])),
            None => ItemState::Absent,
        }
    }

    fn current_state(&self, _ctx: &ApplyContext) -> Result<ItemState> {
        let metadata = match fs::symlink_metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ItemState::Absent),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to stat {}", self.path.display()));
            }
        };
        if !metadata.file_type().is_symlink() {
            return Ok(ItemState::Present(state(&[(
                "type",
                Some(path_kind(&metadata).to_string()),
            )])));
        }
        let target = fs::read_link(&self.path).context("Failed to read symlink")?;
        Ok(ItemState::Present(state(&[
            ("type", Some("symlink".to_string())),
            ("target", Some(target.to_string_lossy().to_string())),
        ])))
    }

    fn fix(&self, status: &ItemStatus, _ctx: &ApplyContext) -> Result<()> {
        if let ItemState::Present(current) = &status.current {
            if current.get("type").map(String::as_str) == Some("directory") {
                bail!("{} is a directory, refusing to replace it", self.path.display());
            }
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        match &self.target {
            Some(target) => create_link(target, &self.path),
            None => Ok(()),
        }
    }
}
