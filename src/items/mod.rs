//! Concrete item types for the local host
//!
//! Each item is declared in the node file as a TOML table keyed by its id.
//! Relation keys (`needs`, `triggers`, `tags`, ...) are common to every type;
//! the remaining keys are validated by the type's own config struct.

mod action;
mod directory;
mod file;
mod pkg;
mod svc;
mod symlink;

pub use directory::Directory;
pub use file::File;
pub use pkg::Pkg;
pub use svc::Svc;
pub use symlink::Symlink;

use itemgraph::{BoxedItem, CommandAction, Item, ItemAttributes, StateDict};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::paths;

/// Invalid item declarations in a node file
#[derive(Debug, Error)]
pub enum ItemConfigError {
    #[error("item id '{id}' must have the form type:name")]
    InvalidId { id: String },

    #[error("item '{id}' has unknown type '{type_name}'")]
    UnknownType { id: String, type_name: String },

    #[error("item '{id}': {message}")]
    InvalidAttributes { id: String, message: String },

    #[error("item '{id}': name '{name}' may only contain letters, digits and . _ + @ -")]
    InvalidName { id: String, name: String },
}

/// Item table split into common relations and type-specific keys
#[derive(Debug, Deserialize)]
struct ItemTable {
    #[serde(flatten)]
    attributes: ItemAttributes,
    #[serde(flatten)]
    rest: toml::Table,
}

/// Build an item from its node file declaration
pub fn build_item(
    bundle: &str,
    id: &str,
    table: toml::Table,
) -> Result<BoxedItem, ItemConfigError> {
    let Some((type_name, name)) = id.split_once(':') else {
        return Err(ItemConfigError::InvalidId { id: id.to_string() });
    };
    if type_name.is_empty() || name.is_empty() {
        return Err(ItemConfigError::InvalidId { id: id.to_string() });
    }

    let ItemTable { attributes, rest } = toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| invalid(id, e.to_string().trim()))?;

    let item: BoxedItem = match type_name {
        "action" => {
            let config: action::ActionConfig = type_config(id, rest)?;
            Box::new(
                CommandAction::new(bundle, name, config.command, attributes)
                    .with_expected_return_code(config.expected_return_code),
            )
        }
        "file" => Box::new(File::new(bundle, name, attributes, type_config(id, rest)?)?),
        "directory" => Box::new(Directory::new(
            bundle,
            name,
            attributes,
            type_config(id, rest)?,
        )?),
        "symlink" => Box::new(Symlink::new(bundle, name, attributes, type_config(id, rest)?)?),
        "pkg" => Box::new(Pkg::new(bundle, name, attributes, type_config(id, rest)?)?),
        "svc" => Box::new(Svc::new(bundle, name, attributes, type_config(id, rest)?)?),
        other => {
            return Err(ItemConfigError::UnknownType {
                id: id.to_string(),
                type_name: other.to_string(),
            });
        }
    };
    log::trace!("built {} in bundle {bundle}", item.id());
    Ok(item)
}

fn type_config<T: DeserializeOwned>(id: &str, rest: toml::Table) -> Result<T, ItemConfigError> {
    toml::Value::Table(rest)
        .try_into()
        .map_err(|e: toml::de::Error| invalid(id, e.to_string().trim()))
}

pub(crate) fn invalid(id: &str, message: impl Into<String>) -> ItemConfigError {
    ItemConfigError::InvalidAttributes {
        id: id.to_string(),
        message: message.into(),
    }
}

/// Names substituted into shell command templates
pub(crate) fn check_command_name(id: &str, name: &str) -> Result<(), ItemConfigError> {
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '@' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ItemConfigError::InvalidName {
            id: id.to_string(),
            name: name.to_string(),
        })
    }
}

/// Replace `{name}` in a command template
pub(crate) fn render(template: &str, name: &str) -> String {
    template.replace("{name}", name)
}

/// Validate an octal permission string like "0644"
pub(crate) fn parse_mode(
    id: &str,
    mode: Option<&str>,
) -> Result<Option<String>, ItemConfigError> {
    let Some(mode) = mode else {
        return Ok(None);
    };
    let valid = (3..=4).contains(&mode.len()) && mode.chars().all(|c| ('0'..='7').contains(&c));
    if !valid {
        return Err(invalid(id, format!("invalid mode '{mode}'")));
    }
    Ok(Some(format!("{mode:0>4}")))
}

/// Selectors of directory and symlink items that are ancestors of `path`
pub(crate) fn parent_deps(path: &Path, items: &[&dyn Item]) -> Vec<String> {
    items
        .iter()
        .filter(|item| matches!(item.type_name(), "directory" | "symlink"))
        .filter(|item| {
            let candidate = paths::expand(item.name());
            candidate != path && path.starts_with(&candidate)
        })
        .map(|item| item.id())
        .collect()
}

/// Expanded filesystem path of an item name
pub(crate) fn item_path(name: &str) -> PathBuf {
    paths::expand(name)
}

/// Current mode bits of a path, formatted like a config mode
#[cfg(unix)]
pub(crate) fn mode_of(metadata: &std::fs::Metadata) -> Option<String> {
    use std::os::unix::fs::PermissionsExt;
    Some(format!("{:04o}", metadata.permissions().mode() & 0o7777))
}

#[cfg(not(unix))]
pub(crate) fn mode_of(_metadata: &std::fs::Metadata) -> Option<String> {
    None
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: &str) -> anyhow::Result<()> {
    use anyhow::Context;
    use std::os::unix::fs::PermissionsExt;

    let bits = u32::from_str_radix(mode, 8).with_context(|| format!("invalid mode {mode}"))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(bits))
        .with_context(|| format!("Failed to set mode {mode} on {}", path.display()))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: &str) -> anyhow::Result<()> {
    anyhow::bail!("file modes are only supported on unix")
}

/// Kind of whatever currently occupies a path
pub(crate) fn path_kind(metadata: &std::fs::Metadata) -> &'static str {
    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        "symlink"
    } else if file_type.is_dir() {
        "directory"
    } else {
        "file"
    }
}

pub(crate) fn state(pairs: &[(&str, Option<String>)]) -> StateDict {
    pairs
        .iter()
        .filter_map(|(key, value)| value.clone().map(|v| ((*key).to_string(), v)))
        .collect()
}
