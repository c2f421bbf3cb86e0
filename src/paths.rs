//! Path resolution for converge
//!
//! # Environment Variables
//!
//! - `CONVERGE_CONFIG_DIR` - Override config directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `CONVERGE_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/converge` (if set)
//! 3. `~/.config/converge`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "CONVERGE_CONFIG_DIR";

/// File name of the default node definition
pub const NODE_FILE: &str = "node.toml";

/// Get the converge config directory path
pub fn config_dir() -> Result<PathBuf> {
    resolve_config_dir(|key| std::env::var(key).ok(), dirs::home_dir())
}

fn resolve_config_dir(
    env: impl Fn(&str) -> Option<String>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = env(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Some(xdg_config) = env("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("converge");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = home.context("Could not determine home directory")?;
    let path = home.join(".config").join("converge");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Node file given on the command line, or the default one
pub fn node_file(given: Option<&Path>) -> Result<PathBuf> {
    match given {
        Some(path) => Ok(expand(&path.to_string_lossy())),
        None => Ok(config_dir()?.join(NODE_FILE)),
    }
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as they are.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_dir_env_override() {
        let result = resolve_config_dir(
            env_of(&[(ENV_CONFIG_DIR, "/custom/config"), ("XDG_CONFIG_HOME", "/xdg")]),
            Some(PathBuf::from("/home/me")),
        )
        .unwrap();
        assert_eq!(result, PathBuf::from("/custom/config"));
    }

    #[test]
    fn test_config_dir_xdg() {
        let result = resolve_config_dir(
            env_of(&[("XDG_CONFIG_HOME", "/xdg")]),
            Some(PathBuf::from("/home/me")),
        )
        .unwrap();
        assert_eq!(result, PathBuf::from("/xdg/converge"));
    }

    #[test]
    fn test_config_dir_default() {
        let result = resolve_config_dir(env_of(&[]), Some(PathBuf::from("/home/me"))).unwrap();
        assert_eq!(result, PathBuf::from("/home/me/.config/converge"));
        assert!(resolve_config_dir(env_of(&[]), None).is_err());
    }

    #[test]
    fn test_node_file_given() {
        let result = node_file(Some(Path::new("/srv/web1.toml"))).unwrap();
        assert_eq!(result, PathBuf::from("/srv/web1.toml"));
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/test/path");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("test").join("path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_VAR_12345/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_VAR_12345/file"));
    }
}
