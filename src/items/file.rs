//! Regular file with optional content and mode

use anyhow::{Context, Result, bail};
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
pub struct FileConfig {
    content: Option<String>,
    /// Environment variable holding the content
    content_from_env: Option<String>,
    mode: Option<String>,
    #[serde(default)]
    delete: bool,
}

#[derive(Debug)]
pub struct File {
    name: String,
    bundle: String,
    attributes: ItemAttributes,
    path: PathBuf,
    content: Option<String>,
    /// Variable that should have provided the content but is not set
    missing_fault: Option<String>,
    mode: Option<String>,
    delete: bool,
}

impl File {
    pub fn new(
        bundle: &str,
        name: &str,
        attributes: ItemAttributes,
        config: FileConfig,
    ) -> Result<Self, ItemConfigError> {
        let id = format!("file:{name}");
        if config.content.is_some() && config.content_from_env.is_some() {
            return Err(invalid(
                &id,
                "'content' and 'content_from_env' are mutually exclusive",
            ));
        }
        let has_content = config.content.is_some() || config.content_from_env.is_some();
        if config.delete && (has_content || config.mode.is_some()) {
            return Err(invalid(&id, "'delete' cannot be combined with content or mode"));
        }
        let mode = parse_mode(&id, config.mode.as_deref())?;

        let (content, missing_fault) = match config.content_from_env {
            Some(var) => match std::env::var(&var) {
                Ok(value) => (Some(value), None),
                Err(_) => (None, Some(var)),
            },
            None => (config.content, None),
        };

        Ok(Self {
            name: name.to_string(),
            bundle: bundle.to_string(),
            attributes,
            path: item_path(name),
            content,
            missing_fault,
            mode,
            delete: config.delete,
        })
    }

    fn write_content(&self) -> Result<()> {
        let content = self.content.as_deref().unwrap_or_default();
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

impl Item for File {
    fn type_name(&self) -> &'static str {
        "file"
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
        if self.delete {
            format!("Delete {}", self.path.display())
        } else {
            format!("File {}", self.path.display())
        }
    }

    fn auto_deps(&self, items: &[&dyn Item]) -> Vec<String> {
        parent_deps(&self.path, items)
    }

    fn unavailable_faults(&self) -> Vec<String> {
        self.missing_fault.iter().cloned().collect()
    }

    fn desired_state(&self) -> ItemState {
        if self.delete {
            return ItemState::Absent;
        }
        ItemState::Present(state(&[
            ("type", Some("file".to_string())),
            (
                "content_hash",
                self.content.as_deref().map(|c| content_hash(c.as_bytes())),
            ),
            ("mode", self.mode.clone()),
        ]))
    }

    fn current_state(&self, _ctx: &ApplyContext) -> Result<ItemState> {
        let metadata = match fs::symlink_metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ItemState::Absent),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to stat {}", self.path.display()));
            }
        };
        let kind = path_kind(&metadata);
        if kind != "file" {
            return Ok(ItemState::Present(state(&[("type", Some(kind.to_string()))])));
        }
        let bytes =
            fs::read(&self.path).with_context(|| format!("Failed to read {}", self.path.display()))?;
        Ok(ItemState::Present(state(&[
            ("type", Some("file".to_string())),
            ("content_hash", Some(content_hash(&bytes))),
            ("mode", mode_of(&metadata)),
        ])))
    }

    fn fix(&self, status: &ItemStatus, _ctx: &ApplyContext) -> Result<()> {
        if status.must_remove() {
            return fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()));
        }

        let wrong_kind = status.keys_to_fix.iter().any(|k| k == "type");
        if wrong_kind {
            if let ItemState::Present(current) = &status.current
                && current.get("type").map(String::as_str) == Some("directory")
            {
                bail!("{} is a directory, refusing to replace it", self.path.display());
            }
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }

        let rewrite = status.must_create()
            || wrong_kind
            || status.keys_to_fix.iter().any(|k| k == "content_hash");
        if rewrite {
            log::debug!("writing {}", self.path.display());
            self.write_content()?;
        }
        if let Some(mode) = &self.mode {
            set_mode(&self.path, mode)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemgraph::NoRunner;

    fn file(path: &std::path::Path, config: FileConfig) -> File {
        File::new("base", &path.to_string_lossy(), ItemAttributes::default(), config).unwrap()
    }

    fn converge(item: &File) -> ItemStatus {
        let ctx = ApplyContext::new(&NoRunner, "local");
        let status = item.status(&ctx).unwrap();
        item.fix(&status, &ctx).unwrap();
        item.status(&ctx).unwrap()
    }

    #[test]
    fn test_creates_file_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motd");
        let item = file(
            &path,
            FileConfig {
                content: Some("hello\n".into()),
                ..Default::default()
            },
        );

        let ctx = ApplyContext::new(&NoRunner, "local");
        let status = item.status(&ctx).unwrap();
        assert!(status.must_create());

        assert!(converge(&item).is_correct());
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn test_rewrites_changed_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motd");
        fs::write(&path, "old").unwrap();
        let item = file(
            &path,
            FileConfig {
                content: Some("new".into()),
                ..Default::default()
            },
        );

        let ctx = ApplyContext::new(&NoRunner, "local");
        assert_eq!(item.status(&ctx).unwrap().keys_to_fix, vec!["content_hash"]);
        assert!(converge(&item).is_correct());
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_existing_file_without_content_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        fs::write(&path, "keep me").unwrap();
        let item = file(&path, FileConfig::default());

        let ctx = ApplyContext::new(&NoRunner, "local");
        assert!(item.status(&ctx).unwrap().is_correct());
    }

    #[cfg(unix)]
    #[test]
    fn test_sets_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        fs::write(&path, "x").unwrap();
        let item = file(
            &path,
            FileConfig {
                mode: Some("600".into()),
                ..Default::default()
            },
        );
        assert!(converge(&item).is_correct());
        let metadata = fs::metadata(&path).unwrap();
        assert_eq!(mode_of(&metadata).as_deref(), Some("0600"));
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale");
        fs::write(&path, "x").unwrap();
        let item = file(
            &path,
            FileConfig {
                delete: true,
                ..Default::default()
            },
        );
        assert!(converge(&item).is_correct());
        assert!(!path.exists());
    }

    #[test]
    fn test_refuses_to_replace_directory() {
        let dir = tempfile::tempdir().unwrap();
        let item = file(
            dir.path(),
            FileConfig {
                content: Some("x".into()),
                ..Default::default()
            },
        );
        let ctx = ApplyContext::new(&NoRunner, "local");
        let status = item.status(&ctx).unwrap();
        assert!(status.keys_to_fix.contains(&"type".to_string()));
        assert!(item.fix(&status, &ctx).is_err());
    }

    #[test]
    fn test_missing_env_fault() {
        let item = file(
            std::path::Path::new("/tmp/never-written"),
            FileConfig {
                content_from_env: Some("CONVERGE_TEST_UNSET_VARIABLE_9431".into()),
                ..Default::default()
            },
        );
        assert_eq!(
            item.unavailable_faults(),
            vec!["CONVERGE_TEST_UNSET_VARIABLE_9431".to_string()]
        );
    }

    #[test]
    fn test_invalid_combinations() {
        let err = File::new(
            "base",
            "/tmp/x",
            ItemAttributes::default(),
            FileConfig {
                content: Some("a".into()),
                content_from_env: Some("B".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));

        let err = File::new(
            "base",
            "/tmp/x",
            ItemAttributes::default(),
            FileConfig {
                delete: true,
                mode: Some("0644".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("delete"));
    }
}
