//! Instance directory setup
//!
//! Each instance owns one directory under the configured base:
//!
//! ```text
//! <base_dir>/<instance_id>/
//!   session/      credential material (purged on logout)
//!   data/         event cache snapshot and bot data files
//! ```
//!
//! A template directory can seed `data/` on first start; files the
//! instance already has are never overwritten, so instance-local edits
//! survive restarts.

use crate::error::{CliError, Result};
use herald_core::types::InstanceId;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const EVENTS_FILE: &str = "events.json";

// ----------------------------------------------------------------------------
// Instance Paths
// ----------------------------------------------------------------------------

/// Resolved filesystem layout for one instance.
#[derive(Debug, Clone)]
pub struct InstancePaths {
    pub root: PathBuf,
    pub session_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl InstancePaths {
    pub fn resolve(base_dir: &Path, instance_id: &InstanceId) -> Self {
        let root = base_dir.join(instance_id.as_str());
        Self {
            session_dir: root.join("session"),
            data_dir: root.join("data"),
            root,
        }
    }

    /// Where the event cache snapshot lives.
    pub fn events_file(&self) -> PathBuf {
        self.data_dir.join(EVENTS_FILE)
    }
}

// ----------------------------------------------------------------------------
// Setup
// ----------------------------------------------------------------------------

/// Create the instance directories and seed the data directory from the
/// template, if one is configured.
pub fn prepare(paths: &InstancePaths, template_dir: Option<&Path>) -> Result<()> {
    std::fs::create_dir_all(&paths.session_dir)?;
    std::fs::create_dir_all(&paths.data_dir)?;

    if let Some(template) = template_dir {
        seed_data_dir(template, &paths.data_dir)?;
    }

    info!(root = %paths.root.display(), "instance directories ready");
    Ok(())
}

/// Copy template files the instance does not have yet. Only top-level
/// regular files are seeded.
fn seed_data_dir(template: &Path, data_dir: &Path) -> Result<()> {
    if !template.is_dir() {
        return Err(CliError::Setup(format!(
            "template directory {} does not exist",
            template.display()
        )));
    }

    for entry in std::fs::read_dir(template)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let target = data_dir.join(entry.file_name());
        if target.exists() {
            continue;
        }
        std::fs::copy(entry.path(), &target)?;
        debug!(file = %target.display(), "seeded data file from template");
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_lays_out_the_instance_tree() {
        let paths = InstancePaths::resolve(Path::new("/srv/herald"), &InstanceId::new("bot-1"));
        assert_eq!(paths.root, Path::new("/srv/herald/bot-1"));
        assert_eq!(paths.session_dir, Path::new("/srv/herald/bot-1/session"));
        assert_eq!(
            paths.events_file(),
            Path::new("/srv/herald/bot-1/data/events.json")
        );
    }

    #[test]
    fn prepare_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let paths = InstancePaths::resolve(dir.path(), &InstanceId::new("bot-1"));
        prepare(&paths, None).unwrap();
        assert!(paths.session_dir.is_dir());
        assert!(paths.data_dir.is_dir());
    }

    #[test]
    fn template_seeds_missing_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template");
        std::fs::create_dir_all(&template).unwrap();
        std::fs::write(template.join("greetings.json"), b"{\"hello\":1}").unwrap();
        std::fs::write(template.join("menu.json"), b"{}").unwrap();

        let paths = InstancePaths::resolve(dir.path(), &InstanceId::new("bot-1"));
        std::fs::create_dir_all(&paths.data_dir).unwrap();
        std::fs::write(paths.data_dir.join("menu.json"), b"{\"edited\":true}").unwrap();

        prepare(&paths, Some(&template)).unwrap();

        assert!(paths.data_dir.join("greetings.json").exists());
        // Pre-existing file kept its instance-local contents.
        let menu = std::fs::read_to_string(paths.data_dir.join("menu.json")).unwrap();
        assert_eq!(menu, "{\"edited\":true}");
    }

    #[test]
    fn missing_template_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = InstancePaths::resolve(dir.path(), &InstanceId::new("bot-1"));
        let missing = dir.path().join("nope");
        assert!(prepare(&paths, Some(&missing)).is_err());
    }
}
