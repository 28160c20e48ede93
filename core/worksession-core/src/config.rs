//! User settings loaded from `config.toml`.
//!
//! Every field has a default, so a missing file (or a file that only sets a few
//! keys) is valid. A file that fails to parse is an error: silently falling back
//! to defaults would point cleanup at the wrong workspace roots.

use std::path::PathBuf;
use std::time::Duration;

use fs_err as fs;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorksessionError};
use crate::storage::StorageConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directories scanned for legacy per-repository session stores.
    pub workspace_roots: Vec<PathBuf>,
    /// Maximum directory depth of the legacy scan below each root.
    pub scan_depth: usize,
    /// First path segment of issue branches (`issue/github/123`).
    pub branch_prefix: String,
    /// Worktree directory, relative to the repository root.
    pub worktree_dir: String,
    /// Container runtime binary used for sandboxes.
    pub sandbox_runtime: String,
    /// Image new sandboxes are started from.
    pub sandbox_image: String,
    /// Directory inside the sandbox where the worktree is mounted.
    pub sandbox_workdir: String,
    pub sandbox_read_timeout_secs: u64,
    pub lock_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workspace_roots: Vec::new(),
            scan_depth: 3,
            branch_prefix: "issue".to_string(),
            worktree_dir: ".worktrees".to_string(),
            sandbox_runtime: "docker".to_string(),
            sandbox_image: "ubuntu:24.04".to_string(),
            sandbox_workdir: "/workspace".to_string(),
            sandbox_read_timeout_secs: 5,
            lock_timeout_ms: 5_000,
        }
    }
}

impl Settings {
    pub fn sandbox_read_timeout(&self) -> Duration {
        Duration::from_secs(self.sandbox_read_timeout_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Loads settings, returning defaults if the file doesn't exist.
pub fn load_settings(storage: &StorageConfig) -> Result<Settings> {
    let path = storage.config_file();
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
        Err(e) => return Err(WorksessionError::io("Failed to read config", e)),
    };

    toml::from_str(&content).map_err(|e| WorksessionError::ConfigMalformed {
        path,
        details: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_returns_defaults() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        assert_eq!(load_settings(&storage).unwrap(), Settings::default());
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        std::fs::write(
            storage.config_file(),
            "workspace_roots = [\"/code\"]\nscan_depth = 1\n",
        )
        .unwrap();

        let settings = load_settings(&storage).unwrap();
        assert_eq!(settings.workspace_roots, vec![PathBuf::from("/code")]);
        assert_eq!(settings.scan_depth, 1);
        assert_eq!(settings.branch_prefix, "issue");
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        std::fs::write(storage.config_file(), "scan_depth = [").unwrap();

        let err = load_settings(&storage).unwrap_err();
        assert!(matches!(err, WorksessionError::ConfigMalformed { .. }));
    }
}
