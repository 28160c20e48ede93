//! Storage configuration and path management for worksession.
//!
//! All file paths used by the CLI and the core live here so tests can point the
//! whole system at a temp directory with [`StorageConfig::with_root`].
//!
//! ```text
//! ~/.worksession/
//! ├── sessions.json       # canonical session store (JSON array)
//! ├── sessions.lock/      # store lock directory (present while a writer holds it)
//! ├── config.toml         # optional settings
//! └── logs/               # CLI log files
//! ```

use std::path::{Path, PathBuf};

use crate::error::{Result, WorksessionError};

/// Environment variable that overrides the storage root.
pub const ROOT_ENV_VAR: &str = "WORKSESSION_HOME";

/// Directory name used both for the global root (`~/.worksession`) and for
/// per-repository legacy data (`<repo>/.worksession`).
pub const DATA_DIR_NAME: &str = ".worksession";

/// File name of a session store, global or legacy.
pub const SESSIONS_FILE_NAME: &str = "sessions.json";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the storage root from `WORKSESSION_HOME`, else `~/.worksession`.
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(ROOT_ENV_VAR).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }
        let home = dirs::home_dir().ok_or(WorksessionError::HomeDirNotFound)?;
        Ok(Self::with_root(home.join(DATA_DIR_NAME)))
    }

    /// Creates a StorageConfig with a custom root directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the canonical session store.
    pub fn sessions_file(&self) -> PathBuf {
        self.root.join(SESSIONS_FILE_NAME)
    }

    /// Path to config.toml (user settings).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path to the logs/ directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Path to a repository's legacy session store.
    /// Example: /Users/pete/Code/app/.worksession/sessions.json
    pub fn legacy_sessions_file(repo_root: &Path) -> PathBuf {
        repo_root.join(DATA_DIR_NAME).join(SESSIONS_FILE_NAME)
    }
}
