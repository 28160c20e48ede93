//! Resource gateways: the only way the engine touches external state.
//!
//! Each trait is a thin capability contract over one external system. The
//! engine decides; gateways do. Concrete implementations shell out to the real
//! tools ([`command`]); [`memory`] provides in-process fakes with failure
//! injection for tests and dry simulations.
//!
//! Contract shared by every existence check: `Ok(false)` means the resource is
//! confirmed absent, `Err(_)` means the check itself failed and nothing is known.

use std::path::{Path, PathBuf};

use crate::error::GatewayResult;

pub mod command;
pub mod memory;

pub use command::{ContainerCli, GitCli, TmuxCli};
pub use memory::{InMemorySandbox, InMemoryTerminal, InMemoryVcs};

/// Version control operations, scoped to one repository root.
pub trait VcsGateway: Send + Sync {
    fn branch_exists(&self, repo: &Path, branch: &str) -> GatewayResult<bool>;

    /// Creates `branch` pointing at the repository's current HEAD.
    fn create_branch(&self, repo: &Path, branch: &str) -> GatewayResult<()>;

    /// Name of the checked-out branch, None on a detached HEAD.
    fn current_branch(&self, repo: &Path) -> GatewayResult<Option<String>>;

    /// All local branch names.
    fn list_branches(&self, repo: &Path) -> GatewayResult<Vec<String>>;

    /// Deletes a local branch. Implementations must refuse to delete the
    /// checked-out branch with [`crate::error::GatewayError::CheckedOutBranch`].
    fn delete_branch(&self, repo: &Path, branch: &str) -> GatewayResult<()>;

    fn create_worktree(&self, repo: &Path, path: &Path, branch: &str) -> GatewayResult<()>;

    fn remove_worktree(&self, repo: &Path, path: &Path) -> GatewayResult<()>;

    fn list_worktrees(&self, repo: &Path) -> GatewayResult<Vec<PathBuf>>;
}

/// Terminal multiplexer sessions.
pub trait TerminalGateway: Send + Sync {
    fn session_exists(&self, name: &str) -> GatewayResult<bool>;

    fn create_session(&self, name: &str, cwd: &Path) -> GatewayResult<()>;

    fn kill_session(&self, name: &str) -> GatewayResult<()>;
}

/// Isolated execution sandboxes.
pub trait SandboxGateway: Send + Sync {
    fn sandbox_exists(&self, name: &str) -> GatewayResult<bool>;

    /// Creates a sandbox with `worktree` mounted as its working directory.
    fn create_sandbox(&self, name: &str, worktree: &Path) -> GatewayResult<()>;

    fn delete_sandbox(&self, name: &str) -> GatewayResult<()>;

    /// Reads a file relative to the sandbox working directory.
    /// A missing file is `Ok(None)`.
    fn read_file(&self, name: &str, relative_path: &str) -> GatewayResult<Option<String>>;
}

/// The three gateways bundled, borrowed for the duration of one command.
#[derive(Clone, Copy)]
pub struct Gateways<'a> {
    pub vcs: &'a dyn VcsGateway,
    pub terminal: &'a dyn TerminalGateway,
    pub sandbox: &'a dyn SandboxGateway,
}
