//! In-memory gateways.
//!
//! Each fake keeps its world in a `Mutex`, records every call as
//! `"<operation>:<target>"`, and lets callers inject failures per target so tests
//! can exercise partial-failure and ambiguous-evidence paths.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{SandboxGateway, TerminalGateway, VcsGateway};
use crate::error::{GatewayError, GatewayResult};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn injected(operation: &str, target: &str) -> GatewayError {
    GatewayError::Injected(format!("{} failed for {}", operation, target))
}

#[derive(Debug, Default)]
struct CallLog(Mutex<Vec<String>>);

impl CallLog {
    fn push(&self, operation: &str, target: &str) {
        guard(&self.0).push(format!("{}:{}", operation, target));
    }

    fn all(&self) -> Vec<String> {
        guard(&self.0).clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Terminal
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct InMemoryTerminal {
    sessions: Mutex<BTreeSet<String>>,
    failing: Mutex<BTreeSet<String>>,
    calls: CallLog,
}

impl InMemoryTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, name: &str) -> Self {
        guard(&self.sessions).insert(name.to_string());
        self
    }

    /// Every operation on `name` returns an error.
    pub fn failing_for(self, name: &str) -> Self {
        guard(&self.failing).insert(name.to_string());
        self
    }

    pub fn has_session(&self, name: &str) -> bool {
        guard(&self.sessions).contains(name)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.all()
    }

    fn check(&self, operation: &str, name: &str) -> GatewayResult<()> {
        self.calls.push(operation, name);
        if guard(&self.failing).contains(name) {
            return Err(injected(operation, name));
        }
        Ok(())
    }
}

impl TerminalGateway for InMemoryTerminal {
    fn session_exists(&self, name: &str) -> GatewayResult<bool> {
        self.check("session_exists", name)?;
        Ok(self.has_session(name))
    }

    fn create_session(&self, name: &str, _cwd: &Path) -> GatewayResult<()> {
        self.check("create_session", name)?;
        guard(&self.sessions).insert(name.to_string());
        Ok(())
    }

    fn kill_session(&self, name: &str) -> GatewayResult<()> {
        self.check("kill_session", name)?;
        guard(&self.sessions).remove(name);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sandbox
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct InMemorySandbox {
    sandboxes: Mutex<BTreeSet<String>>,
    files: Mutex<BTreeMap<(String, String), String>>,
    failing: Mutex<BTreeSet<(String, String)>>,
    calls: CallLog,
}

impl InMemorySandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sandbox(self, name: &str) -> Self {
        guard(&self.sandboxes).insert(name.to_string());
        self
    }

    pub fn with_file(self, name: &str, relative_path: &str, content: &str) -> Self {
        guard(&self.files).insert(
            (name.to_string(), relative_path.to_string()),
            content.to_string(),
        );
        self
    }

    /// `operation` (e.g. `"delete_sandbox"`) returns an error for `name`.
    pub fn failing(self, operation: &str, name: &str) -> Self {
        guard(&self.failing).insert((operation.to_string(), name.to_string()));
        self
    }

    pub fn has_sandbox(&self, name: &str) -> bool {
        guard(&self.sandboxes).contains(name)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.all()
    }

    fn check(&self, operation: &str, name: &str) -> GatewayResult<()> {
        self.calls.push(operation, name);
        if guard(&self.failing).contains(&(operation.to_string(), name.to_string())) {
            return Err(injected(operation, name));
        }
        Ok(())
    }
}

impl SandboxGateway for InMemorySandbox {
    fn sandbox_exists(&self, name: &str) -> GatewayResult<bool> {
        self.check("sandbox_exists", name)?;
        Ok(self.has_sandbox(name))
    }

    fn create_sandbox(&self, name: &str, _worktree: &Path) -> GatewayResult<()> {
        self.check("create_sandbox", name)?;
        guard(&self.sandboxes).insert(name.to_string());
        Ok(())
    }

    fn delete_sandbox(&self, name: &str) -> GatewayResult<()> {
        self.check("delete_sandbox", name)?;
        guard(&self.sandboxes).remove(name);
        guard(&self.files).retain(|(sandbox, _), _| sandbox != name);
        Ok(())
    }

    fn read_file(&self, name: &str, relative_path: &str) -> GatewayResult<Option<String>> {
        self.check("read_file", name)?;
        if !self.has_sandbox(name) {
            return Err(GatewayError::CommandFailed {
                command: format!("read_file {}", relative_path),
                details: format!("No such container: {}", name),
            });
        }
        Ok(guard(&self.files)
            .get(&(name.to_string(), relative_path.to_string()))
            .cloned())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Version control
// ═══════════════════════════════════════════════════════════════════════════════

/// A single repository's branches and worktrees. The `repo` argument of each
/// call is recorded but not otherwise used.
#[derive(Debug, Default)]
pub struct InMemoryVcs {
    branches: Mutex<BTreeSet<String>>,
    current: Mutex<Option<String>>,
    worktrees: Mutex<BTreeSet<PathBuf>>,
    failing: Mutex<BTreeSet<(String, String)>>,
    calls: CallLog,
}

impl InMemoryVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_branch(self, branch: &str) -> Self {
        guard(&self.branches).insert(branch.to_string());
        self
    }

    pub fn with_current_branch(self, branch: &str) -> Self {
        guard(&self.branches).insert(branch.to_string());
        *guard(&self.current) = Some(branch.to_string());
        self
    }

    pub fn with_worktree(self, path: impl Into<PathBuf>) -> Self {
        guard(&self.worktrees).insert(path.into());
        self
    }

    /// `operation` returns an error for `target` (a branch name or worktree path;
    /// `"*"` matches every target).
    pub fn failing(self, operation: &str, target: &str) -> Self {
        guard(&self.failing).insert((operation.to_string(), target.to_string()));
        self
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        guard(&self.branches).contains(branch)
    }

    pub fn has_worktree(&self, path: &Path) -> bool {
        guard(&self.worktrees).contains(path)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.all()
    }

    fn check(&self, operation: &str, target: &str) -> GatewayResult<()> {
        self.calls.push(operation, target);
        let failing = guard(&self.failing);
        if failing.contains(&(operation.to_string(), target.to_string()))
            || failing.contains(&(operation.to_string(), "*".to_string()))
        {
            return Err(injected(operation, target));
        }
        Ok(())
    }
}

impl VcsGateway for InMemoryVcs {
    fn branch_exists(&self, _repo: &Path, branch: &str) -> GatewayResult<bool> {
        self.check("branch_exists", branch)?;
        Ok(self.has_branch(branch))
    }

    fn create_branch(&self, _repo: &Path, branch: &str) -> GatewayResult<()> {
        self.check("create_branch", branch)?;
        guard(&self.branches).insert(branch.to_string());
        Ok(())
    }

    fn current_branch(&self, repo: &Path) -> GatewayResult<Option<String>> {
        self.check("current_branch", &repo.to_string_lossy())?;
        Ok(guard(&self.current).clone())
    }

    fn list_branches(&self, repo: &Path) -> GatewayResult<Vec<String>> {
        self.check("list_branches", &repo.to_string_lossy())?;
        Ok(guard(&self.branches).iter().cloned().collect())
    }

    fn delete_branch(&self, _repo: &Path, branch: &str) -> GatewayResult<()> {
        self.check("delete_branch", branch)?;
        if guard(&self.current).as_deref() == Some(branch) {
            return Err(GatewayError::CheckedOutBranch(branch.to_string()));
        }
        guard(&self.branches).remove(branch);
        Ok(())
    }

    fn create_worktree(&self, _repo: &Path, path: &Path, branch: &str) -> GatewayResult<()> {
        self.check("create_worktree", &path.to_string_lossy())?;
        if !self.has_branch(branch) {
            return Err(GatewayError::CommandFailed {
                command: format!("worktree add {}", path.display()),
                details: format!("invalid reference: {}", branch),
            });
        }
        guard(&self.worktrees).insert(path.to_path_buf());
        Ok(())
    }

    fn remove_worktree(&self, _repo: &Path, path: &Path) -> GatewayResult<()> {
        self.check("remove_worktree", &path.to_string_lossy())?;
        guard(&self.worktrees).remove(path);
        Ok(())
    }

    fn list_worktrees(&self, repo: &Path) -> GatewayResult<Vec<PathBuf>> {
        self.check("list_worktrees", &repo.to_string_lossy())?;
        Ok(guard(&self.worktrees).iter().cloned().collect())
    }
}
