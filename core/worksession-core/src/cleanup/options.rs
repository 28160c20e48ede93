//! Cleanup flags and the named modes that preset them.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::paths::same_path;
use crate::types::SessionRecord;

/// Which sessions a cleanup may look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupScope {
    /// Sessions whose `repo_path` is this repository root.
    CurrentRepo(PathBuf),
    Global,
}

impl CleanupScope {
    pub fn includes(&self, record: &SessionRecord) -> bool {
        match self {
            CleanupScope::Global => true,
            CleanupScope::CurrentRepo(repo) => same_path(&record.repo_path, repo),
        }
    }

    pub fn repo(&self) -> Option<&Path> {
        match self {
            CleanupScope::CurrentRepo(repo) => Some(repo),
            CleanupScope::Global => None,
        }
    }
}

/// Flags as given on the command line, before mode selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupFlags {
    pub stale: bool,
    pub orphaned: bool,
    pub branches: bool,
    pub all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupMode {
    /// Sandboxes and worktrees of stale sessions.
    Default,
    /// Sandboxes only; worktrees are preserved.
    StaleOnly,
    /// Deletes nothing; drops records whose resources are already gone.
    Orphaned,
    /// Orphaned branches only; sessions are left alone.
    BranchesOnly,
    All,
    StaleWithBranches,
}

impl CleanupMode {
    /// Precedence: all, stale+branches, branches, orphaned, stale, default.
    pub fn from_flags(flags: CleanupFlags) -> Self {
        if flags.all {
            CleanupMode::All
        } else if flags.stale && flags.branches {
            CleanupMode::StaleWithBranches
        } else if flags.branches {
            CleanupMode::BranchesOnly
        } else if flags.orphaned {
            CleanupMode::Orphaned
        } else if flags.stale {
            CleanupMode::StaleOnly
        } else {
            CleanupMode::Default
        }
    }

    /// `(sandboxes, worktrees, branches, prune_records)`
    fn presets(self) -> (bool, bool, bool, bool) {
        match self {
            CleanupMode::Default => (true, true, false, true),
            CleanupMode::StaleOnly => (true, false, false, true),
            CleanupMode::Orphaned => (false, false, false, true),
            CleanupMode::BranchesOnly => (false, false, true, false),
            CleanupMode::All | CleanupMode::StaleWithBranches => (true, true, true, true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupOptions {
    pub clean_sandboxes: bool,
    pub clean_worktrees: bool,
    pub clean_branches: bool,
    /// Drop records whose sandbox and worktree are confirmed gone.
    pub prune_records: bool,
    pub dry_run: bool,
    /// Skip the interactive confirmation.
    pub force: bool,
    /// Suppress narration.
    pub silent: bool,
    pub scope: CleanupScope,
    /// Worker count for per-session cleanup. 1 runs sequentially.
    pub parallelism: usize,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        CleanupOptions::for_mode(CleanupMode::Default, CleanupScope::Global)
    }
}

impl CleanupOptions {
    pub fn for_mode(mode: CleanupMode, scope: CleanupScope) -> Self {
        let (clean_sandboxes, clean_worktrees, clean_branches, prune_records) = mode.presets();
        CleanupOptions {
            clean_sandboxes,
            clean_worktrees,
            clean_branches,
            prune_records,
            dry_run: false,
            force: false,
            silent: false,
            scope,
            parallelism: 1,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn parallelism(mut self, workers: usize) -> Self {
        self.parallelism = workers.max(1);
        self
    }

    /// Whether stale sessions are processed at all.
    pub fn touches_sessions(&self) -> bool {
        self.clean_sandboxes || self.clean_worktrees || self.prune_records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(stale: bool, orphaned: bool, branches: bool, all: bool) -> CleanupMode {
        CleanupMode::from_flags(CleanupFlags {
            stale,
            orphaned,
            branches,
            all,
        })
    }

    #[test]
    fn test_mode_precedence() {
        assert_eq!(mode(false, false, false, false), CleanupMode::Default);
        assert_eq!(mode(true, false, false, false), CleanupMode::StaleOnly);
        assert_eq!(mode(false, true, false, false), CleanupMode::Orphaned);
        assert_eq!(mode(true, true, false, false), CleanupMode::Orphaned);
        assert_eq!(mode(false, false, true, false), CleanupMode::BranchesOnly);
        assert_eq!(mode(false, true, true, false), CleanupMode::BranchesOnly);
        assert_eq!(mode(true, false, true, false), CleanupMode::StaleWithBranches);
        assert_eq!(mode(true, true, true, false), CleanupMode::StaleWithBranches);
    }

    #[test]
    fn test_all_dominates_every_flag() {
        for stale in [false, true] {
            for orphaned in [false, true] {
                for branches in [false, true] {
                    assert_eq!(mode(stale, orphaned, branches, true), CleanupMode::All);
                }
            }
        }
    }

    #[test]
    fn test_mode_presets() {
        let stale_only = CleanupOptions::for_mode(CleanupMode::StaleOnly, CleanupScope::Global);
        assert!(stale_only.clean_sandboxes);
        assert!(!stale_only.clean_worktrees);
        assert!(!stale_only.clean_branches);

        let branches = CleanupOptions::for_mode(CleanupMode::BranchesOnly, CleanupScope::Global);
        assert!(branches.clean_branches);
        assert!(!branches.touches_sessions());

        let orphaned = CleanupOptions::for_mode(CleanupMode::Orphaned, CleanupScope::Global);
        assert!(!orphaned.clean_sandboxes && !orphaned.clean_worktrees);
        assert!(orphaned.touches_sessions());

        let all = CleanupOptions::for_mode(CleanupMode::All, CleanupScope::Global);
        assert!(all.clean_sandboxes && all.clean_worktrees && all.clean_branches);
    }

    #[test]
    fn test_scope_matches_repo_path() {
        let item = crate::types::WorkItemId::github(1);
        let record = SessionRecord::new(&item, "t", "app", PathBuf::from("/no/such/app/"));
        assert!(CleanupScope::Global.includes(&record));
        assert!(CleanupScope::CurrentRepo(PathBuf::from("/no/such/app")).includes(&record));
        assert!(!CleanupScope::CurrentRepo(PathBuf::from("/no/such/other")).includes(&record));
    }

    #[test]
    fn test_parallelism_is_at_least_one() {
        assert_eq!(CleanupOptions::default().parallelism(0).parallelism, 1);
    }
}
