use serde::Serialize;

/// Results from a cleanup batch.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Stale sessions processed without any error.
    pub sessions_cleaned: u32,
    pub sandboxes_cleaned: u32,
    pub worktrees_cleaned: u32,
    pub branches_cleaned: u32,
    /// Records whose sandbox and worktree are confirmed gone.
    pub records_pruned: u32,
    /// Dry run only: sessions a real run would process.
    pub would_clean: u32,
    /// One line per action taken (or, in a dry run, planned).
    pub details: Vec<String>,
    /// Each failure names the resource and the operation.
    pub errors: Vec<String>,
}

impl CleanupReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// True when nothing was cleaned, pruned, or planned.
    pub fn is_noop(&self) -> bool {
        self.sessions_cleaned == 0
            && self.branches_cleaned == 0
            && self.records_pruned == 0
            && self.would_clean == 0
            && self.details.is_empty()
            && self.errors.is_empty()
    }
}
