//! Orphaned issue branches: issue-pattern branches with no live session.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::engine::CleanupEngine;
use super::options::{CleanupOptions, CleanupScope};
use super::report::CleanupReport;
use crate::error::GatewayResult;
use crate::naming::{is_issue_branch, resolve_terminal_name, work_item_from_branch};
use crate::paths::{normalize_path, same_path};
use crate::types::{CoarseStatus, SessionRecord};

impl CleanupEngine<'_> {
    /// Active unless the terminal session is confirmed gone.
    fn counts_as_active(&self, record: &SessionRecord) -> bool {
        if record.status != CoarseStatus::Active {
            return false;
        }
        let Some(name) = resolve_terminal_name(record) else {
            return false;
        };
        match self.gateways().terminal.session_exists(&name) {
            Ok(exists) => exists,
            Err(e) => {
                warn!(
                    session = %record.id,
                    error = %e,
                    "Terminal check failed, keeping session's branch"
                );
                true
            }
        }
    }

    /// Issue-pattern branches in `repo` that no active session of that repo owns.
    ///
    /// A session is active only if its coarse status says so **and** its terminal
    /// session is confirmed to exist.
    pub fn find_orphaned_branches(
        &self,
        repo: &Path,
        records: &[SessionRecord],
    ) -> GatewayResult<Vec<String>> {
        let prefix = self.branch_prefix();
        let candidates: Vec<String> = self
            .gateways()
            .vcs
            .list_branches(repo)?
            .into_iter()
            .filter(|branch| is_issue_branch(prefix, branch))
            .collect();
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let mut active_ids = HashSet::new();
        let mut active_branches = HashSet::new();
        for record in records.iter().filter(|r| same_path(&r.repo_path, repo)) {
            if !self.counts_as_active(record) {
                continue;
            }
            active_ids.insert(record.id.clone());
            if !record.branch.is_empty() {
                active_branches.insert(record.branch.clone());
            }
        }

        Ok(candidates
            .into_iter()
            .filter(|branch| !active_branches.contains(branch))
            .filter(|branch| {
                work_item_from_branch(prefix, branch)
                    .map_or(true, |item| !active_ids.contains(&item.to_string()))
            })
            .collect())
    }

    /// Repositories covered by `scope`: the current one, or every repository a
    /// record points at.
    fn repos_in_scope(scope: &CleanupScope, records: &[SessionRecord]) -> Vec<PathBuf> {
        if let Some(repo) = scope.repo() {
            return vec![repo.to_path_buf()];
        }
        let mut seen = HashSet::new();
        records
            .iter()
            .filter(|r| !r.repo_path.as_os_str().is_empty())
            .filter(|r| seen.insert(normalize_path(&r.repo_path)))
            .map(|r| r.repo_path.clone())
            .collect()
    }

    /// Deletes orphaned branches in every repository in scope. The checked-out
    /// branch is never deleted, and an unreadable HEAD skips the repository.
    pub fn cleanup_branches(
        &self,
        records: &[SessionRecord],
        options: &CleanupOptions,
        report: &mut CleanupReport,
    ) {
        let vcs = self.gateways().vcs;

        for repo in Self::repos_in_scope(&options.scope, records) {
            let orphaned = match self.find_orphaned_branches(&repo, records) {
                Ok(orphaned) => orphaned,
                Err(e) => {
                    report
                        .errors
                        .push(format!("{}: list branches: {}", repo.display(), e));
                    continue;
                }
            };
            if orphaned.is_empty() {
                continue;
            }

            let current = match vcs.current_branch(&repo) {
                Ok(current) => current,
                Err(e) => {
                    report.errors.push(format!(
                        "{}: read checked-out branch: {}",
                        repo.display(),
                        e
                    ));
                    continue;
                }
            };

            for branch in orphaned {
                if current.as_deref() == Some(branch.as_str()) {
                    report.details.push(format!(
                        "{}: kept checked-out branch {}",
                        repo.display(),
                        branch
                    ));
                    continue;
                }
                if options.dry_run {
                    report
                        .details
                        .push(format!("{}: would delete branch {}", repo.display(), branch));
                    continue;
                }
                match vcs.delete_branch(&repo, &branch) {
                    Ok(()) => {
                        info!(repo = %repo.display(), branch = %branch, "Orphaned branch deleted");
                        report.branches_cleaned += 1;
                        report
                            .details
                            .push(format!("{}: deleted branch {}", repo.display(), branch));
                    }
                    Err(e) => {
                        report.errors.push(format!(
                            "{}: delete branch {}: {}",
                            repo.display(),
                            branch,
                            e
                        ));
                    }
                }
            }
        }
    }
}
