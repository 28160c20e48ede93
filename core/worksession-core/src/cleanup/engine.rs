//! Stale-session identification and per-session resource cleanup.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use super::options::{CleanupOptions, CleanupScope};
use super::report::CleanupReport;
use crate::config::Settings;
use crate::gateway::Gateways;
use crate::naming::{resolve_sandbox_name, resolve_terminal_name, resolve_worktree_path};
use crate::paths::same_path;
use crate::types::{ResourceStatus, ResourceType, SessionRecord};

/// A record still being provisioned is left alone for this long.
const PROVISIONING_GRACE_MINUTES: i64 = 10;

/// What cleanup knows about one resource after its step ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePresence {
    /// Confirmed not to exist (or the record never had one).
    Absent,
    /// Deleted by this run.
    Removed,
    /// Still exists, either by request or because deletion failed.
    Remaining,
    /// The existence check itself failed.
    Unknown,
}

impl ResourcePresence {
    pub fn is_gone(self) -> bool {
        matches!(self, ResourcePresence::Absent | ResourcePresence::Removed)
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: String,
    pub sandbox: ResourcePresence,
    pub worktree: ResourcePresence,
    /// Resources deleted by this run, in deletion order.
    pub removed: Vec<(ResourceType, String)>,
    pub errors: Vec<String>,
    /// The record should be dropped from the store.
    pub prunable: bool,
}

impl SessionOutcome {
    fn new(session_id: &str) -> Self {
        SessionOutcome {
            session_id: session_id.to_string(),
            sandbox: ResourcePresence::Absent,
            worktree: ResourcePresence::Absent,
            removed: Vec::new(),
            errors: Vec::new(),
            prunable: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CleanupOutcome {
    pub report: CleanupReport,
    /// One entry per target, in target order. Empty for a dry run.
    pub sessions: Vec<SessionOutcome>,
}

pub struct CleanupEngine<'a> {
    gateways: Gateways<'a>,
    worktree_dir: String,
    branch_prefix: String,
}

impl<'a> CleanupEngine<'a> {
    pub fn new(gateways: Gateways<'a>) -> Self {
        let defaults = Settings::default();
        CleanupEngine {
            gateways,
            worktree_dir: defaults.worktree_dir,
            branch_prefix: defaults.branch_prefix,
        }
    }

    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.worktree_dir = settings.worktree_dir.clone();
        self.branch_prefix = settings.branch_prefix.clone();
        self
    }

    pub(super) fn gateways(&self) -> Gateways<'a> {
        self.gateways
    }

    pub(super) fn branch_prefix(&self) -> &str {
        &self.branch_prefix
    }

    // ─────────────────────────────────────────────────────────────────────
    // Identification
    // ─────────────────────────────────────────────────────────────────────

    /// A session is stale when its terminal session is confirmed gone.
    ///
    /// A failed check is not confirmation. Records still inside their
    /// provisioning window are never stale.
    pub fn is_stale(&self, record: &SessionRecord) -> bool {
        if record.resource_status == ResourceStatus::Creating
            && Utc::now() - record.created_at < Duration::minutes(PROVISIONING_GRACE_MINUTES)
        {
            debug!(session = %record.id, "Skipping session still being provisioned");
            return false;
        }

        let Some(name) = resolve_terminal_name(record) else {
            return true;
        };
        match self.gateways.terminal.session_exists(&name) {
            Ok(exists) => !exists,
            Err(e) => {
                warn!(
                    session = %record.id,
                    terminal = %name,
                    error = %e,
                    "Terminal check failed, treating session as not stale"
                );
                false
            }
        }
    }

    /// Indices of stale records inside `scope`, in record order.
    pub fn stale_indices(&self, records: &[SessionRecord], scope: &CleanupScope) -> Vec<usize> {
        records
            .iter()
            .enumerate()
            .filter(|(_, record)| scope.includes(record) && self.is_stale(record))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn identify_stale<'r>(
        &self,
        records: &'r [SessionRecord],
        scope: &CleanupScope,
    ) -> Vec<&'r SessionRecord> {
        self.stale_indices(records, scope)
            .into_iter()
            .map(|index| &records[index])
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Cleanup
    // ─────────────────────────────────────────────────────────────────────

    /// Cleans up `targets` according to `options`. Never aborts: every failure
    /// lands in the report and the batch moves on.
    pub fn cleanup(&self, targets: &[&SessionRecord], options: &CleanupOptions) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();

        if options.dry_run {
            for record in targets {
                outcome.report.details.push(self.describe_plan(record, options));
            }
            outcome.report.would_clean = targets.len() as u32;
            return outcome;
        }

        outcome.sessions = self.cleanup_all(targets, options);
        for session in &outcome.sessions {
            let report = &mut outcome.report;
            for (resource_type, id) in &session.removed {
                match resource_type {
                    ResourceType::Sandbox => report.sandboxes_cleaned += 1,
                    ResourceType::Worktree => report.worktrees_cleaned += 1,
                    _ => {}
                }
                report
                    .details
                    .push(format!("{}: removed {} {}", session.session_id, resource_type, id));
            }
            if session.prunable {
                report.records_pruned += 1;
                report
                    .details
                    .push(format!("{}: record removed", session.session_id));
            }
            if session.errors.is_empty() {
                report.sessions_cleaned += 1;
            }
            report.errors.extend(session.errors.iter().cloned());
        }

        info!(
            sessions = outcome.report.sessions_cleaned,
            sandboxes = outcome.report.sandboxes_cleaned,
            worktrees = outcome.report.worktrees_cleaned,
            pruned = outcome.report.records_pruned,
            errors = outcome.report.errors.len(),
            "Session cleanup finished"
        );
        outcome
    }

    fn cleanup_all(&self, targets: &[&SessionRecord], options: &CleanupOptions) -> Vec<SessionOutcome> {
        let workers = options.parallelism.min(targets.len()).max(1);
        if workers == 1 {
            return targets
                .iter()
                .map(|record| self.cleanup_session(record, options))
                .collect();
        }

        debug!(workers, sessions = targets.len(), "Cleaning sessions in parallel");
        let next = AtomicUsize::new(0);
        let results = Mutex::new(Vec::with_capacity(targets.len()));
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(record) = targets.get(index) else {
                        break;
                    };
                    let session = self.cleanup_session(record, options);
                    results
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push((index, session));
                });
            }
        });

        let mut results = results
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, session)| session).collect()
    }

    /// Sandbox, then worktree. A failure in one does not skip the other.
    pub fn cleanup_session(&self, record: &SessionRecord, options: &CleanupOptions) -> SessionOutcome {
        let mut outcome = SessionOutcome::new(&record.id);
        outcome.sandbox = self.sandbox_step(record, options.clean_sandboxes, &mut outcome);
        outcome.worktree = self.worktree_step(record, options.clean_worktrees, &mut outcome);
        outcome.prunable =
            options.prune_records && outcome.sandbox.is_gone() && outcome.worktree.is_gone();
        outcome
    }

    fn sandbox_step(
        &self,
        record: &SessionRecord,
        delete: bool,
        outcome: &mut SessionOutcome,
    ) -> ResourcePresence {
        let Some((strategy, name)) = resolve_sandbox_name(record) else {
            return ResourcePresence::Absent;
        };

        match self.gateways.sandbox.sandbox_exists(&name) {
            Ok(false) => ResourcePresence::Absent,
            Ok(true) if !delete => ResourcePresence::Remaining,
            Ok(true) => match self.gateways.sandbox.delete_sandbox(&name) {
                Ok(()) => {
                    info!(session = %record.id, sandbox = %name, ?strategy, "Sandbox deleted");
                    outcome.removed.push((ResourceType::Sandbox, name));
                    ResourcePresence::Removed
                }
                Err(e) => {
                    warn!(session = %record.id, sandbox = %name, error = %e, "Sandbox delete failed");
                    outcome
                        .errors
                        .push(format!("{}: delete sandbox {}: {}", record.id, name, e));
                    ResourcePresence::Remaining
                }
            },
            Err(e) => {
                outcome
                    .errors
                    .push(format!("{}: check sandbox {}: {}", record.id, name, e));
                ResourcePresence::Unknown
            }
        }
    }

    fn worktree_step(
        &self,
        record: &SessionRecord,
        remove: bool,
        outcome: &mut SessionOutcome,
    ) -> ResourcePresence {
        let Some((_, path)) = resolve_worktree_path(record, &self.worktree_dir) else {
            return ResourcePresence::Absent;
        };

        let exists = match self.worktree_exists(&record.repo_path, &path) {
            Ok(exists) => exists,
            Err(details) => {
                outcome.errors.push(format!(
                    "{}: check worktree {}: {}",
                    record.id,
                    path.display(),
                    details
                ));
                return ResourcePresence::Unknown;
            }
        };
        if !exists {
            return ResourcePresence::Absent;
        }
        if !remove {
            return ResourcePresence::Remaining;
        }

        if record.repo_path.as_os_str().is_empty() {
            outcome.errors.push(format!(
                "{}: remove worktree {}: record has no repository path",
                record.id,
                path.display()
            ));
            return ResourcePresence::Remaining;
        }

        match self.gateways.vcs.remove_worktree(&record.repo_path, &path) {
            Ok(()) => {
                info!(session = %record.id, worktree = %path.display(), "Worktree removed");
                outcome
                    .removed
                    .push((ResourceType::Worktree, path.display().to_string()));
                ResourcePresence::Removed
            }
            Err(e) => {
                warn!(
                    session = %record.id,
                    worktree = %path.display(),
                    error = %e,
                    "Worktree remove failed"
                );
                outcome.errors.push(format!(
                    "{}: remove worktree {}: {}",
                    record.id,
                    path.display(),
                    e
                ));
                ResourcePresence::Remaining
            }
        }
    }

    /// The repository's worktree list when it can be read, else a filesystem stat.
    fn worktree_exists(&self, repo: &Path, path: &Path) -> Result<bool, String> {
        if !repo.as_os_str().is_empty() {
            match self.gateways.vcs.list_worktrees(repo) {
                Ok(worktrees) => return Ok(worktrees.iter().any(|w| same_path(w, path))),
                Err(e) => {
                    debug!(repo = %repo.display(), error = %e, "Worktree list failed, using stat");
                }
            }
        }
        path.try_exists().map_err(|e| e.to_string())
    }

    fn describe_plan(&self, record: &SessionRecord, options: &CleanupOptions) -> String {
        let mut parts = Vec::new();
        if options.clean_sandboxes {
            if let Some((_, name)) = resolve_sandbox_name(record) {
                parts.push(format!("sandbox {}", name));
            }
        }
        if options.clean_worktrees {
            if let Some((_, path)) = resolve_worktree_path(record, &self.worktree_dir) {
                parts.push(format!("worktree {}", path.display()));
            }
        }
        if parts.is_empty() {
            format!("{}: would check resources", record.id)
        } else {
            format!("{}: would remove {}", record.id, parts.join(", "))
        }
    }
}
