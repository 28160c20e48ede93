//! Session lifecycle: provisioning the resource bundle, activity updates, and
//! the shutdown hook.
//!
//! # Provisioning Order
//!
//! ```text
//! branch ─► worktree ─► terminal ─► sandbox
//! ```
//!
//! Each step reuses the resource if it already exists. [`Provisioner::plan`]
//! writes every handle onto a `creating` record, which the caller persists before
//! the first step runs, so a start that fails or dies halfway is still fully
//! addressable by cleanup.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{GatewayError, GatewayResult, Result, WorksessionError};
use crate::gateway::Gateways;
use crate::naming::{
    branch_name, resolve_worktree_path, sandbox_name, tmux_session_name, worktree_path,
};
use crate::paths::same_path;
use crate::state::{
    find_record_mut, remove_shutdown_artifact, write_shutdown_artifact, SessionStore,
};
use crate::types::{
    CoarseStatus, ResourceEntryStatus, ResourceStatus, ResourceType, SessionRecord, WorkItemId,
};

#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub work_item: WorkItemId,
    pub title: String,
    pub repo_path: PathBuf,
    /// Defaults to the repository directory name.
    pub repo_name: Option<String>,
}

struct StepFailure {
    resource_type: ResourceType,
    resource_id: String,
    error: GatewayError,
}

pub struct Provisioner<'a> {
    gateways: Gateways<'a>,
    branch_prefix: String,
    worktree_dir: String,
}

impl<'a> Provisioner<'a> {
    pub fn new(gateways: Gateways<'a>, settings: &Settings) -> Self {
        Provisioner {
            gateways,
            branch_prefix: settings.branch_prefix.clone(),
            worktree_dir: settings.worktree_dir.clone(),
        }
    }

    /// Skeleton record for `request`: every resource handle filled in,
    /// `resource_status = creating`, nothing created yet.
    pub fn plan(&self, request: &ProvisionRequest) -> SessionRecord {
        let item = &request.work_item;
        let repo_name = request.repo_name.clone().unwrap_or_else(|| {
            request
                .repo_path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default()
        });

        let mut record =
            SessionRecord::new(item, &request.title, &repo_name, request.repo_path.clone());
        record.issue_number = item.number().filter(|_| item.source() == "github");
        record.branch = branch_name(&self.branch_prefix, item);
        record.worktree_path = worktree_path(&record, &self.worktree_dir, item);
        record.tmux_session = tmux_session_name(&repo_name, item);
        record.sandbox_name = Some(sandbox_name(&repo_name, item));
        record
    }

    /// Creates (or adopts) every resource for `request`.
    ///
    /// Always returns the record. On failure it carries `resource_status =
    /// failed` with the failing step and reason; the caller persists it either way.
    pub fn provision(&self, request: &ProvisionRequest) -> SessionRecord {
        self.provision_record(self.plan(request))
    }

    /// Runs the provisioning steps for a record produced by [`Provisioner::plan`].
    pub fn provision_record(&self, mut record: SessionRecord) -> SessionRecord {
        match self.run_steps(&mut record) {
            Ok(()) => {
                record.resource_status = ResourceStatus::Active;
                record.status = CoarseStatus::Active;
                record.current_step = None;
                info!(session = %record.id, "Session provisioned");
            }
            Err(failure) => {
                warn!(
                    session = %record.id,
                    step = %failure.resource_type,
                    error = %failure.error,
                    "Provisioning failed"
                );
                let mut metadata = BTreeMap::new();
                metadata.insert("error".to_string(), failure.error.to_string());
                record.record_resource(
                    failure.resource_type,
                    &failure.resource_id,
                    ResourceEntryStatus::Failed,
                    metadata,
                );
                record.resource_status = ResourceStatus::Failed;
                record.failed_step = Some(failure.resource_type.to_string());
                record.failure_reason = Some(failure.error.to_string());
                record.current_step = None;
            }
        }
        record
    }

    fn run_steps(&self, record: &mut SessionRecord) -> std::result::Result<(), StepFailure> {
        let Gateways {
            vcs,
            terminal,
            sandbox,
        } = self.gateways;
        let repo = record.repo_path.clone();
        let branch = record.branch.clone();
        let worktree = record.worktree_path.clone();
        let session = record.tmux_session.clone();
        let sandbox_name = record.sandbox_name.clone().unwrap_or_default();

        ensure(
            record,
            ResourceType::Branch,
            &branch,
            || vcs.branch_exists(&repo, &branch),
            || vcs.create_branch(&repo, &branch),
        )?;
        ensure(
            record,
            ResourceType::Worktree,
            &worktree.display().to_string(),
            || {
                vcs.list_worktrees(&repo)
                    .map(|list| list.iter().any(|w| same_path(w, &worktree)))
            },
            || vcs.create_worktree(&repo, &worktree, &branch),
        )?;
        ensure(
            record,
            ResourceType::Terminal,
            &session,
            || terminal.session_exists(&session),
            || terminal.create_session(&session, &worktree),
        )?;
        ensure(
            record,
            ResourceType::Sandbox,
            &sandbox_name,
            || sandbox.sandbox_exists(&sandbox_name),
            || sandbox.create_sandbox(&sandbox_name, &worktree),
        )
    }
}

fn ensure(
    record: &mut SessionRecord,
    resource_type: ResourceType,
    resource_id: &str,
    exists: impl FnOnce() -> GatewayResult<bool>,
    create: impl FnOnce() -> GatewayResult<()>,
) -> std::result::Result<(), StepFailure> {
    record.current_step = Some(resource_type.to_string());
    let fail = |error: GatewayError| StepFailure {
        resource_type,
        resource_id: resource_id.to_string(),
        error,
    };

    let reused = exists().map_err(fail)?;
    if !reused {
        create().map_err(fail)?;
    }

    let mut metadata = BTreeMap::new();
    if reused {
        metadata.insert("reused".to_string(), "true".to_string());
    }
    record.record_resource(resource_type, resource_id, ResourceEntryStatus::Created, metadata);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle updates
// ─────────────────────────────────────────────────────────────────────────────

/// Records activity on a session.
///
/// A stopped session becomes active again and its shutdown artifact is removed,
/// otherwise the detector would keep reporting it stopped.
pub fn touch(store: &SessionStore, item: &WorkItemId, settings: &Settings) -> Result<SessionRecord> {
    store.update(settings.lock_timeout(), |records| {
        let record = find_record_mut(records, item)
            .ok_or_else(|| WorksessionError::SessionNotFound(item.to_string()))?;
        if let Some((_, worktree)) = resolve_worktree_path(record, &settings.worktree_dir) {
            if remove_shutdown_artifact(&worktree)? {
                info!(session = %record.id, "Shutdown artifact cleared");
            }
        }
        record.touch();
        if record.status == CoarseStatus::Stopped {
            record.status = CoarseStatus::Active;
        }
        Ok(record.clone())
    })
}

/// Shutdown hook: marks the session stopped and writes the shutdown artifact
/// into its worktree.
///
/// A missing worktree only skips the artifact; the record is still updated.
pub fn mark_stopped(
    store: &SessionStore,
    item: &WorkItemId,
    settings: &Settings,
) -> Result<SessionRecord> {
    store.update(settings.lock_timeout(), |records| {
        let record = find_record_mut(records, item)
            .ok_or_else(|| WorksessionError::SessionNotFound(item.to_string()))?;
        let now = Utc::now();

        match resolve_worktree_path(record, &settings.worktree_dir) {
            Some((_, worktree)) if worktree.is_dir() => write_shutdown_artifact(&worktree, now)?,
            Some((_, worktree)) => {
                warn!(
                    session = %record.id,
                    worktree = %worktree.display(),
                    "Worktree missing, shutdown artifact not written"
                );
            }
            None => warn!(session = %record.id, "No worktree path, shutdown artifact not written"),
        }

        record.status = CoarseStatus::Stopped;
        record.last_activity = Some(now);
        info!(session = %record.id, "Session stopped");
        Ok(record.clone())
    })
}
