//! WorksessionEngine - the entry point for worksession clients.
//!
//! Bundles storage paths, settings, and the three resource gateways so that a
//! client (the CLI today) can run each command as one call:
//!
//! - **Synchronous**: every call blocks on its gateway round-trips
//! - **Stateless**: each call loads the store fresh
//!
//! ```rust,ignore
//! use worksession_core::WorksessionEngine;
//!
//! let engine = WorksessionEngine::new()?;
//! for view in engine.list()? {
//!     println!("{} {}", view.record.id, view.status.kind);
//! }
//! ```

use std::path::PathBuf;

use chrono::Utc;
use fs_err as fs;
use serde::Serialize;
use tracing::info;

use crate::cleanup::{reconcile, CleanupEngine, CleanupOptions, CleanupReport};
use crate::config::{load_settings, Settings};
use crate::error::{Result, WorksessionError};
use crate::gateway::{
    ContainerCli, Gateways, GitCli, SandboxGateway, TerminalGateway, TmuxCli, VcsGateway,
};
use crate::lifecycle::{mark_stopped, touch, ProvisionRequest, Provisioner};
use crate::state::{
    discover_legacy_stores, find_record, find_record_mut, load_all, SessionStore, StatusDetector,
};
use crate::storage::StorageConfig;
use crate::types::{ResourceStatus, SessionRecord, SessionStatus, WorkItemId};

/// A record together with its freshly detected status.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub record: SessionRecord,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationSummary {
    /// Legacy per-repository stores folded into the global store.
    pub legacy_stores: Vec<PathBuf>,
    /// Records added to the global store.
    pub records_imported: usize,
    pub records_total: usize,
}

pub struct WorksessionEngine {
    storage: StorageConfig,
    settings: Settings,
    vcs: Box<dyn VcsGateway>,
    terminal: Box<dyn TerminalGateway>,
    sandbox: Box<dyn SandboxGateway>,
}

impl WorksessionEngine {
    /// Default storage (`~/.worksession`, or `WORKSESSION_HOME`), settings from
    /// its `config.toml`, and the command-line gateways.
    pub fn new() -> Result<Self> {
        let storage = StorageConfig::from_env()?;
        let settings = load_settings(&storage)?;
        let sandbox = ContainerCli::new(&settings);
        Ok(Self::with_parts(
            storage,
            settings,
            Box::new(GitCli),
            Box::new(TmuxCli),
            Box::new(sandbox),
        ))
    }

    /// Used by tests with temp directories and in-memory gateways.
    pub fn with_parts(
        storage: StorageConfig,
        settings: Settings,
        vcs: Box<dyn VcsGateway>,
        terminal: Box<dyn TerminalGateway>,
        sandbox: Box<dyn SandboxGateway>,
    ) -> Self {
        WorksessionEngine {
            storage,
            settings,
            vcs,
            terminal,
            sandbox,
        }
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn gateways(&self) -> Gateways<'_> {
        Gateways {
            vcs: self.vcs.as_ref(),
            terminal: self.terminal.as_ref(),
            sandbox: self.sandbox.as_ref(),
        }
    }

    /// The global store every writer goes through.
    pub fn store(&self) -> SessionStore {
        SessionStore::global(&self.storage, &self.settings)
    }

    fn detector(&self) -> StatusDetector<'_> {
        StatusDetector::new(self.terminal.as_ref(), self.sandbox.as_ref())
            .with_worktree_dir(&self.settings.worktree_dir)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sessions API
    // ─────────────────────────────────────────────────────────────────────────

    /// Provisions a session and records it.
    ///
    /// The planned record (`creating`, all handles filled in) is stored under the
    /// lock before any resource is created, and replaced by the final record
    /// afterwards. A start that fails or is killed halfway stays visible to
    /// cleanup.
    ///
    /// Starting a work item whose previous attempt failed replaces that record.
    pub fn start(&self, request: &ProvisionRequest) -> Result<SessionRecord> {
        let store = self.store();
        let item = &request.work_item;
        let provisioner = Provisioner::new(self.gateways(), &self.settings);
        let planned = provisioner.plan(request);

        store.update(self.settings.lock_timeout(), |records| {
            if let Some(existing) = find_record(records, item) {
                if existing.resource_status != ResourceStatus::Failed {
                    return Err(WorksessionError::SessionExists(item.to_string()));
                }
            }
            records.retain(|r| r.id != planned.id);
            records.push(planned.clone());
            Ok(())
        })?;

        let record = provisioner.provision_record(planned);
        store.update(self.settings.lock_timeout(), |records| {
            match find_record_mut(records, item) {
                Some(slot) => *slot = record.clone(),
                None => records.push(record.clone()),
            }
            Ok(())
        })?;
        Ok(record)
    }

    /// Every known session (global and legacy stores) with its live status,
    /// most recently active first.
    pub fn list(&self) -> Result<Vec<SessionView>> {
        let detector = self.detector();
        let now = Utc::now();
        let mut views: Vec<SessionView> = load_all(&self.storage, &self.settings)?
            .into_iter()
            .map(|record| SessionView {
                status: detector.detect_at(&record, now),
                record,
            })
            .collect();
        views.sort_by(|a, b| b.record.last_activity.cmp(&a.record.last_activity));
        Ok(views)
    }

    pub fn status(&self, item: &WorkItemId) -> Result<SessionView> {
        let records = load_all(&self.storage, &self.settings)?;
        let record = find_record(&records, item)
            .cloned()
            .ok_or_else(|| WorksessionError::SessionNotFound(item.to_string()))?;
        Ok(SessionView {
            status: self.detector().detect(&record),
            record,
        })
    }

    pub fn touch(&self, item: &WorkItemId) -> Result<SessionRecord> {
        touch(&self.store(), item, &self.settings)
    }

    pub fn stop(&self, item: &WorkItemId) -> Result<SessionRecord> {
        mark_stopped(&self.store(), item, &self.settings)
    }

    pub fn cleanup(&self, options: &CleanupOptions) -> Result<CleanupReport> {
        let engine = CleanupEngine::new(self.gateways()).with_settings(&self.settings);
        reconcile(&self.store(), &engine, options, self.settings.lock_timeout())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Migration API
    // ─────────────────────────────────────────────────────────────────────────

    /// Folds every legacy per-repository store into the global store and renames
    /// the legacy files to `sessions.json.migrated`.
    pub fn migrate_legacy(&self) -> Result<MigrationSummary> {
        let store = self.store();
        let legacy_stores = discover_legacy_stores(&self.storage, &self.settings);

        let summary = store.update(self.settings.lock_timeout(), |records| {
            let before = records.len();
            let merged = load_all(&self.storage, &self.settings)?;
            *records = merged;
            Ok(MigrationSummary {
                legacy_stores: legacy_stores.clone(),
                records_imported: records.len().saturating_sub(before),
                records_total: records.len(),
            })
        })?;

        for path in &legacy_stores {
            let mut renamed = path.clone().into_os_string();
            renamed.push(".migrated");
            fs::rename(path, &renamed)
                .map_err(|e| WorksessionError::io("Failed to retire legacy session store", e))?;
        }

        info!(
            stores = summary.legacy_stores.len(),
            imported = summary.records_imported,
            "Legacy session stores migrated"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GatewayError, GatewayResult};
    use crate::gateway::{InMemorySandbox, InMemoryTerminal, InMemoryVcs};
    use crate::types::StatusKind;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    /// Terminal gateway that snapshots the store when asked to create a session.
    struct StoreSnapshotTerminal {
        store: SessionStore,
        seen: Arc<Mutex<Option<Vec<SessionRecord>>>>,
    }

    impl TerminalGateway for StoreSnapshotTerminal {
        fn session_exists(&self, _name: &str) -> GatewayResult<bool> {
            Ok(false)
        }

        fn create_session(&self, _name: &str, _cwd: &Path) -> GatewayResult<()> {
            let records = self
                .store
                .load()
                .map_err(|e| GatewayError::Injected(e.to_string()))?;
            *self.seen.lock().unwrap() = Some(records);
            Ok(())
        }

        fn kill_session(&self, _name: &str) -> GatewayResult<()> {
            Ok(())
        }
    }

    fn engine(root: PathBuf, settings: Settings) -> WorksessionEngine {
        WorksessionEngine::with_parts(
            StorageConfig::with_root(root),
            settings,
            Box::new(InMemoryVcs::new()),
            Box::new(InMemoryTerminal::new()),
            Box::new(InMemorySandbox::new()),
        )
    }

    #[test]
    fn test_start_then_duplicate_is_rejected() {
        let temp = tempdir().unwrap();
        let engine = engine(temp.path().join("home"), Settings::default());
        let request = ProvisionRequest {
            work_item: WorkItemId::github(4),
            title: "Add thing".to_string(),
            repo_path: temp.path().join("app"),
            repo_name: None,
        };

        let record = engine.start(&request).unwrap();
        assert_eq!(record.resource_status, ResourceStatus::Active);

        let view = engine.status(&request.work_item).unwrap();
        assert_eq!(view.status.kind, StatusKind::Active);

        let err = engine.start(&request).unwrap_err();
        assert!(matches!(err, WorksessionError::SessionExists(_)));
    }

    #[test]
    fn test_start_records_session_before_creating_resources() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().join("home"));
        let seen = Arc::new(Mutex::new(None));
        let terminal = StoreSnapshotTerminal {
            store: SessionStore::new(storage.sessions_file()),
            seen: Arc::clone(&seen),
        };
        let engine = WorksessionEngine::with_parts(
            storage,
            Settings::default(),
            Box::new(InMemoryVcs::new()),
            Box::new(terminal),
            Box::new(InMemorySandbox::new()),
        );
        let request = ProvisionRequest {
            work_item: WorkItemId::github(6),
            title: "Spy".to_string(),
            repo_path: temp.path().join("app"),
            repo_name: None,
        };

        let record = engine.start(&request).unwrap();
        assert_eq!(record.resource_status, ResourceStatus::Active);

        let during = seen.lock().unwrap().take().expect("terminal step ran");
        assert_eq!(during.len(), 1);
        assert_eq!(during[0].id, "github:6");
        assert_eq!(during[0].resource_status, ResourceStatus::Creating);
        assert_eq!(during[0].tmux_session, record.tmux_session);
        assert_eq!(during[0].worktree_path, record.worktree_path);

        let stored = engine.store().load().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].resource_status, ResourceStatus::Active);
    }

    #[test]
    fn test_start_refuses_session_still_being_created() {
        let temp = tempdir().unwrap();
        let engine = engine(temp.path().join("home"), Settings::default());
        let item = WorkItemId::github(11);
        let pending = SessionRecord::new(&item, "t", "app", temp.path().join("app"));
        assert_eq!(pending.resource_status, ResourceStatus::Creating);
        engine.store().save(&[pending]).unwrap();

        let request = ProvisionRequest {
            work_item: item,
            title: "t".to_string(),
            repo_path: temp.path().join("app"),
            repo_name: None,
        };
        let err = engine.start(&request).unwrap_err();
        assert!(matches!(err, WorksessionError::SessionExists(_)));
        assert_eq!(engine.store().load().unwrap().len(), 1);
    }

    #[test]
    fn test_migrate_legacy_keeps_records_without_identity() {
        let temp = tempdir().unwrap();
        let workspace = temp.path().join("code");
        let legacy = StorageConfig::legacy_sessions_file(&workspace.join("app"));
        std::fs::create_dir_all(legacy.parent().unwrap()).unwrap();
        std::fs::write(&legacy, r#"[{"title": "first"}, {"title": "second"}]"#).unwrap();

        let settings = Settings {
            workspace_roots: vec![workspace],
            ..Settings::default()
        };
        let engine = engine(temp.path().join("home"), settings);

        let summary = engine.migrate_legacy().unwrap();
        assert_eq!(summary.records_imported, 2);
        assert!(!legacy.exists());
        let titles: Vec<String> = engine
            .store()
            .load()
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[test]
    fn test_migrate_legacy_folds_and_retires_stores() {
        let temp = tempdir().unwrap();
        let workspace = temp.path().join("code");
        let legacy = StorageConfig::legacy_sessions_file(&workspace.join("app"));
        std::fs::create_dir_all(legacy.parent().unwrap()).unwrap();
        std::fs::write(&legacy, r#"[{"issue_number": 8, "title": "old"}]"#).unwrap();

        let settings = Settings {
            workspace_roots: vec![workspace],
            ..Settings::default()
        };
        let engine = engine(temp.path().join("home"), settings);

        let summary = engine.migrate_legacy().unwrap();
        assert_eq!(summary.legacy_stores, vec![legacy.clone()]);
        assert_eq!(summary.records_imported, 1);
        assert!(!legacy.exists());
        assert_eq!(engine.store().load().unwrap()[0].id, "github:8");

        // A second run finds nothing left to fold in.
        let again = engine.migrate_legacy().unwrap();
        assert!(again.legacy_stores.is_empty());
        assert_eq!(again.records_total, 1);
    }
}
