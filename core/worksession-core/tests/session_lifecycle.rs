//! Integration tests for the session lifecycle through WorksessionEngine:
//! start, status, stop, and legacy store aggregation.

use std::path::Path;

use chrono::{Duration, Utc};
use tempfile::TempDir;
use worksession_core::gateway::{InMemorySandbox, InMemoryTerminal, InMemoryVcs};
use worksession_core::state::SHUTDOWN_ARTIFACT_PATH;
use worksession_core::{
    CoarseStatus, ProvisionRequest, SessionRecord, Settings, StatusKind, StorageConfig,
    WorkItemId, WorksessionEngine,
};

fn engine(temp: &TempDir, settings: Settings, terminal: InMemoryTerminal) -> WorksessionEngine {
    WorksessionEngine::with_parts(
        StorageConfig::with_root(temp.path().join("home")),
        settings,
        Box::new(InMemoryVcs::new()),
        Box::new(terminal),
        Box::new(InMemorySandbox::new()),
    )
}

fn request(temp: &TempDir, id: &str) -> ProvisionRequest {
    ProvisionRequest {
        work_item: id.parse().unwrap(),
        title: "Some work".to_string(),
        repo_path: temp.path().join("app"),
        repo_name: None,
    }
}

#[test]
fn test_stop_marks_session_stopped_even_while_terminal_lives() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp, Settings::default(), InMemoryTerminal::new());
    let record = engine.start(&request(&temp, "test:quick")).unwrap();
    std::fs::create_dir_all(&record.worktree_path).unwrap();

    let item: WorkItemId = "test:quick".parse().unwrap();
    assert_eq!(engine.status(&item).unwrap().status.kind, StatusKind::Active);

    let stopped = engine.stop(&item).unwrap();
    assert_eq!(stopped.status, CoarseStatus::Stopped);
    assert!(record.worktree_path.join(SHUTDOWN_ARTIFACT_PATH).exists());

    let view = engine.status(&item).unwrap();
    assert_eq!(view.status.kind, StatusKind::Stopped);
    assert_eq!(view.status.time_delta, "now");
    assert!(view.status.last_change.is_some());
}

#[test]
fn test_corrupt_artifact_reports_unknown() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp, Settings::default(), InMemoryTerminal::new());
    let record = engine.start(&request(&temp, "github:5")).unwrap();

    // The terminal session goes away and a half-written artifact is left behind.
    let artifact = record.worktree_path.join(SHUTDOWN_ARTIFACT_PATH);
    std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
    std::fs::write(&artifact, r#"{"shutdown_hook": {"timest"#).unwrap();
    let reopened = WorksessionEngine::with_parts(
        engine.storage().clone(),
        engine.settings().clone(),
        Box::new(InMemoryVcs::new()),
        Box::new(InMemoryTerminal::new()),
        Box::new(InMemorySandbox::new()),
    );

    let view = reopened.status(&WorkItemId::github(5)).unwrap();
    assert_eq!(view.status.kind, StatusKind::Unknown);
}

fn write_legacy_store(repo: &Path, records: &[SessionRecord]) {
    let file = StorageConfig::legacy_sessions_file(repo);
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(file, serde_json::to_string(records).unwrap()).unwrap();
}

#[test]
fn test_list_merges_legacy_stores_and_orders_by_activity() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("code");
    let settings = Settings {
        workspace_roots: vec![workspace.clone()],
        ..Settings::default()
    };
    let engine = engine(&temp, settings, InMemoryTerminal::new());

    let mut old = SessionRecord::new(
        &WorkItemId::github(1),
        "old",
        "legacy",
        workspace.join("legacy"),
    );
    old.last_activity = Some(Utc::now() - Duration::hours(2));
    old.tmux_session = "gone".to_string();
    write_legacy_store(&workspace.join("legacy"), &[old]);
    engine.start(&request(&temp, "github:2")).unwrap();

    let views = engine.list().unwrap();
    let ids: Vec<&str> = views.iter().map(|v| v.record.id.as_str()).collect();
    assert_eq!(ids, vec!["github:2", "github:1"]);
    assert_eq!(views[1].status.kind, StatusKind::Stale);
    assert_eq!(views[1].status.time_delta, "2h ago");
}

#[test]
fn test_failed_start_is_recorded_and_can_be_retried() {
    let temp = TempDir::new().unwrap();
    let storage = StorageConfig::with_root(temp.path().join("home"));
    let failing = WorksessionEngine::with_parts(
        storage,
        Settings::default(),
        Box::new(InMemoryVcs::new()),
        Box::new(InMemoryTerminal::new().failing_for("app-github-7")),
        Box::new(InMemorySandbox::new()),
    );

    let record = failing.start(&request(&temp, "github:7")).unwrap();
    assert_eq!(record.failed_step.as_deref(), Some("terminal"));
    assert_eq!(failing.store().load().unwrap().len(), 1);

    let healthy = engine(&temp, Settings::default(), InMemoryTerminal::new());
    let retried = healthy.start(&request(&temp, "github:7")).unwrap();
    assert_eq!(retried.failed_step, None);
    let stored = healthy.store().load().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].resources, retried.resources);
}
