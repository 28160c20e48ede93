//! Status detection: fuses the shutdown artifact, terminal liveness and the
//! record's own timestamps into one [`SessionStatus`].
//!
//! # Evidence Precedence
//!
//! ```text
//! 1. shutdown artifact parses with a timestamp  → stopped (last change = artifact time)
//! 2. terminal session confirmed alive           → active  (no fixed instant)
//! 3. shutdown artifact present but unparsable   → unknown
//! 4. otherwise                                  → stale   (last change = last_activity)
//! ```
//!
//! Step 3 sits below step 2 on purpose: a corrupt artifact from an earlier run
//! must not hide a live session, but without a live session it must not be
//! reported as plain "stale" either.
//!
//! # Shutdown Artifact
//!
//! Written by the shutdown hook at [`SHUTDOWN_ARTIFACT_PATH`] (relative to the
//! worktree, which is also the sandbox working directory). Accepted shapes:
//!
//! ```json
//! { "shutdown_hook": { "timestamp": "2026-01-27T07:00:00Z" } }
//! { "timestamp": "2026-01-27T07:00:00+02:00" }
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde_json::Value;
use tracing::debug;

use super::delta::{format_optional_delta, format_time_delta};
use crate::error::{Result, WorksessionError};
use crate::gateway::{SandboxGateway, TerminalGateway};
use crate::naming::{resolve_sandbox_name, resolve_terminal_name, resolve_worktree_path};
use crate::types::{SessionRecord, SessionStatus, StatusKind};

pub const SHUTDOWN_ARTIFACT_PATH: &str = ".worksession/shutdown.json";
pub const SHUTDOWN_HOOK_KEY: &str = "shutdown_hook";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownArtifact {
    Absent,
    Stopped(DateTime<Utc>),
    /// Present but corrupt or missing a usable timestamp.
    Unparsable(String),
}

fn timestamp_at(value: &Value) -> Option<&str> {
    value.get("timestamp").and_then(Value::as_str)
}

pub fn parse_shutdown_artifact(content: &str) -> ShutdownArtifact {
    let value: Value = match serde_json::from_str(content) {
        Ok(value) => value,
        Err(e) => return ShutdownArtifact::Unparsable(e.to_string()),
    };
    if !value.is_object() {
        return ShutdownArtifact::Unparsable("expected a JSON object".to_string());
    }

    let raw = value
        .get(SHUTDOWN_HOOK_KEY)
        .and_then(timestamp_at)
        .or_else(|| timestamp_at(&value));

    match raw {
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => ShutdownArtifact::Stopped(ts.with_timezone(&Utc)),
            Err(e) => ShutdownArtifact::Unparsable(format!("bad timestamp {:?}: {}", raw, e)),
        },
        None => ShutdownArtifact::Unparsable("no timestamp".to_string()),
    }
}

/// Reads the artifact from the worktree on the local filesystem.
pub fn read_shutdown_artifact_from_worktree(worktree: &Path) -> ShutdownArtifact {
    match fs::read_to_string(worktree.join(SHUTDOWN_ARTIFACT_PATH)) {
        Ok(content) => parse_shutdown_artifact(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ShutdownArtifact::Absent,
        Err(e) => ShutdownArtifact::Unparsable(e.to_string()),
    }
}

/// Writes the artifact in the nested shape. Used by the shutdown hook.
pub fn write_shutdown_artifact(worktree: &Path, at: DateTime<Utc>) -> Result<()> {
    let path = worktree.join(SHUTDOWN_ARTIFACT_PATH);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| WorksessionError::io("Failed to create shutdown artifact directory", e))?;
    }
    let content = serde_json::json!({ SHUTDOWN_HOOK_KEY: { "timestamp": at.to_rfc3339() } });
    fs::write(&path, content.to_string())
        .map_err(|e| WorksessionError::io("Failed to write shutdown artifact", e))
}

/// Deletes the artifact, returning whether one was there. Used when a stopped
/// session sees activity again.
pub fn remove_shutdown_artifact(worktree: &Path) -> Result<bool> {
    match fs::remove_file(worktree.join(SHUTDOWN_ARTIFACT_PATH)) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(WorksessionError::io("Failed to remove shutdown artifact", e)),
    }
}

pub struct StatusDetector<'a> {
    terminal: &'a dyn TerminalGateway,
    sandbox: &'a dyn SandboxGateway,
    worktree_dir: String,
}

impl<'a> StatusDetector<'a> {
    pub fn new(terminal: &'a dyn TerminalGateway, sandbox: &'a dyn SandboxGateway) -> Self {
        Self {
            terminal,
            sandbox,
            worktree_dir: crate::config::Settings::default().worktree_dir,
        }
    }

    pub fn with_worktree_dir(mut self, worktree_dir: &str) -> Self {
        self.worktree_dir = worktree_dir.to_string();
        self
    }

    /// Sandbox first, then the worktree on disk.
    pub fn read_shutdown_artifact(&self, record: &SessionRecord) -> ShutdownArtifact {
        if let Some((_, name)) = resolve_sandbox_name(record) {
            match self.sandbox.sandbox_exists(&name) {
                Ok(true) => match self.sandbox.read_file(&name, SHUTDOWN_ARTIFACT_PATH) {
                    Ok(Some(content)) => return parse_shutdown_artifact(&content),
                    Ok(None) => {}
                    Err(e) => {
                        debug!(sandbox = %name, error = %e, "Sandbox read failed, using worktree");
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    debug!(sandbox = %name, error = %e, "Sandbox check failed, using worktree");
                }
            }
        }

        match resolve_worktree_path(record, &self.worktree_dir) {
            Some((_, worktree)) => read_shutdown_artifact_from_worktree(&worktree),
            None => ShutdownArtifact::Absent,
        }
    }

    /// True only when the terminal gateway positively confirms the session.
    fn terminal_confirmed(&self, record: &SessionRecord) -> bool {
        let Some(name) = resolve_terminal_name(record) else {
            return false;
        };
        match self.terminal.session_exists(&name) {
            Ok(exists) => exists,
            Err(e) => {
                debug!(session = %name, error = %e, "Terminal check failed");
                false
            }
        }
    }

    pub fn detect(&self, record: &SessionRecord) -> SessionStatus {
        self.detect_at(record, Utc::now())
    }

    pub fn detect_at(&self, record: &SessionRecord, now: DateTime<Utc>) -> SessionStatus {
        let artifact = self.read_shutdown_artifact(record);

        if let ShutdownArtifact::Stopped(at) = artifact {
            return SessionStatus {
                kind: StatusKind::Stopped,
                last_change: Some(at),
                time_delta: format_time_delta(at, now),
            };
        }

        if self.terminal_confirmed(record) {
            return SessionStatus {
                kind: StatusKind::Active,
                last_change: None,
                time_delta: "now".to_string(),
            };
        }

        if let ShutdownArtifact::Unparsable(reason) = &artifact {
            debug!(session = %record.id, reason = %reason, "Shutdown artifact unparsable");
            return SessionStatus {
                kind: StatusKind::Unknown,
                last_change: record.last_activity,
                time_delta: format_optional_delta(record.last_activity, now),
            };
        }

        SessionStatus {
            kind: StatusKind::Stale,
            last_change: record.last_activity,
            time_delta: format_optional_delta(record.last_activity, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{InMemorySandbox, InMemoryTerminal};
    use crate::types::WorkItemId;
    use chrono::Duration;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn record(worktree: &Path) -> SessionRecord {
        let item = WorkItemId::github(1);
        let mut record = SessionRecord::new(&item, "t", "app", PathBuf::from("/code/app"));
        record.tmux_session = "app-github-1".to_string();
        record.sandbox_name = Some("app-github-1".to_string());
        record.worktree_path = worktree.to_path_buf();
        record
    }

    #[test]
    fn test_parse_nested_and_top_level_shapes() {
        let nested = r#"{"shutdown_hook": {"timestamp": "2026-01-27T07:00:00Z"}}"#;
        let top = r#"{"timestamp": "2026-01-27T09:00:00+02:00", "reason": "exit"}"#;
        let expected: DateTime<Utc> = "2026-01-27T07:00:00Z".parse().unwrap();
        assert_eq!(parse_shutdown_artifact(nested), ShutdownArtifact::Stopped(expected));
        assert_eq!(parse_shutdown_artifact(top), ShutdownArtifact::Stopped(expected));
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        for content in [
            "not json",
            "[]",
            r#"{"shutdown_hook": {}}"#,
            r#"{"timestamp": 12345}"#,
            r#"{"timestamp": "yesterday"}"#,
        ] {
            assert!(
                matches!(parse_shutdown_artifact(content), ShutdownArtifact::Unparsable(_)),
                "accepted {}",
                content
            );
        }
    }

    #[test]
    fn test_write_then_read_from_worktree() {
        let temp = tempdir().unwrap();
        let at: DateTime<Utc> = "2026-03-01T12:00:00Z".parse().unwrap();
        write_shutdown_artifact(temp.path(), at).unwrap();
        assert_eq!(
            read_shutdown_artifact_from_worktree(temp.path()),
            ShutdownArtifact::Stopped(at)
        );
    }

    #[test]
    fn test_active_when_terminal_alive_and_no_artifact() {
        let temp = tempdir().unwrap();
        let terminal = InMemoryTerminal::new().with_session("app-github-1");
        let sandbox = InMemorySandbox::new();
        let status = StatusDetector::new(&terminal, &sandbox).detect(&record(temp.path()));
        assert_eq!(status.kind, StatusKind::Active);
        assert_eq!(status.last_change, None);
        assert_eq!(status.time_delta, "now");
    }

    #[test]
    fn test_stopped_wins_over_live_terminal() {
        let temp = tempdir().unwrap();
        let at = Utc::now() - Duration::minutes(5);
        write_shutdown_artifact(temp.path(), at).unwrap();
        let terminal = InMemoryTerminal::new().with_session("app-github-1");
        let sandbox = InMemorySandbox::new();

        let status = StatusDetector::new(&terminal, &sandbox).detect(&record(temp.path()));
        assert_eq!(status.kind, StatusKind::Stopped);
        assert_eq!(
            status.last_change.map(|t| t.timestamp()),
            Some(at.timestamp())
        );
        assert_eq!(status.time_delta, "5m ago");
    }

    #[test]
    fn test_sandbox_artifact_is_read_before_worktree() {
        let temp = tempdir().unwrap();
        write_shutdown_artifact(temp.path(), "2026-01-01T00:00:00Z".parse().unwrap()).unwrap();
        let terminal = InMemoryTerminal::new();
        let sandbox = InMemorySandbox::new().with_sandbox("app-github-1").with_file(
            "app-github-1",
            SHUTDOWN_ARTIFACT_PATH,
            r#"{"timestamp": "2026-02-01T00:00:00Z"}"#,
        );

        let status = StatusDetector::new(&terminal, &sandbox).detect(&record(temp.path()));
        assert_eq!(status.kind, StatusKind::Stopped);
        assert_eq!(
            status.last_change,
            Some("2026-02-01T00:00:00Z".parse().unwrap())
        );
    }

    #[test]
    fn test_failed_sandbox_read_falls_back_to_worktree() {
        let temp = tempdir().unwrap();
        let at: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        write_shutdown_artifact(temp.path(), at).unwrap();
        let terminal = InMemoryTerminal::new();
        let sandbox = InMemorySandbox::new()
            .with_sandbox("app-github-1")
            .failing("read_file", "app-github-1");

        let status = StatusDetector::new(&terminal, &sandbox).detect(&record(temp.path()));
        assert_eq!(status.kind, StatusKind::Stopped);
        assert_eq!(status.last_change, Some(at));
    }

    #[test]
    fn test_unparsable_artifact_is_unknown_not_stale() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join(".worksession")).unwrap();
        std::fs::write(temp.path().join(SHUTDOWN_ARTIFACT_PATH), "{truncated").unwrap();
        let terminal = InMemoryTerminal::new();
        let sandbox = InMemorySandbox::new();

        let status = StatusDetector::new(&terminal, &sandbox).detect(&record(temp.path()));
        assert_eq!(status.kind, StatusKind::Unknown);
    }

    #[test]
    fn test_unparsable_artifact_does_not_hide_live_session() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join(".worksession")).unwrap();
        std::fs::write(temp.path().join(SHUTDOWN_ARTIFACT_PATH), "{}").unwrap();
        let terminal = InMemoryTerminal::new().with_session("app-github-1");
        let sandbox = InMemorySandbox::new();

        let status = StatusDetector::new(&terminal, &sandbox).detect(&record(temp.path()));
        assert_eq!(status.kind, StatusKind::Active);
    }

    #[test]
    fn test_stale_uses_last_activity() {
        let temp = tempdir().unwrap();
        let now = Utc::now();
        let mut r = record(temp.path());
        r.last_activity = Some(now - Duration::hours(2));
        let terminal = InMemoryTerminal::new();
        let sandbox = InMemorySandbox::new();

        let status = StatusDetector::new(&terminal, &sandbox).detect_at(&r, now);
        assert_eq!(status.kind, StatusKind::Stale);
        assert_eq!(status.last_change, r.last_activity);
        assert_eq!(status.time_delta, "2h ago");
    }

    #[test]
    fn test_terminal_error_is_not_confirmation() {
        let temp = tempdir().unwrap();
        let mut r = record(temp.path());
        r.last_activity = None;
        let terminal = InMemoryTerminal::new().failing_for("app-github-1");
        let sandbox = InMemorySandbox::new();

        let status = StatusDetector::new(&terminal, &sandbox).detect(&r);
        assert_eq!(status.kind, StatusKind::Stale);
        assert_eq!(status.last_change, None);
        assert_eq!(status.time_delta, "unknown");
    }
}
