//! File-backed session store.
//!
//! # File Format
//!
//! A single JSON array of [`SessionRecord`]s:
//!
//! ```json
//! [
//!   { "id": "github:123", "source_type": "github", "branch": "issue/github/123", ... }
//! ]
//! ```
//!
//! # Failure Semantics
//!
//! - Missing file (or whitespace only): empty store
//! - Unparsable content: hard error. Treating it as empty would let the next
//!   save overwrite the user's sessions.
//!
//! # Atomic Writes
//!
//! Saves go through a temp file in the same directory followed by a rename, so a
//! reader never observes a half-written array.
//!
//! # Concurrency
//!
//! Two processes doing load → modify → save can clobber each other. Writers either
//! hold a [`StoreLock`] across the cycle ([`SessionStore::update`]) or use
//! [`SessionStore::save_if_unchanged`] with a snapshot from
//! [`SessionStore::load_versioned`].

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs_err as fs;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::lock::StoreLock;
use super::migrate::{is_sentinel, migrate};
use crate::config::Settings;
use crate::error::{Result, WorksessionError};
use crate::storage::{StorageConfig, DATA_DIR_NAME, SESSIONS_FILE_NAME};
use crate::types::{SessionRecord, WorkItemId};

/// Identity of the store file's content at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVersion {
    Missing,
    Content { len: usize, hash: u64 },
}

impl StoreVersion {
    fn of(raw: Option<&str>) -> Self {
        match raw {
            None => StoreVersion::Missing,
            Some(content) => {
                let mut hasher = DefaultHasher::new();
                content.hash(&mut hasher);
                StoreVersion::Content {
                    len: content.len(),
                    hash: hasher.finish(),
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub records: Vec<SessionRecord>,
    pub version: StoreVersion,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    branch_prefix: String,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SessionStore {
            path: path.into(),
            branch_prefix: Settings::default().branch_prefix,
        }
    }

    /// The canonical global store.
    pub fn global(storage: &StorageConfig, settings: &Settings) -> Self {
        SessionStore::new(storage.sessions_file()).with_branch_prefix(&settings.branch_prefix)
    }

    /// Branch prefix used to recover identities during migration.
    pub fn with_branch_prefix(mut self, prefix: &str) -> Self {
        self.branch_prefix = prefix.to_string();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_raw(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WorksessionError::io("Failed to read session store", e)),
        }
    }

    fn parse(&self, raw: Option<&str>) -> Result<Vec<SessionRecord>> {
        let content = match raw {
            Some(content) if !content.trim().is_empty() => content,
            _ => return Ok(Vec::new()),
        };

        let records: Vec<SessionRecord> =
            serde_json::from_str(content).map_err(|e| WorksessionError::StoreCorrupt {
                path: self.path.clone(),
                details: e.to_string(),
            })?;

        let (records, migrated) = migrate(records, &self.branch_prefix);
        if migrated > 0 {
            info!(
                path = %self.path.display(),
                migrated,
                "Migrated legacy session records"
            );
        }
        Ok(records)
    }

    /// Loads all records. A missing store is empty; a corrupt one is an error.
    pub fn load(&self) -> Result<Vec<SessionRecord>> {
        let raw = self.read_raw()?;
        self.parse(raw.as_deref())
    }

    /// Loads all records together with the version of the content they came from.
    pub fn load_versioned(&self) -> Result<StoreSnapshot> {
        let raw = self.read_raw()?;
        let records = self.parse(raw.as_deref())?;
        Ok(StoreSnapshot {
            records,
            version: StoreVersion::of(raw.as_deref()),
        })
    }

    /// Replaces the full content of the store.
    pub fn save(&self, records: &[SessionRecord]) -> Result<()> {
        let content =
            serde_json::to_string_pretty(records).map_err(|e| WorksessionError::Json {
                context: "Failed to serialize session records".to_string(),
                source: e,
            })?;

        let parent_dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent_dir)
            .map_err(|e| WorksessionError::io("Failed to create store directory", e))?;

        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|e| WorksessionError::io("Failed to create temp store file", e))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| WorksessionError::io("Failed to write temp store file", e))?;
        temp_file
            .flush()
            .map_err(|e| WorksessionError::io("Failed to flush temp store file", e))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| WorksessionError::io("Failed to replace session store", e.error))?;

        debug!(path = %self.path.display(), records = records.len(), "Session store saved");
        Ok(())
    }

    /// Saves only if the file still matches `snapshot`.
    pub fn save_if_unchanged(
        &self,
        snapshot: &StoreSnapshot,
        records: &[SessionRecord],
    ) -> Result<()> {
        let current = StoreVersion::of(self.read_raw()?.as_deref());
        if current != snapshot.version {
            return Err(WorksessionError::StoreConflict(self.path.clone()));
        }
        self.save(records)
    }

    pub fn lock(&self, timeout: Duration) -> Result<StoreLock> {
        StoreLock::acquire(&self.path, timeout)
    }

    /// Lock → load → `f` → save → unlock. Nothing is saved if `f` fails.
    pub fn update<T>(
        &self,
        timeout: Duration,
        f: impl FnOnce(&mut Vec<SessionRecord>) -> Result<T>,
    ) -> Result<T> {
        let _lock = self.lock(timeout)?;
        let mut records = self.load()?;
        let result = f(&mut records)?;
        self.save(&records)?;
        Ok(result)
    }
}

pub fn find_record<'a>(
    records: &'a [SessionRecord],
    item: &WorkItemId,
) -> Option<&'a SessionRecord> {
    let id = item.to_string();
    records.iter().find(|r| r.id == id)
}

pub fn find_record_mut<'a>(
    records: &'a mut [SessionRecord],
    item: &WorkItemId,
) -> Option<&'a mut SessionRecord> {
    let id = item.to_string();
    records.iter_mut().find(|r| r.id == id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Legacy discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Finds per-repository stores (`<repo>/.worksession/sessions.json`) under the
/// configured workspace roots, at most `scan_depth` directories below a root.
pub fn discover_legacy_stores(storage: &StorageConfig, settings: &Settings) -> Vec<PathBuf> {
    let global = storage.sessions_file();
    let mut found = Vec::new();

    for root in &settings.workspace_roots {
        let walker = WalkDir::new(root)
            .max_depth(settings.scan_depth + 2)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !(entry.file_type().is_dir() && (name == ".git" || name == "node_modules"))
            });

        for entry in walker.flatten() {
            let path = entry.path();
            let is_store = entry.file_type().is_file()
                && entry.file_name() == SESSIONS_FILE_NAME
                && path
                    .parent()
                    .and_then(|p| p.file_name())
                    .is_some_and(|name| name == DATA_DIR_NAME);
            if is_store && path != global {
                found.push(path.to_path_buf());
            }
        }
    }

    found
}

/// Global records plus every discovered legacy record whose id is not already
/// present (global wins, then first legacy store in scan order).
///
/// Sentinel ids (`<source>:unknown`) say nothing about identity, so legacy
/// records carrying one are always kept.
pub fn load_all(storage: &StorageConfig, settings: &Settings) -> Result<Vec<SessionRecord>> {
    let mut records = SessionStore::global(storage, settings).load()?;
    let mut seen: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();

    for path in discover_legacy_stores(storage, settings) {
        let legacy = SessionStore::new(&path)
            .with_branch_prefix(&settings.branch_prefix)
            .load()?;
        let before = records.len();
        for record in legacy {
            if is_sentinel(&record.id) || seen.insert(record.id.clone()) {
                records.push(record);
            }
        }
        debug!(
            path = %path.display(),
            added = records.len() - before,
            "Merged legacy session store"
        );
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CoarseStatus;
    use tempfile::tempdir;

    fn record(id: &str) -> SessionRecord {
        let item: WorkItemId = id.parse().unwrap();
        SessionRecord::new(&item, "title", "app", PathBuf::from("/code/app"))
    }

    #[test]
    fn test_load_nonexistent_file_returns_empty() {
        let temp = tempdir().unwrap();
        let store = SessionStore::new(temp.path().join("missing.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_load_whitespace_file_returns_empty() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("sessions.json");
        std::fs::write(&file, "  \n").unwrap();
        assert!(SessionStore::new(&file).load().unwrap().is_empty());
    }

    #[test]
    fn test_load_corrupt_json_is_an_error() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("sessions.json");
        std::fs::write(&file, "[{not json").unwrap();

        let err = SessionStore::new(&file).load().unwrap_err();
        assert!(matches!(err, WorksessionError::StoreCorrupt { .. }));
        // The corrupt file is left untouched.
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "[{not json");
    }

    #[test]
    fn test_save_replaces_full_content() {
        let temp = tempdir().unwrap();
        let store = SessionStore::new(temp.path().join("nested/sessions.json"));

        store.save(&[record("github:1"), record("github:2")]).unwrap();
        store.save(&[record("test:quick")]).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "test:quick");
    }

    #[test]
    fn test_load_migrates_legacy_records() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("sessions.json");
        std::fs::write(&file, r#"[{"issue_number": 5, "status": "stopped"}]"#).unwrap();

        let loaded = SessionStore::new(&file).load().unwrap();
        assert_eq!(loaded[0].id, "github:5");
        assert_eq!(loaded[0].status, CoarseStatus::Stopped);
    }

    #[test]
    fn test_save_if_unchanged_detects_concurrent_write() {
        let temp = tempdir().unwrap();
        let store = SessionStore::new(temp.path().join("sessions.json"));
        store.save(&[record("github:1")]).unwrap();

        let snapshot = store.load_versioned().unwrap();
        // Another writer gets in first.
        store.save(&[record("github:1"), record("github:2")]).unwrap();

        let err = store
            .save_if_unchanged(&snapshot, &snapshot.records)
            .unwrap_err();
        assert!(matches!(err, WorksessionError::StoreConflict(_)));
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_save_if_unchanged_succeeds_without_interference() {
        let temp = tempdir().unwrap();
        let store = SessionStore::new(temp.path().join("sessions.json"));

        let snapshot = store.load_versioned().unwrap();
        assert_eq!(snapshot.version, StoreVersion::Missing);
        store
            .save_if_unchanged(&snapshot, &[record("github:3")])
            .unwrap();
        assert_eq!(store.load().unwrap()[0].id, "github:3");
    }

    #[test]
    fn test_update_saves_and_releases_lock() {
        let temp = tempdir().unwrap();
        let store = SessionStore::new(temp.path().join("sessions.json"));

        let count = store
            .update(Duration::from_millis(200), |records| {
                records.push(record("github:7"));
                Ok(records.len())
            })
            .unwrap();
        assert_eq!(count, 1);
        assert!(!StoreLock::lock_dir_for(store.path()).exists());
        assert_eq!(store.load().unwrap()[0].id, "github:7");
    }

    #[test]
    fn test_update_does_not_save_on_error() {
        let temp = tempdir().unwrap();
        let store = SessionStore::new(temp.path().join("sessions.json"));
        store.save(&[record("github:1")]).unwrap();

        let result: Result<()> = store.update(Duration::from_millis(200), |records| {
            records.clear();
            Err(WorksessionError::SessionNotFound("github:1".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_load_all_merges_legacy_stores() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().join("home"));
        let workspace = temp.path().join("code");
        let settings = Settings {
            workspace_roots: vec![workspace.clone()],
            scan_depth: 2,
            ..Settings::default()
        };

        SessionStore::global(&storage, &settings)
            .save(&[record("github:1")])
            .unwrap();

        let mut shadowed = record("github:1");
        shadowed.title = "legacy copy".to_string();
        SessionStore::new(StorageConfig::legacy_sessions_file(&workspace.join("org/app")))
            .save(&[shadowed, record("github:2")])
            .unwrap();
        // Too deep to be scanned.
        SessionStore::new(StorageConfig::legacy_sessions_file(
            &workspace.join("a/b/c/deep"),
        ))
        .save(&[record("github:3")])
        .unwrap();

        let all = load_all(&storage, &settings).unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["github:1", "github:2"]);
        assert_eq!(all[0].title, "title");
    }

    #[test]
    fn test_load_all_keeps_every_sentinel_record() {
        let temp = tempdir().unwrap();
        let storage = StorageConfig::with_root(temp.path().join("home"));
        let workspace = temp.path().join("code");
        let settings = Settings {
            workspace_roots: vec![workspace.clone()],
            ..Settings::default()
        };

        let legacy = StorageConfig::legacy_sessions_file(&workspace.join("app"));
        std::fs::create_dir_all(legacy.parent().unwrap()).unwrap();
        std::fs::write(
            &legacy,
            r#"[{"title": "first"}, {"title": "second"}, {"issue_number": 4}, {"issue_number": 4}]"#,
        )
        .unwrap();

        let all = load_all(&storage, &settings).unwrap();
        let titles: Vec<_> = all
            .iter()
            .filter(|r| r.id == "github:unknown")
            .map(|r| r.title.as_str())
            .collect();
        assert_eq!(titles, vec!["first", "second"]);
        assert_eq!(all.iter().filter(|r| r.id == "github:4").count(), 1);
    }
}
