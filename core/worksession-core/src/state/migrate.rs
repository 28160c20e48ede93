//! Upgrades pre-namespacing session records.
//!
//! A record needs migration iff `source_type` or `id` is empty. Identity is
//! recovered in this order:
//!
//! 1. legacy `issue_number` → `github:<n>` (`<source_type>:<n>` when a
//!    non-github source is already recorded)
//! 2. an `id` that already parses → its source
//! 3. an issue-pattern branch name → that work item
//! 4. sentinel: `<source_type>:unknown` if the source is known, `test:unknown` if
//!    any handle mentions "test", else `github:unknown`
//!
//! When `source_type` is already set, steps 1-3 only accept an identity with that
//! source, so `id` and `source_type` always agree.
//!
//! Nothing else on the record is touched, and records are never dropped. Several
//! records may share a sentinel id; see [`is_sentinel`].

use crate::naming::work_item_from_branch;
use crate::types::{SessionRecord, WorkItemId};

/// Id part given to records whose identity cannot be recovered.
pub const SENTINEL_ID: &str = "unknown";

/// True for `<source>:unknown` ids. These are not unique across records.
pub fn is_sentinel(id: &str) -> bool {
    id.split_once(':')
        .is_some_and(|(_, item)| item == SENTINEL_ID)
}

pub fn needs_migration(record: &SessionRecord) -> bool {
    record.source_type.is_empty() || record.id.is_empty()
}

fn looks_like_test(record: &SessionRecord) -> bool {
    [
        record.branch.as_str(),
        record.tmux_session.as_str(),
        record.sandbox_name.as_deref().unwrap_or(""),
    ]
    .iter()
    .any(|handle| handle.to_lowercase().contains("test"))
}

fn recover_identity(record: &SessionRecord, branch_prefix: &str) -> WorkItemId {
    let known_source = Some(record.source_type.as_str()).filter(|s| !s.is_empty());

    let from_number = record.issue_number.and_then(|number| match known_source {
        None | Some("github") => Some(WorkItemId::github(number)),
        Some(source) => WorkItemId::new(source, &number.to_string()).ok(),
    });
    let recovered = from_number
        .into_iter()
        .chain(record.id.parse::<WorkItemId>().ok())
        .chain(work_item_from_branch(branch_prefix, &record.branch))
        .find(|item| known_source.map_or(true, |source| item.source() == source));
    if let Some(item) = recovered {
        return item;
    }

    if let Ok(item) = WorkItemId::new(&record.source_type, SENTINEL_ID) {
        return item;
    }
    let source = if looks_like_test(record) { "test" } else { "github" };
    WorkItemId::new(source, SENTINEL_ID).unwrap_or_else(|_| WorkItemId::github(0))
}

/// Migrates one record in place. Returns true if anything changed.
pub fn migrate_record(record: &mut SessionRecord, branch_prefix: &str) -> bool {
    if !needs_migration(record) {
        return false;
    }

    let item = recover_identity(record, branch_prefix);
    if record.id.is_empty() {
        record.id = item.to_string();
    }
    if record.source_type.is_empty() {
        record.source_type = record
            .work_item()
            .map(|existing| existing.source().to_string())
            .unwrap_or_else(|| item.source().to_string());
    }
    true
}

/// Migrates every record, returning the upgraded list and how many changed.
pub fn migrate(
    mut records: Vec<SessionRecord>,
    branch_prefix: &str,
) -> (Vec<SessionRecord>, usize) {
    let migrated = records
        .iter_mut()
        .map(|record| migrate_record(record, branch_prefix))
        .filter(|changed| *changed)
        .count();
    (records, migrated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy(json: &str) -> SessionRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_issue_number_becomes_github_id() {
        let (records, count) = migrate(
            vec![legacy(r#"{"issue_number": 42, "title": "Fix it", "branch": "issue-42"}"#)],
            "issue",
        );
        assert_eq!(count, 1);
        assert_eq!(records[0].id, "github:42");
        assert_eq!(records[0].source_type, "github");
        assert_eq!(records[0].issue_number, Some(42));
        assert_eq!(records[0].title, "Fix it");
    }

    #[test]
    fn test_source_inferred_from_existing_id() {
        let (records, _) = migrate(vec![legacy(r#"{"id": "linear:ENG-1"}"#)], "issue");
        assert_eq!(records[0].id, "linear:ENG-1");
        assert_eq!(records[0].source_type, "linear");
    }

    #[test]
    fn test_identity_recovered_from_branch() {
        let (records, _) = migrate(vec![legacy(r#"{"branch": "issue/test/quick"}"#)], "issue");
        assert_eq!(records[0].id, "test:quick");
        assert_eq!(records[0].source_type, "test");
    }

    #[test]
    fn test_unrecoverable_records_get_sentinels() {
        let (records, count) = migrate(
            vec![
                legacy(r#"{"tmux_session": "app-test-run", "title": "keep me"}"#),
                legacy(r#"{"tmux_session": "app-feature"}"#),
                legacy(r#"{"source_type": "linear"}"#),
            ],
            "issue",
        );
        assert_eq!(count, 3);
        assert_eq!(records[0].id, "test:unknown");
        assert_eq!(records[0].title, "keep me");
        assert_eq!(records[1].id, "github:unknown");
        assert_eq!(records[2].id, "linear:unknown");
        assert_eq!(records[2].source_type, "linear");
    }

    #[test]
    fn test_issue_number_keeps_recorded_source() {
        let (records, _) = migrate(
            vec![
                legacy(r#"{"issue_number": 7, "source_type": "linear"}"#),
                legacy(r#"{"issue_number": 8, "source_type": "github"}"#),
            ],
            "issue",
        );
        assert_eq!(records[0].id, "linear:7");
        assert_eq!(records[0].source_type, "linear");
        assert_eq!(records[1].id, "github:8");
    }

    #[test]
    fn test_branch_with_other_source_is_ignored_when_source_known() {
        let (records, _) = migrate(
            vec![legacy(r#"{"source_type": "linear", "branch": "issue/github/5"}"#)],
            "issue",
        );
        assert_eq!(records[0].id, "linear:unknown");
        assert_eq!(records[0].work_item().unwrap().source(), records[0].source_type);
    }

    #[test]
    fn test_sentinel_detection() {
        assert!(is_sentinel("github:unknown"));
        assert!(is_sentinel("test:unknown"));
        assert!(!is_sentinel("github:12"));
        assert!(!is_sentinel("unknown"));
    }

    #[test]
    fn test_migration_is_idempotent() {
        let input = vec![
            legacy(r#"{"issue_number": 1}"#),
            legacy(r#"{"branch": "feature"}"#),
            legacy(r#"{"id": "github:9", "source_type": "github"}"#),
        ];
        let (once, first_count) = migrate(input, "issue");
        let (twice, second_count) = migrate(once.clone(), "issue");
        assert_eq!(first_count, 2);
        assert_eq!(second_count, 0);
        assert_eq!(once, twice);
    }
}
