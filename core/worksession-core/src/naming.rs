//! Resource naming: branch patterns, derived handles, and fallback chains.
//!
//! Records written by older versions may lack a stored sandbox name or worktree
//! path. Resolution walks an ordered list of strategies and takes the first one
//! that yields a name:
//!
//! | priority | sandbox                        | worktree                                |
//! |----------|--------------------------------|-----------------------------------------|
//! | 1        | stored `sandbox_name`          | stored `worktree_path`                  |
//! | 2        | `<repo>-<source>-<id>`         | `<repo_path>/<worktree_dir>/<source>-<id>` |
//! | 3        | `<repo>-issue-<n>` (legacy)    | `<repo_path>/<worktree_dir>/issue-<n>`  |

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{SessionRecord, WorkItemId};

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9_-]+").expect("static regex is valid"));

const FRIENDLY_TITLE_MAX: usize = 40;

/// Lowercases and collapses anything outside `[a-z0-9_-]` into single dashes.
pub fn sanitize(value: &str) -> String {
    let lowered = value.to_lowercase();
    UNSAFE_CHARS
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Sandbox-safe slug of a work item title.
pub fn friendly_title(title: &str) -> String {
    let slug = sanitize(&title.replace('_', "-"));
    if slug.len() <= FRIENDLY_TITLE_MAX {
        return slug;
    }
    slug[..FRIENDLY_TITLE_MAX].trim_end_matches('-').to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Branches
// ─────────────────────────────────────────────────────────────────────────────

/// `<prefix>/<source>/<id>`
pub fn branch_name(prefix: &str, item: &WorkItemId) -> String {
    format!("{}/{}/{}", prefix, item.source(), item.id())
}

/// Maps an issue-pattern branch back to its work item.
///
/// Accepts `<prefix>/<source>/<id>` and the legacy `<prefix>-<n>` form (which maps
/// to `github:<n>`). Any other branch is not an issue branch.
pub fn work_item_from_branch(prefix: &str, branch: &str) -> Option<WorkItemId> {
    if let Some(rest) = branch
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        let (source, id) = rest.split_once('/')?;
        return WorkItemId::new(source, id).ok();
    }

    let number = branch
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))?;
    number.parse::<u64>().ok().map(WorkItemId::github)
}

pub fn is_issue_branch(prefix: &str, branch: &str) -> bool {
    work_item_from_branch(prefix, branch).is_some()
}

// ─────────────────────────────────────────────────────────────────────────────
// Derived handles
// ─────────────────────────────────────────────────────────────────────────────

pub fn tmux_session_name(repo_name: &str, item: &WorkItemId) -> String {
    sanitize(&format!("{}-{}-{}", repo_name, item.source(), item.id()))
}

pub fn sandbox_name(repo_name: &str, item: &WorkItemId) -> String {
    sanitize(&format!("{}-{}-{}", repo_name, item.source(), item.id()))
}

fn legacy_sandbox_name(repo_name: &str, number: u64) -> String {
    sanitize(&format!("{}-issue-{}", repo_name, number))
}

pub fn worktree_path(record: &SessionRecord, worktree_dir: &str, item: &WorkItemId) -> PathBuf {
    record
        .repo_path
        .join(worktree_dir)
        .join(sanitize(&format!("{}-{}", item.source(), item.id())))
}

// ─────────────────────────────────────────────────────────────────────────────
// Fallback chains
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingStrategy {
    /// Handle stored on the record.
    Stored,
    /// Derived from repository + namespaced id.
    Namespaced,
    /// Derived from repository + legacy issue number.
    Legacy,
}

/// Strategies in the order they are tried.
pub const NAMING_STRATEGIES: [NamingStrategy; 3] = [
    NamingStrategy::Stored,
    NamingStrategy::Namespaced,
    NamingStrategy::Legacy,
];

impl NamingStrategy {
    pub fn sandbox_name(self, record: &SessionRecord) -> Option<String> {
        match self {
            NamingStrategy::Stored => record
                .sandbox_name
                .as_ref()
                .filter(|name| !name.is_empty())
                .cloned(),
            NamingStrategy::Namespaced => {
                if record.repo_name.is_empty() {
                    return None;
                }
                record
                    .work_item()
                    .map(|item| sandbox_name(&record.repo_name, &item))
            }
            NamingStrategy::Legacy => {
                if record.repo_name.is_empty() {
                    return None;
                }
                record
                    .issue_number
                    .map(|n| legacy_sandbox_name(&record.repo_name, n))
            }
        }
    }

    pub fn worktree_path(self, record: &SessionRecord, worktree_dir: &str) -> Option<PathBuf> {
        match self {
            NamingStrategy::Stored => {
                Some(record.worktree_path.clone()).filter(|p| !p.as_os_str().is_empty())
            }
            NamingStrategy::Namespaced => {
                if record.repo_path.as_os_str().is_empty() {
                    return None;
                }
                record
                    .work_item()
                    .map(|item| worktree_path(record, worktree_dir, &item))
            }
            NamingStrategy::Legacy => {
                if record.repo_path.as_os_str().is_empty() {
                    return None;
                }
                record.issue_number.map(|n| {
                    record
                        .repo_path
                        .join(worktree_dir)
                        .join(format!("issue-{}", n))
                })
            }
        }
    }
}

/// First sandbox name produced by [`NAMING_STRATEGIES`].
pub fn resolve_sandbox_name(record: &SessionRecord) -> Option<(NamingStrategy, String)> {
    NAMING_STRATEGIES
        .iter()
        .find_map(|s| s.sandbox_name(record).map(|name| (*s, name)))
}

/// First worktree path produced by [`NAMING_STRATEGIES`].
pub fn resolve_worktree_path(
    record: &SessionRecord,
    worktree_dir: &str,
) -> Option<(NamingStrategy, PathBuf)> {
    NAMING_STRATEGIES
        .iter()
        .find_map(|s| s.worktree_path(record, worktree_dir).map(|path| (*s, path)))
}

/// Stored terminal-session name, else the namespaced derivation. Legacy records
/// always stored theirs.
pub fn resolve_terminal_name(record: &SessionRecord) -> Option<String> {
    if !record.tmux_session.is_empty() {
        return Some(record.tmux_session.clone());
    }
    if record.repo_name.is_empty() {
        return None;
    }
    record
        .work_item()
        .map(|item| tmux_session_name(&record.repo_name, &item))
}
