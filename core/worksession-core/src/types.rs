//! Core types for worksession.
//!
//! [`SessionRecord`] is the on-disk shape (one element of the store's JSON array).
//! Older stores may lack any of the optional fields, so nearly every field carries
//! a serde default; the migrator fills in identity fields after load.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorksessionError;

// ═══════════════════════════════════════════════════════════════════════════════
// Work Item Identity
// ═══════════════════════════════════════════════════════════════════════════════

/// Namespaced work item identifier, `source:id` (e.g. `github:123`, `test:quick`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkItemId {
    source: String,
    id: String,
}

impl WorkItemId {
    pub fn new(source: &str, id: &str) -> Result<Self, WorksessionError> {
        let invalid = |reason: &str| WorksessionError::InvalidWorkItem {
            input: format!("{}:{}", source, id),
            reason: reason.to_string(),
        };

        if source.is_empty() {
            return Err(invalid("source is empty"));
        }
        if id.is_empty() {
            return Err(invalid("id is empty"));
        }
        if !source
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid("source may only contain letters, digits, '-' and '_'"));
        }
        if id.chars().any(|c| c.is_whitespace() || c == ':') {
            return Err(invalid("id may not contain whitespace or ':'"));
        }

        Ok(Self {
            source: source.to_string(),
            id: id.to_string(),
        })
    }

    pub fn github(number: u64) -> Self {
        Self {
            source: "github".to_string(),
            id: number.to_string(),
        }
    }

    /// Parses user input. Unlike [`FromStr`], a bare number (optionally written
    /// `#<n>`) is accepted here and normalized to `github:<n>`.
    pub fn parse_input(input: &str) -> Result<Self, WorksessionError> {
        let trimmed = input.trim();
        let bare = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if let Ok(number) = bare.parse::<u64>() {
            return Ok(Self::github(number));
        }
        trimmed.parse()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Numeric id for github-style items.
    pub fn number(&self) -> Option<u64> {
        self.id.parse().ok()
    }
}

impl FromStr for WorkItemId {
    type Err = WorksessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(source), Some(id), None) => WorkItemId::new(source, id),
            _ => Err(WorksessionError::InvalidWorkItem {
                input: s.to_string(),
                reason: "expected exactly one ':' separator".to_string(),
            }),
        }
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Session Record
// ═══════════════════════════════════════════════════════════════════════════════

/// Coarse status as last written by whoever touched the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoarseStatus {
    #[default]
    Active,
    Stopped,
}

/// Provisioning/cleanup progress for the whole resource bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Creating,
    #[default]
    Active,
    Cleanup,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Branch,
    Worktree,
    Terminal,
    Sandbox,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceType::Branch => "branch",
            ResourceType::Worktree => "worktree",
            ResourceType::Terminal => "terminal",
            ResourceType::Sandbox => "sandbox",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceEntryStatus {
    Created,
    Failed,
    Cleanup,
}

/// One entry of a record's append-only resource audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub created_at: DateTime<Utc>,
    pub status: ResourceEntryStatus,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Namespaced id (`source:id`). Empty on records written before namespacing.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub source_type: String,
    /// Legacy numeric identity, kept for records created before namespacing.
    #[serde(default)]
    pub issue_number: Option<u64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub friendly_title: String,
    #[serde(default)]
    pub repo_name: String,
    #[serde(default)]
    pub repo_path: PathBuf,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub worktree_path: PathBuf,
    #[serde(default)]
    pub tmux_session: String,
    #[serde(default)]
    pub sandbox_name: Option<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: CoarseStatus,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
    #[serde(default)]
    pub resource_status: ResourceStatus,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub failed_step: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl SessionRecord {
    /// Skeleton record for a work item about to be provisioned. Resource handles
    /// are filled in by the provisioner.
    pub fn new(work_item: &WorkItemId, title: &str, repo_name: &str, repo_path: PathBuf) -> Self {
        let now = Utc::now();
        SessionRecord {
            id: work_item.to_string(),
            source_type: work_item.source().to_string(),
            issue_number: None,
            title: title.to_string(),
            friendly_title: crate::naming::friendly_title(title),
            repo_name: repo_name.to_string(),
            repo_path,
            branch: String::new(),
            worktree_path: PathBuf::new(),
            tmux_session: String::new(),
            sandbox_name: None,
            created_at: now,
            last_activity: Some(now),
            status: CoarseStatus::Active,
            resources: Vec::new(),
            resource_status: ResourceStatus::Creating,
            current_step: None,
            failed_step: None,
            failure_reason: None,
        }
    }

    /// Parsed namespaced id, or None for unmigrated/invalid records.
    pub fn work_item(&self) -> Option<WorkItemId> {
        self.id.parse().ok()
    }

    /// Appends to the audit trail. Timestamps never go backwards: an entry older
    /// than the previous one is clamped to the previous entry's time.
    pub fn record_resource(
        &mut self,
        resource_type: ResourceType,
        resource_id: &str,
        status: ResourceEntryStatus,
        metadata: BTreeMap<String, String>,
    ) {
        let mut created_at = Utc::now();
        if let Some(last) = self.resources.last() {
            if created_at < last.created_at {
                created_at = last.created_at;
            }
        }
        self.resources.push(ResourceEntry {
            resource_type,
            resource_id: resource_id.to_string(),
            created_at,
            status,
            metadata,
        });
    }

    pub fn touch(&mut self) {
        self.last_activity = Some(Utc::now());
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Derived Status
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Active,
    Stopped,
    Stale,
    Unknown,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusKind::Active => "active",
            StatusKind::Stopped => "stopped",
            StatusKind::Stale => "stale",
            StatusKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Live status of a session, recomputed on every query and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub kind: StatusKind,
    pub last_change: Option<DateTime<Utc>>,
    pub time_delta: String,
}
