//! Error types for worksession-core operations.

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// Gateway Errors (external commands)
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure talking to an external system (git, tmux, sandbox runtime).
///
/// A gateway error means "could not tell", never "resource absent". Absence is
/// reported through `Ok(false)` / `Ok(None)` by the gateway methods.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },

    #[error("Command could not be started: {command}: {details}")]
    Spawn { command: String, details: String },

    #[error("Command timed out after {timeout_ms}ms: {command}")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("Refusing to delete checked-out branch: {0}")]
    CheckedOutBranch(String),

    #[error("{0}")]
    Injected(String),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Core Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that abort a worksession command.
#[derive(Debug, thiserror::Error)]
pub enum WorksessionError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Store Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Session store is corrupt: {path}: {details}")]
    StoreCorrupt { path: PathBuf, details: String },

    #[error("Session store changed on disk since it was loaded: {0}")]
    StoreConflict(PathBuf),

    #[error("Timed out waiting for store lock after {waited_ms}ms: {path}")]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already exists: {0}")]
    SessionExists(String),

    // ─────────────────────────────────────────────────────────────────────
    // Input Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid work item identifier: {input}: {reason}")]
    InvalidWorkItem { input: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Convenience type alias for Results using WorksessionError.
pub type Result<T> = std::result::Result<T, WorksessionError>;

impl WorksessionError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        WorksessionError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<WorksessionError> for String {
    fn from(err: WorksessionError) -> String {
        err.to_string()
    }
}
