//! Session state: persistence, schema migration, and live status detection.
//!
//! # Sources of Truth
//!
//! ```text
//! sessions.json ──► SessionStore ──► migrate ──► SessionRecord ─┐
//!                                                                ├─► StatusDetector ─► SessionStatus
//! tmux / sandbox / shutdown.json ──► gateways ───────────────────┘
//! ```
//!
//! The store holds what a writer last knew. The detector never trusts the
//! stored coarse `status`; it asks the external systems every time.
//!
//! # Module Structure
//!
//! - [`lock`]: exclusive lock directory around read-modify-write cycles
//! - [`store`]: reads/writes the JSON store, legacy store discovery
//! - [`migrate`]: pure upgrade of pre-namespacing records, applied at load
//! - [`resolver`]: status detection from the shutdown artifact and terminal liveness
//! - [`delta`]: "2h ago" rendering

pub mod delta;
pub mod lock;
pub mod migrate;
pub mod resolver;
pub mod store;

pub use delta::{format_optional_delta, format_time_delta};
pub use lock::{is_pid_alive, LockInfo, StoreLock};
pub use migrate::{is_sentinel, migrate, migrate_record, needs_migration, SENTINEL_ID};
pub use resolver::{
    parse_shutdown_artifact, read_shutdown_artifact_from_worktree, remove_shutdown_artifact,
    write_shutdown_artifact, ShutdownArtifact, StatusDetector, SHUTDOWN_ARTIFACT_PATH,
};
pub use store::{
    discover_legacy_stores, find_record, find_record_mut, load_all, SessionStore,
    StoreSnapshot, StoreVersion,
};
