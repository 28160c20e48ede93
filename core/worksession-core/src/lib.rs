//! # worksession-core
//!
//! Lifecycle and reconciliation engine for work sessions: one git branch, git
//! worktree, tmux session, and sandbox per work item.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Each command is one blocking call.
//! - **Decide here, do in gateways**: The engine only touches git, tmux, and the
//!   sandbox runtime through the traits in [`gateway`].
//! - **Fail safe**: A check that errors is "cannot tell", never "absent". Nothing
//!   is deleted on ambiguous evidence.
//! - **Never lose the store**: A corrupt store is an error, writes are atomic,
//!   and every read-modify-write holds the store lock.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use worksession_core::{CleanupMode, CleanupOptions, CleanupScope, WorksessionEngine};
//!
//! let engine = WorksessionEngine::new()?;
//! let options = CleanupOptions::for_mode(CleanupMode::Default, CleanupScope::Global).dry_run(true);
//! let report = engine.cleanup(&options)?;
//! ```

pub mod cleanup;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod naming;
pub mod paths;
pub mod state;
pub mod storage;
pub mod types;

// Re-export commonly used items at crate root
pub use cleanup::{
    reconcile, CleanupEngine, CleanupFlags, CleanupMode, CleanupOptions, CleanupReport,
    CleanupScope,
};
pub use config::{load_settings, Settings};
pub use engine::{MigrationSummary, SessionView, WorksessionEngine};
pub use error::{GatewayError, GatewayResult, Result, WorksessionError};
pub use gateway::{Gateways, SandboxGateway, TerminalGateway, VcsGateway};
pub use lifecycle::{ProvisionRequest, Provisioner};
pub use state::{SessionStore, StatusDetector};
pub use storage::StorageConfig;
pub use types::*;
