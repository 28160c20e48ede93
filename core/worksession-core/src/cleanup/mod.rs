//! Reconciliation and cleanup of stale sessions.
//!
//! Cleanup always runs in two phases that callers can drive separately:
//!
//! 1. **Identify**: [`CleanupEngine::identify_stale`] picks the sessions in scope
//!    whose terminal session is confirmed gone. A failed check never makes a
//!    session stale.
//! 2. **Clean**: [`CleanupEngine::cleanup`] deletes the resources selected by
//!    [`CleanupOptions`] and [`CleanupEngine::cleanup_branches`] removes orphaned
//!    issue branches. Failures are collected into the [`CleanupReport`]; the
//!    batch never aborts.
//!
//! [`reconcile`] wraps both phases around the session store, persisting cleanup
//! intent before anything is deleted.

mod branches;
mod engine;
mod options;
mod reconcile;
mod report;

pub use engine::{CleanupEngine, CleanupOutcome, ResourcePresence, SessionOutcome};
pub use options::{CleanupFlags, CleanupMode, CleanupOptions, CleanupScope};
pub use reconcile::{reconcile, CLEANUP_STEP};
pub use report::CleanupReport;
