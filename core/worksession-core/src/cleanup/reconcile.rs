//! Store-backed cleanup with persisted intent.
//!
//! # Ordering
//!
//! ```text
//! lock ─► load ─► identify ─► mark targets `cleanup` ─► save ─► delete resources
//!                                                                   │
//!                          unlock ◄─ save (pruned, annotated) ◄─────┘
//! ```
//!
//! If the second save fails, the store still shows the targets in `cleanup`
//! state. Existence checks make the next run idempotent: already-deleted
//! resources read as absent and the records get pruned then.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{info, warn};

use super::engine::CleanupEngine;
use super::options::CleanupOptions;
use super::report::CleanupReport;
use crate::error::Result;
use crate::state::SessionStore;
use crate::types::{ResourceEntryStatus, ResourceStatus, SessionRecord};

pub const CLEANUP_STEP: &str = "cleanup";

/// Runs one cleanup batch against `store`, holding its lock throughout.
///
/// Dry runs never write the store.
pub fn reconcile(
    store: &SessionStore,
    engine: &CleanupEngine<'_>,
    options: &CleanupOptions,
    lock_timeout: Duration,
) -> Result<CleanupReport> {
    let _lock = store.lock(lock_timeout)?;
    let mut records = store.load()?;

    let targets = if options.touches_sessions() {
        engine.stale_indices(&records, &options.scope)
    } else {
        Vec::new()
    };

    if options.dry_run {
        let target_refs: Vec<&SessionRecord> = targets.iter().map(|&i| &records[i]).collect();
        let mut outcome = engine.cleanup(&target_refs, options);
        if options.clean_branches {
            engine.cleanup_branches(&records, options, &mut outcome.report);
        }
        return Ok(outcome.report);
    }

    let previous: Vec<ResourceStatus> = targets.iter().map(|&i| records[i].resource_status).collect();
    if !targets.is_empty() {
        for &index in &targets {
            let record = &mut records[index];
            if record.resource_status == ResourceStatus::Cleanup {
                info!(session = %record.id, "Resuming interrupted cleanup");
            }
            record.resource_status = ResourceStatus::Cleanup;
            record.current_step = Some(CLEANUP_STEP.to_string());
        }
        store.save(&records)?;
    }

    let target_refs: Vec<&SessionRecord> = targets.iter().map(|&i| &records[i]).collect();
    let mut outcome = engine.cleanup(&target_refs, options);
    if options.clean_branches {
        engine.cleanup_branches(&records, options, &mut outcome.report);
    }

    let mut prune = vec![false; records.len()];
    for ((&index, session), before) in targets.iter().zip(&outcome.sessions).zip(previous) {
        if session.prunable {
            prune[index] = true;
            continue;
        }

        let record = &mut records[index];
        for (resource_type, id) in &session.removed {
            record.record_resource(
                *resource_type,
                id,
                ResourceEntryStatus::Cleanup,
                BTreeMap::new(),
            );
        }
        if session.errors.is_empty() {
            record.resource_status = match before {
                ResourceStatus::Cleanup => ResourceStatus::Active,
                other => other,
            };
            record.current_step = None;
        } else {
            record.failure_reason = Some(session.errors.join("; "));
        }
    }

    if !targets.is_empty() {
        let mut flags = prune.into_iter();
        records.retain(|_| !flags.next().unwrap_or(false));
        if let Err(e) = store.save(&records) {
            warn!(
                path = %store.path().display(),
                error = %e,
                "Cleanup finished but the store could not be updated"
            );
            return Err(e);
        }
    }

    Ok(outcome.report)
}
