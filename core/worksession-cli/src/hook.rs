//! Lifecycle hooks: `worksession touch` and `worksession stop`.
//!
//! Both are meant to be called from inside a session (editor or agent hooks,
//! shell exit traps), so the work item may be omitted: the session whose
//! worktree contains the current directory is used.
//!
//! ```text
//! touch → last_activity = now (and back to active if it was stopped)
//! stop  → status = stopped, shutdown artifact written into the worktree
//! ```

use std::env;

use worksession_core::paths::same_path;
use worksession_core::{WorkItemId, WorksessionEngine};

use crate::repo::find_repo_root;

fn resolve_session(engine: &WorksessionEngine, id: Option<&str>) -> Result<WorkItemId, String> {
    if let Some(id) = id {
        return WorkItemId::parse_input(id).map_err(String::from);
    }

    let cwd = env::current_dir().map_err(|e| format!("Failed to read current directory: {}", e))?;
    let root = find_repo_root(&cwd)
        .ok_or_else(|| format!("Not inside a session worktree: {}", cwd.display()))?;
    let records = engine.store().load()?;
    records
        .iter()
        .find(|record| same_path(&record.worktree_path, &root))
        .and_then(|record| record.work_item())
        .ok_or_else(|| format!("No session owns worktree {}", root.display()))
}

pub fn touch(engine: &WorksessionEngine, id: Option<&str>) -> Result<(), String> {
    let item = resolve_session(engine, id)?;
    engine.touch(&item)?;
    tracing::debug!(session = %item, "Session touched");
    Ok(())
}

pub fn stop(engine: &WorksessionEngine, id: Option<&str>) -> Result<(), String> {
    let item = resolve_session(engine, id)?;
    let record = engine.stop(&item)?;
    println!("Stopped {}", record.id);
    Ok(())
}
