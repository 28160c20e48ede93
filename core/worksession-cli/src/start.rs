//! `worksession start <ID>`: provision a session for a work item.

use std::path::Path;

use worksession_core::{ProvisionRequest, ResourceStatus, WorkItemId, WorksessionEngine};

use crate::repo::resolve_repo;

pub fn run(
    engine: &WorksessionEngine,
    id: &str,
    title: Option<&str>,
    repo: Option<&Path>,
) -> Result<(), String> {
    let work_item = WorkItemId::parse_input(id)?;
    let repo_path = resolve_repo(repo)?;
    let request = ProvisionRequest {
        title: title.map(str::to_string).unwrap_or_else(|| work_item.to_string()),
        work_item,
        repo_path,
        repo_name: None,
    };

    let record = engine.start(&request)?;
    if record.resource_status == ResourceStatus::Failed {
        return Err(format!(
            "Session {} failed at step {}: {}",
            record.id,
            record.failed_step.as_deref().unwrap_or("unknown"),
            record.failure_reason.as_deref().unwrap_or("no reason recorded")
        ));
    }

    println!("Started {}", record.id);
    println!("  branch    {}", record.branch);
    println!("  worktree  {}", record.worktree_path.display());
    println!("  terminal  {}", record.tmux_session);
    if let Some(sandbox) = &record.sandbox_name {
        println!("  sandbox   {}", sandbox);
    }
    Ok(())
}
