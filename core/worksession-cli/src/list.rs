//! `worksession list` and `worksession status <ID>`.

use worksession_core::{SessionView, WorkItemId, WorksessionEngine};

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize output: {}", e))?;
    println!("{}", json);
    Ok(())
}

fn line(view: &SessionView) -> String {
    let title = if view.record.friendly_title.is_empty() {
        view.record.title.as_str()
    } else {
        view.record.friendly_title.as_str()
    };
    format!(
        "{:<24} {:<8} {:<10} {:<16} {}",
        view.record.id,
        view.status.kind.to_string(),
        view.status.time_delta,
        view.record.repo_name,
        title
    )
}

pub fn list(engine: &WorksessionEngine, json: bool) -> Result<(), String> {
    let views = engine.list()?;
    if json {
        return print_json(&views);
    }
    if views.is_empty() {
        println!("No sessions");
        return Ok(());
    }
    for view in &views {
        println!("{}", line(view));
    }
    Ok(())
}

pub fn status(engine: &WorksessionEngine, id: &str, json: bool) -> Result<(), String> {
    let item = WorkItemId::parse_input(id)?;
    let view = engine.status(&item)?;
    if json {
        return print_json(&view);
    }

    println!("{}", line(&view));
    if let Some(at) = view.status.last_change {
        println!("  last change  {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("  resources    {:?}", view.record.resource_status);
    if let Some(step) = &view.record.failed_step {
        println!(
            "  failed at    {} ({})",
            step,
            view.record.failure_reason.as_deref().unwrap_or("no reason recorded")
        );
    }
    Ok(())
}
