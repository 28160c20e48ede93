//! `worksession migrate`: fold legacy per-repository stores into the global one.

use worksession_core::WorksessionEngine;

pub fn run(engine: &WorksessionEngine) -> Result<(), String> {
    let summary = engine.migrate_legacy()?;
    if summary.legacy_stores.is_empty() {
        println!("No legacy session stores found");
        return Ok(());
    }

    for path in &summary.legacy_stores {
        println!("  migrated {}", path.display());
    }
    println!(
        "Imported {} record(s); {} session(s) in {}",
        summary.records_imported,
        summary.records_total,
        engine.storage().sessions_file().display()
    );
    Ok(())
}
