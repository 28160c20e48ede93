//! `worksession cleanup`: reclaim resources of stale sessions.
//!
//! Without `--force` the command first prints what a dry run would do and asks
//! for confirmation. Resource errors are reported but do not fail the command;
//! the affected records stay in the store for the next run.

use std::io::{self, BufRead, Write};

use worksession_core::{
    CleanupFlags, CleanupMode, CleanupOptions, CleanupReport, CleanupScope, WorksessionEngine,
};

use crate::repo::resolve_repo;

pub struct CleanupArgs {
    pub flags: CleanupFlags,
    pub dry_run: bool,
    pub force: bool,
    pub global: bool,
    pub silent: bool,
    pub parallel: usize,
}

fn options(args: &CleanupArgs) -> Result<CleanupOptions, String> {
    let scope = if args.global {
        CleanupScope::Global
    } else {
        CleanupScope::CurrentRepo(resolve_repo(None)?)
    };
    Ok(CleanupOptions::for_mode(CleanupMode::from_flags(args.flags), scope)
        .dry_run(args.dry_run)
        .force(args.force)
        .silent(args.silent)
        .parallelism(args.parallel))
}

fn confirm(prompt: &str) -> Result<bool, String> {
    print!("{} [y/N] ", prompt);
    io::stdout()
        .flush()
        .map_err(|e| format!("Failed to write prompt: {}", e))?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| format!("Failed to read answer: {}", e))?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "YES"))
}

fn print_details(report: &CleanupReport) {
    for line in &report.details {
        println!("  {}", line);
    }
}

fn print_summary(report: &CleanupReport) {
    println!(
        "Cleaned {} session(s): {} sandbox(es), {} worktree(s), {} branch(es), {} record(s) pruned",
        report.sessions_cleaned,
        report.sandboxes_cleaned,
        report.worktrees_cleaned,
        report.branches_cleaned,
        report.records_pruned
    );
}

fn print_errors(report: &CleanupReport) {
    if report.errors.is_empty() {
        return;
    }
    eprintln!("{} error(s) during cleanup:", report.errors.len());
    for error in &report.errors {
        eprintln!("  {}", error);
    }
}

pub fn run(engine: &WorksessionEngine, args: &CleanupArgs) -> Result<(), String> {
    let options = options(args)?;

    if options.dry_run {
        let report = engine.cleanup(&options)?;
        if !options.silent {
            if report.is_noop() {
                println!("Nothing to clean up");
            } else {
                println!("Would clean {} session(s):", report.would_clean);
                print_details(&report);
            }
        }
        print_errors(&report);
        return Ok(());
    }

    if !options.force {
        let preview = engine.cleanup(&options.clone().dry_run(true))?;
        if preview.is_noop() {
            if !options.silent {
                println!("Nothing to clean up");
            }
            return Ok(());
        }
        println!("About to clean {} session(s):", preview.would_clean);
        print_details(&preview);
        if !confirm("Proceed?")? {
            println!("Aborted");
            return Ok(());
        }
    }

    let report = engine.cleanup(&options)?;
    tracing::info!(
        sessions = report.sessions_cleaned,
        branches = report.branches_cleaned,
        errors = report.errors.len(),
        "Cleanup finished"
    );
    if !options.silent {
        print_details(&report);
        print_summary(&report);
    }
    print_errors(&report);
    Ok(())
}
