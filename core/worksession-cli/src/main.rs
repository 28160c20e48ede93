//! worksession: manage per-work-item development sessions.
//!
//! Each session bundles a git branch, a worktree, a tmux session and a sandbox
//! container. State lives in `~/.worksession/sessions.json`.
//!
//! ## Subcommands
//!
//! - `start`: provision a session for a work item
//! - `list` / `status`: show sessions with their detected status
//! - `touch` / `stop`: lifecycle hooks, usually called from inside a session
//! - `cleanup`: reclaim resources of stale sessions and orphaned branches
//! - `migrate`: fold legacy per-repository stores into the global store

mod cleanup;
mod hook;
mod list;
mod logging;
mod migrate;
mod repo;
mod start;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use worksession_core::{CleanupFlags, WorksessionEngine};

#[derive(Parser)]
#[command(name = "worksession")]
#[command(about = "Per-work-item development sessions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a session (branch, worktree, terminal, sandbox)
    Start {
        /// Work item, e.g. `42`, `#42`, or `jira:PROJ-7`
        #[arg(value_name = "ID")]
        id: String,

        /// Title shown in listings (defaults to the work item)
        #[arg(long)]
        title: Option<String>,

        /// Repository to work in (defaults to the current one)
        #[arg(long)]
        repo: Option<PathBuf>,
    },

    /// List sessions, most recently active first
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show one session
    Status {
        #[arg(value_name = "ID")]
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Record activity for a session (defaults to the one owning the cwd)
    Touch {
        #[arg(value_name = "ID")]
        id: Option<String>,
    },

    /// Mark a session stopped (defaults to the one owning the cwd)
    Stop {
        #[arg(value_name = "ID")]
        id: Option<String>,
    },

    /// Remove resources of stale sessions
    Cleanup {
        /// Show what would be removed without removing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,

        /// Remove sandboxes only, keep worktrees
        #[arg(long)]
        stale: bool,

        /// Drop records whose resources are already gone
        #[arg(long)]
        orphaned: bool,

        /// Delete issue branches no active session owns
        #[arg(long)]
        branches: bool,

        /// Sandboxes, worktrees and branches
        #[arg(long)]
        all: bool,

        /// Every repository instead of the current one
        #[arg(long)]
        global: bool,

        /// Only print errors
        #[arg(long)]
        silent: bool,

        /// Sessions cleaned concurrently
        #[arg(long, value_name = "N", default_value_t = 1)]
        parallel: usize,
    },

    /// Import legacy per-repository session stores
    Migrate,
}

fn run(command: Commands) -> Result<(), String> {
    let engine = WorksessionEngine::new()?;

    match command {
        Commands::Start { id, title, repo } => {
            start::run(&engine, &id, title.as_deref(), repo.as_deref())
        }
        Commands::List { json } => list::list(&engine, json),
        Commands::Status { id, json } => list::status(&engine, &id, json),
        Commands::Touch { id } => hook::touch(&engine, id.as_deref()),
        Commands::Stop { id } => hook::stop(&engine, id.as_deref()),
        Commands::Cleanup {
            dry_run,
            force,
            stale,
            orphaned,
            branches,
            all,
            global,
            silent,
            parallel,
        } => {
            let args = cleanup::CleanupArgs {
                flags: CleanupFlags {
                    stale,
                    orphaned,
                    branches,
                    all,
                },
                dry_run,
                force,
                global,
                silent,
                parallel,
            };
            cleanup::run(&engine, &args)
        }
        Commands::Migrate => migrate::run(&engine),
    }
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        tracing::error!(error = %e, "worksession command failed");
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
