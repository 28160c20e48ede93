//! Locating the repository the command was started in.

use std::env;
use std::path::{Path, PathBuf};

/// Nearest ancestor of `start` (inclusive) containing `.git`. Worktrees carry a
/// `.git` file rather than a directory; both count.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Main repository of a linked worktree, following its `.git` file:
///
/// ```text
/// <worktree>/.git            gitdir: <repo>/.git/worktrees/<name>
/// <gitdir>/commondir         ../..   (→ <repo>/.git)
/// ```
///
/// None when `root` is not a linked worktree (a regular checkout, a submodule).
fn main_repo_of_worktree(root: &Path) -> Option<PathBuf> {
    let marker = root.join(".git");
    if !marker.is_file() {
        return None;
    }
    let content = fs_err::read_to_string(&marker).ok()?;
    let gitdir = content
        .lines()
        .find_map(|line| line.strip_prefix("gitdir:"))
        .map(str::trim)?;
    let gitdir = root.join(gitdir);

    let common = match fs_err::read_to_string(gitdir.join("commondir")) {
        Ok(relative) => gitdir.join(relative.trim()),
        Err(_) if gitdir.parent()?.file_name()? == "worktrees" => {
            gitdir.parent()?.parent()?.to_path_buf()
        }
        Err(_) => return None,
    };
    let common = fs_err::canonicalize(&common).ok()?;
    if common.file_name()? == ".git" {
        common.parent().map(Path::to_path_buf)
    } else {
        Some(common)
    }
}

/// Repository root for `explicit`, else for the current directory. Inside a
/// linked worktree this is the main repository, which is what session records
/// store as their `repo_path`.
pub fn resolve_repo(explicit: Option<&Path>) -> Result<PathBuf, String> {
    let start = match explicit {
        Some(path) => path.to_path_buf(),
        None => env::current_dir().map_err(|e| format!("Failed to read current directory: {}", e))?,
    };
    let root = find_repo_root(&start)
        .ok_or_else(|| format!("Not inside a git repository: {}", start.display()))?;
    Ok(main_repo_of_worktree(&root).unwrap_or(root))
}
