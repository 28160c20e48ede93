//! Path normalization for comparing repository and worktree paths.
//!
//! Records store whatever path the writer saw, which may carry a trailing slash,
//! go through a symlink, or (on macOS) differ only in case from the path the
//! current command was started in.

use std::path::{Path, PathBuf};

/// Canonical form used for comparisons.
///
/// Symlinks are resolved when the path exists; otherwise the path is used as
/// written. Trailing separators are dropped. On macOS the result is lowercased,
/// since the default filesystems are case-insensitive.
pub fn normalize_path(path: &Path) -> PathBuf {
    let resolved = if path.exists() {
        path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
    } else {
        path.to_path_buf()
    };
    // `components()` already folds repeated and trailing separators.
    let rebuilt: PathBuf = resolved.components().collect();
    apply_case_normalization(rebuilt)
}

pub fn same_path(a: &Path, b: &Path) -> bool {
    if a.as_os_str().is_empty() || b.as_os_str().is_empty() {
        return false;
    }
    normalize_path(a) == normalize_path(b)
}

fn apply_case_normalization(path: PathBuf) -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        PathBuf::from(path.to_string_lossy().to_lowercase())
    }
    #[cfg(not(target_os = "macos"))]
    {
        path
    }
}
