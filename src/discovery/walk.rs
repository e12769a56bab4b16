//! Bounded breadth-first search for Git repositories.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::git::is_git_repo;

/// Directory names never descended into.
pub const SKIP_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "vendor",
    "packages",
    ".cache",
    "cache",
    "__pycache__",
];

pub const DEFAULT_MAX_DEPTH: usize = 4;
pub const DEFAULT_DIR_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct WalkOptions {
    /// Roots are depth 0; directories deeper than this are not visited.
    pub max_depth: usize,
    /// Budget for listing a single directory.
    pub dir_timeout: Duration,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            dir_timeout: DEFAULT_DIR_TIMEOUT,
        }
    }
}

#[derive(Debug, Default)]
pub struct WalkOutcome {
    /// Repository roots, sorted and unique.
    pub repositories: Vec<PathBuf>,
    /// One message per directory that could not be listed.
    pub errors: Vec<String>,
}

/// Find repositories under `roots`.
///
/// A directory identified as a repository is recorded and not descended
/// into. Unreadable or slow directories are recorded in `errors` and skipped.
pub async fn find_repositories(roots: &[PathBuf], options: &WalkOptions) -> WalkOutcome {
    let mut outcome = WalkOutcome::default();
    let mut found = HashSet::new();
    let mut visited = HashSet::new();
    let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::new();

    for root in roots {
        if root.is_dir() {
            queue.push_back((root.clone(), 0));
        } else {
            outcome
                .errors
                .push(format!("Scan root is not a directory: {}", root.display()));
        }
    }

    while let Some((dir, depth)) = queue.pop_front() {
        if !visited.insert(dir.clone()) {
            continue;
        }
        if is_git_repo(&dir) {
            found.insert(dir);
            continue;
        }
        if depth >= options.max_depth {
            continue;
        }

        match tokio::time::timeout(options.dir_timeout, list_subdirs(&dir)).await {
            Ok(Ok(children)) => {
                queue.extend(children.into_iter().map(|c| (c, depth + 1)));
            }
            Ok(Err(e)) => {
                tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                outcome
                    .errors
                    .push(format!("Cannot read {}: {}", dir.display(), e));
            }
            Err(_) => {
                tracing::warn!(dir = %dir.display(), "directory listing timed out");
                outcome.errors.push(format!(
                    "Timed out after {}s listing {}",
                    options.dir_timeout.as_secs(),
                    dir.display()
                ));
            }
        }
    }

    outcome.repositories = found.into_iter().collect();
    outcome.repositories.sort();
    outcome
}

/// Real (non-symlink) subdirectories not on the skip list.
async fn list_subdirs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    let mut dirs = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if SKIP_DIRS.iter().any(|skip| name == *skip) {
            continue;
        }
        dirs.push(entry.path());
    }
    dirs.sort();
    Ok(dirs)
}
