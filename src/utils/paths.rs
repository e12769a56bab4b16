//! Path resolution for the files gitid reads and writes.
//!
//! Everything outside the application data directory (global Git config,
//! SSH directory) is resolved relative to a home directory so that tests and
//! embedders can point the whole system at a sandbox.

use std::path::{Path, PathBuf};

use crate::error::{GitIdError, Result};

/// Directory name used under the platform data directory.
const APP_DIR: &str = "gitid";

/// Expand tilde (~) prefix to the user's home directory.
/// Handles both "~" alone and "~/path/to/something" patterns.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

/// Render a path with the home prefix collapsed to `~`, the form SSH config
/// files conventionally use.
pub fn collapse_home(path: &Path, home: &Path) -> String {
    match path.strip_prefix(home) {
        Ok(rest) if !rest.as_os_str().is_empty() => format!("~/{}", rest.display()),
        _ => path.display().to_string(),
    }
}

/// Resolve a path that may start with `~/` against an explicit home.
pub fn expand_with_home(path: &str, home: &Path) -> PathBuf {
    if path == "~" {
        home.to_path_buf()
    } else if let Some(rest) = path.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// The current user's home directory.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| GitIdError::config("could not determine home directory"))
}

/// Default application data directory (`~/.local/share/gitid` on Linux).
pub fn default_data_dir() -> Result<PathBuf> {
    if let Some(data) = dirs::data_dir() {
        return Ok(data.join(APP_DIR));
    }
    Ok(home_dir()?.join(format!(".{}", APP_DIR)))
}

/// Pick the global Git config file for a home directory.
///
/// `~/.gitconfig` wins when present. Otherwise the XDG location is used if it
/// exists, and `~/.gitconfig` is the path to create.
pub fn resolve_global_git_config(home: &Path, xdg_config_home: Option<&Path>) -> PathBuf {
    let classic = home.join(".gitconfig");
    if classic.exists() {
        return classic;
    }
    let xdg_root = xdg_config_home
        .map(Path::to_path_buf)
        .unwrap_or_else(|| home.join(".config"));
    let xdg = xdg_root.join("git").join("config");
    if xdg.exists() { xdg } else { classic }
}

/// All on-disk locations used by one gitid installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub home: PathBuf,
    pub ssh_dir: PathBuf,
    pub global_git_config: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Build paths rooted at an explicit home directory.
    pub fn for_home(home: &Path, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            home: home.to_path_buf(),
            ssh_dir: home.join(".ssh"),
            global_git_config: resolve_global_git_config(home, None),
            data_dir: data_dir.into(),
        }
    }

    /// `~/.ssh/config`.
    pub fn ssh_config(&self) -> PathBuf {
        self.ssh_dir.join("config")
    }

    /// Directory holding backup bodies and the backup registry.
    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    /// Directory holding date-partitioned audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.data_dir.join("audit")
    }

    /// The record store database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("gitid.db")
    }
}
