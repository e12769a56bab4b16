//! Reads repositories and writes identity settings into Git config files.
//!
//! Every write goes backup -> write -> audit. If the backup cannot be taken
//! the file is left untouched.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::config_file::{self, GitConfigMap};
use crate::audit::{AuditCategory, AuditTrail, LogOptions};
use crate::backup::{BackupInfo, BackupStorage, BackupType};
use crate::db::{RepoStatus, Repository};
use crate::error::{GitIdError, Result};
use crate::utils::fs::{read_string_optional, write_atomic};
use crate::utils::process::{self, CommandOutput};

/// Author identity as stored under `[user]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitIdentity {
    pub email: Option<String>,
    pub username: Option<String>,
}

impl GitIdentity {
    pub fn new(email: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            username: Some(username.into()),
        }
    }

    fn from_map(map: &GitConfigMap) -> Self {
        Self {
            email: map.get("user.email").cloned(),
            username: map.get("user.name").cloned(),
        }
    }

    fn edits(&self) -> Vec<(&'static str, &str)> {
        let mut edits = Vec::new();
        if let Some(email) = self.email.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            edits.push(("email", email));
        }
        if let Some(name) = self.username.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            edits.push(("name", name));
        }
        edits
    }
}

/// Outcome class of a dry-run fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    Success,
    PermissionDenied,
    HostUnreachable,
    Failed,
}

/// Result of [`GitMutator::validate_access`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheck {
    pub success: bool,
    pub status: AccessStatus,
    pub remote: Option<String>,
    pub message: String,
}

impl AccessCheck {
    fn new(status: AccessStatus, remote: Option<String>, message: impl Into<String>) -> Self {
        Self {
            success: status == AccessStatus::Success,
            status,
            remote,
            message: message.into(),
        }
    }

    /// Turn denied / unreachable outcomes into their typed errors.
    pub fn into_result(self) -> Result<AccessCheck> {
        match self.status {
            AccessStatus::Success => Ok(self),
            AccessStatus::PermissionDenied => Err(GitIdError::AccessDenied(self.message)),
            AccessStatus::HostUnreachable => Err(GitIdError::HostUnreachable(self.message)),
            AccessStatus::Failed => Err(GitIdError::command("git fetch --dry-run", self.message)),
        }
    }
}

/// Stderr fragments (case-insensitive) that mean the credentials were refused.
static PERMISSION_DENIED: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)permission denied",
        r"(?i)authentication failed",
        r"(?i)could not read (username|password)",
        r"(?i)access denied",
        r"(?i)invalid username or password",
        r"(?i)repository not found",
        r"(?i)\b403\b",
    ])
    .unwrap_or_else(|_| RegexSet::empty())
});

/// Stderr fragments that mean the host could not be reached.
static HOST_UNREACHABLE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)could not resolve host",
        r"(?i)could not resolve hostname",
        r"(?i)connection (timed out|refused)",
        r"(?i)operation timed out",
        r"(?i)network is unreachable",
        r"(?i)no route to host",
    ])
    .unwrap_or_else(|_| RegexSet::empty())
});

/// Classify a finished dry-run fetch.
pub fn classify_fetch(output: &CommandOutput) -> AccessStatus {
    if output.success {
        AccessStatus::Success
    } else if PERMISSION_DENIED.is_match(&output.stderr) {
        AccessStatus::PermissionDenied
    } else if HOST_UNREACHABLE.is_match(&output.stderr) {
        AccessStatus::HostUnreachable
    } else {
        AccessStatus::Failed
    }
}

/// Network side of access validation.
#[async_trait]
pub trait GitTransport: Send + Sync {
    async fn dry_run_fetch(&self, repo: &Path, remote: &str) -> Result<CommandOutput>;
}

/// [`GitTransport`] that shells out to `git fetch --dry-run`.
pub struct GitCli {
    timeout: Duration,
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl GitTransport for GitCli {
    async fn dry_run_fetch(&self, repo: &Path, remote: &str) -> Result<CommandOutput> {
        process::run("git", &["fetch", "--dry-run", remote], Some(repo), self.timeout).await
    }
}

/// True for a working tree with a `.git` directory or a `.git` file holding
/// a `gitdir:` pointer (worktrees, submodules).
pub fn is_git_repo(dir: &Path) -> bool {
    git_dir(dir).is_some()
}

/// The repository's git directory, following `gitdir:` pointers.
pub fn git_dir(repo: &Path) -> Option<PathBuf> {
    let dot_git = repo.join(".git");
    if dot_git.is_dir() {
        return Some(dot_git);
    }
    if dot_git.is_file() {
        let content = std::fs::read_to_string(&dot_git).ok()?;
        let target = content
            .lines()
            .find_map(|l| l.trim().strip_prefix("gitdir:"))?
            .trim();
        let target = Path::new(target);
        return Some(if target.is_absolute() {
            target.to_path_buf()
        } else {
            repo.join(target)
        });
    }
    None
}

/// `<git dir>/config` of a repository.
pub fn local_config_path(repo: &Path) -> Result<PathBuf> {
    git_dir(repo)
        .map(|d| d.join("config"))
        .ok_or_else(|| GitIdError::not_found(format!("Not a git repository: {}", repo.display())))
}

/// Reads repositories and writes identity settings into Git config files.
#[async_trait]
pub trait GitOperations: Send + Sync {
    fn global_config_path(&self) -> &Path;

    /// Flat `section.key` map of any config file (empty when missing).
    fn parse_git_config(&self, path: &Path) -> Result<GitConfigMap>;

    /// Load a repository. `None` when `path` is not a Git working tree.
    async fn get_repo(&self, path: &Path) -> Result<Option<Repository>>;

    fn get_global_config(&self) -> Result<GitIdentity>;

    fn set_global_config(&self, identity: &GitIdentity) -> Result<Option<BackupInfo>>;

    fn set_local_config(&self, repo: &Path, identity: &GitIdentity) -> Result<Option<BackupInfo>>;

    fn set_remote_url(&self, repo: &Path, remote: &str, url: &str) -> Result<Option<BackupInfo>>;

    /// Check that the repository's remote accepts this machine's credentials.
    async fn validate_access(&self, repo: &Path) -> Result<AccessCheck>;
}

/// Git config reader/writer bound to one global config file.
pub struct GitMutator {
    global_config: PathBuf,
    backups: Arc<dyn BackupStorage>,
    audit: Arc<dyn AuditTrail>,
    transport: Arc<dyn GitTransport>,
}

impl GitMutator {
    pub fn new(
        global_config: impl Into<PathBuf>,
        backups: Arc<dyn BackupStorage>,
        audit: Arc<dyn AuditTrail>,
        transport: Arc<dyn GitTransport>,
    ) -> Self {
        Self {
            global_config: global_config.into(),
            backups,
            audit,
            transport,
        }
    }

    fn write_identity(
        &self,
        path: &Path,
        backup_type: BackupType,
        identity: &GitIdentity,
        mut details: serde_json::Value,
    ) -> Result<Option<BackupInfo>> {
        let edits = identity.edits();
        if edits.is_empty() {
            return Err(GitIdError::validation("Email or username is required"));
        }

        let mut content = read_string_optional(path)?.unwrap_or_default();
        for (key, value) in &edits {
            content = config_file::set_value(&content, "user", None, key, value);
        }

        let backup = self
            .backups
            .create_backup(path, backup_type, "Set git identity")?;
        write_atomic(path, content.as_bytes())?;

        if let serde_json::Value::Object(map) = &mut details {
            map.insert("email".into(), json!(identity.email));
            map.insert("username".into(), json!(identity.username));
        }
        let action = match backup_type {
            BackupType::GitConfigGlobal => "set_global",
            _ => "set_local",
        };
        self.audit.log(
            AuditCategory::GitConfig,
            action,
            details,
            LogOptions::for_write(path, backup.as_ref().map(|b| b.id.clone())),
        )?;

        tracing::info!(path = %path.display(), "git identity written");
        Ok(backup)
    }
}

#[async_trait]
impl GitOperations for GitMutator {
    fn global_config_path(&self) -> &Path {
        &self.global_config
    }

    /// Flat key map of any config file (empty when missing).
    fn parse_git_config(&self, path: &Path) -> Result<GitConfigMap> {
        config_file::parse_file(path)
    }

    /// Load a repository from its `.git/config`. `None` when `path` is not a
    /// repository; an unreadable config yields status `Error`.
    async fn get_repo(&self, path: &Path) -> Result<Option<Repository>> {
        let Some(git_dir) = git_dir(path) else {
            return Ok(None);
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut repo = Repository {
            path: path.to_path_buf(),
            name,
            remotes: Vec::new(),
            bound_profile_id: None,
            local_email: None,
            local_username: None,
            detected_provider: None,
            has_mismatch: false,
            mismatch_details: None,
            status: RepoStatus::Unbound,
            last_accessed: Utc::now(),
        };

        let config_path = git_dir.join("config");
        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                let map = config_file::parse(&content);
                let identity = GitIdentity::from_map(&map);
                repo.remotes = config_file::remotes(&map);
                repo.detected_provider = repo.remotes.iter().find_map(|r| r.provider);
                repo.local_email = identity.email;
                repo.local_username = identity.username;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %config_path.display(), error = %e, "unreadable git config");
                repo.status = RepoStatus::Error;
                repo.mismatch_details = Some(format!("Could not read git config: {}", e));
            }
        }
        Ok(Some(repo))
    }

    fn get_global_config(&self) -> Result<GitIdentity> {
        Ok(GitIdentity::from_map(&config_file::parse_file(&self.global_config)?))
    }

    /// Write `user.email` / `user.name` into the global config.
    fn set_global_config(&self, identity: &GitIdentity) -> Result<Option<BackupInfo>> {
        let path = self.global_config.clone();
        self.write_identity(&path, BackupType::GitConfigGlobal, identity, json!({ "scope": "global" }))
    }

    /// Write `user.email` / `user.name` into a repository's local config.
    fn set_local_config(&self, repo: &Path, identity: &GitIdentity) -> Result<Option<BackupInfo>> {
        let path = local_config_path(repo)?;
        self.write_identity(
            &path,
            BackupType::GitConfigLocal,
            identity,
            json!({ "scope": "local", "repository": repo.display().to_string() }),
        )
    }

    /// Point `remote.<name>.url` somewhere else.
    fn set_remote_url(&self, repo: &Path, remote: &str, url: &str) -> Result<Option<BackupInfo>> {
        if remote.trim().is_empty() || url.trim().is_empty() {
            return Err(GitIdError::validation("Remote name and URL are required"));
        }
        let path = local_config_path(repo)?;
        let current = read_string_optional(&path)?.unwrap_or_default();
        let updated = config_file::set_value(&current, "remote", Some(remote), "url", url.trim());

        let backup = self.backups.create_backup(
            &path,
            BackupType::GitConfigLocal,
            &format!("Set remote {} URL", remote),
        )?;
        write_atomic(&path, updated.as_bytes())?;

        self.audit.log(
            AuditCategory::GitConfig,
            "set_remote_url",
            json!({
                "repository": repo.display().to_string(),
                "remote": remote,
                "url": url.trim(),
            }),
            LogOptions::for_write(&path, backup.as_ref().map(|b| b.id.clone())),
        )?;
        Ok(backup)
    }

    /// Dry-run fetch of `origin` (or the first remote) and classify the outcome.
    async fn validate_access(&self, repo: &Path) -> Result<AccessCheck> {
        let Some(repository) = self.get_repo(repo).await? else {
            return Err(GitIdError::not_found(format!(
                "Not a git repository: {}",
                repo.display()
            )));
        };
        let Some(remote) = repository.remotes.first() else {
            return Ok(AccessCheck::new(AccessStatus::Failed, None, "No remote configured"));
        };

        let check = match self.transport.dry_run_fetch(repo, &remote.name).await {
            Ok(output) => {
                let status = classify_fetch(&output);
                let message = match status {
                    AccessStatus::Success => format!("Access to {} confirmed", remote.url),
                    _ => first_line(&output.stderr)
                        .unwrap_or("git fetch failed")
                        .to_string(),
                };
                AccessCheck::new(status, Some(remote.name.clone()), message)
            }
            Err(e) => AccessCheck::new(AccessStatus::Failed, Some(remote.name.clone()), e.to_string()),
        };
        tracing::debug!(repo = %repo.display(), status = ?check.status, "access validated");
        Ok(check)
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

#[cfg(test)]
pub(crate) mod testing {
    //! A [`GitTransport`] with canned results.

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeTransport {
        pub stderr: Mutex<Option<String>>,
    }

    impl FakeTransport {
        pub fn failing(stderr: &str) -> Self {
            Self {
                stderr: Mutex::new(Some(stderr.to_string())),
            }
        }
    }

    #[async_trait]
    impl GitTransport for FakeTransport {
        async fn dry_run_fetch(&self, _repo: &Path, _remote: &str) -> Result<CommandOutput> {
            let stderr = self.stderr.lock().unwrap().clone();
            Ok(CommandOutput {
                success: stderr.is_none(),
                code: Some(if stderr.is_none() { 0 } else { 128 }),
                stdout: String::new(),
                stderr: stderr.unwrap_or_default(),
            })
        }
    }
}
