//! Repository scanning, binding and validation.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::IdentityService;
use crate::audit::{AuditCategory, LogOptions};
use crate::db::{Profile, RepoStatus, Repository, RepositoryRecord};
use crate::discovery::WalkOptions;
use crate::error::{GitIdError, Result};
use crate::git::remote::with_host_alias;
use crate::git::{AccessCheck, GitIdentity};

/// Where to look for repositories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanOptions {
    /// Roots to walk; the configured default directories when empty.
    pub directories: Vec<PathBuf>,
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub repositories: Vec<Repository>,
    /// Directories that could not be walked or read.
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BindOptions {
    /// Rewrite an SSH `origin` to go through the profile's host alias.
    pub use_host_alias: bool,
}

impl IdentityService {
    /// Walk the given roots, remember every repository found and report its
    /// binding state. Existing bindings are kept.
    pub async fn scan_repositories(&self, options: ScanOptions) -> Result<ScanResult> {
        let started = Instant::now();
        let roots = if options.directories.is_empty() {
            self.default_scan_roots()?
        } else {
            options.directories
        };
        if roots.is_empty() {
            return Err(GitIdError::validation(
                "No directories to scan; pass one or set default scan directories",
            ));
        }
        let walk = WalkOptions {
            max_depth: options.max_depth.unwrap_or(self.scan_depth),
            ..Default::default()
        };

        let (found, errors) = self.discovery.scan_repositories(&roots, &walk).await;
        let profiles = self.store.get_profiles()?;
        let now = Utc::now();
        let mut repositories = Vec::with_capacity(found.len());
        for mut repo in found {
            let bound = self
                .store
                .get_repository(&repo.path)?
                .and_then(|r| r.bound_profile_id);
            self.store.save_repository(&RepositoryRecord {
                path: repo.path.clone(),
                name: repo.name.clone(),
                bound_profile_id: bound.clone(),
                last_accessed: now,
            })?;
            repo.bound_profile_id = bound;
            repo.last_accessed = now;
            evaluate(&mut repo, &profiles);
            repositories.push(repo);
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            found = repositories.len(),
            errors = errors.len(),
            duration_ms,
            "repository scan finished"
        );
        Ok(ScanResult {
            repositories,
            errors,
            duration_ms,
        })
    }

    /// Current state of one repository, read fresh from `.git/config`.
    pub async fn get_repository(&self, path: &Path) -> Result<Repository> {
        let mut repo = self
            .git
            .get_repo(path)
            .await?
            .ok_or_else(|| GitIdError::not_found(format!("Not a git repository: {}", path.display())))?;
        if let Some(record) = self.store.get_repository(path)? {
            repo.bound_profile_id = record.bound_profile_id;
            repo.last_accessed = record.last_accessed;
        }
        evaluate(&mut repo, &self.store.get_profiles()?);
        Ok(repo)
    }

    /// Every remembered repository, most recently accessed first. Entries
    /// whose directory is gone are reported with status `Error`.
    pub async fn list_repositories(&self) -> Result<Vec<Repository>> {
        let profiles = self.store.get_profiles()?;
        let mut repositories = Vec::new();
        for record in self.store.get_repositories()? {
            let repo = match self.git.get_repo(&record.path).await? {
                Some(mut repo) => {
                    repo.bound_profile_id = record.bound_profile_id;
                    repo.last_accessed = record.last_accessed;
                    evaluate(&mut repo, &profiles);
                    repo
                }
                None => missing(record),
            };
            repositories.push(repo);
        }
        Ok(repositories)
    }

    /// Write the profile's identity into the repository and remember the
    /// binding. With `use_host_alias`, an SSH `origin` is pointed at the
    /// profile's host alias as well.
    pub async fn bind_repository(
        &self,
        path: &Path,
        profile_id: &str,
        options: BindOptions,
    ) -> Result<Repository> {
        let profile = self.get_profile(profile_id)?;
        let repo = self
            .git
            .get_repo(path)
            .await?
            .ok_or_else(|| GitIdError::not_found(format!("Not a git repository: {}", path.display())))?;

        let alias_url = if options.use_host_alias {
            let alias = profile.ssh_host_alias.as_deref().ok_or_else(|| {
                GitIdError::validation(format!("Profile '{}' has no SSH host alias", profile.label))
            })?;
            let origin = repo.remotes.iter().find(|r| r.name == "origin");
            match origin.and_then(|o| with_host_alias(o, alias)) {
                Some(url) => Some(url),
                None => {
                    tracing::warn!(repo = %path.display(), "no SSH origin to rewrite");
                    None
                }
            }
        } else {
            None
        };

        let mut backup_ids = Vec::new();
        let identity = GitIdentity::new(profile.email.clone(), profile.username.clone());
        if let Some(backup) = self.git.set_local_config(path, &identity)? {
            backup_ids.push(backup.id);
        }
        if let Some(url) = &alias_url
            && let Some(backup) = self.git.set_remote_url(path, "origin", url)?
        {
            backup_ids.push(backup.id);
        }

        self.store.save_repository(&RepositoryRecord {
            path: path.to_path_buf(),
            name: repo.name.clone(),
            bound_profile_id: Some(profile.id.clone()),
            last_accessed: Utc::now(),
        })?;

        self.audit.log(
            AuditCategory::Repository,
            "bind",
            json!({
                "path": path.display().to_string(),
                "profileId": profile.id,
                "label": profile.label,
                "remoteUrl": alias_url,
                "backupIds": backup_ids,
            }),
            LogOptions {
                affected_paths: vec![path.to_path_buf()],
                reversible: !backup_ids.is_empty(),
                backup_id: backup_ids.first().cloned(),
            },
        )?;
        tracing::info!(repo = %path.display(), profile = %profile.id, "repository bound");
        self.get_repository(path).await
    }

    /// Forget the binding. The repository's `.git/config` is left as is.
    pub async fn unbind_repository(&self, path: &Path) -> Result<Repository> {
        let mut record = self
            .store
            .get_repository(path)?
            .ok_or_else(|| GitIdError::not_found(format!("Repository not tracked: {}", path.display())))?;
        let previous = record.bound_profile_id.take();
        record.last_accessed = Utc::now();
        self.store.save_repository(&record)?;

        self.audit.log(
            AuditCategory::Repository,
            "unbind",
            json!({
                "path": path.display().to_string(),
                "previousProfileId": previous,
            }),
            LogOptions {
                affected_paths: vec![path.to_path_buf()],
                ..Default::default()
            },
        )?;

        match self.git.get_repo(path).await? {
            Some(_) => self.get_repository(path).await,
            None => Ok(missing(record)),
        }
    }

    /// Stop tracking a repository. Nothing on disk changes.
    pub fn forget_repository(&self, path: &Path) -> Result<()> {
        if !self.store.delete_repository(path)? {
            return Err(GitIdError::not_found(format!(
                "Repository not tracked: {}",
                path.display()
            )));
        }
        self.audit.log(
            AuditCategory::Repository,
            "forget",
            json!({ "path": path.display().to_string() }),
            LogOptions {
                affected_paths: vec![path.to_path_buf()],
                ..Default::default()
            },
        )?;
        tracing::info!(repo = %path.display(), "repository forgotten");
        Ok(())
    }

    /// Check that the repository's remote accepts our credentials.
    pub async fn validate_repository(&self, path: &Path) -> Result<AccessCheck> {
        self.git.validate_access(path).await
    }
}

/// Derive status and mismatch details from the binding.
///
/// A bound repository is in mismatch when its local email differs from the
/// profile's (ignoring case) or its local name differs.
fn evaluate(repo: &mut Repository, profiles: &[Profile]) {
    if repo.status == RepoStatus::Error {
        return;
    }
    repo.has_mismatch = false;
    repo.mismatch_details = None;

    let Some(profile) = repo
        .bound_profile_id
        .as_deref()
        .and_then(|id| profiles.iter().find(|p| p.id == id))
    else {
        repo.bound_profile_id = None;
        repo.status = RepoStatus::Unbound;
        return;
    };

    let mut problems = Vec::new();
    let email_ok = repo
        .local_email
        .as_deref()
        .is_some_and(|e| e.eq_ignore_ascii_case(&profile.email));
    if !email_ok {
        problems.push(format!(
            "email is '{}', profile '{}' expects '{}'",
            repo.local_email.as_deref().unwrap_or("(unset)"),
            profile.label,
            profile.email
        ));
    }
    if repo.local_username.as_deref() != Some(profile.username.as_str()) {
        problems.push(format!(
            "name is '{}', profile '{}' expects '{}'",
            repo.local_username.as_deref().unwrap_or("(unset)"),
            profile.label,
            profile.username
        ));
    }

    if problems.is_empty() {
        repo.status = RepoStatus::Bound;
    } else {
        repo.status = RepoStatus::Mismatch;
        repo.has_mismatch = true;
        repo.mismatch_details = Some(problems.join("; "));
    }
}

fn missing(record: RepositoryRecord) -> Repository {
    Repository {
        mismatch_details: Some(format!(
            "No longer a git repository: {}",
            record.path.display()
        )),
        path: record.path,
        name: record.name,
        remotes: Vec::new(),
        bound_profile_id: record.bound_profile_id,
        local_email: None,
        local_username: None,
        detected_provider: None,
        has_mismatch: false,
        status: RepoStatus::Error,
        last_accessed: record.last_accessed,
    }
}
