//! Read-only discovery of identities already present on the machine.
//!
//! Phases (SSH keys, SSH config, global Git config, repository walk) run
//! independently; a failing phase adds a message to `errors` and the scan
//! carries on with what the other phases found.

mod labels;
pub mod walk;

pub use labels::{LabelFn, LabelHints, suggest_label};
pub use walk::{WalkOptions, find_repositories};

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::db::{Provider, Repository};
use crate::error::SCAN_PARTIAL_FAILURE;
use crate::git::{GitIdentity, GitOperations, detect_provider};
use crate::ssh::{SshConfigEntry, SshKeyInfo, SshManager};

/// Repositories read concurrently during a walk.
const REPO_READ_CONCURRENCY: usize = 8;

/// Which phases to run and how far to walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryOptions {
    pub scan_ssh_keys: bool,
    pub scan_ssh_config: bool,
    pub scan_git_config: bool,
    pub scan_repositories: bool,
    pub scan_directories: Vec<PathBuf>,
    pub max_depth: usize,
    pub dir_timeout_ms: u64,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            scan_ssh_keys: true,
            scan_ssh_config: true,
            scan_git_config: true,
            scan_repositories: true,
            scan_directories: Vec::new(),
            max_depth: walk::DEFAULT_MAX_DEPTH,
            dir_timeout_ms: walk::DEFAULT_DIR_TIMEOUT.as_millis() as u64,
        }
    }
}

impl DiscoveryOptions {
    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            max_depth: self.max_depth,
            dir_timeout: Duration::from_millis(self.dir_timeout_ms),
        }
    }
}

/// Where a suggested identity was first seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    SshKey,
    GitConfig,
    SshConfig,
    CredentialHelper,
}

/// A candidate identity. Becomes a profile only when imported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredIdentity {
    pub id: String,
    pub source: IdentitySource,
    pub email: Option<String>,
    pub username: Option<String>,
    pub ssh_key: Option<SshKeyInfo>,
    pub ssh_config_entry: Option<SshConfigEntry>,
    pub provider: Option<Provider>,
    pub suggested_label: String,
    #[serde(default = "default_selected")]
    pub selected: bool,
}

fn default_selected() -> bool {
    true
}

impl DiscoveredIdentity {
    fn new(source: IdentitySource) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source,
            email: None,
            username: None,
            ssh_key: None,
            ssh_config_entry: None,
            provider: None,
            suggested_label: String::new(),
            selected: true,
        }
    }
}

/// Everything one discovery run found.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    pub ssh_keys: Vec<SshKeyInfo>,
    pub ssh_config_entries: Vec<SshConfigEntry>,
    pub global_identity: Option<GitIdentity>,
    pub repositories: Vec<Repository>,
    pub identities: Vec<DiscoveredIdentity>,
    pub errors: Vec<String>,
    /// `SCAN_PARTIAL_FAILURE` when some phase failed.
    pub warning: Option<String>,
    pub duration_ms: u64,
}

/// Read-only scan for identities already configured on the machine.
#[async_trait]
pub trait IdentityDiscovery: Send + Sync {
    /// Run the enabled phases. Phase failures land in `errors`.
    async fn discover(&self, options: &DiscoveryOptions) -> DiscoveryResult;

    /// Walk `roots` and load every repository found.
    async fn scan_repositories(
        &self,
        roots: &[PathBuf],
        options: &WalkOptions,
    ) -> (Vec<Repository>, Vec<String>);

    /// Merge what the phases found into de-duplicated suggestions.
    fn build_identity_suggestions(&self, result: &DiscoveryResult) -> Vec<DiscoveredIdentity>;

    /// Whether the machine already has an SSH key pair or a global email.
    async fn has_existing_identities(&self) -> bool;
}

/// Composes the SSH and Git components into a read-only scan.
pub struct DiscoveryEngine {
    ssh: Arc<dyn SshManager>,
    git: Arc<dyn GitOperations>,
    label_fn: LabelFn,
}

impl DiscoveryEngine {
    pub fn new(ssh: Arc<dyn SshManager>, git: Arc<dyn GitOperations>) -> Self {
        Self {
            ssh,
            git,
            label_fn: suggest_label,
        }
    }

    /// Replace the label heuristic.
    pub fn with_label_fn(mut self, label_fn: LabelFn) -> Self {
        self.label_fn = label_fn;
        self
    }


}

#[async_trait]
impl IdentityDiscovery for DiscoveryEngine {
    async fn discover(&self, options: &DiscoveryOptions) -> DiscoveryResult {
        let started = Instant::now();
        let mut result = DiscoveryResult::default();

        if options.scan_ssh_keys {
            match self.ssh.list_keys().await {
                Ok(keys) => result.ssh_keys = keys,
                Err(e) => result.errors.push(format!("SSH key scan failed: {}", e)),
            }
        }
        if options.scan_ssh_config {
            match self.ssh.get_ssh_config() {
                Ok(entries) => result.ssh_config_entries = entries,
                Err(e) => result.errors.push(format!("SSH config scan failed: {}", e)),
            }
        }
        if options.scan_git_config {
            match self.git.get_global_config() {
                Ok(identity) => result.global_identity = Some(identity),
                Err(e) => result.errors.push(format!("Global git config read failed: {}", e)),
            }
        }
        if options.scan_repositories && !options.scan_directories.is_empty() {
            let (repos, errors) = self
                .scan_repositories(&options.scan_directories, &options.walk_options())
                .await;
            result.repositories = repos;
            result.errors.extend(errors);
        }

        result.identities = self.build_identity_suggestions(&result);
        if !result.errors.is_empty() {
            result.warning = Some(SCAN_PARTIAL_FAILURE.to_string());
        }
        result.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            keys = result.ssh_keys.len(),
            hosts = result.ssh_config_entries.len(),
            repositories = result.repositories.len(),
            identities = result.identities.len(),
            errors = result.errors.len(),
            "discovery finished"
        );
        result
    }

    /// Walk `roots` and load every repository found. Per-item failures are
    /// returned as messages.
    async fn scan_repositories(
        &self,
        roots: &[PathBuf],
        options: &WalkOptions,
    ) -> (Vec<Repository>, Vec<String>) {
        let outcome = find_repositories(roots, options).await;
        let mut errors = outcome.errors;

        let loaded: Vec<_> = stream::iter(outcome.repositories)
            .map(|path| {
                let git = Arc::clone(&self.git);
                async move {
                    let loaded = git.get_repo(&path).await;
                    (path, loaded)
                }
            })
            .buffer_unordered(REPO_READ_CONCURRENCY)
            .collect()
            .await;

        let mut repos = Vec::with_capacity(loaded.len());
        for (path, loaded) in loaded {
            match loaded {
                Ok(Some(repo)) => repos.push(repo),
                Ok(None) => {}
                Err(e) => errors.push(format!("Cannot read {}: {}", path.display(), e)),
            }
        }
        repos.sort_by(|a, b| a.path.cmp(&b.path));
        (repos, errors)
    }

    /// Merge what the phases found into de-duplicated suggestions.
    ///
    /// Keys are keyed by comment, then fingerprint, then path; SSH config
    /// stanzas by alias; the global config by email. A stanza whose
    /// `IdentityFile` points at an already-suggested key enriches that
    /// suggestion, and any email is suggested at most once.
    fn build_identity_suggestions(&self, result: &DiscoveryResult) -> Vec<DiscoveredIdentity> {
        let mut suggestions: Vec<DiscoveredIdentity> = Vec::new();
        let mut seen_keys: HashSet<String> = HashSet::new();
        let mut seen_aliases: HashSet<String> = HashSet::new();
        let mut by_email: HashMap<String, usize> = HashMap::new();
        let mut by_key_path: HashMap<PathBuf, usize> = HashMap::new();

        for key in &result.ssh_keys {
            let natural = key
                .comment
                .clone()
                .or_else(|| key.fingerprint.clone())
                .unwrap_or_else(|| key.path.display().to_string());
            if !seen_keys.insert(natural) {
                continue;
            }

            let email = key
                .comment
                .as_deref()
                .filter(|c| looks_like_email(c))
                .map(str::to_string);
            if let Some(&idx) = email.as_ref().and_then(|e| by_email.get(&e.to_lowercase())) {
                by_key_path.insert(key.path.clone(), idx);
                continue;
            }

            let mut identity = DiscoveredIdentity::new(IdentitySource::SshKey);
            identity.email = email.clone();
            identity.ssh_key = Some(key.clone());
            let idx = suggestions.len();
            if let Some(email) = email {
                by_email.insert(email.to_lowercase(), idx);
            }
            by_key_path.insert(key.path.clone(), idx);
            suggestions.push(identity);
        }

        for entry in result.ssh_config_entries.iter().filter(|e| !e.is_wildcard) {
            if !seen_aliases.insert(entry.host.clone()) {
                continue;
            }
            let provider = entry
                .host_name
                .as_deref()
                .and_then(detect_provider)
                .or_else(|| detect_provider(&entry.host));
            let username = entry.user.clone().filter(|u| u != "git");

            let key_idx = entry
                .identity_file
                .as_deref()
                .map(|f| self.ssh.resolve_identity_file(f))
                .and_then(|path| by_key_path.get(&path).copied());

            match key_idx {
                Some(idx) if suggestions[idx].ssh_config_entry.is_none() => {
                    let existing = &mut suggestions[idx];
                    existing.ssh_config_entry = Some(entry.clone());
                    existing.provider = existing.provider.or(provider);
                    if existing.username.is_none() {
                        existing.username = username;
                    }
                }
                Some(_) => {}
                None => {
                    let mut identity = DiscoveredIdentity::new(IdentitySource::SshConfig);
                    identity.ssh_config_entry = Some(entry.clone());
                    identity.provider = provider;
                    identity.username = username;
                    suggestions.push(identity);
                }
            }
        }

        if let Some(global) = &result.global_identity
            && let Some(email) = global.email.as_deref().filter(|e| !e.trim().is_empty())
        {
            match by_email.get(&email.to_lowercase()) {
                Some(&idx) => {
                    let existing = &mut suggestions[idx];
                    if existing.username.is_none() {
                        existing.username = global.username.clone();
                    }
                }
                None => {
                    let mut identity = DiscoveredIdentity::new(IdentitySource::GitConfig);
                    identity.email = Some(email.to_string());
                    identity.username = global.username.clone();
                    by_email.insert(email.to_lowercase(), suggestions.len());
                    suggestions.push(identity);
                }
            }
        }

        for identity in &mut suggestions {
            let hints = LabelHints {
                email: identity.email.as_deref(),
                username: identity.username.as_deref(),
                key_comment: identity.ssh_key.as_ref().and_then(|k| k.comment.as_deref()),
            };
            identity.suggested_label = (self.label_fn)(&hints);
        }
        suggestions
    }

    /// Whether the machine already has an SSH key pair or a global email.
    async fn has_existing_identities(&self) -> bool {
        if self.ssh.list_keys().await.is_ok_and(|keys| !keys.is_empty()) {
            return true;
        }
        self.git
            .get_global_config()
            .is_ok_and(|identity| identity.email.is_some_and(|e| !e.trim().is_empty()))
    }
}

fn looks_like_email(text: &str) -> bool {
    let mut parts = text.split('@');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(domain), None) if !local.is_empty() && domain.contains('.')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::backup::BackupEngine;
    use crate::git::GitMutator;
    use crate::git::testing::FakeTransport;
    use crate::ssh::SshKeyManager;
    use crate::ssh::testing::FakeKeyTool;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        home: PathBuf,
        engine: DiscoveryEngine,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        fs::create_dir_all(home.join(".ssh")).unwrap();
        let backups = Arc::new(BackupEngine::new(dir.path().join("data/backups")));
        let audit = Arc::new(AuditLog::new(dir.path().join("data/audit")));
        let ssh = Arc::new(SshKeyManager::new(
            &home,
            home.join(".ssh"),
            Arc::new(FakeKeyTool),
            backups.clone(),
            audit.clone(),
        ));
        let git = Arc::new(GitMutator::new(
            home.join(".gitconfig"),
            backups,
            audit,
            Arc::new(FakeTransport::default()),
        ));
        Fixture {
            _dir: dir,
            home,
            engine: DiscoveryEngine::new(ssh, git),
        }
    }

    fn write_key(home: &std::path::Path, name: &str, comment: &str) {
        let ssh = home.join(".ssh");
        fs::write(ssh.join(name), "PRIVATE").unwrap();
        fs::write(
            ssh.join(format!("{}.pub", name)),
            format!("ssh-ed25519 AAAA{} {}\n", name, comment),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_keys_sharing_a_comment_give_one_suggestion() {
        let fx = fixture();
        write_key(&fx.home, "id_ed25519_a", "deploy-key");
        write_key(&fx.home, "id_ed25519_b", "deploy-key");

        let result = fx.engine.discover(&DiscoveryOptions::default()).await;
        assert_eq!(result.ssh_keys.len(), 2);
        assert_eq!(result.identities.len(), 1);
        let only = &result.identities[0];
        assert_eq!(only.source, IdentitySource::SshKey);
        assert_eq!(
            only.ssh_key.as_ref().and_then(|k| k.comment.as_deref()),
            Some("deploy-key")
        );
    }

    #[tokio::test]
    async fn test_sources_are_merged_into_one_suggestion_per_identity() {
        let fx = fixture();
        write_key(&fx.home, "id_ed25519", "ada@gmail.com");
        write_key(&fx.home, "id_ed25519_work", "ada@acme.io");
        fs::write(
            fx.home.join(".ssh/config"),
            "Host github-work\n    HostName github.com\n    User git\n    IdentityFile ~/.ssh/id_ed25519_work\n\nHost *\n    AddKeysToAgent yes\n",
        )
        .unwrap();
        fs::write(
            fx.home.join(".gitconfig"),
            "[user]\n\temail = ADA@gmail.com\n\tname = Ada Lovelace\n",
        )
        .unwrap();

        let result = fx.engine.discover(&DiscoveryOptions::default()).await;
        assert!(result.errors.is_empty());
        assert!(result.warning.is_none());
        assert_eq!(result.identities.len(), 2);

        let personal = result
            .identities
            .iter()
            .find(|i| i.email.as_deref() == Some("ada@gmail.com"))
            .unwrap();
        assert_eq!(personal.suggested_label, "Personal");
        assert_eq!(personal.username.as_deref(), Some("Ada Lovelace"));

        let work = result
            .identities
            .iter()
            .find(|i| i.email.as_deref() == Some("ada@acme.io"))
            .unwrap();
        assert_eq!(work.suggested_label, "Acme");
        assert_eq!(work.provider, Some(Provider::Github));
        assert_eq!(
            work.ssh_config_entry.as_ref().map(|e| e.host.as_str()),
            Some("github-work")
        );
    }

    #[tokio::test]
    async fn test_unlinked_stanza_and_global_email_are_separate() {
        let fx = fixture();
        fs::write(
            fx.home.join(".ssh/config"),
            "Host gitlab-oss\n    HostName gitlab.com\n    IdentityFile ~/.ssh/missing\n",
        )
        .unwrap();
        fs::write(fx.home.join(".gitconfig"), "[user]\n\temail = me@users.noreply.github.com\n").unwrap();

        let result = fx.engine.discover(&DiscoveryOptions::default()).await;
        assert_eq!(result.identities.len(), 2);
        assert_eq!(result.identities[0].source, IdentitySource::SshConfig);
        assert_eq!(result.identities[0].provider, Some(Provider::Gitlab));
        assert_eq!(result.identities[1].source, IdentitySource::GitConfig);
        assert_eq!(result.identities[1].suggested_label, "GitHub");
    }

    #[tokio::test]
    async fn test_repository_phase_and_partial_failure() {
        let fx = fixture();
        let code = fx.home.join("code");
        fs::create_dir_all(code.join("app/.git")).unwrap();
        fs::write(code.join("app/.git/config"), "[user]\n\temail = a@b.io\n").unwrap();

        let options = DiscoveryOptions {
            scan_ssh_keys: false,
            scan_ssh_config: false,
            scan_git_config: false,
            scan_directories: vec![code.clone(), fx.home.join("nope")],
            ..Default::default()
        };
        let result = fx.engine.discover(&options).await;
        assert_eq!(result.repositories.len(), 1);
        assert_eq!(result.repositories[0].local_email.as_deref(), Some("a@b.io"));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.warning.as_deref(), Some(SCAN_PARTIAL_FAILURE));
    }

    #[tokio::test]
    async fn test_custom_label_fn() {
        let fx = fixture();
        fs::write(fx.home.join(".gitconfig"), "[user]\n\temail = x@y.io\n").unwrap();
        let engine = fx.engine.with_label_fn(|_| "Custom".to_string());
        let result = engine.discover(&DiscoveryOptions::default()).await;
        assert_eq!(result.identities[0].suggested_label, "Custom");
    }

    #[tokio::test]
    async fn test_has_existing_identities() {
        let fx = fixture();
        assert!(!fx.engine.has_existing_identities().await);
        write_key(&fx.home, "id_rsa", "me@host");
        assert!(fx.engine.has_existing_identities().await);
    }
}
