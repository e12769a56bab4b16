//! Discovery runs and turning their suggestions into profiles.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use super::IdentityService;
use super::profiles::auth_method_for;
use crate::audit::{AuditCategory, LogOptions};
use crate::db::{CreateProfileInput, Profile, Provider, SettingsUpdate};
use crate::discovery::{DiscoveredIdentity, DiscoveryOptions, DiscoveryResult};
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub imported: usize,
    pub profiles: Vec<Profile>,
    /// One message per selected identity that was not imported.
    pub skipped: Vec<String>,
}

impl IdentityService {
    /// Run a read-only discovery scan and remember when it happened.
    pub async fn start_discovery(&self, mut options: DiscoveryOptions) -> Result<DiscoveryResult> {
        if options.scan_repositories && options.scan_directories.is_empty() {
            options.scan_directories = self.default_scan_roots()?;
        }
        let result = self.discovery.discover(&options).await;

        self.store.update_settings(SettingsUpdate {
            last_discovery_at: Some(Utc::now()),
            ..Default::default()
        })?;
        self.audit.log(
            AuditCategory::Discovery,
            "run",
            json!({
                "sshKeys": result.ssh_keys.len(),
                "sshConfigEntries": result.ssh_config_entries.len(),
                "repositories": result.repositories.len(),
                "identities": result.identities.len(),
                "errors": result.errors.len(),
                "durationMs": result.duration_ms,
            }),
            LogOptions::default(),
        )?;
        Ok(result)
    }

    pub async fn has_existing_identities(&self) -> bool {
        self.discovery.has_existing_identities().await
    }

    /// Create a profile for every selected suggestion. Suggestions without an
    /// email, or whose email already belongs to a profile, are skipped.
    pub async fn import_identities(&self, identities: Vec<DiscoveredIdentity>) -> Result<ImportResult> {
        let mut known: HashSet<String> = self
            .store
            .get_profiles()?
            .into_iter()
            .map(|p| p.email.to_lowercase())
            .collect();
        let mut result = ImportResult {
            imported: 0,
            profiles: Vec::new(),
            skipped: Vec::new(),
        };

        for identity in identities.into_iter().filter(|i| i.selected) {
            let Some(email) = identity.email.clone().filter(|e| !e.trim().is_empty()) else {
                result
                    .skipped
                    .push(format!("{}: no email address", identity.suggested_label));
                continue;
            };
            if !known.insert(email.to_lowercase()) {
                result
                    .skipped
                    .push(format!("{}: a profile already uses this email", email));
                continue;
            }

            match self.create_profile(import_input(&identity, &email, self)).await {
                Ok(profile) => {
                    result.imported += 1;
                    result.profiles.push(profile);
                }
                Err(e) => {
                    tracing::warn!(email = %email, error = %e, "identity not imported");
                    result.skipped.push(format!("{}: {}", email, e));
                }
            }
        }
        Ok(result)
    }
}

fn import_input(identity: &DiscoveredIdentity, email: &str, service: &IdentityService) -> CreateProfileInput {
    let entry = identity.ssh_config_entry.as_ref();
    let ssh_key_path = identity.ssh_key.as_ref().map(|k| k.path.clone()).or_else(|| {
        entry
            .and_then(|e| e.identity_file.as_deref())
            .map(|f| service.ssh.resolve_identity_file(f))
            .filter(|p| p.is_file())
    });
    let ssh_host_alias = ssh_key_path
        .as_ref()
        .and(entry)
        .map(|e| e.host.clone());
    let username = identity
        .username
        .clone()
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string());

    CreateProfileInput {
        label: identity.suggested_label.clone(),
        provider: identity.provider.unwrap_or(Provider::Github),
        username,
        email: email.to_string(),
        auth_method: auth_method_for(ssh_key_path.is_some()),
        ssh_key_path,
        ssh_host_alias,
        generate_new_key: false,
        token: None,
        color: None,
        is_default: false,
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::service;
    use super::*;
    use crate::audit::LogFilter;
    use crate::db::AuthMethod;
    use std::fs;

    #[tokio::test]
    async fn test_discovery_records_time_and_audits() {
        let t = service();
        fs::write(t.home().join(".gitconfig"), "[user]\n\temail = ada@acme.io\n").unwrap();

        let result = t
            .service
            .start_discovery(DiscoveryOptions::default())
            .await
            .unwrap();
        assert_eq!(result.identities.len(), 1);
        assert!(t.service.get_settings().unwrap().last_discovery_at.is_some());

        let logs = t.service.get_logs(&LogFilter::default()).unwrap();
        assert_eq!(logs[0].action, "run");
        assert_eq!(logs[0].details["identities"], 1);
    }

    #[tokio::test]
    async fn test_existing_identities_seen_before_any_profile() {
        let t = service();
        assert!(!t.service.has_existing_identities().await);
        fs::write(t.home().join(".gitconfig"), "[user]\n\tname = Ada\n").unwrap();
        assert!(!t.service.has_existing_identities().await);
        fs::write(t.home().join(".gitconfig"), "[user]\n\temail = ada@acme.io\n").unwrap();
        assert!(t.service.has_existing_identities().await);
    }

    #[tokio::test]
    async fn test_import_selected_and_skip_known_emails() {
        let t = service();
        let ssh = t.home().join(".ssh");
        fs::write(ssh.join("id_work"), "PRIVATE").unwrap();
        fs::write(ssh.join("id_work.pub"), "ssh-ed25519 AAAAwork ada@acme.io\n").unwrap();
        fs::write(
            ssh.join("config"),
            "Host github-acme\n    HostName github.com\n    User git\n    IdentityFile ~/.ssh/id_work\n",
        )
        .unwrap();
        fs::write(
            t.home().join(".gitconfig"),
            "[user]\n\temail = ada@gmail.com\n\tname = Ada\n",
        )
        .unwrap();

        let mut found = t
            .service
            .start_discovery(DiscoveryOptions::default())
            .await
            .unwrap()
            .identities;
        assert_eq!(found.len(), 2);
        let mut duplicate = found[1].clone();
        duplicate.email = duplicate.email.map(|e| e.to_uppercase());
        found.push(duplicate);

        let result = t.service.import_identities(found.clone()).await.unwrap();
        assert_eq!(result.imported, 2);
        assert_eq!(result.skipped.len(), 1);

        let work = result
            .profiles
            .iter()
            .find(|p| p.email == "ada@acme.io")
            .unwrap();
        assert_eq!(work.auth_method, AuthMethod::Ssh);
        assert_eq!(work.ssh_host_alias.as_deref(), Some("github-acme"));
        assert_eq!(work.ssh_key_path.as_deref(), Some(ssh.join("id_work").as_path()));
        // The existing stanza is reused rather than duplicated.
        assert_eq!(t.service.get_ssh_config().unwrap().len(), 1);

        let again = t.service.import_identities(found).await.unwrap();
        assert_eq!(again.imported, 0);
    }

    #[tokio::test]
    async fn test_unselected_identities_are_ignored() {
        let t = service();
        fs::write(t.home().join(".gitconfig"), "[user]\n\temail = ada@acme.io\n").unwrap();
        let mut found = t
            .service
            .start_discovery(DiscoveryOptions::default())
            .await
            .unwrap()
            .identities;
        found[0].selected = false;
        let result = t.service.import_identities(found).await.unwrap();
        assert_eq!(result.imported, 0);
        assert!(result.skipped.is_empty());
        assert!(t.service.get_profiles().unwrap().is_empty());
    }
}
