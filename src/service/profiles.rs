//! Profile lifecycle and the global identity switch.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use super::IdentityService;
use crate::audit::{AuditCategory, LogOptions};
use crate::db::{AuthMethod, CreateProfileInput, Profile, Provider, UpdateProfileInput};
use crate::error::{GitIdError, Result};
use crate::git::GitIdentity;
use crate::ssh::keys::public_key_path;
use crate::ssh::{GenerateKeyOptions, KeyType, SshConfigEntry, slugify};

/// Colors handed out round-robin to new profiles.
const PALETTE: &[&str] = &[
    "#6366f1", "#10b981", "#f59e0b", "#ef4444", "#3b82f6", "#ec4899", "#14b8a6", "#8b5cf6",
];

/// Result of pointing the global Git config at a profile.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSwitch {
    pub profile: Profile,
    pub backup_id: Option<String>,
}

/// The global identity together with the profile it belongs to, if any.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentGlobal {
    pub identity: GitIdentity,
    pub profile: Option<Profile>,
}

impl IdentityService {
    pub fn get_profiles(&self) -> Result<Vec<Profile>> {
        self.store.get_profiles()
    }

    pub fn get_profile(&self, id: &str) -> Result<Profile> {
        self.store
            .get_profile(id)?
            .ok_or_else(|| GitIdError::not_found(format!("Profile not found: {}", id)))
    }

    /// Create a profile. The first profile becomes the default.
    ///
    /// With `generate_new_key` an ed25519 pair is minted. Any profile that
    /// ends up with a key but no host alias gets `<provider>-<label>` (with a
    /// `-2`, `-3` suffix when that alias routes elsewhere) and a matching
    /// `~/.ssh/config` stanza. A token goes to the vault only.
    ///
    /// If anything fails before the record is saved, the key pair, stanza
    /// and token written by this call are removed again.
    pub async fn create_profile(&self, input: CreateProfileInput) -> Result<Profile> {
        let mut undo = CreateUndo::default();
        let saved = match self.create_profile_record(input, &mut undo).await {
            Ok(saved) => saved,
            Err(e) => {
                self.undo_create(undo);
                return Err(e);
            }
        };

        self.audit.log(
            AuditCategory::Profile,
            "create",
            json!({
                "id": saved.id,
                "label": saved.label,
                "provider": saved.provider.as_str(),
                "email": saved.email,
                "authMethod": saved.auth_method.as_str(),
                "sshHostAlias": saved.ssh_host_alias,
                "generatedKey": undo.key.is_some(),
                "isDefault": saved.is_default,
            }),
            LogOptions::default(),
        )?;
        tracing::info!(id = %saved.id, label = %saved.label, "profile created");
        Ok(saved)
    }

    async fn create_profile_record(
        &self,
        input: CreateProfileInput,
        undo: &mut CreateUndo,
    ) -> Result<Profile> {
        let label = required("label", &input.label)?;
        let username = required("username", &input.username)?;
        let email = validate_email(&input.email)?;
        if input.generate_new_key && input.ssh_key_path.is_some() {
            return Err(GitIdError::validation(
                "Use either an existing SSH key or generate a new one, not both",
            ));
        }

        let mut key_path = match &input.ssh_key_path {
            Some(path) => Some(self.existing_key(path)?),
            None => None,
        };
        let explicit_alias = input
            .ssh_host_alias
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        if explicit_alias.is_some() && key_path.is_none() && !input.generate_new_key {
            return Err(GitIdError::validation(
                "An SSH host alias needs an SSH key; set both or neither",
            ));
        }
        if (key_path.is_some() || input.generate_new_key) && explicit_alias.is_none() {
            // Fails early for custom providers, before any key is minted.
            self.host_alias_for(input.provider, &label)?;
        }

        if input.generate_new_key {
            let info = self
                .ssh
                .generate_key(&GenerateKeyOptions {
                    email: email.clone(),
                    label: label.clone(),
                    key_type: KeyType::Ed25519,
                })
                .await?;
            undo.key = Some(info.path.clone());
            key_path = Some(info.path);
        }

        let alias = match &key_path {
            Some(key) => {
                let alias = self.settle_alias(&AliasRequest {
                    profile_id: None,
                    explicit: explicit_alias.as_deref(),
                    provider: input.provider,
                    label: &label,
                    key,
                })?;
                if self.ensure_host_stanza(input.provider, &alias, key)? {
                    undo.stanza = Some(alias.clone());
                }
                Some(alias)
            }
            None => None,
        };

        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let color = match input.color.filter(|c| !c.trim().is_empty()) {
            Some(color) => color,
            None => PALETTE[self.store.get_profiles()?.len() % PALETTE.len()].to_string(),
        };

        let token_id = match input.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => {
                undo.token = Some(id.clone());
                self.store.store_token(&id, token)?;
                Some(id.clone())
            }
            _ => None,
        };

        self.store.save_profile(&Profile {
            id,
            label,
            provider: input.provider,
            username,
            email,
            auth_method: input.auth_method,
            ssh_key_path: key_path,
            ssh_host_alias: alias,
            token_id,
            is_default: input.is_default,
            color,
            created_at: now,
            updated_at: now,
        })
    }

    /// Best-effort removal of what a failed `create_profile` left behind.
    fn undo_create(&self, undo: CreateUndo) {
        if let Some(id) = &undo.token
            && let Err(e) = self.store.delete_token(id)
        {
            tracing::warn!(error = %e, "could not remove token of failed profile");
        }
        if let Some(alias) = &undo.stanza
            && let Err(e) = self.ssh.remove_ssh_config_entry(alias)
        {
            tracing::warn!(alias, error = %e, "could not remove host stanza of failed profile");
        }
        if let Some(key) = &undo.key {
            for path in [key.clone(), public_key_path(key)] {
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "could not remove generated key");
                }
            }
        }
    }

    /// Apply a partial update. An empty token removes the stored one.
    pub fn update_profile(&self, input: UpdateProfileInput) -> Result<Profile> {
        let mut profile = self.get_profile(&input.id)?;
        let mut changed: Vec<&str> = Vec::new();

        if let Some(label) = &input.label {
            profile.label = required("label", label)?;
            changed.push("label");
        }
        if let Some(provider) = input.provider {
            profile.provider = provider;
            changed.push("provider");
        }
        if let Some(username) = &input.username {
            profile.username = required("username", username)?;
            changed.push("username");
        }
        if let Some(email) = &input.email {
            profile.email = validate_email(email)?;
            changed.push("email");
        }
        if let Some(method) = input.auth_method {
            profile.auth_method = method;
            changed.push("authMethod");
        }
        if let Some(path) = &input.ssh_key_path {
            profile.ssh_key_path = Some(self.existing_key(path)?);
            changed.push("sshKeyPath");
        }
        if let Some(alias) = &input.ssh_host_alias {
            let alias = alias.trim();
            profile.ssh_host_alias = (!alias.is_empty()).then(|| alias.to_string());
            changed.push("sshHostAlias");
        }
        if let Some(color) = &input.color {
            profile.color = required("color", color)?;
            changed.push("color");
        }
        if let Some(is_default) = input.is_default {
            profile.is_default = is_default;
            changed.push("isDefault");
        }

        if profile.ssh_key_path.is_none() && profile.ssh_host_alias.is_some() {
            return Err(GitIdError::validation(
                "An SSH host alias needs an SSH key; set both or neither",
            ));
        }
        if let Some(key) = profile.ssh_key_path.clone()
            && (profile.ssh_host_alias.is_none()
                || changed.contains(&"sshKeyPath")
                || changed.contains(&"sshHostAlias"))
        {
            let requested = profile.ssh_host_alias.clone();
            let alias = self.settle_alias(&AliasRequest {
                profile_id: Some(&profile.id),
                explicit: requested.as_deref(),
                provider: profile.provider,
                label: &profile.label,
                key: &key,
            })?;
            self.ensure_host_stanza(profile.provider, &alias, &key)?;
            profile.ssh_host_alias = Some(alias);
        }

        if let Some(token) = input.token.as_deref().map(str::trim) {
            if token.is_empty() {
                self.store.delete_token(&profile.id)?;
                profile.token_id = None;
            } else {
                self.store.store_token(&profile.id, token)?;
                profile.token_id = Some(profile.id.clone());
            }
            changed.push("token");
        }

        profile.updated_at = Utc::now();
        let saved = self.store.save_profile(&profile)?;
        self.audit.log(
            AuditCategory::Profile,
            "update",
            json!({ "id": saved.id, "fields": changed }),
            LogOptions::default(),
        )?;
        Ok(saved)
    }

    /// Delete a profile along with its token and SSH host stanza. A deleted
    /// default is replaced by the oldest remaining profile, and repositories
    /// bound to it become unbound.
    pub fn delete_profile(&self, id: &str) -> Result<()> {
        let profile = self.get_profile(id)?;

        self.store.delete_token(&profile.id)?;
        let removed_alias = match &profile.ssh_host_alias {
            Some(alias) if self.owns_stanza(&profile, alias)? => self.ssh.remove_ssh_config_entry(alias)?,
            _ => false,
        };
        self.store.delete_profile(&profile.id)?;

        self.audit.log(
            AuditCategory::Profile,
            "delete",
            json!({
                "id": profile.id,
                "label": profile.label,
                "wasDefault": profile.is_default,
                "removedHostAlias": removed_alias.then_some(profile.ssh_host_alias.clone()).flatten(),
            }),
            LogOptions::default(),
        )?;
        tracing::info!(id = %profile.id, "profile deleted");
        Ok(())
    }

    pub fn set_default_profile(&self, id: &str) -> Result<Profile> {
        self.store.set_default_profile(id)?;
        let profile = self.get_profile(id)?;
        self.audit.log(
            AuditCategory::Profile,
            "set_default",
            json!({ "id": profile.id, "label": profile.label }),
            LogOptions::default(),
        )?;
        Ok(profile)
    }

    /// Write the profile's email and name into the global Git config.
    pub fn switch_global(&self, id: &str) -> Result<GlobalSwitch> {
        let profile = self.get_profile(id)?;
        let identity = GitIdentity::new(profile.email.clone(), profile.username.clone());
        let backup = self.git.set_global_config(&identity)?;
        let backup_id = backup.map(|b| b.id);

        self.audit.log(
            AuditCategory::Profile,
            "global_switch",
            json!({
                "id": profile.id,
                "label": profile.label,
                "email": profile.email,
            }),
            LogOptions::for_write(self.git.global_config_path(), backup_id.clone()),
        )?;
        tracing::info!(id = %profile.id, "global identity switched");
        Ok(GlobalSwitch { profile, backup_id })
    }

    pub fn get_current_global(&self) -> Result<CurrentGlobal> {
        let identity = self.git.get_global_config()?;
        let profile = match identity.email.as_deref() {
            Some(email) => self
                .store
                .get_profiles()?
                .into_iter()
                .find(|p| p.email.eq_ignore_ascii_case(email)),
            None => None,
        };
        Ok(CurrentGlobal { identity, profile })
    }

    /// Resolve and check an explicit private key path.
    fn existing_key(&self, path: &Path) -> Result<PathBuf> {
        let resolved = self.ssh.resolve_identity_file(&path.to_string_lossy());
        if !resolved.is_file() {
            return Err(GitIdError::validation(format!(
                "SSH key not found: {}",
                resolved.display()
            )));
        }
        Ok(resolved)
    }

    fn host_alias_for(&self, provider: Provider, label: &str) -> Result<String> {
        if provider.default_host().is_none() {
            return Err(GitIdError::validation(
                "Custom providers need an explicit SSH host alias",
            ));
        }
        let slug = slugify(label);
        if slug.is_empty() {
            return Err(GitIdError::validation(format!(
                "Cannot derive a host alias from label '{}'",
                label
            )));
        }
        Ok(format!("{}-{}", provider.as_str(), slug))
    }

    /// Pick the host alias that routes to `req.key`.
    ///
    /// An alias is usable when no other profile holds it for a different key
    /// and its stanza, if any, already points at the key. A stanza the profile
    /// being updated owns alone may be repointed. An explicit alias must be
    /// usable; a derived one takes the first usable `-N` suffix.
    fn settle_alias(&self, req: &AliasRequest<'_>) -> Result<String> {
        let entries = self.ssh.get_ssh_config()?;
        let profiles = self.store.get_profiles()?;
        let owned = profiles
            .iter()
            .find(|p| Some(p.id.as_str()) == req.profile_id)
            .and_then(|p| p.ssh_host_alias.clone());
        let others: Vec<&Profile> = profiles
            .iter()
            .filter(|p| Some(p.id.as_str()) != req.profile_id)
            .collect();

        let usable = |alias: &str| {
            let shared = others
                .iter()
                .filter(|p| p.ssh_host_alias.as_deref() == Some(alias))
                .collect::<Vec<_>>();
            if shared.iter().any(|p| p.ssh_key_path.as_deref() != Some(req.key)) {
                return false;
            }
            entries
                .iter()
                .filter(|e| e.host == alias)
                .all(|e| {
                    self.stanza_points_at(e, req.key)
                        || (owned.as_deref() == Some(alias) && shared.is_empty())
                })
        };

        if let Some(alias) = req.explicit {
            if !usable(alias) {
                return Err(GitIdError::validation(format!(
                    "SSH host alias '{}' already routes to a different key",
                    alias
                )));
            }
            return Ok(alias.to_string());
        }

        let base = self.host_alias_for(req.provider, req.label)?;
        std::iter::once(base.clone())
            .chain((2u32..).map(|n| format!("{}-{}", base, n)))
            .find(|alias| usable(alias.as_str()))
            .ok_or_else(|| GitIdError::from("no free SSH host alias"))
    }

    fn stanza_points_at(&self, entry: &SshConfigEntry, key: &Path) -> bool {
        entry
            .identity_file
            .as_deref()
            .is_some_and(|f| self.ssh.resolve_identity_file(f) == key)
    }

    /// Whether deleting `profile` may remove the `alias` stanza: no other
    /// profile uses the alias and the stanza points at this profile's key.
    fn owns_stanza(&self, profile: &Profile, alias: &str) -> Result<bool> {
        let shared = self
            .store
            .get_profiles()?
            .iter()
            .any(|p| p.id != profile.id && p.ssh_host_alias.as_deref() == Some(alias));
        if shared {
            return Ok(false);
        }
        let Some(key) = profile.ssh_key_path.as_deref() else {
            return Ok(false);
        };
        Ok(self
            .ssh
            .get_ssh_config()?
            .iter()
            .filter(|e| e.host == alias)
            .all(|e| self.stanza_points_at(e, key)))
    }

    /// Write a `Host <alias>` stanza for the key unless one already points
    /// at it. Returns whether the config file was changed.
    fn ensure_host_stanza(&self, provider: Provider, alias: &str, key: &Path) -> Result<bool> {
        let existing = self.ssh.get_ssh_config()?;
        if existing
            .iter()
            .any(|e| e.host == alias && self.stanza_points_at(e, key))
        {
            return Ok(false);
        }
        let Some(host_name) = provider.default_host() else {
            tracing::debug!(alias, "custom provider; leaving SSH config to the user");
            return Ok(false);
        };
        let entry = SshConfigEntry::for_identity(alias, host_name, &self.ssh.identity_file_for(key));
        self.ssh.upsert_ssh_config_entry(&entry)?;
        Ok(true)
    }
}

/// Inputs to [`IdentityService::settle_alias`].
struct AliasRequest<'a> {
    /// Profile being updated, if any.
    profile_id: Option<&'a str>,
    explicit: Option<&'a str>,
    provider: Provider,
    label: &'a str,
    key: &'a Path,
}

/// What a `create_profile` call has written so far.
#[derive(Default)]
struct CreateUndo {
    key: Option<PathBuf>,
    stanza: Option<String>,
    token: Option<String>,
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(GitIdError::validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn validate_email(value: &str) -> Result<String> {
    let email = required("email", value)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email)
        }
        _ => Err(GitIdError::validation(format!("Invalid email address: {}", email))),
    }
}

/// Auth method implied by what an imported identity carries.
pub(super) fn auth_method_for(has_ssh: bool) -> AuthMethod {
    if has_ssh { AuthMethod::Ssh } else { AuthMethod::Https }
}

#[cfg(test)]
mod tests {
    use super::super::testing::service;
    use super::*;
    use crate::audit::LogFilter;
    use std::fs;

    fn input(label: &str, email: &str) -> CreateProfileInput {
        CreateProfileInput {
            label: label.into(),
            provider: Provider::Github,
            username: "Ada Lovelace".into(),
            email: email.into(),
            auth_method: AuthMethod::Ssh,
            ssh_key_path: None,
            ssh_host_alias: None,
            generate_new_key: false,
            token: None,
            color: None,
            is_default: false,
        }
    }

    #[tokio::test]
    async fn test_first_profile_is_default_and_later_default_moves() {
        let t = service();
        let first = t.service.create_profile(input("Personal", "ada@gmail.com")).await.unwrap();
        assert!(first.is_default);

        let mut work = input("Work", "ada@acme.io");
        work.is_default = true;
        let second = t.service.create_profile(work).await.unwrap();
        assert!(second.is_default);
        assert!(!t.service.get_profile(&first.id).unwrap().is_default);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let t = service();
        let err = t.service.create_profile(input(" ", "ada@gmail.com")).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
        let err = t.service.create_profile(input("Work", "not-an-email")).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION");

        let mut alias_only = input("Work", "ada@acme.io");
        alias_only.ssh_host_alias = Some("github-work".into());
        assert_eq!(t.service.create_profile(alias_only).await.unwrap_err().code(), "VALIDATION");
        assert!(t.service.get_profiles().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generate_new_key_writes_alias_stanza() {
        let t = service();
        let mut work = input("Acme Work", "ada@acme.io");
        work.generate_new_key = true;
        let profile = t.service.create_profile(work).await.unwrap();

        assert_eq!(profile.ssh_host_alias.as_deref(), Some("github-acme-work"));
        let key = profile.ssh_key_path.clone().unwrap();
        assert!(key.is_file());

        let entries = t.service.get_ssh_config().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].host, "github-acme-work");
        assert_eq!(entries[0].host_name.as_deref(), Some("github.com"));
        assert_eq!(entries[0].identities_only, Some(true));
        let expected = format!(
            "~/{}",
            key.strip_prefix(t.home()).unwrap().display()
        );
        assert_eq!(entries[0].identity_file.as_deref(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_token_lives_in_vault_only() {
        let t = service();
        let mut https = input("Work", "ada@acme.io");
        https.auth_method = AuthMethod::Https;
        https.token = Some("ghp_secret123".into());
        let profile = t.service.create_profile(https).await.unwrap();

        assert_eq!(profile.token_id.as_deref(), Some(profile.id.as_str()));
        assert_eq!(
            t.service.store().get_token(&profile.id).unwrap().as_deref(),
            Some("ghp_secret123")
        );
        let logs = serde_json::to_string(&t.service.get_logs(&LogFilter::default()).unwrap()).unwrap();
        assert!(!logs.contains("ghp_secret123"));

        let updated = t
            .service
            .update_profile(UpdateProfileInput {
                id: profile.id.clone(),
                token: Some(String::new()),
                ..Default::default()
            })
            .unwrap();
        assert!(updated.token_id.is_none());
        assert!(t.service.store().get_token(&profile.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_default_reelects_and_removes_stanza() {
        let t = service();
        let mut first = input("Personal", "ada@gmail.com");
        first.generate_new_key = true;
        let first = t.service.create_profile(first).await.unwrap();
        let second = t.service.create_profile(input("Work", "ada@acme.io")).await.unwrap();
        assert!(first.is_default);

        t.service.delete_profile(&first.id).unwrap();
        assert!(t.service.get_profile(&second.id).unwrap().is_default);
        assert!(t.service.get_ssh_config().unwrap().is_empty());
        assert_eq!(t.service.delete_profile(&first.id).unwrap_err().code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_switch_global_backs_up_and_audits() {
        let t = service();
        fs::write(t.home().join(".gitconfig"), "[user]\n\temail = old@example.com\n").unwrap();
        let profile = t.service.create_profile(input("Work", "ada@acme.io")).await.unwrap();

        let switch = t.service.switch_global(&profile.id).unwrap();
        let backup_id = switch.backup_id.clone().unwrap();
        let current = t.service.get_current_global().unwrap();
        assert_eq!(current.identity.email.as_deref(), Some("ada@acme.io"));
        assert_eq!(current.profile.map(|p| p.id), Some(profile.id.clone()));

        let logs = t.service.get_logs(&LogFilter::default()).unwrap();
        let entry = logs.iter().find(|e| e.action == "global_switch").unwrap();
        assert_eq!(entry.backup_id.as_deref(), Some(backup_id.as_str()));
        assert!(entry.reversible);

        t.service.restore_backup(&backup_id).unwrap();
        let content = fs::read_to_string(t.home().join(".gitconfig")).unwrap();
        assert_eq!(content, "[user]\n\temail = old@example.com\n");
    }

    #[tokio::test]
    async fn test_same_label_gets_its_own_alias() {
        let t = service();
        let mut a = input("Work", "ada@acme.io");
        a.generate_new_key = true;
        let a = t.service.create_profile(a).await.unwrap();
        let mut b = input("Work", "ada@globex.com");
        b.generate_new_key = true;
        let b = t.service.create_profile(b).await.unwrap();

        assert_eq!(a.ssh_host_alias.as_deref(), Some("github-work"));
        assert_eq!(b.ssh_host_alias.as_deref(), Some("github-work-2"));
        assert_ne!(a.ssh_key_path, b.ssh_key_path);

        let entries = t.service.get_ssh_config().unwrap();
        let b_entry = entries.iter().find(|e| e.host == "github-work-2").unwrap();
        assert_eq!(
            t.service.ssh.resolve_identity_file(b_entry.identity_file.as_deref().unwrap()),
            b.ssh_key_path.clone().unwrap()
        );

        t.service.delete_profile(&a.id).unwrap();
        let hosts: Vec<String> = t.service.get_ssh_config().unwrap().into_iter().map(|e| e.host).collect();
        assert_eq!(hosts, vec!["github-work-2".to_string()]);
    }

    #[tokio::test]
    async fn test_explicit_alias_routing_elsewhere_is_rejected_and_key_removed() {
        let t = service();
        let ssh = t.home().join(".ssh");
        fs::write(
            ssh.join("config"),
            "Host github-work\n    HostName github.com\n    IdentityFile ~/.ssh/id_other\n",
        )
        .unwrap();

        let mut work = input("Work", "ada@acme.io");
        work.generate_new_key = true;
        work.ssh_host_alias = Some("github-work".into());
        let err = t.service.create_profile(work).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION");

        assert!(!ssh.join("id_ed25519_work").exists());
        assert!(!ssh.join("id_ed25519_work.pub").exists());
        assert!(t.service.get_profiles().unwrap().is_empty());
        let entries = t.service.get_ssh_config().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].identity_file.as_deref(), Some("~/.ssh/id_other"));
    }

    #[tokio::test]
    async fn test_shared_alias_stanza_survives_deleting_one_profile() {
        let t = service();
        let ssh = t.home().join(".ssh");
        fs::write(ssh.join("id_shared"), "PRIVATE\n").unwrap();
        fs::write(ssh.join("id_shared.pub"), "ssh-ed25519 AAAA ada@acme.io\n").unwrap();

        let mut first = input("Work", "ada@acme.io");
        first.ssh_key_path = Some(ssh.join("id_shared"));
        first.ssh_host_alias = Some("acme".into());
        let first = t.service.create_profile(first).await.unwrap();
        let mut second = input("Work bot", "bot@acme.io");
        second.ssh_key_path = Some(ssh.join("id_shared"));
        second.ssh_host_alias = Some("acme".into());
        let second = t.service.create_profile(second).await.unwrap();
        assert_eq!(t.service.get_ssh_config().unwrap().len(), 1);

        t.service.delete_profile(&first.id).unwrap();
        assert_eq!(t.service.get_ssh_config().unwrap().len(), 1);

        t.service.delete_profile(&second.id).unwrap();
        assert!(t.service.get_ssh_config().unwrap().is_empty());
    }

    #[test]
    fn test_set_default_unknown_is_not_found() {
        let t = service();
        assert_eq!(t.service.set_default_profile("missing").unwrap_err().code(), "NOT_FOUND");
    }
}
