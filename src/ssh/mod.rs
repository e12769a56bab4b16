//! SSH key and `~/.ssh/config` management.

pub mod config;
pub mod keys;

pub use config::SshConfigEntry;
pub use keys::{GenerateKeyOptions, KeyTool, KeyType, SshKeyInfo, SshKeygen, slugify};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::audit::{AuditCategory, AuditTrail, LogOptions};
use crate::backup::{BackupInfo, BackupStorage, BackupType};
use crate::error::{GitIdError, Result};
use crate::utils::fs::{ensure_dir, read_string_optional, write_atomic};
use crate::utils::{
    collapse_home, expand_with_home, restrict_dir_permissions, restrict_file_permissions,
};

/// SSH keys and `~/.ssh/config` stanzas of one home directory.
#[async_trait]
pub trait SshManager: Send + Sync {
    /// Key path as it should appear in `IdentityFile` (`~/...` when under home).
    fn identity_file_for(&self, key: &Path) -> String;

    /// Inverse of [`identity_file_for`](Self::identity_file_for).
    fn resolve_identity_file(&self, value: &str) -> PathBuf;

    /// Key pairs in the SSH directory.
    async fn list_keys(&self) -> Result<Vec<SshKeyInfo>>;

    async fn generate_key(&self, options: &GenerateKeyOptions) -> Result<SshKeyInfo>;

    fn get_public_key(&self, private: &Path) -> Result<Option<String>>;

    fn get_ssh_config(&self) -> Result<Vec<SshConfigEntry>>;

    /// Replace or append the stanza for `entry.host`, backing up first.
    fn upsert_ssh_config_entry(&self, entry: &SshConfigEntry) -> Result<Option<BackupInfo>>;

    /// Remove the stanza for `alias`. False when there was none.
    fn remove_ssh_config_entry(&self, alias: &str) -> Result<bool>;
}

/// Reads keys and edits the SSH config of one home directory.
pub struct SshKeyManager {
    home: PathBuf,
    ssh_dir: PathBuf,
    tool: Arc<dyn KeyTool>,
    backups: Arc<dyn BackupStorage>,
    audit: Arc<dyn AuditTrail>,
}

impl SshKeyManager {
    pub fn new(
        home: impl Into<PathBuf>,
        ssh_dir: impl Into<PathBuf>,
        tool: Arc<dyn KeyTool>,
        backups: Arc<dyn BackupStorage>,
        audit: Arc<dyn AuditTrail>,
    ) -> Self {
        Self {
            home: home.into(),
            ssh_dir: ssh_dir.into(),
            tool,
            backups,
            audit,
        }
    }

    fn config_path(&self) -> PathBuf {
        self.ssh_dir.join("config")
    }

    fn ensure_ssh_dir(&self) -> Result<()> {
        if !self.ssh_dir.exists() {
            ensure_dir(&self.ssh_dir)?;
            restrict_dir_permissions(&self.ssh_dir)?;
        }
        Ok(())
    }

    fn write_config(&self, path: &Path, content: &str) -> Result<()> {
        self.ensure_ssh_dir()?;
        let existed = path.exists();
        write_atomic(path, content.as_bytes())?;
        if !existed {
            restrict_file_permissions(path)?;
        }
        Ok(())
    }
}

#[async_trait]
impl SshManager for SshKeyManager {
    /// Key path as it should appear in `IdentityFile` (`~/...` when under home).
    fn identity_file_for(&self, key: &Path) -> String {
        collapse_home(key, &self.home)
    }

    /// Inverse of [`identity_file_for`](Self::identity_file_for).
    fn resolve_identity_file(&self, value: &str) -> PathBuf {
        expand_with_home(value, &self.home)
    }

    async fn list_keys(&self) -> Result<Vec<SshKeyInfo>> {
        keys::list_keys(&self.ssh_dir, self.tool.as_ref()).await
    }

    /// Mint a new key pair at the next free `id_<type>_<label>` path.
    async fn generate_key(&self, options: &GenerateKeyOptions) -> Result<SshKeyInfo> {
        let email = options.email.trim();
        if email.is_empty() {
            return Err(GitIdError::validation("An email is required to generate a key"));
        }

        self.ensure_ssh_dir()?;
        let path = keys::next_key_path(&self.ssh_dir, options.key_type, &options.label);
        self.tool.generate(&path, options.key_type, email).await?;

        let public = keys::public_key_path(&path);
        if !path.is_file() || !public.is_file() {
            return Err(GitIdError::command(
                "ssh-keygen",
                format!("no key pair was written at {}", path.display()),
            ));
        }
        restrict_file_permissions(&path)?;

        let info = keys::key_info(&path, self.tool.as_ref())
            .await?
            .ok_or_else(|| GitIdError::command("ssh-keygen", "generated public key is unreadable"))?;

        self.audit.log(
            AuditCategory::Ssh,
            "generate_key",
            json!({
                "name": info.name,
                "keyType": info.key_type,
                "comment": email,
                "label": options.label,
            }),
            LogOptions {
                affected_paths: vec![path.clone(), public],
                ..Default::default()
            },
        )?;

        tracing::info!(path = %path.display(), "ssh key generated");
        Ok(info)
    }

    fn get_public_key(&self, private: &Path) -> Result<Option<String>> {
        keys::get_public_key(private)
    }

    /// All `Host` stanzas of the SSH config (empty when the file is absent).
    fn get_ssh_config(&self) -> Result<Vec<SshConfigEntry>> {
        Ok(read_string_optional(&self.config_path())?
            .map(|content| config::parse(&content))
            .unwrap_or_default())
    }

    /// Replace or append the stanza for `entry.host`. Returns the backup
    /// taken before the write (none when the file did not exist).
    fn upsert_ssh_config_entry(&self, entry: &SshConfigEntry) -> Result<Option<BackupInfo>> {
        let host = entry.host.trim();
        if host.is_empty() {
            return Err(GitIdError::validation("SSH config entry needs a Host alias"));
        }

        let path = self.config_path();
        let current = read_string_optional(&path)?.unwrap_or_default();
        let updated = config::upsert(&current, entry);

        let backup = self.backups.create_backup(
            &path,
            BackupType::SshConfig,
            &format!("Update Host {}", host),
        )?;
        self.write_config(&path, &updated)?;

        self.audit.log(
            AuditCategory::Ssh,
            "config_upsert",
            json!({
                "host": host,
                "hostName": entry.host_name,
                "identityFile": entry.identity_file,
            }),
            LogOptions::for_write(&path, backup.as_ref().map(|b| b.id.clone())),
        )?;
        Ok(backup)
    }

    /// Remove the stanza whose `Host` value is exactly `alias`. Returns
    /// false (and writes nothing) when there is no such stanza.
    fn remove_ssh_config_entry(&self, alias: &str) -> Result<bool> {
        let path = self.config_path();
        let Some(current) = read_string_optional(&path)? else {
            return Ok(false);
        };
        let Some(updated) = config::remove(&current, alias) else {
            return Ok(false);
        };

        let backup = self.backups.create_backup(
            &path,
            BackupType::SshConfig,
            &format!("Remove Host {}", alias),
        )?;
        self.write_config(&path, &updated)?;

        self.audit.log(
            AuditCategory::Ssh,
            "config_remove",
            json!({ "host": alias }),
            LogOptions::for_write(&path, backup.map(|b| b.id)),
        )?;
        Ok(true)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeKeyTool;
    use super::*;
    use crate::audit::{AuditLog, LogFilter};
    use crate::backup::BackupEngine;

    struct Fixture {
        _dir: tempfile::TempDir,
        home: PathBuf,
        manager: SshKeyManager,
        backups: Arc<BackupEngine>,
        audit: Arc<AuditLog>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        std::fs::create_dir_all(&home).unwrap();
        let data = dir.path().join("data");
        let backups = Arc::new(BackupEngine::new(data.join("backups")));
        let audit = Arc::new(AuditLog::new(data.join("audit")));
        let manager = SshKeyManager::new(
            &home,
            home.join(".ssh"),
            Arc::new(FakeKeyTool),
            backups.clone(),
            audit.clone(),
        );
        Fixture {
            _dir: dir,
            home,
            manager,
            backups,
            audit,
        }
    }

    #[tokio::test]
    async fn test_generate_and_list_keys() {
        let fx = fixture();
        let options = GenerateKeyOptions {
            email: "ada@acme.io".into(),
            label: "Work".into(),
            key_type: KeyType::Ed25519,
        };

        let first = fx.manager.generate_key(&options).await.unwrap();
        let second = fx.manager.generate_key(&options).await.unwrap();
        assert_eq!(first.name, "id_ed25519_work");
        assert_eq!(second.name, "id_ed25519_work_2");
        assert_eq!(first.comment.as_deref(), Some("ada@acme.io"));
        assert!(first.fingerprint.as_deref().unwrap().starts_with("SHA256:"));

        // An orphan public key is not a pair.
        std::fs::write(fx.home.join(".ssh/orphan.pub"), "ssh-ed25519 AAAA x\n").unwrap();
        let keys = fx.manager.list_keys().await.unwrap();
        let names: Vec<_> = keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["id_ed25519_work", "id_ed25519_work_2"]);

        let logs = fx.audit.get_logs(&LogFilter::default()).unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|e| e.action == "generate_key"));
    }

    #[tokio::test]
    async fn test_generate_requires_email() {
        let fx = fixture();
        let err = fx
            .manager
            .generate_key(&GenerateKeyOptions {
                email: " ".into(),
                label: "x".into(),
                key_type: KeyType::Ed25519,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn test_upsert_backs_up_existing_config_and_audits() {
        let fx = fixture();
        let ssh = fx.home.join(".ssh");
        std::fs::create_dir_all(&ssh).unwrap();
        let original = "Host github.com\n    User git\n";
        std::fs::write(ssh.join("config"), original).unwrap();

        let key = ssh.join("id_ed25519_work");
        let entry = SshConfigEntry::for_identity(
            "github-work",
            "github.com",
            &fx.manager.identity_file_for(&key),
        );
        let backup = fx.manager.upsert_ssh_config_entry(&entry).unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(&backup.backup_path).unwrap(), original);

        let entries = fx.manager.get_ssh_config().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].identity_file.as_deref(), Some("~/.ssh/id_ed25519_work"));

        let logs = fx.audit.get_logs(&LogFilter::default()).unwrap();
        assert_eq!(logs[0].backup_id.as_deref(), Some(backup.id.as_str()));
        assert!(logs[0].reversible);

        assert!(fx.manager.remove_ssh_config_entry("github-work").unwrap());
        assert_eq!(std::fs::read_to_string(ssh.join("config")).unwrap(), original);
        assert!(!fx.manager.remove_ssh_config_entry("github-work").unwrap());
        assert_eq!(fx.backups.list_backups(None).unwrap().len(), 2);
    }

    #[test]
    fn test_first_write_creates_config_without_backup() {
        let fx = fixture();
        let entry = SshConfigEntry::for_identity("gitlab-me", "gitlab.com", "~/.ssh/id");
        assert!(fx.manager.upsert_ssh_config_entry(&entry).unwrap().is_none());
        assert_eq!(fx.manager.get_ssh_config().unwrap()[0].host, "gitlab-me");
        assert!(fx.backups.list_backups(None).unwrap().is_empty());
    }
}
