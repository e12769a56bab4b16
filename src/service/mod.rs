//! The orchestration layer every boundary operation goes through.
//!
//! `IdentityService` holds one instance of each component behind its trait
//! and sequences them: validate, back up, write, record, audit. Components
//! never call each other except through here (discovery only reads).

mod discover;
pub mod envelope;
mod profiles;
mod repositories;

pub use discover::ImportResult;
pub use envelope::{Envelope, ErrorBody};
pub use profiles::{CurrentGlobal, GlobalSwitch};
pub use repositories::{BindOptions, ScanOptions, ScanResult};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use serde_json::json;

use crate::audit::{
    AuditCategory, AuditLog, AuditLogEntry, AuditTrail, LogFilter, LogOptions, VerifyReport,
};
use crate::backup::{BackupEngine, BackupInfo, BackupStorage, BackupType};
use crate::config::{Config, DEFAULT_SCAN_DEPTH};
use crate::db::{AppSettings, RecordStorage, RecordStore, SettingsUpdate, init_db};
use crate::discovery::{DiscoveryEngine, IdentityDiscovery};
use crate::error::Result;
use crate::git::{GitCli, GitMutator, GitOperations, GitTransport};
use crate::keychain::{KeyringVault, TokenVault};
use crate::ssh::{
    GenerateKeyOptions, KeyTool, SshConfigEntry, SshKeyInfo, SshKeyManager, SshKeygen, SshManager,
};
use crate::utils::{AppPaths, restrict_dir_permissions};

/// The process-facing seams, swappable for tests and embedders.
pub struct Dependencies {
    pub vault: Arc<dyn TokenVault>,
    pub key_tool: Arc<dyn KeyTool>,
    pub transport: Arc<dyn GitTransport>,
}

/// Every component the service sequences.
#[derive(Clone)]
pub struct Components {
    pub store: Arc<dyn RecordStorage>,
    pub audit: Arc<dyn AuditTrail>,
    pub backups: Arc<dyn BackupStorage>,
    pub ssh: Arc<dyn SshManager>,
    pub git: Arc<dyn GitOperations>,
    pub discovery: Arc<dyn IdentityDiscovery>,
}

impl Components {
    /// The stock components over `paths`, an initialized database and the
    /// process seams. The record store key is loaded from (or created in)
    /// `deps.vault`.
    pub fn assemble(paths: &AppPaths, conn: Connection, deps: Dependencies) -> Result<Self> {
        let store = Arc::new(RecordStore::open(conn, deps.vault)?);
        let audit: Arc<dyn AuditTrail> = Arc::new(AuditLog::new(paths.audit_dir()));
        let backups: Arc<dyn BackupStorage> = Arc::new(BackupEngine::new(paths.backups_dir()));
        let ssh: Arc<dyn SshManager> = Arc::new(SshKeyManager::new(
            paths.home.clone(),
            paths.ssh_dir.clone(),
            deps.key_tool,
            Arc::clone(&backups),
            Arc::clone(&audit),
        ));
        let git: Arc<dyn GitOperations> = Arc::new(GitMutator::new(
            paths.global_git_config.clone(),
            Arc::clone(&backups),
            Arc::clone(&audit),
            deps.transport,
        ));
        let discovery = Arc::new(DiscoveryEngine::new(Arc::clone(&ssh), Arc::clone(&git)));

        Ok(Self {
            store,
            audit,
            backups,
            ssh,
            git,
            discovery,
        })
    }
}

pub struct IdentityService {
    paths: AppPaths,
    store: Arc<dyn RecordStorage>,
    audit: Arc<dyn AuditTrail>,
    backups: Arc<dyn BackupStorage>,
    ssh: Arc<dyn SshManager>,
    git: Arc<dyn GitOperations>,
    discovery: Arc<dyn IdentityDiscovery>,
    scan_depth: usize,
}

impl IdentityService {
    /// Wire the real keychain, `ssh-keygen` and `git` from a loaded config.
    pub fn open(config: &Config) -> Result<Self> {
        let paths = config.app_paths()?;
        let timeout = config.command_timeout();
        let deps = Dependencies {
            vault: Arc::new(KeyringVault::new()),
            key_tool: Arc::new(SshKeygen::new(timeout)),
            transport: Arc::new(GitCli::new(timeout)),
        };
        let conn = init_db(&paths.db_path())?;
        restrict_dir_permissions(&paths.data_dir)?;

        let mut service = Self::with_parts(paths, conn, deps)?;
        service.scan_depth = config.scan_depth();
        Ok(service)
    }

    /// Assemble the stock components over explicit paths and an initialized
    /// database.
    pub fn with_parts(paths: AppPaths, conn: Connection, deps: Dependencies) -> Result<Self> {
        let components = Components::assemble(&paths, conn, deps)?;
        Ok(Self::with_components(paths, components))
    }

    /// Build a service over caller-supplied components.
    pub fn with_components(paths: AppPaths, components: Components) -> Self {
        let Components {
            store,
            audit,
            backups,
            ssh,
            git,
            discovery,
        } = components;
        Self {
            paths,
            store,
            audit,
            backups,
            ssh,
            git,
            discovery,
            scan_depth: DEFAULT_SCAN_DEPTH,
        }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// Direct access to the record store.
    pub fn store(&self) -> &dyn RecordStorage {
        self.store.as_ref()
    }

    // ========================================================================
    // SSH
    // ========================================================================

    pub async fn list_keys(&self) -> Result<Vec<SshKeyInfo>> {
        self.ssh.list_keys().await
    }

    pub async fn generate_key(&self, options: &GenerateKeyOptions) -> Result<SshKeyInfo> {
        self.ssh.generate_key(options).await
    }

    pub fn get_public_key(&self, private: &Path) -> Result<Option<String>> {
        self.ssh.get_public_key(private)
    }

    pub fn get_ssh_config(&self) -> Result<Vec<SshConfigEntry>> {
        self.ssh.get_ssh_config()
    }

    // ========================================================================
    // Backups
    // ========================================================================

    pub fn list_backups(&self, backup_type: Option<BackupType>) -> Result<Vec<BackupInfo>> {
        self.backups.list_backups(backup_type)
    }

    /// Put a backed-up file back in place.
    pub fn restore_backup(&self, id: &str) -> Result<BackupInfo> {
        let info = self.backups.restore_backup(id)?;
        self.audit.log(
            AuditCategory::Backup,
            "restore",
            json!({
                "backupId": info.id,
                "type": info.backup_type.as_str(),
                "reason": info.reason,
            }),
            LogOptions {
                affected_paths: vec![info.original_path.clone()],
                reversible: false,
                backup_id: Some(info.id.clone()),
            },
        )?;
        Ok(info)
    }

    pub fn delete_backup(&self, id: &str) -> Result<BackupInfo> {
        let info = self.backups.delete_backup(id)?;
        self.audit.log(
            AuditCategory::Backup,
            "delete",
            json!({ "backupId": info.id }),
            LogOptions {
                affected_paths: vec![info.backup_path.clone()],
                ..Default::default()
            },
        )?;
        Ok(info)
    }

    pub fn verify_backup(&self, id: &str) -> Result<BackupInfo> {
        self.backups.verify_backup(id)
    }

    /// Delete backups older than `retention_days`, or the configured
    /// retention when not given. Returns how many were removed.
    pub fn cleanup_backups(&self, retention_days: Option<u32>) -> Result<usize> {
        let days = match retention_days {
            Some(days) => days,
            None => self.store.get_settings()?.backup_retention_days,
        };
        let removed = self.backups.cleanup_old_backups(days)?;
        if removed > 0 {
            self.audit.log(
                AuditCategory::Backup,
                "cleanup",
                json!({ "retentionDays": days, "removed": removed }),
                LogOptions::default(),
            )?;
        }
        Ok(removed)
    }

    // ========================================================================
    // Audit
    // ========================================================================

    pub fn get_logs(&self, filter: &LogFilter) -> Result<Vec<AuditLogEntry>> {
        self.audit.get_logs(filter)
    }

    pub fn export_logs(&self, path: &Path, filter: &LogFilter) -> Result<usize> {
        self.audit.export_logs(path, filter)
    }

    pub fn verify_logs(&self, filter: &LogFilter) -> Result<VerifyReport> {
        self.audit.verify_logs(filter)
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub fn get_settings(&self) -> Result<AppSettings> {
        self.store.get_settings()
    }

    pub fn update_settings(&self, update: SettingsUpdate) -> Result<AppSettings> {
        let changed = serde_json::to_value(&update)?;
        let settings = self.store.update_settings(update)?;
        self.audit.log(
            AuditCategory::Settings,
            "update",
            strip_nulls(changed),
            LogOptions::default(),
        )?;
        Ok(settings)
    }

    /// Scan roots to use when a caller gives none.
    fn default_scan_roots(&self) -> Result<Vec<PathBuf>> {
        Ok(self.store.get_settings()?.default_scan_directories)
    }
}

/// Drop `null` members so audit details only name what changed.
fn strip_nulls(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            serde_json::Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect())
        }
        other => other,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::service;
    use super::*;
    use crate::audit::AuditCategory;

    #[test]
    fn test_update_settings_is_audited_with_changed_fields_only() {
        let t = service();
        let settings = t
            .service
            .update_settings(SettingsUpdate {
                backup_retention_days: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(settings.backup_retention_days, 3);

        let logs = t.service.get_logs(&LogFilter::default()).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].category, AuditCategory::Settings);
        assert_eq!(logs[0].details, json!({ "backupRetentionDays": 3 }));
    }

    #[test]
    fn test_restore_unknown_backup_is_not_found() {
        let t = service();
        assert_eq!(t.service.restore_backup("nope").unwrap_err().code(), "NOT_FOUND");
    }

    #[test]
    fn test_cleanup_with_nothing_to_remove_writes_no_audit() {
        let t = service();
        assert_eq!(t.service.cleanup_backups(None).unwrap(), 0);
        assert!(t.service.get_logs(&LogFilter::default()).unwrap().is_empty());
    }
}
