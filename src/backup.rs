//! Snapshot-before-write backups of the files gitid edits.
//!
//! Each backup is a byte-exact copy of the original in the backups
//! directory plus a record in `registry.json`. The registry is re-read on
//! every call and rewritten atomically after every change; all
//! read-modify-write cycles hold one mutex.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GitIdError, Result};
use crate::utils::fs::{ensure_dir, read_optional, write_atomic};
use crate::utils::{restrict_dir_permissions, restrict_file_permissions, sha256_hex};

const REGISTRY_FILE: &str = "registry.json";
const REGISTRY_VERSION: u32 = 1;

/// Kind of file a backup protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    SshConfig,
    GitConfigGlobal,
    GitConfigLocal,
    SshKey,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::SshConfig => "ssh_config",
            BackupType::GitConfigGlobal => "git_config_global",
            BackupType::GitConfigLocal => "git_config_local",
            BackupType::SshKey => "ssh_key",
        }
    }
}

impl std::str::FromStr for BackupType {
    type Err = GitIdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "ssh_config" => Ok(BackupType::SshConfig),
            "git_config_global" => Ok(BackupType::GitConfigGlobal),
            "git_config_local" => Ok(BackupType::GitConfigLocal),
            "ssh_key" => Ok(BackupType::SshKey),
            other => Err(GitIdError::validation(format!(
                "Unknown backup type '{}'",
                other
            ))),
        }
    }
}

/// Registry record for one backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    /// SHA-256 (hex) of the original content at snapshot time.
    pub hash: String,
    pub reason: String,
    #[serde(default)]
    pub restored: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    version: u32,
    backups: Vec<BackupInfo>,
}

/// Snapshot, restore and prune copies of the files gitid edits.
pub trait BackupStorage: Send + Sync {
    /// Snapshot `path` before it is modified. `None` when the file does not
    /// exist yet.
    fn create_backup(
        &self,
        path: &Path,
        backup_type: BackupType,
        reason: &str,
    ) -> Result<Option<BackupInfo>>;

    fn restore_backup(&self, id: &str) -> Result<BackupInfo>;

    fn list_backups(&self, backup_type: Option<BackupType>) -> Result<Vec<BackupInfo>>;

    fn get_backup(&self, id: &str) -> Result<Option<BackupInfo>>;

    fn delete_backup(&self, id: &str) -> Result<BackupInfo>;

    fn cleanup_old_backups(&self, retention_days: u32) -> Result<usize>;

    fn verify_backup(&self, id: &str) -> Result<BackupInfo>;
}

/// Creates, restores and prunes backups under one directory.
pub struct BackupEngine {
    dir: PathBuf,
    registry_lock: Mutex<()>,
}

impl BackupEngine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            registry_lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.registry_lock
            .lock()
            .map_err(|_| GitIdError::from("backup registry lock poisoned"))
    }

    fn registry_path(&self) -> PathBuf {
        self.dir.join(REGISTRY_FILE)
    }

    fn load_registry(&self) -> Result<Registry> {
        match read_optional(&self.registry_path())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Registry {
                version: REGISTRY_VERSION,
                backups: Vec::new(),
            }),
        }
    }

    fn save_registry(&self, registry: &mut Registry) -> Result<()> {
        registry.version = REGISTRY_VERSION;
        let path = self.registry_path();
        write_atomic(&path, &serde_json::to_vec_pretty(registry)?)?;
        restrict_file_permissions(&path)
    }
}

impl BackupStorage for BackupEngine {
    /// Snapshot `path` before it is modified.
    ///
    /// Returns `None` when the file does not exist yet; creating a config
    /// for the first time has nothing to protect.
    fn create_backup(
        &self,
        path: &Path,
        backup_type: BackupType,
        reason: &str,
    ) -> Result<Option<BackupInfo>> {
        let Some(content) = read_optional(path)? else {
            tracing::debug!(path = %path.display(), "nothing to back up");
            return Ok(None);
        };

        let id = uuid::Uuid::new_v4().to_string();
        let timestamp = Utc::now();
        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let file_name = format!(
            "{}_{}_{}.bak",
            sanitize_filename(&base),
            timestamp.format("%Y%m%dT%H%M%S%3fZ"),
            &id[..8]
        );
        let backup_path = self.dir.join(file_name);

        let _guard = self.lock()?;
        ensure_dir(&self.dir)?;
        restrict_dir_permissions(&self.dir)?;
        fs::write(&backup_path, &content).map_err(|e| GitIdError::io_at(&backup_path, e))?;
        restrict_file_permissions(&backup_path)?;

        let info = BackupInfo {
            id,
            timestamp,
            backup_type,
            original_path: path.to_path_buf(),
            backup_path,
            hash: sha256_hex(&content),
            reason: reason.to_string(),
            restored: false,
        };

        let mut registry = self.load_registry()?;
        registry.backups.push(info.clone());
        self.save_registry(&mut registry)?;

        tracing::info!(id = %info.id, path = %path.display(), kind = backup_type.as_str(), "backup created");
        Ok(Some(info))
    }

    /// Write a backup's content back over its original path.
    ///
    /// A hash mismatch is logged but does not block the restore: the backup
    /// is still the best recovery point available.
    fn restore_backup(&self, id: &str) -> Result<BackupInfo> {
        let _guard = self.lock()?;
        let mut registry = self.load_registry()?;
        let info = registry
            .backups
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| GitIdError::not_found(format!("Backup not found: {}", id)))?;

        let content =
            fs::read(&info.backup_path).map_err(|e| GitIdError::io_at(&info.backup_path, e))?;

        let actual = sha256_hex(&content);
        if actual != info.hash {
            tracing::warn!(
                id,
                expected = %info.hash,
                actual = %actual,
                "backup content does not match recorded hash; restoring anyway"
            );
        }

        write_atomic(&info.original_path, &content)?;
        info.restored = true;
        let restored = info.clone();
        self.save_registry(&mut registry)?;

        tracing::info!(id, path = %restored.original_path.display(), "backup restored");
        Ok(restored)
    }

    /// Backups, newest first, optionally of one type.
    fn list_backups(&self, backup_type: Option<BackupType>) -> Result<Vec<BackupInfo>> {
        let _guard = self.lock()?;
        let mut backups: Vec<BackupInfo> = self
            .load_registry()?
            .backups
            .into_iter()
            .filter(|b| backup_type.is_none_or(|t| t == b.backup_type))
            .collect();
        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(backups)
    }

    fn get_backup(&self, id: &str) -> Result<Option<BackupInfo>> {
        let _guard = self.lock()?;
        Ok(self.load_registry()?.backups.into_iter().find(|b| b.id == id))
    }

    /// Remove a backup body and its registry record.
    fn delete_backup(&self, id: &str) -> Result<BackupInfo> {
        let _guard = self.lock()?;
        let mut registry = self.load_registry()?;
        let idx = registry
            .backups
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| GitIdError::not_found(format!("Backup not found: {}", id)))?;

        let info = registry.backups.remove(idx);
        remove_body(&info.backup_path)?;
        self.save_registry(&mut registry)?;
        Ok(info)
    }

    /// Delete never-restored backups older than `retention_days`. Restored
    /// backups are kept as a record of what happened. Returns the count
    /// removed.
    fn cleanup_old_backups(&self, retention_days: u32) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let _guard = self.lock()?;
        let mut registry = self.load_registry()?;

        let (expired, kept): (Vec<_>, Vec<_>) = registry
            .backups
            .into_iter()
            .partition(|b| b.timestamp < cutoff && !b.restored);

        for info in &expired {
            remove_body(&info.backup_path)?;
        }
        registry.backups = kept;
        if !expired.is_empty() {
            self.save_registry(&mut registry)?;
            tracing::info!(removed = expired.len(), retention_days, "old backups cleaned up");
        }
        Ok(expired.len())
    }

    /// Check that a backup body still hashes to its recorded value.
    fn verify_backup(&self, id: &str) -> Result<BackupInfo> {
        let info = self
            .get_backup(id)?
            .ok_or_else(|| GitIdError::not_found(format!("Backup not found: {}", id)))?;
        let content =
            fs::read(&info.backup_path).map_err(|e| GitIdError::io_at(&info.backup_path, e))?;
        let actual = sha256_hex(&content);
        if actual != info.hash {
            return Err(GitIdError::IntegrityMismatch(format!(
                "backup {} hashes to {} but {} was recorded",
                id, actual, info.hash
            )));
        }
        Ok(info)
    }
}

fn remove_body(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GitIdError::io_at(path, e)),
    }
}

/// Keep backup file names to a portable character set.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(dir: &Path) -> BackupEngine {
        BackupEngine::new(dir.join("backups"))
    }

    #[test]
    fn test_missing_file_is_not_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let result = engine
            .create_backup(&dir.path().join("nope"), BackupType::SshConfig, "test")
            .unwrap();
        assert!(result.is_none());
        assert!(engine.list_backups(None).unwrap().is_empty());
    }

    #[test]
    fn test_backup_write_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let target = dir.path().join(".gitconfig");
        let original = b"[user]\n\temail = old@acme.io\n\xff raw bytes\n".to_vec();
        fs::write(&target, &original).unwrap();

        let info = engine
            .create_backup(&target, BackupType::GitConfigGlobal, "switch")
            .unwrap()
            .unwrap();
        assert_eq!(info.hash, sha256_hex(&original));
        assert!(info.backup_path.starts_with(dir.path().join("backups")));
        let name = info.backup_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".gitconfig_"));
        assert!(name.ends_with(&format!("_{}.bak", &info.id[..8])));

        fs::write(&target, b"[user]\n\temail = new@acme.io\n").unwrap();

        let restored = engine.restore_backup(&info.id).unwrap();
        assert!(restored.restored);
        assert_eq!(fs::read(&target).unwrap(), original);
        assert!(engine.get_backup(&info.id).unwrap().unwrap().restored);
    }

    #[test]
    fn test_repeated_backups_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let target = dir.path().join("config");
        fs::write(&target, "a").unwrap();

        let first = engine.create_backup(&target, BackupType::SshConfig, "1").unwrap().unwrap();
        let second = engine.create_backup(&target, BackupType::SshConfig, "2").unwrap().unwrap();
        assert_ne!(first.backup_path, second.backup_path);
        assert_eq!(engine.list_backups(None).unwrap().len(), 2);
    }

    #[test]
    fn test_restore_errors() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        assert_eq!(engine.restore_backup("unknown").unwrap_err().code(), "NOT_FOUND");

        let target = dir.path().join("config");
        fs::write(&target, "a").unwrap();
        let info = engine.create_backup(&target, BackupType::SshConfig, "t").unwrap().unwrap();
        fs::remove_file(&info.backup_path).unwrap();

        let err = engine.restore_backup(&info.id).unwrap_err();
        assert_eq!(err.code(), "IO_FAILURE");
        assert!(!engine.get_backup(&info.id).unwrap().unwrap().restored);
    }

    #[test]
    fn test_drifted_backup_still_restores_but_fails_verify() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let target = dir.path().join("config");
        fs::write(&target, "original").unwrap();
        let info = engine.create_backup(&target, BackupType::SshConfig, "t").unwrap().unwrap();
        assert!(engine.verify_backup(&info.id).is_ok());

        fs::write(&info.backup_path, "drifted").unwrap();
        assert_eq!(
            engine.verify_backup(&info.id).unwrap_err().code(),
            "INTEGRITY_MISMATCH"
        );

        engine.restore_backup(&info.id).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "drifted");
    }

    #[test]
    fn test_cleanup_removes_only_old_unrestored_backups() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let target = dir.path().join("config");
        fs::write(&target, "x").unwrap();

        let old = engine.create_backup(&target, BackupType::SshConfig, "old").unwrap().unwrap();
        let old_restored = engine.create_backup(&target, BackupType::SshConfig, "kept").unwrap().unwrap();
        let fresh = engine.create_backup(&target, BackupType::SshConfig, "fresh").unwrap().unwrap();
        engine.restore_backup(&old_restored.id).unwrap();

        // Age two of them by 40 days directly in the registry.
        {
            let mut registry = engine.load_registry().unwrap();
            for b in registry.backups.iter_mut() {
                if b.id == old.id || b.id == old_restored.id {
                    b.timestamp = Utc::now() - Duration::days(40);
                }
            }
            engine.save_registry(&mut registry).unwrap();
        }

        assert_eq!(engine.cleanup_old_backups(30).unwrap(), 1);
        let remaining: Vec<String> = engine
            .list_backups(None)
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&old_restored.id));
        assert!(remaining.contains(&fresh.id));
        assert!(!old.backup_path.exists());
    }

    #[test]
    fn test_registry_is_read_through() {
        let dir = tempfile::tempdir().unwrap();
        let writer = engine(dir.path());
        let reader = engine(dir.path());
        let target = dir.path().join("config");
        fs::write(&target, "x").unwrap();

        let info = writer.create_backup(&target, BackupType::GitConfigLocal, "t").unwrap().unwrap();
        assert_eq!(reader.get_backup(&info.id).unwrap(), Some(info.clone()));

        reader.delete_backup(&info.id).unwrap();
        assert!(writer.list_backups(None).unwrap().is_empty());
        assert!(!info.backup_path.exists());
    }

    #[test]
    fn test_list_filters_by_type() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let target = dir.path().join("config");
        fs::write(&target, "x").unwrap();
        engine.create_backup(&target, BackupType::SshConfig, "a").unwrap();
        engine.create_backup(&target, BackupType::GitConfigLocal, "b").unwrap();

        let ssh = engine.list_backups(Some(BackupType::SshConfig)).unwrap();
        assert_eq!(ssh.len(), 1);
        assert_eq!(ssh[0].reason, "a");
    }
}
