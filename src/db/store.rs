//! Record store for profiles, repositories and settings.
//!
//! One SQLite connection sits behind a mutex; that mutex is the mutual
//! exclusion section for every read-modify-write (default election, settings
//! updates). Default-flag changes run inside a single transaction so no
//! reader ever observes two defaults, or none while profiles exist.
//!
//! Profile identity fields and the settings document are sealed with the
//! [`StoreCipher`] before they are written. Ids, default flags, timestamps
//! and repository paths stay in clear because queries order and join on them.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction, params};

use super::cipher::StoreCipher;
use super::models::{AppSettings, Profile, RepositoryRecord, SettingsUpdate};
use crate::error::{GitIdError, Result};
use crate::keychain::TokenVault;

/// Persistence for profiles, remembered repositories, settings and tokens.
pub trait RecordStorage: Send + Sync {
    /// List all profiles, oldest first.
    fn get_profiles(&self) -> Result<Vec<Profile>>;

    fn get_profile(&self, id: &str) -> Result<Option<Profile>>;

    /// Insert or update a profile and return it as stored, with the
    /// single-default invariant restored.
    fn save_profile(&self, profile: &Profile) -> Result<Profile>;

    /// Delete a profile, re-electing a default when needed. Returns false
    /// when no profile had that id.
    fn delete_profile(&self, id: &str) -> Result<bool>;

    fn set_default_profile(&self, id: &str) -> Result<()>;

    /// Remembered repositories, most recently accessed first.
    fn get_repositories(&self) -> Result<Vec<RepositoryRecord>>;

    fn get_repository(&self, path: &Path) -> Result<Option<RepositoryRecord>>;

    fn save_repository(&self, record: &RepositoryRecord) -> Result<()>;

    /// Forget a repository. Returns false when it was not stored.
    fn delete_repository(&self, path: &Path) -> Result<bool>;

    fn get_settings(&self) -> Result<AppSettings>;

    fn update_settings(&self, update: SettingsUpdate) -> Result<AppSettings>;

    fn store_token(&self, id: &str, secret: &str) -> Result<()>;

    fn get_token(&self, id: &str) -> Result<Option<String>>;

    fn delete_token(&self, id: &str) -> Result<()>;
}

/// SQLite-backed [`RecordStorage`] with tokens in the OS vault.
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
    vault: Arc<dyn TokenVault>,
    cipher: StoreCipher,
}

impl RecordStore {
    /// Create a store over an initialized connection, a token vault and the
    /// cipher for sealed columns.
    pub fn new(conn: Connection, vault: Arc<dyn TokenVault>, cipher: StoreCipher) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            vault,
            cipher,
        }
    }

    /// Create a store whose cipher key lives in `vault`.
    pub fn open(conn: Connection, vault: Arc<dyn TokenVault>) -> Result<Self> {
        let cipher = StoreCipher::from_vault(vault.as_ref())?;
        Ok(Self::new(conn, vault, cipher))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GitIdError::from("record store lock poisoned"))
    }

    fn query_profile(&self, conn: &Connection, id: &str) -> rusqlite::Result<Option<Profile>> {
        conn.query_row(
            &format!("SELECT {} FROM profiles WHERE id = ?", PROFILE_COLUMNS),
            [id],
            |row| row_to_profile(row, &self.cipher),
        )
        .optional()
    }

    fn read_settings(&self, conn: &Connection) -> Result<AppSettings> {
        let data: Option<String> = conn
            .query_row("SELECT data FROM settings WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        match data {
            Some(sealed) => Ok(serde_json::from_str(&self.cipher.open(&sealed)?)?),
            None => Ok(AppSettings::default()),
        }
    }
}

impl RecordStorage for RecordStore {
    // ========================================================================
    // Profile operations
    // ========================================================================

    fn get_profiles(&self) -> Result<Vec<Profile>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM profiles ORDER BY created_at, id",
            PROFILE_COLUMNS
        ))?;
        let profiles = stmt
            .query_map([], |row| row_to_profile(row, &self.cipher))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(profiles)
    }

    fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        let conn = self.conn()?;
        Ok(self.query_profile(&conn, id)?)
    }

    /// A profile saved as default un-defaults every other profile in the same
    /// transaction. If no default remains afterwards, the oldest other profile
    /// is elected (or this one, when it is the only profile).
    fn save_profile(&self, profile: &Profile) -> Result<Profile> {
        let label = self.cipher.seal(&profile.label)?;
        let username = self.cipher.seal(&profile.username)?;
        let email = self.cipher.seal(&profile.email)?;
        let key_path = profile.ssh_key_path.as_deref().map(path_to_string);
        let key_path = self.cipher.seal_opt(key_path.as_deref())?;
        let alias = self.cipher.seal_opt(profile.ssh_host_alias.as_deref())?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO profiles (id, label, provider, username, email, auth_method,
                                  ssh_key_path, ssh_host_alias, token_id, is_default,
                                  color, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                label = excluded.label,
                provider = excluded.provider,
                username = excluded.username,
                email = excluded.email,
                auth_method = excluded.auth_method,
                ssh_key_path = excluded.ssh_key_path,
                ssh_host_alias = excluded.ssh_host_alias,
                token_id = excluded.token_id,
                is_default = excluded.is_default,
                color = excluded.color,
                updated_at = excluded.updated_at
            "#,
            params![
                profile.id,
                label,
                profile.provider.as_str(),
                username,
                email,
                profile.auth_method.as_str(),
                key_path,
                alias,
                profile.token_id,
                profile.is_default,
                profile.color,
                format_ts(&profile.created_at),
                format_ts(&profile.updated_at),
            ],
        )?;

        if profile.is_default {
            normalize_default(&tx, Some(&profile.id), None)?;
        } else {
            normalize_default(&tx, None, Some(&profile.id))?;
        }

        let stored = self
            .query_profile(&tx, &profile.id)?
            .ok_or_else(|| GitIdError::from("profile vanished during save"))?;
        tx.commit()?;
        Ok(stored)
    }

    fn delete_profile(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute("DELETE FROM profiles WHERE id = ?", [id])?;
        normalize_default(&tx, None, None)?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Make `id` the only default profile, in one pass over all rows.
    fn set_default_profile(&self, id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM profiles WHERE id = ?)",
            [id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(GitIdError::not_found(format!("Profile not found: {}", id)));
        }
        normalize_default(&tx, Some(id), None)?;
        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // Repository operations
    // ========================================================================

    fn get_repositories(&self) -> Result<Vec<RepositoryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT path, name, bound_profile_id, last_accessed FROM repositories ORDER BY last_accessed DESC",
        )?;
        let records = stmt
            .query_map([], row_to_repository)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn get_repository(&self, path: &Path) -> Result<Option<RepositoryRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT path, name, bound_profile_id, last_accessed FROM repositories WHERE path = ?",
                [path_to_string(path)],
                row_to_repository,
            )
            .optional()?;
        Ok(record)
    }

    /// Insert or update a repository record (keyed by path).
    fn save_repository(&self, record: &RepositoryRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO repositories (path, name, bound_profile_id, last_accessed)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(path) DO UPDATE SET
                name = excluded.name,
                bound_profile_id = excluded.bound_profile_id,
                last_accessed = excluded.last_accessed
            "#,
            params![
                path_to_string(&record.path),
                record.name,
                record.bound_profile_id,
                format_ts(&record.last_accessed),
            ],
        )?;
        Ok(())
    }

    fn delete_repository(&self, path: &Path) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM repositories WHERE path = ?",
            [path_to_string(path)],
        )?;
        Ok(deleted > 0)
    }

    // ========================================================================
    // Settings operations
    // ========================================================================

    /// Read settings, falling back to defaults on a fresh install.
    fn get_settings(&self) -> Result<AppSettings> {
        let conn = self.conn()?;
        self.read_settings(&conn)
    }

    /// Apply a partial update and return the resulting settings.
    fn update_settings(&self, update: SettingsUpdate) -> Result<AppSettings> {
        let conn = self.conn()?;
        let mut settings = self.read_settings(&conn)?;
        settings.apply(update);
        let sealed = self.cipher.seal(&serde_json::to_string(&settings)?)?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (id, data) VALUES (1, ?)",
            [sealed],
        )?;
        Ok(settings)
    }

    // ========================================================================
    // Token operations (OS keychain)
    // ========================================================================

    fn store_token(&self, id: &str, secret: &str) -> Result<()> {
        self.vault.store(id, secret)
    }

    fn get_token(&self, id: &str) -> Result<Option<String>> {
        self.vault.get(id)
    }

    fn delete_token(&self, id: &str) -> Result<()> {
        self.vault.delete(id)
    }
}

impl Clone for RecordStore {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            vault: Arc::clone(&self.vault),
            cipher: self.cipher.clone(),
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

const PROFILE_COLUMNS: &str = "id, label, provider, username, email, auth_method, ssh_key_path, \
     ssh_host_alias, token_id, is_default, color, created_at, updated_at";

/// Restore the single-default invariant inside an open transaction.
///
/// `preferred` forces that profile to be the default. Otherwise an existing
/// unique default is kept; with none, the oldest profile other than `avoid`
/// is elected, falling back to `avoid` itself when it is the only profile.
fn normalize_default(
    tx: &Transaction<'_>,
    preferred: Option<&str>,
    avoid: Option<&str>,
) -> rusqlite::Result<()> {
    if let Some(id) = preferred {
        tx.execute("UPDATE profiles SET is_default = (id = ?1)", [id])?;
        return Ok(());
    }

    let defaults: i64 = tx.query_row(
        "SELECT COUNT(*) FROM profiles WHERE is_default = 1",
        [],
        |row| row.get(0),
    )?;
    if defaults == 1 {
        return Ok(());
    }

    let elected: Option<String> = if defaults > 1 {
        tx.query_row(
            "SELECT id FROM profiles WHERE is_default = 1 ORDER BY created_at, id LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?
    } else {
        let other: Option<String> = tx
            .query_row(
                "SELECT id FROM profiles WHERE (?1 IS NULL OR id != ?1) ORDER BY created_at, id LIMIT 1",
                [avoid],
                |row| row.get(0),
            )
            .optional()?;
        other.or_else(|| avoid.map(str::to_string))
    };

    if let Some(id) = elected {
        tx.execute("UPDATE profiles SET is_default = (id = ?1)", [id])?;
    }
    Ok(())
}

fn row_to_profile(row: &rusqlite::Row, cipher: &StoreCipher) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        label: open_column(row, 1, cipher)?,
        provider: parse_column(row, 2)?,
        username: open_column(row, 3, cipher)?,
        email: open_column(row, 4, cipher)?,
        auth_method: parse_column(row, 5)?,
        ssh_key_path: open_opt_column(row, 6, cipher)?.map(PathBuf::from),
        ssh_host_alias: open_opt_column(row, 7, cipher)?,
        token_id: row.get(8)?,
        is_default: row.get(9)?,
        color: row.get(10)?,
        created_at: parse_ts(row.get::<_, String>(11).ok()),
        updated_at: parse_ts(row.get::<_, String>(12).ok()),
    })
}

fn row_to_repository(row: &rusqlite::Row) -> rusqlite::Result<RepositoryRecord> {
    Ok(RepositoryRecord {
        path: PathBuf::from(row.get::<_, String>(0)?),
        name: row.get(1)?,
        bound_profile_id: row.get(2)?,
        last_accessed: parse_ts(row.get::<_, String>(3).ok()),
    })
}

fn parse_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = GitIdError>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn open_column(row: &rusqlite::Row, idx: usize, cipher: &StoreCipher) -> rusqlite::Result<String> {
    let sealed: String = row.get(idx)?;
    cipher.open(&sealed).map_err(|e| conversion_error(idx, e))
}

fn open_opt_column(
    row: &rusqlite::Row,
    idx: usize,
    cipher: &StoreCipher,
) -> rusqlite::Result<Option<String>> {
    let sealed: Option<String> = row.get(idx)?;
    cipher
        .open_opt(sealed.as_deref())
        .map_err(|e| conversion_error(idx, e))
}

fn conversion_error(idx: usize, e: GitIdError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: Option<String>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::cipher::is_sealed;
    use crate::db::init_memory_db;
    use crate::db::models::{AuthMethod, Provider, Theme};
    use crate::keychain::MemoryVault;
    use chrono::Duration;

    fn store() -> RecordStore {
        RecordStore::open(init_memory_db().unwrap(), Arc::new(MemoryVault::new())).unwrap()
    }

    fn raw_column(store: &RecordStore, sql: &str) -> Option<String> {
        store
            .conn()
            .unwrap()
            .query_row(sql, [], |row| row.get(0))
            .unwrap()
    }

    fn profile(id: &str, age_minutes: i64, is_default: bool) -> Profile {
        let ts = Utc::now() - Duration::minutes(age_minutes);
        Profile {
            id: id.to_string(),
            label: id.to_string(),
            provider: Provider::Github,
            username: id.to_string(),
            email: format!("{}@example.com", id),
            auth_method: AuthMethod::Ssh,
            ssh_key_path: None,
            ssh_host_alias: None,
            token_id: None,
            is_default,
            color: "#000000".to_string(),
            created_at: ts,
            updated_at: ts,
        }
    }

    fn default_ids(store: &RecordStore) -> Vec<String> {
        store
            .get_profiles()
            .unwrap()
            .into_iter()
            .filter(|p| p.is_default)
            .map(|p| p.id)
            .collect()
    }

    #[test]
    fn test_first_profile_is_elected_default() {
        let store = store();
        let saved = store.save_profile(&profile("a", 10, false)).unwrap();
        assert!(saved.is_default);
    }

    #[test]
    fn test_saving_default_unsets_others() {
        let store = store();
        store.save_profile(&profile("a", 10, true)).unwrap();
        store.save_profile(&profile("b", 5, true)).unwrap();
        assert_eq!(default_ids(&store), vec!["b"]);

        // Saving a non-default keeps the existing default.
        store.save_profile(&profile("c", 1, false)).unwrap();
        assert_eq!(default_ids(&store), vec!["b"]);
    }

    #[test]
    fn test_unsetting_default_elects_oldest_other() {
        let store = store();
        store.save_profile(&profile("a", 10, false)).unwrap();
        store.save_profile(&profile("b", 5, true)).unwrap();

        store.save_profile(&profile("b", 5, false)).unwrap();
        assert_eq!(default_ids(&store), vec!["a"]);
    }

    #[test]
    fn test_sole_profile_cannot_lose_default() {
        let store = store();
        store.save_profile(&profile("a", 10, true)).unwrap();
        let saved = store.save_profile(&profile("a", 10, false)).unwrap();
        assert!(saved.is_default);
    }

    #[test]
    fn test_set_default_profile() {
        let store = store();
        store.save_profile(&profile("a", 10, true)).unwrap();
        store.save_profile(&profile("b", 5, false)).unwrap();

        store.set_default_profile("b").unwrap();
        assert_eq!(default_ids(&store), vec!["b"]);

        let err = store.set_default_profile("zzz").unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(default_ids(&store), vec!["b"]);
    }

    #[test]
    fn test_delete_default_reelects_and_sole_delete_empties() {
        let store = store();
        store.save_profile(&profile("a", 10, false)).unwrap();
        store.save_profile(&profile("b", 5, true)).unwrap();
        store.save_profile(&profile("c", 1, false)).unwrap();

        assert!(store.delete_profile("b").unwrap());
        assert_eq!(default_ids(&store), vec!["a"]);

        assert!(store.delete_profile("c").unwrap());
        assert!(store.delete_profile("a").unwrap());
        assert!(store.get_profiles().unwrap().is_empty());
        assert!(!store.delete_profile("a").unwrap());
    }

    #[test]
    fn test_single_default_after_mixed_sequence() {
        let store = store();
        let ops: Vec<(&str, bool)> = vec![
            ("a", false),
            ("b", true),
            ("c", true),
            ("a", true),
            ("c", false),
            ("a", false),
        ];
        for (i, (id, is_default)) in ops.into_iter().enumerate() {
            store
                .save_profile(&profile(id, 100 - i as i64, is_default))
                .unwrap();
            assert_eq!(default_ids(&store).len(), 1);
        }
        store.delete_profile("a").unwrap();
        assert_eq!(default_ids(&store).len(), 1);
        store.set_default_profile("c").unwrap();
        assert_eq!(default_ids(&store), vec!["c"]);
    }

    #[test]
    fn test_repository_records_are_keyed_by_path() {
        let store = store();
        store.save_profile(&profile("a", 10, true)).unwrap();

        let mut record = RepositoryRecord {
            path: PathBuf::from("/src/widgets"),
            name: "widgets".to_string(),
            bound_profile_id: None,
            last_accessed: Utc::now(),
        };
        store.save_repository(&record).unwrap();
        record.bound_profile_id = Some("a".to_string());
        store.save_repository(&record).unwrap();

        let all = store.get_repositories().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].bound_profile_id.as_deref(), Some("a"));

        // Deleting the profile clears the binding.
        store.delete_profile("a").unwrap();
        let reloaded = store.get_repository(Path::new("/src/widgets")).unwrap().unwrap();
        assert!(reloaded.bound_profile_id.is_none());

        assert!(store.delete_repository(Path::new("/src/widgets")).unwrap());
        assert!(store.get_repository(Path::new("/src/widgets")).unwrap().is_none());
    }

    #[test]
    fn test_settings_defaults_and_update() {
        let store = store();
        assert_eq!(store.get_settings().unwrap(), AppSettings::default());

        let updated = store
            .update_settings(SettingsUpdate {
                theme: Some(Theme::Light),
                first_run_complete: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(updated.theme, Theme::Light);
        assert_eq!(store.get_settings().unwrap(), updated);
    }

    #[test]
    fn test_tokens_go_through_vault() {
        let store = store();
        store.store_token("a", "ghp_x").unwrap();
        assert_eq!(store.get_token("a").unwrap().as_deref(), Some("ghp_x"));
        store.delete_token("a").unwrap();
        assert!(store.get_token("a").unwrap().is_none());
    }

    #[test]
    fn test_identity_fields_and_settings_are_sealed_at_rest() {
        let store = store();
        let mut p = profile("a", 10, true);
        p.ssh_key_path = Some(PathBuf::from("/home/ada/.ssh/id_ed25519_work"));
        p.ssh_host_alias = Some("github-work".to_string());
        store.save_profile(&p).unwrap();
        store
            .update_settings(SettingsUpdate {
                default_scan_directories: Some(vec![PathBuf::from("/home/ada/code")]),
                ..Default::default()
            })
            .unwrap();

        for column in ["label", "username", "email", "ssh_key_path", "ssh_host_alias"] {
            let raw = raw_column(&store, &format!("SELECT {} FROM profiles", column)).unwrap();
            assert!(is_sealed(&raw), "{} stored in clear: {}", column, raw);
        }
        let raw = raw_column(&store, "SELECT email FROM profiles").unwrap();
        assert!(!raw.contains("example.com"));
        let settings = raw_column(&store, "SELECT data FROM settings").unwrap();
        assert!(is_sealed(&settings));
        assert!(!settings.contains("/home/ada/code"));

        let loaded = store.get_profile("a").unwrap().unwrap();
        assert_eq!(loaded.email, "a@example.com");
        assert_eq!(loaded.ssh_host_alias.as_deref(), Some("github-work"));
        assert_eq!(
            store.get_settings().unwrap().default_scan_directories,
            vec![PathBuf::from("/home/ada/code")]
        );
    }

    #[test]
    fn test_rows_sealed_under_another_key_do_not_load() {
        let store = store();
        store.save_profile(&profile("a", 10, true)).unwrap();

        let stranger = RecordStore {
            cipher: StoreCipher::generate(),
            ..store.clone()
        };
        assert!(stranger.get_profiles().is_err());
        assert!(store.get_profiles().is_ok());
    }

    #[test]
    fn test_rows_written_before_sealing_still_load() {
        let store = store();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO profiles (id, label, provider, username, email, auth_method, \
                 is_default, color, created_at, updated_at) \
                 VALUES ('old', 'Old', 'github', 'ada', 'ada@old.io', 'https', 1, '#000000', \
                 '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();

        let old = store.get_profile("old").unwrap().unwrap();
        assert_eq!(old.email, "ada@old.io");

        store.save_profile(&old).unwrap();
        let raw = raw_column(&store, "SELECT email FROM profiles WHERE id = 'old'").unwrap();
        assert!(is_sealed(&raw));
    }
}
