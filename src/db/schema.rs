//! Database schema and initialization.

use rusqlite::{Connection, Result};
use std::path::Path;

const SCHEMA_VERSION: i32 = 2;

/// Initialize the database at the given path, creating tables if needed.
pub fn init_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let conn = Connection::open(path)?;

    // Profiles name keychain entries and key paths; keep the file owner-only.
    let _ = crate::utils::restrict_file_permissions(path);

    prepare(&conn)?;
    Ok(conn)
}

/// Open a throwaway in-memory database (tests, dry runs).
pub fn init_memory_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    prepare(&conn)?;
    Ok(conn)
}

fn prepare(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let version = get_schema_version(conn)?;

    if version == 0 {
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if version < SCHEMA_VERSION {
        migrate(conn, version, SCHEMA_VERSION)?;
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Git identities
        CREATE TABLE profiles (
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            provider TEXT NOT NULL,
            username TEXT NOT NULL,
            email TEXT NOT NULL,
            auth_method TEXT NOT NULL,
            ssh_key_path TEXT,
            ssh_host_alias TEXT,
            token_id TEXT,
            is_default INTEGER NOT NULL DEFAULT 0,
            color TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX idx_profiles_created ON profiles(created_at);

        -- Remembered working directories and their bindings
        CREATE TABLE repositories (
            path TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            bound_profile_id TEXT REFERENCES profiles(id) ON DELETE SET NULL,
            last_accessed TEXT NOT NULL
        );

        CREATE INDEX idx_repositories_profile ON repositories(bound_profile_id);

        -- Singleton settings document
        CREATE TABLE settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            data TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn migrate(conn: &Connection, from_version: i32, to_version: i32) -> Result<()> {
    for version in from_version..to_version {
        match version {
            1 => {
                // v1 -> v2: settings moved from a key/value table to one JSON row
                conn.execute_batch(
                    r#"
                    DROP TABLE IF EXISTS settings;
                    CREATE TABLE settings (
                        id INTEGER PRIMARY KEY CHECK (id = 1),
                        data TEXT NOT NULL
                    );
                    "#,
                )?;
            }
            _ => {}
        }
    }
    set_schema_version(conn, to_version)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gitid.db");

        drop(init_db(&path).unwrap());
        let conn = init_db(&path).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_from_v1() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        set_schema_version(&conn, 1).unwrap();

        prepare(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM settings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
