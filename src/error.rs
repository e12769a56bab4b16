//! Unified error type for gitid.
//!
//! All public APIs return `Result<T, GitIdError>`. Each variant maps to one
//! stable machine-readable code (see [`GitIdError::code`]) that the boundary
//! envelope exposes to callers, so the taxonomy stays the same regardless of
//! which component failed.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Code reported when one or more discovery phases failed but others
/// produced results. Partial scans are returned as data, never as an error.
pub const SCAN_PARTIAL_FAILURE: &str = "SCAN_PARTIAL_FAILURE";

/// The unified error type for all gitid operations.
#[derive(Debug, Error)]
pub enum GitIdError {
    // ── Lookup / input ─────────────────────────────────────────────────
    /// A profile, repository or backup id is unknown.
    #[error("{0}")]
    NotFound(String),

    /// A required field is missing or malformed.
    #[error("{0}")]
    Validation(String),

    // ── Secure storage ─────────────────────────────────────────────────
    /// The OS credential vault is unavailable or rejected the write.
    #[error("secure storage unavailable: {0}")]
    SecureStorage(String),

    // ── I/O & filesystem ───────────────────────────────────────────────
    /// Filesystem or I/O operation failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Filesystem operation failed on a known path.
    #[error("I/O error on '{}': {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored content no longer hashes to its recorded value.
    #[error("integrity mismatch: {0}")]
    IntegrityMismatch(String),

    // ── Remote validation ──────────────────────────────────────────────
    /// The remote rejected our credentials.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The remote host could not be reached.
    #[error("host unreachable: {0}")]
    HostUnreachable(String),

    // ── Persistence ────────────────────────────────────────────────────
    /// SQLite / database operation failed.
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// KDL config file error.
    #[error("config error: {0}")]
    Config(String),

    // ── Subprocesses ───────────────────────────────────────────────────
    /// An external command (git, ssh-keygen) failed or timed out.
    #[error("command '{command}' failed: {message}")]
    Command { command: String, message: String },

    // ── Catch-all ──────────────────────────────────────────────────────
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<keyring::Error> for GitIdError {
    fn from(e: keyring::Error) -> Self {
        GitIdError::SecureStorage(e.to_string())
    }
}

impl From<String> for GitIdError {
    fn from(s: String) -> Self {
        GitIdError::Other(s)
    }
}

impl From<&str> for GitIdError {
    fn from(s: &str) -> Self {
        GitIdError::Other(s.to_string())
    }
}

// ── Convenience constructors ───────────────────────────────────────────

impl GitIdError {
    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        GitIdError::NotFound(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        GitIdError::Validation(message.into())
    }

    /// Create a secure storage error.
    pub fn secure_storage(message: impl Into<String>) -> Self {
        GitIdError::SecureStorage(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        GitIdError::Config(message.into())
    }

    /// Attach the offending path to an I/O error.
    pub fn io_at(path: &Path, source: std::io::Error) -> Self {
        GitIdError::FileIo {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Create a subprocess failure.
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        GitIdError::Command {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for the boundary envelope.
    pub fn code(&self) -> &'static str {
        match self {
            GitIdError::NotFound(_) => "NOT_FOUND",
            GitIdError::Validation(_) => "VALIDATION",
            GitIdError::SecureStorage(_) => "SECURE_STORAGE_FAILURE",
            GitIdError::Io(_) | GitIdError::FileIo { .. } => "IO_FAILURE",
            GitIdError::IntegrityMismatch(_) => "INTEGRITY_MISMATCH",
            GitIdError::AccessDenied(_) => "ACCESS_DENIED",
            GitIdError::HostUnreachable(_) => "HOST_UNREACHABLE",
            GitIdError::Db(_) | GitIdError::Json(_) => "STORAGE_FAILURE",
            GitIdError::Config(_) => "CONFIG_ERROR",
            GitIdError::Command { .. } => "COMMAND_FAILED",
            GitIdError::Other(_) => "INTERNAL",
        }
    }

    /// Extra structured context for the envelope, when the variant has any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            GitIdError::FileIo { path, .. } => {
                Some(serde_json::json!({ "path": path.display().to_string() }))
            }
            GitIdError::Command { command, .. } => {
                Some(serde_json::json!({ "command": command }))
            }
            _ => None,
        }
    }
}

/// Convenience type alias for Results using GitIdError.
pub type Result<T> = std::result::Result<T, GitIdError>;
