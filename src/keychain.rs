//! OS keychain integration for profile access tokens.
//!
//! HTTPS profiles may carry a personal access token. The token bytes live only
//! in the operating system's credential store (macOS Keychain, Linux kernel
//! keyutils, ...); the record store keeps nothing but the profile id that
//! keys the entry.
//!
//! ## Error handling
//!
//! Unlike a cache, the vault is the only copy of a token. Every failure is
//! surfaced as [`GitIdError::SecureStorage`]; there is no plaintext fallback.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{GitIdError, Result};

/// Service name used for all gitid keychain entries.
pub const SERVICE: &str = "gitid";

/// Storage for secret tokens keyed by profile id.
pub trait TokenVault: Send + Sync {
    /// Store (or replace) the secret for `id`.
    fn store(&self, id: &str, secret: &str) -> Result<()>;

    /// Fetch the secret for `id`, `None` when no entry exists.
    fn get(&self, id: &str) -> Result<Option<String>>;

    /// Delete the secret for `id`. Deleting a missing entry is not an error.
    fn delete(&self, id: &str) -> Result<()>;
}

/// Vault backed by the `keyring` crate.
pub struct KeyringVault {
    service: String,
}

impl KeyringVault {
    /// Create a vault under the default service namespace.
    pub fn new() -> Self {
        Self::with_service(SERVICE)
    }

    /// Create with a custom service name (for testing).
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, id: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, id).map_err(GitIdError::from)
    }

    /// Check whether the OS keychain backend is functional.
    ///
    /// Performs a real round-trip probe: writes a test value, reads it back,
    /// and deletes it.
    pub fn available(&self) -> bool {
        let entry = match self.entry("__gitid_probe__") {
            Ok(e) => e,
            Err(_) => return false,
        };

        let probe_value = "__gitid_probe_value__";
        if entry.set_password(probe_value).is_err() {
            return false;
        }

        let ok = entry
            .get_password()
            .map(|v| v == probe_value)
            .unwrap_or(false);

        let _ = entry.delete_credential();
        ok
    }
}

impl Default for KeyringVault {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenVault for KeyringVault {
    fn store(&self, id: &str, secret: &str) -> Result<()> {
        let entry = self.entry(id)?;
        entry.set_password(secret)?;

        // Some backends accept writes they cannot serve back; verify.
        match entry.get_password() {
            Ok(read_back) if read_back == secret => {
                tracing::debug!(service = %self.service, id, "token stored");
                Ok(())
            }
            Ok(_) => Err(GitIdError::secure_storage(
                "keychain returned different content after write",
            )),
            Err(e) => Err(GitIdError::secure_storage(format!(
                "keychain write could not be verified: {}",
                e
            ))),
        }
    }

    fn get(&self, id: &str) -> Result<Option<String>> {
        match self.entry(id)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, id: &str) -> Result<()> {
        match self.entry(id)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process vault for tests and embedders without an OS keychain.
#[derive(Default)]
pub struct MemoryVault {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| GitIdError::secure_storage("memory vault poisoned"))
    }
}

impl TokenVault for MemoryVault {
    fn store(&self, id: &str, secret: &str) -> Result<()> {
        self.lock()?.insert(id.to_string(), secret.to_string());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.lock()?.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_vault_round_trip() {
        let vault = MemoryVault::new();
        assert!(vault.get("p1").unwrap().is_none());

        vault.store("p1", "ghp_secret").unwrap();
        assert_eq!(vault.get("p1").unwrap().as_deref(), Some("ghp_secret"));

        vault.store("p1", "ghp_rotated").unwrap();
        assert_eq!(vault.get("p1").unwrap().as_deref(), Some("ghp_rotated"));

        vault.delete("p1").unwrap();
        vault.delete("p1").unwrap();
        assert!(vault.get("p1").unwrap().is_none());
    }

    #[test]
    #[ignore] // Touches the real OS keychain: cargo test keychain -- --ignored
    fn test_keyring_vault_operations() {
        let vault = KeyringVault::with_service("gitid-test");
        if !vault.available() {
            return;
        }
        vault.store("probe-profile", "token").unwrap();
        assert_eq!(vault.get("probe-profile").unwrap().as_deref(), Some("token"));
        vault.delete("probe-profile").unwrap();
        assert!(vault.get("probe-profile").unwrap().is_none());
    }
}
