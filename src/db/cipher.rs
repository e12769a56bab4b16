//! Field sealing for the record store.
//!
//! Identity fields of a profile and the settings document are sealed with
//! ChaCha20-Poly1305 before they reach SQLite. The 256-bit key is generated
//! on first use and kept in the OS keychain next to the profile tokens, so a
//! copied database file is unreadable without the user's keychain.
//!
//! A sealed value is stored as `gitid1:` followed by the hex of
//! `nonce || ciphertext || tag`.

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{GitIdError, Result};
use crate::keychain::TokenVault;

/// Keychain entry holding the hex-encoded store key.
pub const STORE_KEY_ID: &str = "__gitid_store_key__";

const PREFIX: &str = "gitid1:";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Seals and opens record store values under one key.
#[derive(Clone)]
pub struct StoreCipher {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl StoreCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// A cipher over a fresh random key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// Load the store key from `vault`, creating and saving one on first use.
    pub fn from_vault(vault: &dyn TokenVault) -> Result<Self> {
        if let Some(encoded) = vault.get(STORE_KEY_ID)? {
            let bytes = Zeroizing::new(
                hex::decode(encoded.trim())
                    .map_err(|_| GitIdError::secure_storage("record store key is not valid hex"))?,
            );
            let key: [u8; KEY_LEN] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| GitIdError::secure_storage("record store key has the wrong length"))?;
            return Ok(Self::new(key));
        }

        let cipher = Self::generate();
        vault.store(STORE_KEY_ID, &hex::encode(cipher.key.as_slice()))?;
        tracing::info!("generated a new record store key");
        Ok(cipher)
    }

    fn aead(&self) -> Result<ChaCha20Poly1305> {
        ChaCha20Poly1305::new_from_slice(&*self.key)
            .map_err(|_| GitIdError::secure_storage("invalid record store key"))
    }

    /// Encrypt `plaintext` under a fresh nonce.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .aead()?
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| GitIdError::secure_storage("failed to seal record store value"))?;

        let mut body = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        body.extend_from_slice(&nonce);
        body.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", PREFIX, hex::encode(body)))
    }

    /// Decrypt a value produced by [`seal`](Self::seal).
    ///
    /// Values without the `gitid1:` prefix predate sealing and are returned
    /// as stored; the next save seals them.
    pub fn open(&self, stored: &str) -> Result<String> {
        let Some(encoded) = stored.strip_prefix(PREFIX) else {
            return Ok(stored.to_string());
        };
        let body = hex::decode(encoded)
            .map_err(|_| GitIdError::secure_storage("sealed value is not valid hex"))?;
        if body.len() < NONCE_LEN + TAG_LEN {
            return Err(GitIdError::secure_storage("sealed value is truncated"));
        }

        let (nonce, ciphertext) = body.split_at(NONCE_LEN);
        let plaintext = self
            .aead()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                GitIdError::secure_storage("sealed value failed authentication (wrong key or tampered)")
            })?;
        String::from_utf8(plaintext)
            .map_err(|_| GitIdError::secure_storage("sealed value is not UTF-8"))
    }

    pub fn seal_opt(&self, plaintext: Option<&str>) -> Result<Option<String>> {
        plaintext.map(|p| self.seal(p)).transpose()
    }

    pub fn open_opt(&self, stored: Option<&str>) -> Result<Option<String>> {
        stored.map(|s| self.open(s)).transpose()
    }
}

/// True when `value` was written by [`StoreCipher::seal`].
#[cfg(test)]
pub(crate) fn is_sealed(value: &str) -> bool {
    value.starts_with(PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keychain::MemoryVault;

    #[test]
    fn test_seal_hides_plaintext_and_opens_back() {
        let cipher = StoreCipher::generate();
        let a = cipher.seal("ada@acme.io").unwrap();
        let b = cipher.seal("ada@acme.io").unwrap();

        assert!(is_sealed(&a));
        assert!(!a.contains("acme"));
        assert_ne!(a, b, "every seal uses a fresh nonce");
        assert_eq!(cipher.open(&a).unwrap(), "ada@acme.io");
        assert_eq!(cipher.open(&b).unwrap(), "ada@acme.io");
    }

    #[test]
    fn test_wrong_key_and_tampering_are_rejected() {
        let cipher = StoreCipher::generate();
        let sealed = cipher.seal("Work").unwrap();

        let other = StoreCipher::generate();
        assert_eq!(other.open(&sealed).unwrap_err().code(), "SECURE_STORAGE_FAILURE");

        // Flip the last hex digit of the tag.
        let mut tampered = sealed.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert!(cipher.open(&tampered).is_err());

        assert!(cipher.open("gitid1:00ff").is_err());
    }

    #[test]
    fn test_unsealed_values_pass_through() {
        let cipher = StoreCipher::generate();
        assert_eq!(cipher.open("plain@example.com").unwrap(), "plain@example.com");
        assert_eq!(cipher.open_opt(None).unwrap(), None);
    }

    #[test]
    fn test_key_is_created_once_and_reused() {
        let vault = MemoryVault::new();
        let first = StoreCipher::from_vault(&vault).unwrap();
        let stored = vault.get(STORE_KEY_ID).unwrap().unwrap();
        assert_eq!(stored.len(), KEY_LEN * 2);

        let sealed = first.seal("personal").unwrap();
        let second = StoreCipher::from_vault(&vault).unwrap();
        assert_eq!(second.open(&sealed).unwrap(), "personal");
        assert_eq!(vault.get(STORE_KEY_ID).unwrap().unwrap(), stored);
    }

    #[test]
    fn test_malformed_vault_key_is_an_error() {
        let vault = MemoryVault::new();
        vault.store(STORE_KEY_ID, "abcd").unwrap();
        let err = StoreCipher::from_vault(&vault).err().unwrap();
        assert_eq!(err.code(), "SECURE_STORAGE_FAILURE");
    }
}
