//! Record types owned by the store, plus the inputs used to create and
//! update them.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GitIdError;
use crate::git::Remote;

/// Hosting provider a profile or remote belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Github,
    Gitlab,
    Bitbucket,
    Azure,
    Custom,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Github => "github",
            Provider::Gitlab => "gitlab",
            Provider::Bitbucket => "bitbucket",
            Provider::Azure => "azure",
            Provider::Custom => "custom",
        }
    }

    /// Canonical SSH host for the provider, used for generated host aliases.
    pub fn default_host(&self) -> Option<&'static str> {
        match self {
            Provider::Github => Some("github.com"),
            Provider::Gitlab => Some("gitlab.com"),
            Provider::Bitbucket => Some("bitbucket.org"),
            Provider::Azure => Some("ssh.dev.azure.com"),
            Provider::Custom => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = GitIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Provider::Github),
            "gitlab" => Ok(Provider::Gitlab),
            "bitbucket" => Ok(Provider::Bitbucket),
            "azure" => Ok(Provider::Azure),
            "custom" => Ok(Provider::Custom),
            other => Err(GitIdError::validation(format!(
                "Unknown provider '{}'. Valid providers: github, gitlab, bitbucket, azure, custom",
                other
            ))),
        }
    }
}

/// How a profile authenticates against its remotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Ssh,
    Https,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Ssh => "ssh",
            AuthMethod::Https => "https",
        }
    }
}

impl FromStr for AuthMethod {
    type Err = GitIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ssh" => Ok(AuthMethod::Ssh),
            "https" => Ok(AuthMethod::Https),
            other => Err(GitIdError::validation(format!(
                "Unknown auth method '{}'. Use ssh or https",
                other
            ))),
        }
    }
}

/// A named Git author identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub label: String,
    pub provider: Provider,
    pub username: String,
    pub email: String,
    pub auth_method: AuthMethod,
    pub ssh_key_path: Option<PathBuf>,
    pub ssh_host_alias: Option<String>,
    /// Keychain reference for the HTTPS token; never the token itself.
    pub token_id: Option<String>,
    pub is_default: bool,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Binding state of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoStatus {
    Bound,
    Unbound,
    Mismatch,
    Error,
}

/// A Git working directory, with everything derived from its `.git/config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub path: PathBuf,
    pub name: String,
    pub remotes: Vec<Remote>,
    pub bound_profile_id: Option<String>,
    pub local_email: Option<String>,
    pub local_username: Option<String>,
    pub detected_provider: Option<Provider>,
    pub has_mismatch: bool,
    pub mismatch_details: Option<String>,
    pub status: RepoStatus,
    pub last_accessed: DateTime<Utc>,
}

/// The persisted part of a [`Repository`]. Everything else is re-read from
/// disk whenever the repository is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryRecord {
    pub path: PathBuf,
    pub name: String,
    pub bound_profile_id: Option<String>,
    pub last_accessed: DateTime<Utc>,
}

/// UI theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl FromStr for Theme {
    type Err = GitIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" => Ok(Theme::System),
            other => Err(GitIdError::validation(format!(
                "Unknown theme '{}'. Use light, dark or system",
                other
            ))),
        }
    }
}

/// Installation-wide settings (singleton).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub theme: Theme,
    pub auto_scan_on_startup: bool,
    pub show_mismatch_warnings: bool,
    pub default_scan_directories: Vec<PathBuf>,
    pub backup_retention_days: u32,
    pub pre_push_hook_enabled: bool,
    pub first_run_complete: bool,
    pub last_discovery_at: Option<DateTime<Utc>>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            auto_scan_on_startup: false,
            show_mismatch_warnings: true,
            default_scan_directories: Vec::new(),
            backup_retention_days: 30,
            pre_push_hook_enabled: false,
            first_run_complete: false,
            last_discovery_at: None,
        }
    }
}

/// Partial update for [`AppSettings`]; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsUpdate {
    pub theme: Option<Theme>,
    pub auto_scan_on_startup: Option<bool>,
    pub show_mismatch_warnings: Option<bool>,
    pub default_scan_directories: Option<Vec<PathBuf>>,
    pub backup_retention_days: Option<u32>,
    pub pre_push_hook_enabled: Option<bool>,
    pub first_run_complete: Option<bool>,
    pub last_discovery_at: Option<DateTime<Utc>>,
}

impl AppSettings {
    /// Apply a partial update in place.
    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(v) = update.theme {
            self.theme = v;
        }
        if let Some(v) = update.auto_scan_on_startup {
            self.auto_scan_on_startup = v;
        }
        if let Some(v) = update.show_mismatch_warnings {
            self.show_mismatch_warnings = v;
        }
        if let Some(v) = update.default_scan_directories {
            self.default_scan_directories = v;
        }
        if let Some(v) = update.backup_retention_days {
            self.backup_retention_days = v;
        }
        if let Some(v) = update.pre_push_hook_enabled {
            self.pre_push_hook_enabled = v;
        }
        if let Some(v) = update.first_run_complete {
            self.first_run_complete = v;
        }
        if let Some(v) = update.last_discovery_at {
            self.last_discovery_at = Some(v);
        }
    }
}

/// Input for creating a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileInput {
    pub label: String,
    pub provider: Provider,
    pub username: String,
    pub email: String,
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub ssh_key_path: Option<PathBuf>,
    #[serde(default)]
    pub ssh_host_alias: Option<String>,
    /// Mint a fresh ed25519 key pair for this profile.
    #[serde(default)]
    pub generate_new_key: bool,
    /// HTTPS token; moved straight into the keychain.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// Input for updating a profile; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateProfileInput {
    pub id: String,
    pub label: Option<String>,
    pub provider: Option<Provider>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub auth_method: Option<AuthMethod>,
    pub ssh_key_path: Option<PathBuf>,
    pub ssh_host_alias: Option<String>,
    pub token: Option<String>,
    pub color: Option<String>,
    pub is_default: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse_and_display() {
        assert_eq!("GitHub".parse::<Provider>().unwrap(), Provider::Github);
        assert_eq!(Provider::Bitbucket.to_string(), "bitbucket");
        assert!("sourceforge".parse::<Provider>().is_err());
    }

    #[test]
    fn test_settings_partial_update() {
        let mut settings = AppSettings::default();
        settings.apply(SettingsUpdate {
            backup_retention_days: Some(7),
            theme: Some(Theme::Dark),
            ..Default::default()
        });
        assert_eq!(settings.backup_retention_days, 7);
        assert_eq!(settings.theme, Theme::Dark);
        assert!(settings.show_mismatch_warnings);
    }

    #[test]
    fn test_profile_serializes_camel_case() {
        let now = Utc::now();
        let profile = Profile {
            id: "p1".into(),
            label: "Work".into(),
            provider: Provider::Github,
            username: "ada".into(),
            email: "ada@acme.io".into(),
            auth_method: AuthMethod::Ssh,
            ssh_key_path: None,
            ssh_host_alias: None,
            token_id: None,
            is_default: true,
            color: "#3b82f6".into(),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["isDefault"], true);
        assert_eq!(json["authMethod"], "ssh");
        assert_eq!(json["provider"], "github");
    }
}
