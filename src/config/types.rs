//! Configuration type definitions.

use std::path::PathBuf;
use std::time::Duration;

use knuffel::Decode;

use crate::error::GitIdError;
use crate::utils::paths::{default_data_dir, home_dir, resolve_global_git_config};
use crate::utils::{AppPaths, expand_tilde};

/// Seconds allowed for a single `git` or `ssh-keygen` invocation.
pub const DEFAULT_COMMAND_TIMEOUT: u64 = 30;
/// How deep `repo scan` and discovery walk below each root.
pub const DEFAULT_SCAN_DEPTH: usize = 4;
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Keys accepted by `config get` / `config set`.
pub const SETTING_KEYS: &[&str] = &[
    "data_dir",
    "ssh_dir",
    "git_config",
    "log_level",
    "command_timeout",
    "scan_depth",
];

/// Main configuration structure parsed from gitid.kdl.
#[derive(Debug, Decode, Clone, Default)]
pub struct Config {
    #[knuffel(child)]
    pub defaults: Option<Defaults>,
}

/// The `defaults` node; every property is optional.
#[derive(Debug, Decode, Clone, Default, PartialEq, Eq)]
pub struct Defaults {
    #[knuffel(property(name = "data_dir"))]
    pub data_dir: Option<String>,

    #[knuffel(property(name = "ssh_dir"))]
    pub ssh_dir: Option<String>,

    /// Global Git config file. When unset, `~/.gitconfig` or the XDG
    /// location is picked, whichever exists.
    #[knuffel(property(name = "git_config"))]
    pub git_config: Option<String>,

    #[knuffel(property(name = "log_level"))]
    pub log_level: Option<String>,

    #[knuffel(property(name = "command_timeout"))]
    pub command_timeout: Option<u64>,

    #[knuffel(property(name = "scan_depth"))]
    pub scan_depth: Option<usize>,
}

impl Config {
    fn defaults(&self) -> Option<&Defaults> {
        self.defaults.as_ref()
    }

    /// Where the database, backups and audit logs live.
    pub fn data_dir(&self) -> crate::error::Result<PathBuf> {
        match self.defaults().and_then(|d| d.data_dir.as_deref()) {
            Some(dir) => Ok(expand_tilde(dir)),
            None => default_data_dir(),
        }
    }

    pub fn ssh_dir(&self) -> crate::error::Result<PathBuf> {
        match self.defaults().and_then(|d| d.ssh_dir.as_deref()) {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(home_dir()?.join(".ssh")),
        }
    }

    pub fn git_config(&self) -> crate::error::Result<PathBuf> {
        match self.defaults().and_then(|d| d.git_config.as_deref()) {
            Some(path) => Ok(expand_tilde(path)),
            None => {
                let xdg = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from);
                Ok(resolve_global_git_config(&home_dir()?, xdg.as_deref()))
            }
        }
    }

    /// Log filter directive used when `GITID_LOG` is not set.
    pub fn log_level(&self) -> String {
        self.defaults()
            .and_then(|d| d.log_level.clone())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(
            self.defaults()
                .and_then(|d| d.command_timeout)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT),
        )
    }

    pub fn scan_depth(&self) -> usize {
        self.defaults()
            .and_then(|d| d.scan_depth)
            .unwrap_or(DEFAULT_SCAN_DEPTH)
    }

    /// Resolve every on-disk location from this config.
    pub fn app_paths(&self) -> crate::error::Result<AppPaths> {
        Ok(AppPaths {
            home: home_dir()?,
            ssh_dir: self.ssh_dir()?,
            global_git_config: self.git_config()?,
            data_dir: self.data_dir()?,
        })
    }

    /// Update a default setting
    pub fn set_default(&mut self, key: &str, value: &str) -> crate::error::Result<()> {
        let defaults = self.defaults.get_or_insert_with(Defaults::default);
        match key {
            "data_dir" => defaults.data_dir = Some(value.to_string()),
            "ssh_dir" => defaults.ssh_dir = Some(value.to_string()),
            "git_config" => defaults.git_config = Some(value.to_string()),
            "log_level" => defaults.log_level = Some(value.to_string()),
            "command_timeout" => {
                let secs: u64 = value.parse().map_err(|_| {
                    GitIdError::validation(format!("Invalid number for command_timeout: {}", value))
                })?;
                if secs == 0 {
                    return Err(GitIdError::validation("command_timeout must be at least 1"));
                }
                defaults.command_timeout = Some(secs);
            }
            "scan_depth" => {
                defaults.scan_depth = Some(value.parse().map_err(|_| {
                    GitIdError::validation(format!("Invalid number for scan_depth: {}", value))
                })?)
            }
            _ => return Err(unknown_setting(key)),
        }
        Ok(())
    }

    /// Get a default setting value as string
    pub fn get_default(&self, key: &str) -> crate::error::Result<String> {
        let display = |p: PathBuf| p.to_string_lossy().into_owned();
        match key {
            "data_dir" => Ok(display(self.data_dir()?)),
            "ssh_dir" => Ok(display(self.ssh_dir()?)),
            "git_config" => Ok(display(self.git_config()?)),
            "log_level" => Ok(self.log_level()),
            "command_timeout" => Ok(self.command_timeout().as_secs().to_string()),
            "scan_depth" => Ok(self.scan_depth().to_string()),
            _ => Err(unknown_setting(key)),
        }
    }
}

fn unknown_setting(key: &str) -> GitIdError {
    GitIdError::validation(format!(
        "Unknown setting: {}. Valid settings: {}",
        key,
        SETTING_KEYS.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.scan_depth(), 4);
        assert_eq!(config.log_level(), "warn");
    }

    #[test]
    fn test_set_and_get_default() {
        let mut config = Config::default();
        config.set_default("scan_depth", "6").unwrap();
        config.set_default("data_dir", "/tmp/gitid-data").unwrap();
        assert_eq!(config.get_default("scan_depth").unwrap(), "6");
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/gitid-data"));
    }

    #[test]
    fn test_set_default_rejects_bad_input() {
        let mut config = Config::default();
        assert_eq!(
            config.set_default("command_timeout", "soon").unwrap_err().code(),
            "VALIDATION"
        );
        assert!(config.set_default("command_timeout", "0").is_err());
        assert!(config.set_default("editor", "vim").is_err());
        assert!(config.get_default("editor").is_err());
    }
}
