//! Configuration file loading and saving.

use std::path::{Path, PathBuf};

use super::types::Config;
use crate::error::{GitIdError, Result};
use crate::utils::fs::{ensure_dir, write_atomic};

const FILE_NAME: &str = "gitid.kdl";

impl Config {
    /// Get the explicit ~/.config/gitid/gitid.kdl path (XDG-style, cross-platform)
    fn xdg_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".config/gitid").join(FILE_NAME))
    }

    /// Get the list of config file search paths in priority order
    fn get_config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. ./gitid.kdl (current directory)
        paths.push(PathBuf::from(FILE_NAME));

        // 2. ~/.config/gitid/gitid.kdl
        if let Some(xdg_path) = Self::xdg_config_path() {
            paths.push(xdg_path);
        }

        // 3. Platform-native config directory, unless it is the XDG path
        if let Some(config_dir) = dirs::config_dir() {
            let native_path = config_dir.join("gitid").join(FILE_NAME);
            if Self::xdg_config_path().as_ref() != Some(&native_path) {
                paths.push(native_path);
            }
        }

        // 4. ~/.local/share/gitid/gitid.kdl
        if let Some(data_dir) = dirs::data_dir() {
            paths.push(data_dir.join("gitid").join(FILE_NAME));
        }

        paths
    }

    /// Path of the first config file found in the standard locations.
    pub fn find_existing_config() -> Option<PathBuf> {
        Self::get_config_search_paths()
            .into_iter()
            .find(|path| path.exists())
    }

    /// Get the default config path (~/.config/gitid/gitid.kdl)
    pub fn default_config_path() -> PathBuf {
        Self::xdg_config_path().unwrap_or_else(|| PathBuf::from(FILE_NAME))
    }

    /// Parse KDL text. `source` names the input in error messages.
    pub fn parse(source: &str, content: &str) -> Result<Self> {
        knuffel::parse::<Config>(source, content)
            .map_err(|e| GitIdError::config(format!("{}: {}", source, e)))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| GitIdError::io_at(path, e))?;
        Self::parse(&path.display().to_string(), &content)
    }

    /// Load `explicit` when given, otherwise the first file in the search
    /// path. No file at all yields the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }
        match Self::find_existing_config() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load_from_path(&path)
            }
            None => Ok(Config::default()),
        }
    }

    /// Write a commented template. Refuses to replace an existing file
    /// unless `overwrite` is set.
    pub fn generate_config_file(path: Option<PathBuf>, overwrite: bool) -> Result<PathBuf> {
        let config_path = path.unwrap_or_else(Self::default_config_path);

        if config_path.exists() && !overwrite {
            return Err(GitIdError::validation(format!(
                "Config file already exists at: {}. Use --overwrite to replace it.",
                config_path.display()
            )));
        }

        if let Some(parent) = config_path.parent()
            && !parent.as_os_str().is_empty()
        {
            ensure_dir(parent)?;
        }

        let kdl_content = r#"// gitid configuration
// command_timeout is in seconds; scan_depth counts levels below each scan root.
// GITID_LOG overrides log_level (e.g. GITID_LOG=gitid=debug).
defaults log_level="warn" command_timeout=30 scan_depth=4
// defaults data_dir="~/.local/share/gitid" ssh_dir="~/.ssh" git_config="~/.gitconfig"
"#;

        write_atomic(&config_path, kdl_content.as_bytes())?;
        Ok(config_path)
    }

    /// Serialize config to KDL format
    pub fn to_kdl(&self) -> String {
        let mut output = String::new();
        output.push_str("// gitid configuration file\n");
        output.push_str("// command_timeout is in seconds\n\n");
        output.push_str("defaults");

        if let Some(d) = &self.defaults {
            let strings = [
                ("data_dir", &d.data_dir),
                ("ssh_dir", &d.ssh_dir),
                ("git_config", &d.git_config),
                ("log_level", &d.log_level),
            ];
            for (key, value) in strings {
                if let Some(value) = value {
                    output.push_str(&format!(" {}={}", key, kdl_string(value)));
                }
            }
            if let Some(timeout) = d.command_timeout {
                output.push_str(&format!(" command_timeout={}", timeout));
            }
            if let Some(depth) = d.scan_depth {
                output.push_str(&format!(" scan_depth={}", depth));
            }
        }
        output.push('\n');
        output
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.to_kdl().as_bytes())
    }
}

fn kdl_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
