//! Command and subcommand definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand};

use crate::audit::AuditCategory;
use crate::backup::BackupType;
use crate::db::{AuthMethod, Provider};
use crate::ssh::KeyType;

/// Top-level commands available in gitid.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage identity profiles and the global Git identity
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Find repositories and bind them to profiles
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
    /// Look for identities already configured on this machine
    Discover {
        #[command(subcommand)]
        command: DiscoverCommands,
    },
    /// SSH keys and ~/.ssh/config host aliases
    Ssh {
        #[command(subcommand)]
        command: SshCommands,
    },
    /// Inspect and restore configuration backups
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    /// Read, export and verify the audit log
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
    /// Application settings stored alongside profiles
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Manage the gitid.kdl config file (shows current config if no subcommand provided)
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Print version information
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// List all profiles
    List,
    /// Create a new profile
    Create {
        /// Display name (e.g. "Work")
        #[arg(short, long)]
        label: String,

        /// Author name written to user.name
        #[arg(short, long)]
        username: String,

        /// Author email written to user.email
        #[arg(short, long)]
        email: String,

        /// github, gitlab, bitbucket, azure or custom
        #[arg(short, long, default_value = "github")]
        provider: Provider,

        /// ssh or https
        #[arg(long, default_value = "ssh")]
        auth: AuthMethod,

        /// Existing private key to use
        #[arg(long, value_name = "PATH", conflicts_with = "generate_key")]
        ssh_key: Option<PathBuf>,

        /// SSH host alias (derived from provider and label when omitted)
        #[arg(long)]
        host_alias: Option<String>,

        /// Generate a new ed25519 key pair for this profile
        #[arg(short, long)]
        generate_key: bool,

        /// Read an HTTPS token from stdin and store it in the OS keychain
        #[arg(long)]
        token_stdin: bool,

        /// Badge color (e.g. "#10b981")
        #[arg(long)]
        color: Option<String>,

        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },
    /// Change fields of an existing profile
    Update {
        /// Profile id or label
        profile: String,

        #[arg(short, long)]
        label: Option<String>,

        #[arg(short, long)]
        username: Option<String>,

        #[arg(short, long)]
        email: Option<String>,

        #[arg(short, long)]
        provider: Option<Provider>,

        #[arg(long)]
        auth: Option<AuthMethod>,

        #[arg(long, value_name = "PATH")]
        ssh_key: Option<PathBuf>,

        #[arg(long)]
        host_alias: Option<String>,

        /// Replace the stored token with one read from stdin
        #[arg(long, conflicts_with = "clear_token")]
        token_stdin: bool,

        /// Remove the stored token
        #[arg(long)]
        clear_token: bool,

        #[arg(long)]
        color: Option<String>,

        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },
    /// Delete a profile, its token and its SSH host alias
    Delete {
        /// Profile id or label
        profile: String,
    },
    /// Make a profile the default
    SetDefault {
        /// Profile id or label
        profile: String,
    },
    /// Write a profile's name and email into the global Git config
    Switch {
        /// Profile id or label
        profile: String,
    },
    /// Show the global Git identity and the profile it matches
    Current,
}

#[derive(Subcommand, Debug)]
pub enum RepoCommands {
    /// Walk directories for repositories and remember them
    Scan {
        /// Directories to walk (default: the configured scan directories)
        dirs: Vec<PathBuf>,

        /// How many levels below each directory to look
        #[arg(short, long)]
        depth: Option<usize>,
    },
    /// List remembered repositories
    List {
        /// Show only repositories whose identity does not match their profile
        #[arg(short, long)]
        mismatched: bool,
    },
    /// Show one repository
    Show {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Bind a repository to a profile
    Bind {
        /// Profile id or label
        profile: String,

        #[arg(default_value = ".")]
        path: PathBuf,

        /// Also point an SSH origin at the profile's host alias
        #[arg(long)]
        host_alias: bool,
    },
    /// Forget a repository's binding (its .git/config is left as is)
    Unbind {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Stop tracking a repository
    Forget {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Dry-run fetch to check the remote accepts the configured credentials
    Validate {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

/// Which discovery phases to run.
#[derive(Args, Debug, Default)]
pub struct DiscoverArgs {
    /// Directories to search for repositories (default: the configured scan directories)
    pub dirs: Vec<PathBuf>,

    #[arg(long)]
    pub no_ssh_keys: bool,

    #[arg(long)]
    pub no_ssh_config: bool,

    #[arg(long)]
    pub no_git_config: bool,

    #[arg(long)]
    pub no_repos: bool,

    /// How many levels below each directory to look
    #[arg(short, long)]
    pub depth: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum DiscoverCommands {
    /// Scan and print suggested identities (changes nothing)
    Run {
        #[command(flatten)]
        args: DiscoverArgs,
    },
    /// Scan, then create profiles for the suggestions
    Import {
        #[command(flatten)]
        args: DiscoverArgs,

        /// Import only suggestions with these emails (repeatable)
        #[arg(short, long = "email", value_name = "EMAIL")]
        emails: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SshCommands {
    /// List key pairs in the SSH directory
    Keys,
    /// Generate a new key pair
    Generate {
        /// Comment embedded in the key
        #[arg(short, long)]
        email: String,

        /// Used to name the key file
        #[arg(short, long)]
        label: String,

        /// ed25519, rsa or ecdsa
        #[arg(short = 't', long = "type", default_value = "ed25519")]
        key_type: KeyType,
    },
    /// Print a public key
    Pubkey {
        /// Private key path, or a file name inside the SSH directory
        key: PathBuf,
    },
    /// List Host entries of ~/.ssh/config
    Config,
}

#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// List backups, newest first
    List {
        /// ssh_config, git_config_global, git_config_local or ssh_key
        #[arg(short = 't', long = "type")]
        backup_type: Option<BackupType>,
    },
    /// Restore a file from a backup
    Restore { id: String },
    /// Delete a backup
    Delete { id: String },
    /// Check a backup still matches its recorded hash
    Verify { id: String },
    /// Delete backups older than the retention period
    Cleanup {
        /// Retention in days (default: the backup_retention_days setting)
        #[arg(long)]
        days: Option<u32>,
    },
}

/// Filter shared by the audit subcommands.
#[derive(Args, Debug, Default)]
pub struct AuditFilterArgs {
    /// First day to include (YYYY-MM-DD, UTC)
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD, UTC)
    #[arg(long)]
    pub until: Option<NaiveDate>,

    /// profile, repository, ssh, git_config, discovery, backup or settings
    #[arg(short, long)]
    pub category: Option<AuditCategory>,
}

#[derive(Subcommand, Debug)]
pub enum AuditCommands {
    /// Show audit entries, newest first
    Logs {
        #[command(flatten)]
        filter: AuditFilterArgs,

        /// Maximum number of entries to show
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
    },
    /// Write matching entries to a JSON file
    Export {
        output: PathBuf,

        #[command(flatten)]
        filter: AuditFilterArgs,
    },
    /// Recompute checksums and report tampered entries
    Verify {
        #[command(flatten)]
        filter: AuditFilterArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Show all settings
    Get,
    /// Change one setting
    Set {
        /// theme, auto_scan_on_startup, show_mismatch_warnings,
        /// default_scan_directories, backup_retention_days,
        /// pre_push_hook_enabled or first_run_complete
        key: String,
        /// New value (comma-separated for default_scan_directories)
        value: String,
    },
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a commented config file
    Init {
        /// Path where to create the config file (default: ~/.config/gitid/gitid.kdl)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite existing config file if it exists
        #[arg(long)]
        overwrite: bool,
    },
    /// Show the effective configuration
    Show,
    /// Get a specific configuration value
    Get {
        /// Setting key (e.g., "data_dir", "command_timeout", "scan_depth")
        key: String,
    },
    /// Set a configuration value
    Set {
        /// Setting key
        key: String,
        /// New value
        value: String,
    },
}
