//! Command-line interface definitions.

mod args;
mod commands;

pub use args::{Cli, GlobalArgs};
pub use commands::{
    AuditCommands, AuditFilterArgs, BackupCommands, Commands, ConfigCommands, DiscoverArgs,
    DiscoverCommands, ProfileCommands, RepoCommands, SettingsCommands, SshCommands,
};
