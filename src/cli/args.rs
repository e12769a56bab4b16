//! CLI argument parsing structures.

use clap::{ArgAction, Args, Parser};
use std::path::PathBuf;

use super::commands::Commands;

/// Main CLI structure for gitid.
#[derive(Parser, Debug)]
#[command(name = "gitid")]
#[command(about = "Manage multiple Git identities", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Global arguments available to all commands.
#[derive(Debug, Default, Args)]
pub struct GlobalArgs {
    /// Print results as a JSON envelope on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of the standard search path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase diagnostic output (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}
