use std::process::ExitCode;

use clap::{CommandFactory, Parser};

use gitid::cli::{Cli, Commands};
use gitid::commands::{
    Output, handle_audit, handle_backup, handle_config, handle_discover, handle_profile,
    handle_repo, handle_settings, handle_ssh,
};
use gitid::config::Config;
use gitid::error::Result;
use gitid::logging::init_logging;
use gitid::service::IdentityService;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let out = Output::new(cli.global.json);

    match run(cli, out).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, code = e.code(), "command failed");
            out.error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, out: Output) -> Result<()> {
    let config = Config::load(cli.global.config.as_deref())?;
    init_logging(&config.log_level(), cli.global.verbose);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    // Commands that need neither the database nor the keychain.
    let command = match command {
        Commands::Version => {
            return out.render(
                &serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }),
                |_| println!("gitid {}", env!("CARGO_PKG_VERSION")),
            );
        }
        Commands::Config { command } => {
            return handle_config(&config, cli.global.config.as_deref(), out, command);
        }
        other => other,
    };

    let service = IdentityService::open(&config)?;
    match command {
        Commands::Profile { command } => handle_profile(&service, out, command).await,
        Commands::Repo { command } => handle_repo(&service, out, command).await,
        Commands::Discover { command } => {
            handle_discover(&service, out, config.scan_depth(), command).await
        }
        Commands::Ssh { command } => handle_ssh(&service, out, command).await,
        Commands::Backup { command } => handle_backup(&service, out, command),
        Commands::Audit { command } => handle_audit(&service, out, command),
        Commands::Settings { command } => handle_settings(&service, out, command),
        Commands::Version | Commands::Config { .. } => Ok(()),
    }
}
