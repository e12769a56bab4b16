//! Discovery command handlers.

use crate::cli::{DiscoverArgs, DiscoverCommands};
use crate::discovery::{DiscoveredIdentity, DiscoveryOptions, IdentitySource};
use crate::error::Result;
use crate::service::IdentityService;

use super::output::{Output, or_dash};

pub async fn handle_discover(
    service: &IdentityService,
    out: Output,
    default_depth: usize,
    command: DiscoverCommands,
) -> Result<()> {
    match command {
        DiscoverCommands::Run { args } => {
            let result = service
                .start_discovery(options_from(args, default_depth)?)
                .await?;
            out.render(&result, |r| {
                println!(
                    "Found {} key(s), {} SSH host(s), {} repositories in {} ms",
                    r.ssh_keys.len(),
                    r.ssh_config_entries.len(),
                    r.repositories.len(),
                    r.duration_ms
                );
                if r.identities.is_empty() {
                    println!("No identities found.");
                }
                for identity in &r.identities {
                    print_identity(identity);
                }
                for error in &r.errors {
                    eprintln!("  warning: {}", error);
                }
            })
        }
        DiscoverCommands::Import { args, emails } => {
            let mut found = service
                .start_discovery(options_from(args, default_depth)?)
                .await?
                .identities;
            if !emails.is_empty() {
                for identity in &mut found {
                    identity.selected = identity
                        .email
                        .as_deref()
                        .is_some_and(|e| emails.iter().any(|want| want.eq_ignore_ascii_case(e)));
                }
            }
            let result = service.import_identities(found).await?;
            out.render(&result, |r| {
                for p in &r.profiles {
                    println!("Imported '{}' <{}>", p.label, p.email);
                }
                for reason in &r.skipped {
                    println!("Skipped {}", reason);
                }
                println!("{} profile(s) imported", r.imported);
            })
        }
    }
}

fn options_from(args: DiscoverArgs, default_depth: usize) -> Result<DiscoveryOptions> {
    let scan_directories = args
        .dirs
        .iter()
        .map(std::path::absolute)
        .collect::<std::io::Result<Vec<_>>>()?;
    Ok(DiscoveryOptions {
        scan_ssh_keys: !args.no_ssh_keys,
        scan_ssh_config: !args.no_ssh_config,
        scan_git_config: !args.no_git_config,
        scan_repositories: !args.no_repos,
        scan_directories,
        max_depth: args.depth.unwrap_or(default_depth),
        ..Default::default()
    })
}

fn print_identity(identity: &DiscoveredIdentity) {
    let source = match identity.source {
        IdentitySource::SshKey => "ssh key",
        IdentitySource::GitConfig => "git config",
        IdentitySource::SshConfig => "ssh config",
        IdentitySource::CredentialHelper => "credentials",
    };
    println!(
        "  {:12} {:28} {:10} via {}",
        identity.suggested_label,
        or_dash(identity.email.as_deref()),
        identity.provider.map(|p| p.as_str()).unwrap_or("-"),
        source
    );
}
