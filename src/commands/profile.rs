//! Profile command handlers.

use std::io::Read;

use crate::cli::ProfileCommands;
use crate::db::{CreateProfileInput, Profile, UpdateProfileInput};
use crate::error::{GitIdError, Result};
use crate::service::IdentityService;

use super::output::{Output, ago, or_dash};

pub async fn handle_profile(
    service: &IdentityService,
    out: Output,
    command: ProfileCommands,
) -> Result<()> {
    match command {
        ProfileCommands::List => {
            let profiles = service.get_profiles()?;
            let found_elsewhere =
                profiles.is_empty() && !out.is_json() && service.has_existing_identities().await;
            out.render(&profiles, |profiles| {
                if profiles.is_empty() {
                    println!("No profiles yet. Create one with 'gitid profile create' or 'gitid discover import'.");
                    if found_elsewhere {
                        println!("Git identities already exist on this machine; 'gitid discover run' lists them.");
                    }
                    return;
                }
                for p in profiles {
                    print_profile_line(p);
                }
            })
        }
        ProfileCommands::Create {
            label,
            username,
            email,
            provider,
            auth,
            ssh_key,
            host_alias,
            generate_key,
            token_stdin,
            color,
            default,
        } => {
            let token = if token_stdin { Some(read_token()?) } else { None };
            let profile = service
                .create_profile(CreateProfileInput {
                    label,
                    provider,
                    username,
                    email,
                    auth_method: auth,
                    ssh_key_path: ssh_key,
                    ssh_host_alias: host_alias,
                    generate_new_key: generate_key,
                    token,
                    color,
                    is_default: default,
                })
                .await?;
            out.render(&profile, |p| {
                println!("Created profile '{}' ({})", p.label, p.id);
                if let Some(alias) = &p.ssh_host_alias {
                    println!("  SSH host alias: {}", alias);
                }
                if p.is_default {
                    println!("  This is the default profile.");
                }
            })
        }
        ProfileCommands::Update {
            profile,
            label,
            username,
            email,
            provider,
            auth,
            ssh_key,
            host_alias,
            token_stdin,
            clear_token,
            color,
            default,
        } => {
            let target = resolve_profile(service, &profile)?;
            let token = if token_stdin {
                Some(read_token()?)
            } else if clear_token {
                Some(String::new())
            } else {
                None
            };
            let updated = service.update_profile(UpdateProfileInput {
                id: target.id,
                label,
                provider,
                username,
                email,
                auth_method: auth,
                ssh_key_path: ssh_key,
                ssh_host_alias: host_alias,
                token,
                color,
                is_default: default.then_some(true),
            })?;
            out.render(&updated, |p| println!("Updated profile '{}'", p.label))
        }
        ProfileCommands::Delete { profile } => {
            let target = resolve_profile(service, &profile)?;
            service.delete_profile(&target.id)?;
            out.render(&serde_json::json!({ "deleted": target.id }), |_| {
                println!("Deleted profile '{}'", target.label)
            })
        }
        ProfileCommands::SetDefault { profile } => {
            let target = resolve_profile(service, &profile)?;
            let updated = service.set_default_profile(&target.id)?;
            out.render(&updated, |p| println!("'{}' is now the default profile", p.label))
        }
        ProfileCommands::Switch { profile } => {
            let target = resolve_profile(service, &profile)?;
            let switch = service.switch_global(&target.id)?;
            out.render(&switch, |s| {
                println!(
                    "Global identity set to {} <{}>",
                    s.profile.username, s.profile.email
                );
                if let Some(id) = &s.backup_id {
                    println!("  Previous config saved as backup {}", id);
                }
            })
        }
        ProfileCommands::Current => {
            let current = service.get_current_global()?;
            out.render(&current, |c| {
                println!(
                    "user.name  = {}\nuser.email = {}",
                    or_dash(c.identity.username.as_deref()),
                    or_dash(c.identity.email.as_deref())
                );
                match &c.profile {
                    Some(p) => println!("Profile: {}", p.label),
                    None => println!("Profile: (no matching profile)"),
                }
            })
        }
    }
}

/// Find a profile by exact id, then by case-insensitive label.
pub(super) fn resolve_profile(service: &IdentityService, key: &str) -> Result<Profile> {
    let profiles = service.get_profiles()?;
    if let Some(p) = profiles.iter().find(|p| p.id == key) {
        return Ok(p.clone());
    }
    let matches: Vec<_> = profiles
        .into_iter()
        .filter(|p| p.label.eq_ignore_ascii_case(key))
        .collect();
    match matches.len() {
        0 => Err(GitIdError::not_found(format!("No profile matching '{}'", key))),
        1 => Ok(matches.into_iter().next().ok_or("profile vanished")?),
        _ => Err(GitIdError::validation(format!(
            "Multiple profiles are labelled '{}'. Use the id instead.",
            key
        ))),
    }
}

fn read_token() -> Result<String> {
    let mut token = String::new();
    std::io::stdin().read_to_string(&mut token)?;
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err(GitIdError::validation("No token on stdin"));
    }
    Ok(token)
}

fn print_profile_line(p: &Profile) {
    let marker = if p.is_default { "*" } else { " " };
    println!(
        "{} {:16} {:24} {:9} {:5} {:20} updated {}",
        marker,
        p.label,
        p.email,
        p.provider.as_str(),
        p.auth_method.as_str(),
        or_dash(p.ssh_host_alias.as_deref()),
        ago(&p.updated_at)
    );
}
