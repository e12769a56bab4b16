//! Repository command handlers.

use std::path::{Path, PathBuf};

use crate::cli::RepoCommands;
use crate::db::{RepoStatus, Repository};
use crate::error::Result;
use crate::git::AccessStatus;
use crate::service::{BindOptions, IdentityService, ScanOptions};

use super::output::{Output, ago, or_dash};
use super::profile::resolve_profile;

pub async fn handle_repo(service: &IdentityService, out: Output, command: RepoCommands) -> Result<()> {
    match command {
        RepoCommands::Scan { dirs, depth } => {
            let directories = dirs.iter().map(|d| absolute(d)).collect::<Result<Vec<_>>>()?;
            let result = service
                .scan_repositories(ScanOptions {
                    directories,
                    max_depth: depth,
                })
                .await?;
            out.render(&result, |r| {
                for repo in &r.repositories {
                    print_repo_line(repo);
                }
                println!(
                    "Found {} repositories in {} ms",
                    r.repositories.len(),
                    r.duration_ms
                );
                for error in &r.errors {
                    eprintln!("  warning: {}", error);
                }
            })
        }
        RepoCommands::List { mismatched } => {
            let mut repos = service.list_repositories().await?;
            if mismatched {
                repos.retain(|r| r.has_mismatch);
            }
            out.render(&repos, |repos| {
                if repos.is_empty() {
                    println!("No repositories. Run 'gitid repo scan <dir>' first.");
                }
                for repo in repos {
                    print_repo_line(repo);
                }
            })
        }
        RepoCommands::Show { path } => {
            let repo = service.get_repository(&absolute(&path)?).await?;
            out.render(&repo, print_repo_detail)
        }
        RepoCommands::Bind {
            profile,
            path,
            host_alias,
        } => {
            let target = resolve_profile(service, &profile)?;
            let repo = service
                .bind_repository(
                    &absolute(&path)?,
                    &target.id,
                    BindOptions {
                        use_host_alias: host_alias,
                    },
                )
                .await?;
            out.render(&repo, |r| {
                println!("Bound {} to '{}'", r.path.display(), target.label);
                if let Some(origin) = r.remotes.iter().find(|x| x.name == "origin") {
                    println!("  origin: {}", origin.url);
                }
            })
        }
        RepoCommands::Unbind { path } => {
            let repo = service.unbind_repository(&absolute(&path)?).await?;
            out.render(&repo, |r| println!("Unbound {}", r.path.display()))
        }
        RepoCommands::Forget { path } => {
            let path = absolute(&path)?;
            service.forget_repository(&path)?;
            out.render(&serde_json::json!({ "forgotten": &path }), |_| {
                println!("No longer tracking {}", path.display())
            })
        }
        RepoCommands::Validate { path } => {
            let check = service.validate_repository(&absolute(&path)?).await?;
            out.render(&check, |c| {
                let verdict = match c.status {
                    AccessStatus::Success => "ok",
                    AccessStatus::PermissionDenied => "permission denied",
                    AccessStatus::HostUnreachable => "host unreachable",
                    AccessStatus::Failed => "failed",
                };
                println!(
                    "{} ({}): {}",
                    verdict,
                    or_dash(c.remote.as_deref()),
                    c.message
                );
            })?;
            if out.is_json() {
                return Ok(());
            }
            check.into_result().map(|_| ())
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

fn status_label(status: RepoStatus) -> &'static str {
    match status {
        RepoStatus::Bound => "bound",
        RepoStatus::Unbound => "unbound",
        RepoStatus::Mismatch => "MISMATCH",
        RepoStatus::Error => "error",
    }
}

fn print_repo_line(repo: &Repository) {
    println!(
        "{:9} {:24} {}",
        status_label(repo.status),
        or_dash(repo.local_email.as_deref()),
        repo.path.display()
    );
}

fn print_repo_detail(repo: &Repository) {
    println!("{} ({})", repo.name, repo.path.display());
    println!("  status:   {}", status_label(repo.status));
    println!("  profile:  {}", or_dash(repo.bound_profile_id.as_deref()));
    println!("  email:    {}", or_dash(repo.local_email.as_deref()));
    println!("  name:     {}", or_dash(repo.local_username.as_deref()));
    if let Some(details) = &repo.mismatch_details {
        println!("  problem:  {}", details);
    }
    for remote in &repo.remotes {
        println!("  remote:   {} {}", remote.name, remote.url);
    }
    println!("  accessed: {}", ago(&repo.last_accessed));
}
