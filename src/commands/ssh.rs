//! SSH command handlers.

use crate::cli::SshCommands;
use crate::error::{GitIdError, Result};
use crate::service::IdentityService;
use crate::ssh::GenerateKeyOptions;

use super::output::{Output, or_dash};

pub async fn handle_ssh(service: &IdentityService, out: Output, command: SshCommands) -> Result<()> {
    match command {
        SshCommands::Keys => {
            let keys = service.list_keys().await?;
            out.render(&keys, |keys| {
                if keys.is_empty() {
                    println!("No key pairs in {}", service.paths().ssh_dir.display());
                }
                for key in keys {
                    println!(
                        "{:24} {:8} {:28} {}",
                        key.name,
                        key.key_type,
                        or_dash(key.comment.as_deref()),
                        or_dash(key.fingerprint.as_deref())
                    );
                }
            })
        }
        SshCommands::Generate {
            email,
            label,
            key_type,
        } => {
            let info = service
                .generate_key(&GenerateKeyOptions {
                    email,
                    label,
                    key_type,
                })
                .await?;
            out.render(&info, |k| {
                println!("Generated {} key {}", k.key_type, k.path.display());
                println!("Public key: {}", k.public_key_path.display());
            })
        }
        SshCommands::Pubkey { key } => {
            let path = if key.components().count() == 1 {
                service.paths().ssh_dir.join(&key)
            } else {
                key
            };
            let public = service.get_public_key(&path)?.ok_or_else(|| {
                GitIdError::not_found(format!("No public key next to {}", path.display()))
            })?;
            out.render(&public, |text| println!("{}", text.trim_end()))
        }
        SshCommands::Config => {
            let entries = service.get_ssh_config()?;
            out.render(&entries, |entries| {
                for e in entries {
                    println!(
                        "{:24} {:24} {}",
                        e.host,
                        or_dash(e.host_name.as_deref()),
                        or_dash(e.identity_file.as_deref())
                    );
                }
            })
        }
    }
}
