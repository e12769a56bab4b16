//! Backup command handlers.

use crate::backup::BackupInfo;
use crate::cli::BackupCommands;
use crate::error::Result;
use crate::service::IdentityService;

use super::output::{Output, ago};

pub fn handle_backup(service: &IdentityService, out: Output, command: BackupCommands) -> Result<()> {
    match command {
        BackupCommands::List { backup_type } => {
            let backups = service.list_backups(backup_type)?;
            out.render(&backups, |backups| {
                if backups.is_empty() {
                    println!("No backups.");
                }
                for b in backups {
                    print_backup_line(b);
                }
            })
        }
        BackupCommands::Restore { id } => {
            let info = service.restore_backup(&id)?;
            out.render(&serde_json::json!({ "restored": true, "backup": info }), |_| {
                println!("Restored {} from backup {}", info.original_path.display(), info.id)
            })
        }
        BackupCommands::Delete { id } => {
            let info = service.delete_backup(&id)?;
            out.render(&info, |b| println!("Deleted backup {}", b.id))
        }
        BackupCommands::Verify { id } => {
            let info = service.verify_backup(&id)?;
            out.render(&info, |b| println!("Backup {} is intact ({})", b.id, b.hash))
        }
        BackupCommands::Cleanup { days } => {
            let removed = service.cleanup_backups(days)?;
            out.render(&serde_json::json!({ "removed": removed }), |_| {
                println!("Removed {} old backup(s)", removed)
            })
        }
    }
}

fn print_backup_line(b: &BackupInfo) {
    println!(
        "{}  {:18} {:14} {}{}  ({})",
        &b.id[..8.min(b.id.len())],
        b.backup_type.as_str(),
        ago(&b.timestamp),
        b.original_path.display(),
        if b.restored { " [restored]" } else { "" },
        b.reason
    );
}
