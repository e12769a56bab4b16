//! Settings command handlers.

use std::path::PathBuf;

use crate::cli::SettingsCommands;
use crate::db::{AppSettings, SettingsUpdate};
use crate::error::{GitIdError, Result};
use crate::service::IdentityService;

use super::output::{Output, ago};

pub fn handle_settings(service: &IdentityService, out: Output, command: SettingsCommands) -> Result<()> {
    match command {
        SettingsCommands::Get => {
            let settings = service.get_settings()?;
            out.render(&settings, print_settings)
        }
        SettingsCommands::Set { key, value } => {
            let settings = service.update_settings(parse_update(&key, &value)?)?;
            out.render(&settings, |_| println!("{} updated", key))
        }
    }
}

/// Turn `settings set KEY VALUE` into a partial update.
fn parse_update(key: &str, value: &str) -> Result<SettingsUpdate> {
    let mut update = SettingsUpdate::default();
    match key {
        "theme" => update.theme = Some(value.parse()?),
        "auto_scan_on_startup" => update.auto_scan_on_startup = Some(parse_bool(key, value)?),
        "show_mismatch_warnings" => update.show_mismatch_warnings = Some(parse_bool(key, value)?),
        "pre_push_hook_enabled" => update.pre_push_hook_enabled = Some(parse_bool(key, value)?),
        "first_run_complete" => update.first_run_complete = Some(parse_bool(key, value)?),
        "backup_retention_days" => {
            update.backup_retention_days = Some(value.parse().map_err(|_| {
                GitIdError::validation(format!("Invalid number for {}: {}", key, value))
            })?)
        }
        "default_scan_directories" => {
            let dirs = value
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|d| std::path::absolute(crate::utils::expand_tilde(d)))
                .collect::<std::io::Result<Vec<PathBuf>>>()?;
            update.default_scan_directories = Some(dirs);
        }
        _ => {
            return Err(GitIdError::validation(format!(
                "Unknown setting: {}. Valid settings: theme, auto_scan_on_startup, \
                 show_mismatch_warnings, default_scan_directories, backup_retention_days, \
                 pre_push_hook_enabled, first_run_complete",
                key
            )));
        }
    }
    Ok(update)
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(GitIdError::validation(format!(
            "Invalid value for {}: {} (use true or false)",
            key, value
        ))),
    }
}

fn print_settings(s: &AppSettings) {
    let dirs: Vec<String> = s
        .default_scan_directories
        .iter()
        .map(|d| d.display().to_string())
        .collect();
    println!("theme                    = {:?}", s.theme);
    println!("auto_scan_on_startup     = {}", s.auto_scan_on_startup);
    println!("show_mismatch_warnings   = {}", s.show_mismatch_warnings);
    println!("default_scan_directories = {}", dirs.join(", "));
    println!("backup_retention_days    = {}", s.backup_retention_days);
    println!("pre_push_hook_enabled    = {}", s.pre_push_hook_enabled);
    println!("first_run_complete       = {}", s.first_run_complete);
    println!(
        "last_discovery_at        = {}",
        s.last_discovery_at.as_ref().map(ago).unwrap_or_else(|| "never".into())
    );
}
