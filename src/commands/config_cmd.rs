//! Config file command handlers.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::cli::ConfigCommands;
use crate::config::{Config, SETTING_KEYS};
use crate::error::Result;

use super::output::Output;

/// Handle `gitid config`. `explicit` is the `--config` path, if given.
pub fn handle_config(
    config: &Config,
    explicit: Option<&Path>,
    out: Output,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => show(config, explicit, out),
        Some(ConfigCommands::Init { path, overwrite }) => {
            let written = Config::generate_config_file(path.or_else(|| explicit.map(Path::to_path_buf)), overwrite)?;
            out.render(&json!({ "path": written }), |_| {
                println!("Config written to: {}", written.display())
            })
        }
        Some(ConfigCommands::Get { key }) => {
            let value = config.get_default(&key)?;
            out.render(&json!({ "key": key, "value": value }), |_| println!("{}", value))
        }
        Some(ConfigCommands::Set { key, value }) => {
            let path = config_path(explicit);
            let mut updated = config.clone();
            updated.set_default(&key, &value)?;
            updated.save(&path)?;
            out.render(&json!({ "key": key, "value": value, "path": path }), |_| {
                println!("Set {} = {} in {}", key, value, path.display())
            })
        }
    }
}

fn show(config: &Config, explicit: Option<&Path>, out: Output) -> Result<()> {
    let source = explicit
        .map(Path::to_path_buf)
        .or_else(Config::find_existing_config);
    let mut values = serde_json::Map::new();
    for key in SETTING_KEYS {
        values.insert((*key).to_string(), json!(config.get_default(key)?));
    }
    out.render(&json!({ "path": source, "values": values }), |_| {
        match &source {
            Some(path) => println!("# {}", path.display()),
            None => println!("# no config file found; showing built-in defaults"),
        }
        for key in SETTING_KEYS {
            if let Some(value) = values.get(*key).and_then(|v| v.as_str()) {
                println!("{:16} = {}", key, value);
            }
        }
    })
}

/// File that `config set` rewrites.
fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(Config::find_existing_config)
        .unwrap_or_else(Config::default_config_path)
}
