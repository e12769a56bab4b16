//! Configuration loading and management.

mod loader;
mod types;

pub use types::{
    Config, DEFAULT_COMMAND_TIMEOUT, DEFAULT_LOG_LEVEL, DEFAULT_SCAN_DEPTH, Defaults, SETTING_KEYS,
};
