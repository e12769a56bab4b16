//! Command handlers for the gitid CLI.
//!
//! Each handler calls into [`IdentityService`](crate::service::IdentityService)
//! and renders the result through [`Output`], either as text or as the JSON
//! envelope.

mod audit;
mod backup;
mod config_cmd;
mod discover;
mod output;
mod profile;
mod repo;
mod settings;
mod ssh;

pub use audit::handle_audit;
pub use backup::handle_backup;
pub use config_cmd::handle_config;
pub use discover::handle_discover;
pub use output::Output;
pub use profile::handle_profile;
pub use repo::handle_repo;
pub use settings::handle_settings;
pub use ssh::handle_ssh;
