//! gitid - manage several Git identities on one machine.
//!
//! This crate provides functionality to:
//! - Keep identity profiles (name, email, SSH key, host alias, token)
//! - Switch the global Git identity and bind repositories to a profile
//! - Edit `~/.gitconfig`, `.git/config` and `~/.ssh/config` with a backup
//!   taken before every write
//! - Record every mutation in an append-only, tamper-evident audit log
//! - Discover identities already present on the machine
//!
//! # Example
//!
//! ```no_run
//! use gitid::{Config, IdentityService};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let service = IdentityService::open(&config)?;
//!
//!     for profile in service.get_profiles()? {
//!         println!("{} <{}>", profile.label, profile.email);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod backup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod git;
pub mod keychain;
pub mod logging;
pub mod service;
pub mod ssh;
pub mod utils;

// Re-export commonly used types at the crate root
pub use config::Config;
pub use db::{Profile, Repository, init_db};
pub use error::{GitIdError, Result};
pub use service::{Components, Dependencies, Envelope, IdentityService};
