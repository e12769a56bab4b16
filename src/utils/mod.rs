//! Filesystem, path and process helpers shared across components.

pub mod fs;
pub mod hash;
pub mod paths;
pub(crate) mod permissions;
pub mod process;

pub use hash::sha256_hex;
pub use paths::{AppPaths, collapse_home, expand_tilde, expand_with_home};
pub use permissions::{restrict_dir_permissions, restrict_file_permissions};
