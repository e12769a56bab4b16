//! Git config files, remotes and the repositories that own them.

pub mod config_file;
mod mutator;
pub mod remote;

#[cfg(test)]
pub(crate) use mutator::testing;
pub use mutator::{
    AccessCheck, AccessStatus, GitCli, GitIdentity, GitMutator, GitOperations, GitTransport,
    classify_fetch, git_dir, is_git_repo, local_config_path,
};
pub use remote::{Remote, RemoteKind, detect_provider, parse_remote_url};
