//! Remote URL classification.
//!
//! Remotes are never stored; they are re-derived from `.git/config` each
//! time a repository is read.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::Provider;

/// Transport style of a remote URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    Ssh,
    Https,
}

/// A configured remote of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remote {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: RemoteKind,
    pub provider: Option<Provider>,
    pub owner: Option<String>,
    pub repo: Option<String>,
}

/// Hostname substrings that identify a provider. First match wins.
const PROVIDER_HOSTS: &[(&str, Provider)] = &[
    ("github", Provider::Github),
    ("gitlab", Provider::Gitlab),
    ("bitbucket", Provider::Bitbucket),
    ("azure", Provider::Azure),
    ("visualstudio", Provider::Azure),
];

/// Remote URL shapes. Each captures `host`, `owner` (may contain `/` for
/// nested groups) and `repo` without a trailing `.git`.
static URL_PATTERNS: LazyLock<Vec<(RemoteKind, Regex)>> = LazyLock::new(|| {
    [
        (
            RemoteKind::Ssh,
            r"^ssh://(?:[^@/]+@)?(?P<host>[\w.-]+)(?::\d+)?/(?P<owner>[\w.~/-]+)/(?P<repo>[\w.-]+?)(?:\.git)?/?$",
        ),
        (
            RemoteKind::Ssh,
            r"^[\w.-]+@(?P<host>[\w.-]+):(?P<owner>[\w.~/-]+)/(?P<repo>[\w.-]+?)(?:\.git)?/?$",
        ),
        (
            RemoteKind::Https,
            r"^https?://(?:[^@/]+@)?(?P<host>[\w.-]+)(?::\d+)?/(?P<owner>[\w.~/-]+)/(?P<repo>[\w.-]+?)(?:\.git)?/?$",
        ),
    ]
    .into_iter()
    .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (kind, re)))
    .collect()
});

/// Infer a provider from a hostname (or SSH host alias).
pub fn detect_provider(host: &str) -> Option<Provider> {
    let host = host.to_ascii_lowercase();
    PROVIDER_HOSTS
        .iter()
        .find(|(needle, _)| host.contains(needle))
        .map(|(_, provider)| *provider)
}

/// Classify a remote URL. Unrecognized URLs are treated as HTTPS with no
/// provider, owner or repo.
pub fn parse_remote_url(name: &str, url: &str) -> Remote {
    let trimmed = url.trim();
    for (kind, re) in URL_PATTERNS.iter() {
        if let Some(caps) = re.captures(trimmed) {
            let host = &caps["host"];
            return Remote {
                name: name.to_string(),
                url: trimmed.to_string(),
                kind: *kind,
                provider: detect_provider(host),
                owner: Some(caps["owner"].to_string()),
                repo: Some(caps["repo"].to_string()),
            };
        }
    }
    Remote {
        name: name.to_string(),
        url: trimmed.to_string(),
        kind: RemoteKind::Https,
        provider: None,
        owner: None,
        repo: None,
    }
}

/// Rewrite an SSH remote URL so it connects through `alias` instead of the
/// real host. HTTPS and unrecognized URLs yield `None`.
pub fn with_host_alias(remote: &Remote, alias: &str) -> Option<String> {
    if remote.kind != RemoteKind::Ssh {
        return None;
    }
    let owner = remote.owner.as_deref()?;
    let repo = remote.repo.as_deref()?;
    Some(format!("git@{}:{}/{}.git", alias, owner, repo))
}
