//! `~/.ssh/config` host stanzas.
//!
//! Parsing follows the usual `Key Value` / `Key=Value` rules. Editing treats
//! the file as a sequence of opaque text blocks (preamble, `Host` stanzas,
//! `Match` blocks) so that replacing or removing one stanza leaves every other
//! byte untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One `Host` stanza.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConfigEntry {
    /// The full `Host` value (alias, or space-separated patterns).
    pub host: String,
    pub host_name: Option<String>,
    pub user: Option<String>,
    pub identity_file: Option<String>,
    pub identities_only: Option<bool>,
    pub port: Option<u16>,
    /// Any other directives, keyed as written.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
    #[serde(default)]
    pub is_wildcard: bool,
}

impl SshConfigEntry {
    /// A stanza that pins `alias` to one key on `host_name`.
    pub fn for_identity(alias: &str, host_name: &str, identity_file: &str) -> Self {
        Self {
            host: alias.to_string(),
            host_name: Some(host_name.to_string()),
            user: Some("git".to_string()),
            identity_file: Some(identity_file.to_string()),
            identities_only: Some(true),
            ..Default::default()
        }
    }

    /// Render as config text, ending with a newline.
    pub fn render(&self) -> String {
        let mut out = format!("Host {}\n", self.host);
        if let Some(v) = &self.host_name {
            out.push_str(&format!("    HostName {}\n", v));
        }
        if let Some(v) = &self.user {
            out.push_str(&format!("    User {}\n", v));
        }
        if let Some(v) = self.port {
            out.push_str(&format!("    Port {}\n", v));
        }
        if let Some(v) = &self.identity_file {
            out.push_str(&format!("    IdentityFile {}\n", v));
        }
        if let Some(v) = self.identities_only {
            out.push_str(&format!("    IdentitiesOnly {}\n", if v { "yes" } else { "no" }));
        }
        for (k, v) in &self.extra {
            out.push_str(&format!("    {} {}\n", k, v));
        }
        out
    }
}

/// Parse every `Host` stanza. Wildcard stanzas are kept and flagged.
pub fn parse(content: &str) -> Vec<SshConfigEntry> {
    let mut entries = Vec::new();
    let mut current: Option<SshConfigEntry> = None;

    for line in content.lines() {
        let Some((key, value)) = split_directive(line) else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "host" => {
                entries.extend(current.take());
                current = Some(SshConfigEntry {
                    host: value.to_string(),
                    is_wildcard: value.contains(['*', '?', '!']),
                    ..Default::default()
                });
            }
            "match" => {
                entries.extend(current.take());
            }
            lower => {
                let Some(entry) = current.as_mut() else {
                    continue;
                };
                // First value wins, as in ssh itself.
                match lower {
                    "hostname" => {
                        entry.host_name.get_or_insert_with(|| value.to_string());
                    }
                    "user" => {
                        entry.user.get_or_insert_with(|| value.to_string());
                    }
                    "identityfile" => {
                        entry.identity_file.get_or_insert_with(|| value.to_string());
                    }
                    "identitiesonly" => {
                        entry
                            .identities_only
                            .get_or_insert(value.eq_ignore_ascii_case("yes"));
                    }
                    "port" if value.parse::<u16>().is_ok() => {
                        entry.port = entry.port.or(value.parse().ok());
                    }
                    _ => {
                        entry
                            .extra
                            .entry(key.to_string())
                            .or_insert_with(|| value.to_string());
                    }
                }
            }
        }
    }
    entries.extend(current);
    entries
}

/// Replace the stanza whose `Host` value equals `entry.host`, or append one.
pub fn upsert(content: &str, entry: &SshConfigEntry) -> String {
    let mut blocks = split_blocks(content);
    let rendered = entry.render();

    if let Some(block) = blocks
        .iter_mut()
        .find(|b| b.host.as_deref() == Some(entry.host.as_str()))
    {
        block.text = format!("{}{}", rendered, trailer(&block.text));
        return blocks.into_iter().map(|b| b.text).collect();
    }

    let mut out = content.to_string();
    if !out.is_empty() {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        if !out.ends_with("\n\n") {
            out.push('\n');
        }
    }
    out.push_str(&rendered);
    out
}

/// Drop the stanza whose `Host` value equals `alias`. Comments trailing it
/// are kept; blank lines that would double up with the preceding separator
/// are not. Returns `None` when no stanza matched.
pub fn remove(content: &str, alias: &str) -> Option<String> {
    let blocks = split_blocks(content);
    let idx = blocks
        .iter()
        .position(|b| b.host.as_deref() == Some(alias))?;
    let last = blocks.len() - 1;

    let mut out = String::with_capacity(content.len());
    for (i, block) in blocks.into_iter().enumerate() {
        if i != idx {
            out.push_str(&block.text);
            continue;
        }
        let rest = trailer(&block.text);
        if out.is_empty() || out.ends_with("\n\n") {
            out.push_str(skip_blank_lines(rest));
        } else {
            out.push_str(rest);
        }
    }
    // The separator `upsert` put in front of an appended stanza goes with it.
    if idx == last && out.ends_with("\n\n") {
        out.pop();
    }
    Some(out)
}

struct Block {
    /// `Host` value for host stanzas; `None` for the preamble and `Match`.
    host: Option<String>,
    text: String,
}

fn split_blocks(content: &str) -> Vec<Block> {
    let mut blocks = vec![Block {
        host: None,
        text: String::new(),
    }];
    for line in content.split_inclusive('\n') {
        if let Some((key, value)) = split_directive(line) {
            let key = key.to_ascii_lowercase();
            if key == "host" || key == "match" {
                blocks.push(Block {
                    host: (key == "host").then(|| value.to_string()),
                    text: String::new(),
                });
            }
        }
        if let Some(block) = blocks.last_mut() {
            block.text.push_str(line);
        }
    }
    blocks
}

/// Blank and comment lines after a block's last directive.
fn trailer(text: &str) -> &str {
    let mut end_of_directives = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        offset += line.len();
        if split_directive(line).is_some() {
            end_of_directives = offset;
        }
    }
    &text[end_of_directives..]
}

fn skip_blank_lines(text: &str) -> &str {
    let mut start = 0;
    for line in text.split_inclusive('\n') {
        if !line.trim().is_empty() {
            break;
        }
        start += line.len();
    }
    &text[start..]
}

/// `Key Value` or `Key=Value`; `None` for blanks and comments.
fn split_directive(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (key, value) = match line.find(|c: char| c == '=' || c.is_whitespace()) {
        Some(pos) => (&line[..pos], &line[pos + 1..]),
        None => (line, ""),
    };
    let value = value.trim_start_matches(|c: char| c == '=' || c.is_whitespace());
    Some((key, value.trim()))
}
