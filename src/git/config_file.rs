//! Reading and editing Git config files.
//!
//! Only the subset needed for identity switching is understood: section
//! headers (with optional quoted subsection), `key = value` entries, quoted
//! values and `#`/`;` comments. Edits rewrite a single line (or insert one)
//! and keep every other byte of the file as it was.

use std::collections::BTreeMap;
use std::path::Path;

use super::remote::{Remote, parse_remote_url};
use crate::error::Result;
use crate::utils::fs::read_string_optional;

/// Flat view of a config file: lower-cased `section.key` (or
/// `section.subsection.key`, subsection verbatim) to value. Later entries win.
pub type GitConfigMap = BTreeMap<String, String>;

/// Parse config text into a flat key map.
pub fn parse(content: &str) -> GitConfigMap {
    let mut map = GitConfigMap::new();
    let mut section: Option<(String, Option<String>)> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_comment(trimmed) {
            continue;
        }
        if trimmed.starts_with('[') {
            section = parse_header(trimmed);
            continue;
        }
        let Some((name, sub)) = &section else {
            continue;
        };
        if let Some((key, value)) = parse_entry(trimmed) {
            let full = match sub {
                Some(sub) => format!("{}.{}.{}", name, sub, key),
                None => format!("{}.{}", name, key),
            };
            map.insert(full, value);
        }
    }
    map
}

/// Parse a config file. A missing file is an empty map.
pub fn parse_file(path: &Path) -> Result<GitConfigMap> {
    Ok(read_string_optional(path)?
        .map(|content| parse(&content))
        .unwrap_or_default())
}

/// Classified remotes of a parsed config, `origin` first, others by name.
pub fn remotes(map: &GitConfigMap) -> Vec<Remote> {
    let mut remotes: Vec<Remote> = map
        .iter()
        .filter_map(|(key, url)| {
            let name = key.strip_prefix("remote.")?.strip_suffix(".url")?;
            Some(parse_remote_url(name, url))
        })
        .collect();
    remotes.sort_by_key(|r| (r.name != "origin", r.name.clone()));
    remotes
}

/// Set `section[.subsection].key = value` in config text.
///
/// The last existing occurrence of the key is rewritten in place (keeping its
/// indentation and line ending). Without one, the entry is appended to the
/// last matching section; without that, a new section is appended.
pub fn set_value(
    content: &str,
    section: &str,
    subsection: Option<&str>,
    key: &str,
    value: &str,
) -> String {
    let section_lc = section.to_ascii_lowercase();
    let key_lc = key.to_ascii_lowercase();
    let lines: Vec<&str> = content.split_inclusive('\n').collect();

    let mut in_target = false;
    let mut last_key_line = None;
    let mut last_section_line = None;

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_target = parse_header(trimmed)
                .is_some_and(|(name, sub)| name == section_lc && sub.as_deref() == subsection);
            if in_target {
                last_section_line = Some(i);
            }
            continue;
        }
        if !in_target || trimmed.is_empty() || is_comment(trimmed) {
            continue;
        }
        last_section_line = Some(i);
        if parse_entry(trimmed).is_some_and(|(k, _)| k == key_lc) {
            last_key_line = Some(i);
        }
    }

    let rendered = format!("{} = {}", key, quote_value(value));
    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();

    if let Some(i) = last_key_line {
        let line = lines[i];
        let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
        out[i] = format!("{}{}{}", indent, rendered, line_ending(line));
    } else if let Some(i) = last_section_line {
        let eol = match line_ending(lines[i]) {
            "" => "\n",
            eol => eol,
        };
        if !out[i].ends_with('\n') {
            out[i].push_str(eol);
        }
        out.insert(i + 1, format!("\t{}{}", rendered, eol));
    } else {
        let mut text = out.concat();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&render_header(section, subsection));
        text.push('\n');
        text.push('\t');
        text.push_str(&rendered);
        text.push('\n');
        return text;
    }

    out.concat()
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with('#') || trimmed.starts_with(';')
}

fn line_ending(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

/// `[section]`, `[section "sub"]` or legacy `[section.sub]`.
fn parse_header(trimmed: &str) -> Option<(String, Option<String>)> {
    let inner = trimmed.strip_prefix('[')?;
    let inner = &inner[..inner.find(']')?];
    let inner = inner.trim();

    if let Some((name, rest)) = inner.split_once(char::is_whitespace) {
        let rest = rest.trim();
        let sub = rest
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
            .unwrap_or(rest);
        let sub = sub.replace("\\\"", "\"").replace("\\\\", "\\");
        return Some((name.to_ascii_lowercase(), Some(sub)));
    }
    if let Some((name, sub)) = inner.split_once('.') {
        return Some((name.to_ascii_lowercase(), Some(sub.to_ascii_lowercase())));
    }
    Some((inner.to_ascii_lowercase(), None))
}

fn render_header(section: &str, subsection: Option<&str>) -> String {
    match subsection {
        Some(sub) => format!(
            "[{} \"{}\"]",
            section,
            sub.replace('\\', "\\\\").replace('"', "\\\"")
        ),
        None => format!("[{}]", section),
    }
}

/// `key = value` or a bare `key` (boolean true).
fn parse_entry(trimmed: &str) -> Option<(String, String)> {
    let (key, raw) = match trimmed.split_once('=') {
        Some((k, v)) => (k.trim(), Some(v)),
        None => (trimmed, None),
    };
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }
    let value = raw.map(parse_value).unwrap_or_else(|| "true".to_string());
    Some((key.to_ascii_lowercase(), value))
}

fn parse_value(raw: &str) -> String {
    let mut out = String::new();
    let mut in_quotes = false;
    let mut quoted_len = 0;
    let mut chars = raw.trim_start().chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                quoted_len = out.len();
            }
            '\\' => {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => {}
                }
                quoted_len = out.len();
            }
            '#' | ';' if !in_quotes => break,
            c => {
                out.push(c);
                if in_quotes {
                    quoted_len = out.len();
                }
            }
        }
    }

    let keep = out.trim_end().len().max(quoted_len);
    out.truncate(keep);
    out
}

fn quote_value(value: &str) -> String {
    let needs_quotes = value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace)
        || value.contains(['#', ';', '"', '\\']);
    if !needs_quotes {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
