//! Audit entry type, secret redaction and the integrity checksum.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GitIdError;
use crate::utils::sha256_hex;

/// Replacement written in place of any secret-looking detail value.
pub const REDACTED: &str = "[REDACTED]";

/// Detail keys containing any of these (case-insensitive) are redacted.
const SECRET_KEY_PATTERNS: &[&str] = &["password", "token", "secret", "private"];

/// Area of the system an audited action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Profile,
    Repository,
    Ssh,
    GitConfig,
    Discovery,
    Backup,
    Settings,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Profile => "profile",
            AuditCategory::Repository => "repository",
            AuditCategory::Ssh => "ssh",
            AuditCategory::GitConfig => "git_config",
            AuditCategory::Discovery => "discovery",
            AuditCategory::Backup => "backup",
            AuditCategory::Settings => "settings",
        }
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditCategory {
    type Err = GitIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "profile" => Ok(AuditCategory::Profile),
            "repository" | "repo" => Ok(AuditCategory::Repository),
            "ssh" => Ok(AuditCategory::Ssh),
            "git_config" => Ok(AuditCategory::GitConfig),
            "discovery" => Ok(AuditCategory::Discovery),
            "backup" => Ok(AuditCategory::Backup),
            "settings" => Ok(AuditCategory::Settings),
            other => Err(GitIdError::validation(format!(
                "Unknown audit category '{}'",
                other
            ))),
        }
    }
}

/// Optional attributes of an audited action.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub affected_paths: Vec<PathBuf>,
    pub reversible: bool,
    pub backup_id: Option<String>,
}

impl LogOptions {
    /// Options for a file mutation guarded by `backup_id`.
    pub fn for_write(path: impl Into<PathBuf>, backup_id: Option<String>) -> Self {
        Self {
            affected_paths: vec![path.into()],
            reversible: backup_id.is_some(),
            backup_id,
        }
    }
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    pub action: String,
    pub details: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_paths: Vec<PathBuf>,
    #[serde(default)]
    pub reversible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
    #[serde(default)]
    pub checksum: String,
}

impl AuditLogEntry {
    /// Build a sealed entry: details are redacted, then the checksum is
    /// computed over everything else.
    pub fn new(
        timestamp: DateTime<Utc>,
        category: AuditCategory,
        action: impl Into<String>,
        details: &Value,
        options: LogOptions,
    ) -> Self {
        let mut entry = Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            category,
            action: action.into(),
            details: sanitize(details),
            affected_paths: options.affected_paths,
            reversible: options.reversible,
            backup_id: options.backup_id,
            checksum: String::new(),
        };
        entry.checksum = entry.compute_checksum();
        entry
    }

    /// SHA-256 over the canonical JSON of every field except `checksum`.
    pub fn compute_checksum(&self) -> String {
        let mut value = match serde_json::to_value(self) {
            Ok(v) => v,
            Err(_) => return String::new(),
        };
        if let Value::Object(map) = &mut value {
            map.remove("checksum");
        }
        let mut canonical = String::new();
        write_canonical(&value, &mut canonical);
        sha256_hex(canonical.as_bytes())
    }

    /// True when the stored checksum matches the entry's content.
    pub fn verify(&self) -> bool {
        !self.checksum.is_empty() && self.checksum == self.compute_checksum()
    }
}

/// Recursively redact values whose key looks like a secret.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    let v = if is_secret_key(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        sanitize(v)
                    };
                    (key.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        other => other.clone(),
    }
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SECRET_KEY_PATTERNS.iter().any(|p| key.contains(p))
}

/// JSON with object keys sorted at every level, no insignificant whitespace.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(details: Value) -> AuditLogEntry {
        AuditLogEntry::new(
            Utc::now(),
            AuditCategory::Profile,
            "create",
            &details,
            LogOptions::default(),
        )
    }

    #[test]
    fn test_sanitize_redacts_nested_secret_keys() {
        let details = json!({
            "label": "Work",
            "Token": "ghp_123",
            "nested": { "dbPassword": "hunter2", "keep": 1 },
            "list": [{ "clientSecret": "s" }, "plain"],
            "privateKeyPath": "/home/a/.ssh/id"
        });
        let clean = sanitize(&details);
        assert_eq!(clean["label"], "Work");
        assert_eq!(clean["Token"], REDACTED);
        assert_eq!(clean["nested"]["dbPassword"], REDACTED);
        assert_eq!(clean["nested"]["keep"], 1);
        assert_eq!(clean["list"][0]["clientSecret"], REDACTED);
        assert_eq!(clean["list"][1], "plain");
        assert_eq!(clean["privateKeyPath"], REDACTED);
    }

    #[test]
    fn test_checksum_is_deterministic_and_key_order_independent() {
        let e = entry(json!({ "b": 2, "a": { "y": 1, "x": [1, 2] } }));
        assert_eq!(e.compute_checksum(), e.compute_checksum());
        assert!(e.verify());

        let mut reordered = e.clone();
        reordered.details = json!({ "a": { "x": [1, 2], "y": 1 }, "b": 2 });
        assert_eq!(reordered.compute_checksum(), e.checksum);
    }

    #[test]
    fn test_any_field_mutation_changes_checksum() {
        let e = entry(json!({ "label": "Work" }));
        let mutations: Vec<Box<dyn Fn(&mut AuditLogEntry)>> = vec![
            Box::new(|e: &mut AuditLogEntry| e.id.push('x')),
            Box::new(|e: &mut AuditLogEntry| e.timestamp += chrono::Duration::milliseconds(1)),
            Box::new(|e: &mut AuditLogEntry| e.category = AuditCategory::Settings),
            Box::new(|e: &mut AuditLogEntry| e.action.push('x')),
            Box::new(|e: &mut AuditLogEntry| e.details = json!({ "label": "Work2" })),
            Box::new(|e: &mut AuditLogEntry| e.affected_paths.push(PathBuf::from("/x"))),
            Box::new(|e: &mut AuditLogEntry| e.reversible = !e.reversible),
            Box::new(|e: &mut AuditLogEntry| e.backup_id = Some("b".into())),
        ];
        for mutate in mutations {
            let mut m = e.clone();
            mutate(&mut m);
            assert!(!m.verify());
        }
    }

    #[test]
    fn test_entry_survives_json_round_trip() {
        let e = entry(json!({ "email": "a@b.c" }));
        let line = serde_json::to_string(&e).unwrap();
        let back: AuditLogEntry = serde_json::from_str(&line).unwrap();
        assert!(back.verify());
        assert_eq!(back, e);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("git-config".parse::<AuditCategory>().unwrap(), AuditCategory::GitConfig);
        assert_eq!(AuditCategory::GitConfig.to_string(), "git_config");
        assert!("nope".parse::<AuditCategory>().is_err());
    }
}
