//! Append-only, checksummed audit trail.
//!
//! Every mutating action is appended as one JSON object per line to
//! `audit-YYYY-MM-DD.jsonl` (UTC date) inside the audit directory. Files are
//! never rewritten; tampering is detected by recomputing each entry's
//! checksum and reported, never corrected.

mod entry;

pub use entry::{AuditCategory, AuditLogEntry, LogOptions, REDACTED, sanitize};

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GitIdError, Result};
use crate::utils::fs::{ensure_dir, write_atomic};
use crate::utils::restrict_file_permissions;

/// Upper bound on entries written by a single export.
pub const MAX_EXPORT_ENTRIES: usize = 10_000;

const FILE_PREFIX: &str = "audit-";
const FILE_SUFFIX: &str = ".jsonl";

/// Query filter for [`AuditTrail::get_logs`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub category: Option<AuditCategory>,
    pub limit: Option<usize>,
}

impl LogFilter {
    fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(start) = self.start_date
            && entry.timestamp < start
        {
            return false;
        }
        if let Some(end) = self.end_date
            && entry.timestamp > end
        {
            return false;
        }
        self.category.is_none_or(|c| c == entry.category)
    }

    fn covers_day(&self, day: NaiveDate) -> bool {
        if let Some(start) = self.start_date
            && day < start.date_naive()
        {
            return false;
        }
        if let Some(end) = self.end_date
            && day > end.date_naive()
        {
            return false;
        }
        true
    }
}

/// Outcome of re-verifying stored entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub checked: usize,
    /// Ids of entries whose checksum no longer matches.
    pub tampered: Vec<String>,
    /// Lines that could not be parsed at all.
    pub unreadable: usize,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.tampered.is_empty() && self.unreadable == 0
    }
}

/// Append-only record of every mutation.
pub trait AuditTrail: Send + Sync {
    /// Record an action. Details are redacted before they are stored.
    fn log(
        &self,
        category: AuditCategory,
        action: &str,
        details: Value,
        options: LogOptions,
    ) -> Result<AuditLogEntry>;

    /// Entries matching `filter`, newest first.
    fn get_logs(&self, filter: &LogFilter) -> Result<Vec<AuditLogEntry>>;

    /// Re-verify every stored entry matching `filter`.
    fn verify_logs(&self, filter: &LogFilter) -> Result<VerifyReport>;

    /// Write matching entries to `path` as one JSON array.
    fn export_logs(&self, path: &Path, filter: &LogFilter) -> Result<usize>;
}

/// Writer and reader for the audit directory.
pub struct AuditLog {
    dir: PathBuf,
    append_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            append_lock: Mutex::new(()),
        }
    }

    /// Append an already sealed entry to the file for its UTC date.
    fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        let path = self.file_for(entry.timestamp.date_naive());

        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| GitIdError::from("audit log lock poisoned"))?;

        ensure_dir(&self.dir)?;
        let created = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| GitIdError::io_at(&path, e))?;
        if created {
            restrict_file_permissions(&path)?;
        }
        writeln!(file, "{}", line).map_err(|e| GitIdError::io_at(&path, e))?;
        Ok(())
    }

    /// Recompute the checksum of one entry.
    pub fn verify_entry(entry: &AuditLogEntry) -> bool {
        entry.verify()
    }

    fn file_for(&self, day: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", FILE_PREFIX, day.format("%Y-%m-%d"), FILE_SUFFIX))
    }

    /// Date-named log files, newest first.
    fn log_files(&self) -> Result<Vec<(NaiveDate, PathBuf)>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(GitIdError::io_at(&self.dir, e)),
        };

        let mut files: Vec<(NaiveDate, PathBuf)> = read_dir
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let date = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
                let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
                Some((day, e.path()))
            })
            .collect();
        files.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(files)
    }
}

impl AuditTrail for AuditLog {
    /// Record an action. Details are redacted before they touch disk.
    fn log(
        &self,
        category: AuditCategory,
        action: &str,
        details: Value,
        options: LogOptions,
    ) -> Result<AuditLogEntry> {
        let entry = AuditLogEntry::new(Utc::now(), category, action, &details, options);
        self.append(&entry)?;
        tracing::debug!(category = %category, action, id = %entry.id, "audit entry appended");
        Ok(entry)
    }

    /// Entries matching `filter`, newest first.
    ///
    /// Files are scanned newest-first and lines bottom-up; the scan stops as
    /// soon as `limit` entries have been collected.
    fn get_logs(&self, filter: &LogFilter) -> Result<Vec<AuditLogEntry>> {
        let limit = filter.limit.unwrap_or(usize::MAX);
        let mut entries = Vec::new();
        if limit == 0 {
            return Ok(entries);
        }

        for (day, path) in self.log_files()? {
            if !filter.covers_day(day) {
                continue;
            }
            for entry in read_entries(&path)?.into_iter().rev() {
                if filter.matches(&entry) {
                    entries.push(entry);
                    if entries.len() >= limit {
                        return Ok(entries);
                    }
                }
            }
        }
        Ok(entries)
    }

    /// Re-verify every stored entry matching `filter` (limit ignored).
    fn verify_logs(&self, filter: &LogFilter) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        for (day, path) in self.log_files()? {
            if !filter.covers_day(day) {
                continue;
            }
            let content = fs::read_to_string(&path).map_err(|e| GitIdError::io_at(&path, e))?;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<AuditLogEntry>(line) {
                    Ok(entry) if filter.matches(&entry) => {
                        report.checked += 1;
                        if !Self::verify_entry(&entry) {
                            tracing::warn!(id = %entry.id, file = %path.display(), "audit entry checksum mismatch");
                            report.tampered.push(entry.id);
                        }
                    }
                    Ok(_) => {}
                    Err(_) => report.unreadable += 1,
                }
            }
        }
        Ok(report)
    }

    /// Write matching entries as one JSON array. Returns how many were
    /// written (at most [`MAX_EXPORT_ENTRIES`]).
    fn export_logs(&self, path: &Path, filter: &LogFilter) -> Result<usize> {
        let mut capped = filter.clone();
        capped.limit = Some(
            filter
                .limit
                .map_or(MAX_EXPORT_ENTRIES, |l| l.min(MAX_EXPORT_ENTRIES)),
        );
        let entries = self.get_logs(&capped)?;
        let json = serde_json::to_vec_pretty(&entries)?;
        write_atomic(path, &json)?;
        tracing::info!(count = entries.len(), path = %path.display(), "audit log exported");
        Ok(entries.len())
    }
}

fn read_entries(path: &Path) -> Result<Vec<AuditLogEntry>> {
    let content = fs::read_to_string(path).map_err(|e| GitIdError::io_at(path, e))?;
    let mut entries = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!(file = %path.display(), line = n + 1, error = %e, "skipping unparsable audit line");
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn log_in(dir: &Path) -> AuditLog {
        AuditLog::new(dir.join("audit"))
    }

    #[test]
    fn test_log_appends_to_dated_file_with_redaction() {
        let dir = tempfile::tempdir().unwrap();
        let audit = log_in(dir.path());

        let entry = audit
            .log(
                AuditCategory::Profile,
                "create",
                json!({ "label": "Work", "token": "ghp_live" }),
                LogOptions::default(),
            )
            .unwrap();

        let file = audit.file_for(entry.timestamp.date_naive());
        let content = fs::read_to_string(&file).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(!content.contains("ghp_live"));
        assert!(content.contains(REDACTED));
        assert!(AuditLog::verify_entry(&entry));
    }

    #[test]
    fn test_get_logs_newest_first_with_filters() {
        let dir = tempfile::tempdir().unwrap();
        let audit = log_in(dir.path());

        let old = AuditLogEntry::new(
            Utc::now() - Duration::days(3),
            AuditCategory::Backup,
            "cleanup",
            &json!({}),
            LogOptions::default(),
        );
        audit.append(&old).unwrap();
        let a = audit
            .log(AuditCategory::Profile, "create", json!({}), LogOptions::default())
            .unwrap();
        let b = audit
            .log(AuditCategory::Repository, "bind", json!({}), LogOptions::default())
            .unwrap();

        let all = audit.get_logs(&LogFilter::default()).unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![b.id.as_str(), a.id.as_str(), old.id.as_str()]);

        let limited = audit
            .get_logs(&LogFilter {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, b.id);

        let profiles = audit
            .get_logs(&LogFilter {
                category: Some(AuditCategory::Profile),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(profiles.len(), 1);

        let recent = audit
            .get_logs(&LogFilter {
                start_date: Some(Utc::now() - Duration::days(1)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn test_verify_logs_reports_tampering_without_fixing() {
        let dir = tempfile::tempdir().unwrap();
        let audit = log_in(dir.path());
        let entry = audit
            .log(
                AuditCategory::GitConfig,
                "set_global",
                json!({ "email": "a@b.c" }),
                LogOptions::default(),
            )
            .unwrap();

        let file = audit.file_for(entry.timestamp.date_naive());
        let tampered = fs::read_to_string(&file).unwrap().replace("a@b.c", "evil@x.y");
        fs::write(&file, format!("{}not json\n", tampered)).unwrap();

        let report = audit.verify_logs(&LogFilter::default()).unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.tampered, vec![entry.id]);
        assert_eq!(report.unreadable, 1);
        assert!(!report.is_clean());

        // Reported, not corrected.
        assert!(fs::read_to_string(&file).unwrap().contains("evil@x.y"));
    }

    #[test]
    fn test_export_writes_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let audit = log_in(dir.path());
        for i in 0..3 {
            audit
                .log(AuditCategory::Settings, "update", json!({ "n": i }), LogOptions::default())
                .unwrap();
        }

        let out = dir.path().join("export/audit.json");
        let count = audit.export_logs(&out, &LogFilter::default()).unwrap();
        assert_eq!(count, 3);

        let parsed: Vec<AuditLogEntry> =
            serde_json::from_slice(&fs::read(&out).unwrap()).unwrap();
        assert_eq!(parsed.len(), 3);
        assert!(parsed.iter().all(|e| e.verify()));
    }

    #[test]
    fn test_missing_directory_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let audit = log_in(dir.path());
        assert!(audit.get_logs(&LogFilter::default()).unwrap().is_empty());
        assert!(audit.verify_logs(&LogFilter::default()).unwrap().is_clean());
    }
}
