//! Audit log command handlers.

use chrono::{TimeZone, Utc};

use crate::audit::LogFilter;
use crate::cli::{AuditCommands, AuditFilterArgs};
use crate::error::Result;
use crate::service::IdentityService;

use super::output::{Output, ago};

pub fn handle_audit(service: &IdentityService, out: Output, command: AuditCommands) -> Result<()> {
    match command {
        AuditCommands::Logs { filter, limit } => {
            let mut filter = to_filter(&filter);
            filter.limit = Some(limit);
            let entries = service.get_logs(&filter)?;
            out.render(&entries, |entries| {
                if entries.is_empty() {
                    println!("No audit entries.");
                }
                for e in entries {
                    println!(
                        "  {:16} | {:10} | {:14} | {}",
                        ago(&e.timestamp),
                        e.category,
                        e.action,
                        e.details
                    );
                }
            })
        }
        AuditCommands::Export { output, filter } => {
            let written = service.export_logs(&output, &to_filter(&filter))?;
            out.render(&serde_json::json!({ "exported": written, "path": output }), |_| {
                println!("Exported {} entries to {}", written, output.display())
            })
        }
        AuditCommands::Verify { filter } => {
            let report = service.verify_logs(&to_filter(&filter))?;
            out.render(&report, |r| {
                println!("Checked {} entries", r.checked);
                if r.is_clean() {
                    println!("No tampering detected.");
                }
                for id in &r.tampered {
                    println!("  TAMPERED: {}", id);
                }
                if r.unreadable > 0 {
                    println!("  {} unreadable line(s)", r.unreadable);
                }
            })
        }
    }
}

/// Whole UTC days from `--since` through `--until`.
fn to_filter(args: &AuditFilterArgs) -> LogFilter {
    LogFilter {
        start_date: args
            .since
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt)),
        end_date: args.until.and_then(|d| {
            d.and_hms_milli_opt(23, 59, 59, 999)
                .map(|dt| Utc.from_utc_datetime(&dt))
        }),
        category: args.category,
        limit: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_filter_covers_whole_days() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let filter = to_filter(&AuditFilterArgs {
            since: Some(day),
            until: Some(day),
            category: None,
        });
        assert_eq!(filter.start_date.unwrap().to_rfc3339(), "2024-03-09T00:00:00+00:00");
        assert_eq!(
            filter.end_date.unwrap().to_rfc3339(),
            "2024-03-09T23:59:59.999+00:00"
        );
    }
}
