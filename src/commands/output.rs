//! Human or JSON rendering of command results.

use chrono::{DateTime, Utc};
use chrono_humanize::HumanTime;
use serde::Serialize;

use crate::error::{GitIdError, Result};
use crate::service::Envelope;

/// How results are printed.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Print `data` as a success envelope, or hand it to `human`.
    pub fn render<T: Serialize>(&self, data: &T, human: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            let envelope = Envelope::Ok(data);
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        } else {
            human(data);
        }
        Ok(())
    }

    /// Print a failure the way the current mode expects.
    pub fn error(&self, err: &GitIdError) {
        if self.json {
            let envelope: Envelope<()> = Envelope::Err(err.into());
            match serde_json::to_string_pretty(&envelope) {
                Ok(text) => println!("{}", text),
                Err(_) => eprintln!("Error: {}", err),
            }
        } else {
            eprintln!("Error: {}", err);
        }
    }
}

/// "3 hours ago" style rendering.
pub fn ago(ts: &DateTime<Utc>) -> String {
    HumanTime::from(*ts).to_string()
}

pub fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}
