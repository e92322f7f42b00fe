use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::ValueEnum;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{fs::Metadata, time::SystemTime};

/// Which file timestamp `--after` is compared against.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
#[schemars(description = "File timestamp used for time filtering")]
pub enum TimeField {
    #[default]
    #[schemars(description = "Last modification time")]
    Mtime,
    #[schemars(description = "Inode change time on Unix, creation time elsewhere")]
    Ctime,
}

impl TimeField {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeField::Mtime => "mtime",
            TimeField::Ctime => "ctime",
        }
    }

    pub fn read(self, metadata: &Metadata) -> std::io::Result<SystemTime> {
        match self {
            TimeField::Mtime => metadata.modified(),
            TimeField::Ctime => change_time(metadata),
        }
    }
}

#[cfg(unix)]
fn change_time(metadata: &Metadata) -> std::io::Result<SystemTime> {
    use std::os::unix::fs::MetadataExt;
    use std::time::{Duration, UNIX_EPOCH};

    let secs = metadata.ctime();
    let offset = Duration::new(secs.unsigned_abs(), metadata.ctime_nsec() as u32);

    Ok(if secs >= 0 {
        UNIX_EPOCH + offset
    } else {
        UNIX_EPOCH - offset
    })
}

#[cfg(not(unix))]
fn change_time(metadata: &Metadata) -> std::io::Result<SystemTime> {
    metadata.created()
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const OFFSET_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// Parses an `--after` threshold.
///
/// Accepts a Unix timestamp (integer or fractional), `YYYY-MM-DD`,
/// `YYYY-MM-DD HH:MM[:SS]`, `YYYY-MM-DDTHH:MM[:SS]` or either of those with a
/// UTC offset. Values without an offset are read in the local time zone.
pub fn parse_after(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(secs) = input.parse::<f64>() {
        if !secs.is_finite() {
            bail!("Timestamp '{input}' is not a finite number");
        }
        let micros = (secs * 1_000_000.0).round() as i64;
        return DateTime::from_timestamp_micros(micros)
            .with_context(|| format!("Timestamp '{input}' is out of range"));
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return local_to_utc(date.and_time(chrono::NaiveTime::MIN), input);
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return local_to_utc(naive, input);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(input, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    bail!(
        "Cannot parse '{input}'. Expected a Unix timestamp, 'YYYY-MM-DD', 'YYYY-MM-DD HH:MM[:SS]' or an ISO 8601 timestamp"
    )
}

fn local_to_utc(naive: NaiveDateTime, input: &str) -> Result<DateTime<Utc>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("'{input}' does not exist in the local time zone"))
}

/// Formats a threshold for log output in local time.
pub fn display_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
