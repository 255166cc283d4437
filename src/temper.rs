//! TEMPER-style timestamps (`YYYY.MM.DD_HH:MM:SS.ffffff`).
//!
//! Timestamps stay strings throughout the analyzer: the format is fixed-width
//! and zero-padded, so byte order is chronological order. Only boundary
//! computation goes through `chrono`.

use std::sync::OnceLock;
use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use crate::error::TlogError;

/// Lexically later than any real log timestamp.
pub const END_OF_TIME: &str = "9999.12.31";

static START_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence { Daily, Monthly, End }

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartTime {
    /// Take the first observed line's timestamp.
    Beginning,
    /// Normalized full timestamp.
    At(String),
}

/// Parses a command-line start time: `0`, `-`, or any prefix of a TEMPER timestamp
/// that stops at a field boundary (`2021`, `2021.01`, `2021.01.23`, `2021.01.23_12:26`...).
pub fn parse_start(raw: &str, today: NaiveDate) -> Result<StartTime, TlogError> {
    if raw == "0" { return Ok(StartTime::Beginning); }
    let owned;
    let s = if raw == "-" { owned = today.format("%Y.%m.%d").to_string(); owned.as_str() } else { raw };
    let re = START_RE.get_or_init(|| Regex::new(r"^(\d{4})(?:\.(\d\d)(?:\.(\d\d)(?:_(.*))?)?)?$").expect("start time pattern"));
    let caps = re.captures(s).ok_or_else(|| TlogError::BadStartTime(raw.to_string()))?;
    let year = &caps[1];
    let month = caps.get(2).map_or("01", |m| m.as_str());
    let day = caps.get(3).map_or("01", |m| m.as_str());
    let tod = caps.get(4).map(|m| m.as_str()).filter(|t| !t.is_empty()).unwrap_or("00:00:00.000000");
    let valid = match (year.parse::<i32>(), month.parse::<u32>(), day.parse::<u32>()) {
        (Ok(y), Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(y, m, d).is_some(),
        _ => false,
    };
    if !valid { return Err(TlogError::BadStartTime(raw.to_string())); }
    Ok(StartTime::At(format!("{}.{}.{}_{}", year, month, day, tod)))
}

/// The `YYYY.MM.DD` day a timestamp falls on.
pub fn calendar_day(ts: &str) -> Result<NaiveDate, TlogError> {
    ts.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y.%m.%d").ok())
        .ok_or_else(|| TlogError::BadTimestamp(ts.to_string()))
}

/// Next report trigger for a window starting at `start`.
pub fn next_boundary(start: &str, cadence: Cadence) -> Result<String, TlogError> {
    match cadence {
        Cadence::End => Ok(END_OF_TIME.to_string()),
        Cadence::Monthly => {
            let day = calendar_day(start)?;
            let (y, m) = if day.month() == 12 { (day.year() + 1, 1) } else { (day.year(), day.month() + 1) };
            Ok(format!("{:04}.{:02}", y, m))
        }
        Cadence::Daily => {
            let day = calendar_day(start)?;
            let next = day.succ_opt().ok_or_else(|| TlogError::BadTimestamp(start.to_string()))?;
            Ok(next.format("%Y.%m.%d").to_string())
        }
    }
}
