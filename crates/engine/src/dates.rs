//! Lenient date parsing and canonical re-formatting.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{EngineError, Result};
use crate::value::Value;

/// Output layout when none is configured, e.g. `05-Mar-24`.
pub const DEFAULT_DATE_FORMAT: &str = "%d-%b-%y";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%b-%y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
    "%Y%m%d%H%M%S",
    "%Y%m%d %H%M%S",
];

// Day-first: 03/04/2024 is the 3rd of April. Two-digit years before
// four-digit ones, `%Y` would accept "24" as year 24.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d-%b-%y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%Y%m%d",
    "%Y/%m/%d",
];

/// Parse the common date and date-time layouts found in exports.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Rewrite one field in `format`. Empty stays empty.
pub fn reformat(value: &Value, format: &str, column: &str) -> Result<Value> {
    if value.is_empty() {
        return Ok(Value::Empty);
    }
    let raw = value.render();
    parse_datetime(&raw)
        .map(|dt| Value::Text(dt.format(format).to_string()))
        .ok_or_else(|| EngineError::DateParse {
            column: column.to_string(),
            value: raw,
        })
}
