//! Tolerant timestamp parsing for device logs.
//!
//! Trackers in the wild emit ISO timestamps, Brazilian day-first timestamps,
//! and an out-of-range hour of 24 at midnight. Hour 24 is rolled into the
//! next calendar day with the rest of the string (minutes, seconds,
//! fractions, timezone suffix) preserved.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

static ISO_HOUR_24: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})([ T])24:(\d{2}):(\d{2})(\.\d+)?(Z|[+-]\d{2}:\d{2})?$")
        .unwrap()
});

static BR_HOUR_24: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2})/(\d{2})/(\d{4})\s+24:(\d{2}):(\d{2})(\.\d+)?(Z|[+-]\d{2}:\d{2})?$")
        .unwrap()
});

/// Rewrites a timestamp string containing hour 24 to 00 hours on the next
/// calendar day. Returns `None` when the value needs no correction or does
/// not match a known shape.
pub fn fix_midnight_rollover(value: &str) -> Option<String> {
    let s = value.trim();
    if !s.contains(" 24:") && !s.contains("T24:") {
        return None;
    }

    if let Some(caps) = ISO_HOUR_24.captures(s) {
        let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
        let next = date + Duration::days(1);
        let frac = caps.get(5).map_or("", |m| m.as_str());
        let tz = caps.get(6).map_or("", |m| m.as_str());
        return Some(format!(
            "{}{}00:{}:{}{}{}",
            next.format("%Y-%m-%d"),
            &caps[2],
            &caps[3],
            &caps[4],
            frac,
            tz
        ));
    }

    if let Some(caps) = BR_HOUR_24.captures(s) {
        let date = NaiveDate::from_ymd_opt(
            caps[3].parse().ok()?,
            caps[2].parse().ok()?,
            caps[1].parse().ok()?,
        )?;
        let next = date + Duration::days(1);
        let frac = caps.get(6).map_or("", |m| m.as_str());
        let tz = caps.get(7).map_or("", |m| m.as_str());
        return Some(format!(
            "{} 00:{}:{}{}{}",
            next.format("%d/%m/%Y"),
            &caps[4],
            &caps[5],
            frac,
            tz
        ));
    }

    None
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Parses a timestamp string into a naive datetime, trying RFC 3339 first
/// and then the delimited formats seen in tracker exports. Unparseable
/// values yield `None`; they are never an error.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let fixed = fix_midnight_rollover(trimmed);
    let value = fixed.as_deref().unwrap_or(trimmed);

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// Parses a numeric string, accepting a decimal comma ("12,5") since
/// Latin-locale exports use it alongside the `;` delimiter.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        return Some(n);
    }
    // One comma and no dot: decimal-comma notation
    if trimmed.matches(',').count() == 1 && !trimmed.contains('.') {
        return trimmed.replace(',', ".").parse::<f64>().ok();
    }
    None
}
