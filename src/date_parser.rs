//! Permissive parsing of the free-form `DATE:` header line.
//!
//! Loggers wrote whatever `date` printed on the laptop, so the text shows up
//! as `Tue Mar 16 14:23:01 EST 2010`, RFC 2822, ISO 8601 and mixtures with
//! stray commas. Strict formats are tried first; otherwise tokens are scanned
//! and anything unrecognised is ignored.

use crate::error::{PwrLogError, Result};
use crate::models::utc_offset;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use regex::Regex;
use std::sync::OnceLock;

/// Timestamp recovered from a DATE line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDate {
    pub datetime: DateTime<FixedOffset>,
    /// The text named a zone; when false `datetime` is in UTC by default
    pub explicit_zone: bool,
}

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const WEEKDAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Zone abbreviations seen in field logs, as hours east of UTC
const ZONE_ABBREVIATIONS: &[(&str, i32)] = &[
    ("UTC", 0),
    ("GMT", 0),
    ("Z", 0),
    ("WET", 0),
    ("WEST", 1),
    ("CET", 1),
    ("CEST", 2),
    ("EET", 2),
    ("EEST", 3),
    ("EST", -5),
    ("EDT", -4),
    ("CST", -6),
    ("CDT", -5),
    ("MST", -7),
    ("MDT", -6),
    ("PST", -8),
    ("PDT", -7),
    ("AKST", -9),
    ("AKDT", -8),
    ("HST", -10),
    ("ART", -3),
    ("BRT", -3),
    ("UYT", -3),
    ("PYT", -4),
    ("PET", -5),
    ("COT", -5),
    ("NPT", 5),
    ("JST", 9),
    ("AEST", 10),
    ("NZST", 12),
    ("NZDT", 13),
];

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\.\d+)?(Z|[+-]\d{2}:?\d{2})?$")
            .expect("time pattern is valid")
    })
}

fn iso_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})$").expect("date pattern is valid")
    })
}

fn iso_separator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{4}-\d{1,2}-\d{1,2})[Tt](\d)").expect("separator pattern is valid")
    })
}

fn us_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{1,2})[-/](\d{1,2})[-/](\d{4})$").expect("date pattern is valid")
    })
}

fn offset_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:UTC|GMT)?([+-])(\d{2}):?(\d{2})$").expect("offset pattern is valid")
    })
}

/// Parse a DATE header value
pub fn parse_fuzzy_date(text: &str) -> Result<ParsedDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(date_error(text, "empty date"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ParsedDate {
            datetime: dt,
            explicit_zone: true,
        });
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Ok(ParsedDate {
            datetime: dt,
            explicit_zone: true,
        });
    }

    scan_tokens(text)
}

#[derive(Default)]
struct DateParts {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    time: Option<NaiveTime>,
    offset: Option<FixedOffset>,
}

fn scan_tokens(text: &str) -> Result<ParsedDate> {
    let mut parts = DateParts::default();

    // ISO "dateTtime" shares one token; split it so both halves are seen
    let normalized = iso_separator_pattern().replace_all(text, "$1 $2");
    for token in normalized
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        classify_token(token, &mut parts, text)?;
    }

    let (year, month, day) = match (parts.year, parts.month, parts.day) {
        (Some(y), Some(m), Some(d)) => (y, m, d),
        _ => return Err(date_error(text, "missing year, month or day")),
    };
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| date_error(text, "day out of range for month"))?;
    let naive = NaiveDateTime::new(date, parts.time.unwrap_or(NaiveTime::MIN));

    let explicit_zone = parts.offset.is_some();
    let offset = parts.offset.unwrap_or_else(utc_offset);
    let datetime = offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| date_error(text, "ambiguous local time"))?;

    Ok(ParsedDate {
        datetime,
        explicit_zone,
    })
}

fn classify_token(token: &str, parts: &mut DateParts, text: &str) -> Result<()> {
    if let Some(caps) = time_pattern().captures(token) {
        let hour: u32 = caps[1].parse().unwrap_or(99);
        let minute: u32 = caps[2].parse().unwrap_or(99);
        let second: u32 = caps
            .get(3)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        parts.time = Some(
            NaiveTime::from_hms_opt(hour, minute, second)
                .ok_or_else(|| date_error(text, "time out of range"))?,
        );
        if let Some(zone) = caps.get(4) {
            parts.offset = parse_offset(zone.as_str());
        }
        return Ok(());
    }

    if let Some(caps) = iso_date_pattern().captures(token) {
        parts.year = caps[1].parse().ok();
        parts.month = caps[2].parse().ok();
        parts.day = caps[3].parse().ok();
        return Ok(());
    }

    if let Some(caps) = us_date_pattern().captures(token) {
        parts.month = caps[1].parse().ok();
        parts.day = caps[2].parse().ok();
        parts.year = caps[3].parse().ok();
        return Ok(());
    }

    if parts.offset.is_none() {
        if let Some(offset) = parse_offset(token) {
            parts.offset = Some(offset);
            return Ok(());
        }
    }

    let lower = token.to_ascii_lowercase();
    if lower.len() >= 3 {
        if let Some(index) = MONTHS.iter().position(|m| lower.starts_with(m)) {
            if parts.month.is_none() {
                parts.month = Some(index as u32 + 1);
                return Ok(());
            }
        }
        if WEEKDAYS.iter().any(|d| lower.starts_with(d)) {
            return Ok(());
        }
    }

    if let Some(hours) = zone_abbreviation(token) {
        if parts.offset.is_none() {
            parts.offset = FixedOffset::east_opt(hours * 3600);
        }
        return Ok(());
    }

    if let Ok(number) = token.trim_end_matches(|c: char| c.is_ascii_alphabetic()).parse::<u32>() {
        if token.len() == 4 && number >= 1000 {
            parts.year = Some(number as i32);
        } else if (1..=31).contains(&number) && parts.day.is_none() {
            parts.day = Some(number);
        }
    }

    Ok(())
}

fn parse_offset(token: &str) -> Option<FixedOffset> {
    if token == "Z" {
        return Some(utc_offset());
    }
    let caps = offset_pattern().captures(token)?;
    let hours: i32 = caps[2].parse().ok()?;
    let minutes: i32 = caps[3].parse().ok()?;
    let seconds = hours * 3600 + minutes * 60;
    if &caps[1] == "-" {
        FixedOffset::west_opt(seconds)
    } else {
        FixedOffset::east_opt(seconds)
    }
}

fn zone_abbreviation(token: &str) -> Option<i32> {
    let upper = token.to_ascii_uppercase();
    ZONE_ABBREVIATIONS
        .iter()
        .find(|(name, _)| *name == upper)
        .map(|(_, hours)| *hours)
}

fn date_error(text: &str, reason: &str) -> PwrLogError {
    PwrLogError::DateParse {
        text: text.trim().to_string(),
        reason: reason.to_string(),
    }
}
