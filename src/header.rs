//! Power-log header parsing and metadata extraction.
//!
//! Reads the `KEY:VALUE` lines that precede the `<StartData>` marker and
//! builds a [`LogHeader`]. Individual bad lines are logged and skipped; the
//! header as a whole never fails.

use crate::constants::{START_DATA_MARKER, header_keys};
use crate::date_parser::parse_fuzzy_date;
use crate::error::{PwrLogError, Result};
use crate::models::{LogHeader, utc_offset};
use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Header plus the position of the data section
#[derive(Debug, Clone)]
pub struct ParsedHeader {
    pub header: LogHeader,
    /// Lines consumed, including the marker line
    pub lines_consumed: usize,
    pub found_marker: bool,
}

/// Parse header lines up to and including `<StartData>`.
///
/// The iterator is left positioned on the first data line.
pub fn parse_header<'a, I>(lines: &mut I) -> ParsedHeader
where
    I: Iterator<Item = &'a str>,
{
    let mut builder = HeaderBuilder::default();
    let mut lines_consumed = 0;
    let mut found_marker = false;

    for line in lines.by_ref() {
        lines_consumed += 1;
        let trimmed = line.trim();

        if trimmed == START_DATA_MARKER {
            found_marker = true;
            break;
        }

        if let Err(e) = builder.parse_line(trimmed, lines_consumed) {
            warn!("Skipping header line: {}", e);
        }
    }

    debug!(
        "Parsed {} header fields over {} lines (marker found: {})",
        builder.fields.len(),
        lines_consumed,
        found_marker
    );

    ParsedHeader {
        header: builder.build(),
        lines_consumed,
        found_marker,
    }
}

#[derive(Default)]
struct HeaderBuilder {
    fields: BTreeMap<String, String>,
    run_date: Option<DateTime<FixedOffset>>,
    timezone: Option<FixedOffset>,
}

impl HeaderBuilder {
    fn parse_line(&mut self, line: &str, line_no: usize) -> Result<()> {
        if line.is_empty() {
            return Ok(());
        }

        let Some((key, value)) = line.split_once(':') else {
            debug!("Ignoring unrecognised header line {}: {}", line_no, line);
            return Ok(());
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(PwrLogError::HeaderParse {
                line: line_no,
                reason: format!("empty key in '{}'", line),
            });
        }
        let value = value.trim();
        self.fields.insert(key.to_string(), value.to_string());

        if key == header_keys::DATE {
            self.parse_date(value);
        }

        Ok(())
    }

    fn parse_date(&mut self, value: &str) {
        match parse_fuzzy_date(value) {
            Ok(parsed) => {
                self.run_date = Some(parsed.datetime);
                if parsed.explicit_zone {
                    self.timezone = Some(*parsed.datetime.offset());
                } else {
                    warn!("DATE '{}' has no timezone, assuming UTC", value);
                }
            }
            Err(e) => {
                warn!("{}; timezone defaults to UTC", e);
            }
        }
    }

    fn build(self) -> LogHeader {
        let charge_ticks = tick_total(&self.fields, header_keys::CHGCNT, header_keys::CHGSOC);
        let discharge_ticks = tick_total(&self.fields, header_keys::DISCNT, header_keys::DISSOC);

        LogHeader::new(
            self.fields,
            self.run_date,
            self.timezone.unwrap_or_else(utc_offset),
            charge_ticks,
            discharge_ticks,
        )
    }
}

/// Combine a two-byte cycle counter and its SOC byte into a tick total
fn tick_total(fields: &BTreeMap<String, String>, count_key: &str, soc_key: &str) -> Option<u32> {
    let count = fields.get(count_key)?;
    let soc = fields.get(soc_key)?;

    let count = match parse_cycle_count(count) {
        Ok(count) => count,
        Err(e) => {
            warn!("Invalid {} value: {}", count_key, e);
            return None;
        }
    };
    let soc = match soc.split_whitespace().next().map(parse_hex_byte) {
        Some(Ok(soc)) => soc,
        Some(Err(e)) => {
            warn!("Invalid {} value: {}", soc_key, e);
            return None;
        }
        None => return None,
    };

    Some(count + soc)
}

/// `"msb lsb"` hex bytes, the counter advances 128 per msb step
pub fn parse_cycle_count(value: &str) -> Result<u32> {
    let mut parts = value.split_whitespace();
    let (Some(msb), Some(lsb)) = (parts.next(), parts.next()) else {
        return Err(PwrLogError::HeaderParse {
            line: 0,
            reason: format!("expected two hex bytes, found '{}'", value),
        });
    };
    Ok(parse_hex_byte(msb)? * 128 + parse_hex_byte(lsb)?)
}

fn parse_hex_byte(token: &str) -> Result<u32> {
    let digits = token
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|_| PwrLogError::HeaderParse {
        line: 0,
        reason: format!("'{}' is not a hex byte", token),
    })
}
