//! Core data structures for power-log processing.
//!
//! Defines the header metadata, raw and converted telemetry samples, derived
//! interval metrics and per-file summaries shared across the library.

use crate::constants::{
    BUILD_DISPLAY_WIDTH, CURRENT_DIVISOR_API1, CURRENT_DIVISOR_API2, DEFAULT_KERNAPI,
    DEFAULT_XOVER, header_keys,
};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Laptop hardware generation from the `XOVER` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XoVersion {
    /// XO-1 and anything the logger did not label
    Xo1,
    /// XO-1.5, which reports the ACR in uAh
    Xo15,
}

impl XoVersion {
    pub fn from_header_value(value: &str) -> Self {
        match value.trim() {
            "1.5" => XoVersion::Xo15,
            _ => XoVersion::Xo1,
        }
    }
}

/// Hardware generation plus kernel API version, which together fix the
/// unit scaling and encoding of the raw telemetry fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub xo_version: XoVersion,
    /// `KERNAPI` as written in the header, 0 when absent or unparseable
    pub kernel_api: u32,
}

impl HardwareProfile {
    pub fn new(xo_version: XoVersion, kernel_api: u32) -> Self {
        Self {
            xo_version,
            kernel_api,
        }
    }

    /// Kernel API in force: an unset API is inferred from the hardware
    pub fn effective_kernel_api(&self) -> u32 {
        match self.kernel_api {
            0 if self.xo_version == XoVersion::Xo15 => 2,
            0 => 1,
            api => api,
        }
    }

    /// ACR is already scaled to uAh rather than raw register counts
    pub fn reports_charge_in_uah(&self) -> bool {
        self.xo_version == XoVersion::Xo15 || self.kernel_api == 2
    }

    pub fn current_divisor(&self) -> f64 {
        if self.effective_kernel_api() == 2 {
            CURRENT_DIVISOR_API2
        } else {
            CURRENT_DIVISOR_API1
        }
    }
}

impl Default for HardwareProfile {
    fn default() -> Self {
        Self::new(XoVersion::Xo1, 0)
    }
}

/// Metadata from the lines preceding `<StartData>`
#[derive(Debug, Clone)]
pub struct LogHeader {
    fields: BTreeMap<String, String>,
    run_date: Option<DateTime<FixedOffset>>,
    /// Source timezone of the run; UTC when the DATE line carried none
    timezone: FixedOffset,
    charge_ticks: Option<u32>,
    discharge_ticks: Option<u32>,
}

impl Default for LogHeader {
    fn default() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(header_keys::XOVER.to_string(), DEFAULT_XOVER.to_string());
        fields.insert(header_keys::KERNAPI.to_string(), DEFAULT_KERNAPI.to_string());
        Self {
            fields,
            run_date: None,
            timezone: utc_offset(),
            charge_ticks: None,
            discharge_ticks: None,
        }
    }
}

impl LogHeader {
    pub fn new(
        fields: BTreeMap<String, String>,
        run_date: Option<DateTime<FixedOffset>>,
        timezone: FixedOffset,
        charge_ticks: Option<u32>,
        discharge_ticks: Option<u32>,
    ) -> Self {
        let mut header = Self {
            fields,
            run_date,
            timezone,
            charge_ticks,
            discharge_ticks,
        };
        header
            .fields
            .entry(header_keys::XOVER.to_string())
            .or_insert_with(|| DEFAULT_XOVER.to_string());
        header
            .fields
            .entry(header_keys::KERNAPI.to_string())
            .or_insert_with(|| DEFAULT_KERNAPI.to_string());
        header
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn xo_version(&self) -> &str {
        self.get(header_keys::XOVER).unwrap_or(DEFAULT_XOVER)
    }

    /// `KERNAPI` as an integer, 0 when it does not parse
    pub fn kernel_api(&self) -> u32 {
        self.get(header_keys::KERNAPI)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn hardware(&self) -> HardwareProfile {
        HardwareProfile::new(
            XoVersion::from_header_value(self.xo_version()),
            self.kernel_api(),
        )
    }

    /// Build identifier truncated for display, "Unknown" when absent
    pub fn build(&self) -> String {
        self.get(header_keys::BUILD)
            .map(|b| b.chars().take(BUILD_DISPLAY_WIDTH).collect())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn battery_serial(&self) -> Option<&str> {
        self.get(header_keys::BATSER)
    }

    pub fn laptop_serial(&self) -> Option<&str> {
        self.get(header_keys::SERNUM)
    }

    pub fn comment(&self) -> Option<&str> {
        self.get(header_keys::COMMENT)
    }

    pub fn run_date(&self) -> Option<DateTime<FixedOffset>> {
        self.run_date
    }

    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    pub fn charge_ticks(&self) -> Option<u32> {
        self.charge_ticks
    }

    pub fn discharge_ticks(&self) -> Option<u32> {
        self.discharge_ticks
    }
}

pub(crate) fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// One telemetry row as text, fields named in the logger's column order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample<'a> {
    pub seconds: &'a str,
    pub state_of_charge: &'a str,
    pub voltage: &'a str,
    pub current: &'a str,
    pub temperature: &'a str,
    pub accumulated_charge: &'a str,
}

/// Telemetry row in physical units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConvertedSample {
    /// Seconds since the epoch
    pub seconds: f64,
    /// Percent
    pub state_of_charge: f64,
    pub volts: f64,
    pub milliamps: f64,
    pub temperature_c: f64,
    /// Signed accumulated charge register in mAh
    pub accumulated_charge_mah: f64,
}

/// Metrics derived from a sample and its baseline
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IntervalResult {
    pub elapsed_hours: f64,
    pub delta_seconds: f64,
    pub delta_accumulated_charge: f64,
    pub avg_current_ma: f64,
    pub net_accumulated_charge_mah: f64,
    pub avg_volts: f64,
    pub watts: f64,
    pub cumulative_watt_hours: f64,
    pub charge_watt_hours: f64,
    pub discharge_watt_hours: f64,
    /// Cumulative watt-hours over elapsed hours
    pub avg_watts: f64,
    pub delta_temperature_c: f64,
    pub impedance: f64,
    pub time_of_day_hours: f64,
}

impl IntervalResult {
    /// Clear the fields that need a real predecessor sample
    pub fn zero_deltas(&mut self) {
        self.delta_seconds = 0.0;
        self.delta_accumulated_charge = 0.0;
        self.cumulative_watt_hours = 0.0;
        self.charge_watt_hours = 0.0;
        self.discharge_watt_hours = 0.0;
        self.avg_watts = 0.0;
        self.delta_temperature_c = 0.0;
    }
}

/// Classification of a single interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalVerdict {
    Valid,
    TooShort,
    WattageOutOfRange,
    ElapsedTimeOutOfRange,
}

impl IntervalVerdict {
    pub fn is_valid(self) -> bool {
        self == IntervalVerdict::Valid
    }

    pub fn reject_reason(self) -> Option<crate::error::RejectReason> {
        use crate::error::RejectReason;
        match self {
            IntervalVerdict::Valid => None,
            IntervalVerdict::TooShort => Some(RejectReason::TooShort),
            IntervalVerdict::WattageOutOfRange => Some(RejectReason::WattageOutOfRange),
            IntervalVerdict::ElapsedTimeOutOfRange => Some(RejectReason::ElapsedTimeOutOfRange),
        }
    }
}

/// How a stored record came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    /// First sample of the file, computed against a synthetic predecessor
    Initial,
    /// Accepted interval
    Interval,
    /// Trailing interval recomputed from the last full baseline
    Repaired,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Initial => "initial",
            RecordKind::Interval => "interval",
            RecordKind::Repaired => "repaired",
        }
    }
}

/// Output row: source sample plus derived interval metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedRecord {
    /// 1-based line number in the source file
    pub line: usize,
    pub kind: RecordKind,
    pub sample: ConvertedSample,
    pub interval: IntervalResult,
}

impl DerivedRecord {
    pub fn is_interval(&self) -> bool {
        self.kind != RecordKind::Initial
    }
}

/// Per-file aggregate computed once the record sequence is complete
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileSummary {
    pub net_elapsed_hours: f64,
    pub net_accumulated_charge_mah: f64,
    pub total_watt_hours: f64,
    pub charge_watt_hours: f64,
    pub discharge_watt_hours: f64,
    pub min_watts: Option<f64>,
    pub max_watts: Option<f64>,
    pub avg_watts: f64,
    /// Elapsed hours at which average voltage first fell below critical
    pub critical_voltage_onset_hours: Option<f64>,
    /// Minutes spent after the critical-voltage onset
    pub critical_voltage_duration_minutes: f64,
    /// Charge moved after the critical-voltage onset
    pub critical_accumulated_charge_mah: f64,
    /// Net charge accumulated after the constant-voltage point
    pub cv_accumulated_charge_mah: Option<f64>,
    /// Hours remaining after the constant-voltage point
    pub cv_hours: Option<f64>,
    pub max_temperature_c: Option<f64>,
    pub max_temperature_rise_c: f64,
    pub starting_voltage: f64,
    pub charge_ticks: Option<u32>,
    pub discharge_ticks: Option<u32>,
    pub valid_intervals: usize,
    /// At least one interval met the minimum sample period
    pub time_period_valid: bool,
    /// No wattage reading fell outside the configured limits
    pub power_output_valid: bool,
}

impl FileSummary {
    pub fn is_valid(&self) -> bool {
        self.time_period_valid && self.power_output_valid
    }
}

/// Row-level accounting for one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadStats {
    pub header_lines: usize,
    pub data_rows: usize,
    pub conversion_errors: usize,
    pub charge_decode_errors: usize,
    pub short_intervals: usize,
    pub wattage_rejections: usize,
    pub elapsed_rejections: usize,
    pub valid_intervals: usize,
    pub repaired_tail: bool,
}

impl ReadStats {
    pub fn rows_skipped(&self) -> usize {
        self.conversion_errors + self.charge_decode_errors
    }
}

/// Batch-level processing statistics
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub files_found: usize,
    pub files_processed: usize,
    pub files_invalid: usize,
    pub files_filtered: usize,
    pub files_failed: usize,
    pub total_records: usize,
    pub output_path: Option<PathBuf>,
    pub processing_time_ms: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xo_version_detection() {
        assert_eq!(XoVersion::from_header_value("1.5"), XoVersion::Xo15);
        assert_eq!(XoVersion::from_header_value(" 1.5 "), XoVersion::Xo15);
        assert_eq!(XoVersion::from_header_value("1"), XoVersion::Xo1);
        assert_eq!(XoVersion::from_header_value("garbage"), XoVersion::Xo1);
    }

    #[test]
    fn test_effective_kernel_api() {
        assert_eq!(HardwareProfile::new(XoVersion::Xo1, 0).effective_kernel_api(), 1);
        assert_eq!(HardwareProfile::new(XoVersion::Xo15, 0).effective_kernel_api(), 2);
        assert_eq!(HardwareProfile::new(XoVersion::Xo1, 2).effective_kernel_api(), 2);
        assert_eq!(HardwareProfile::new(XoVersion::Xo15, 1).effective_kernel_api(), 1);
    }

    #[test]
    fn test_current_divisor_follows_api() {
        assert_eq!(HardwareProfile::default().current_divisor(), 1_000.0);
        assert_eq!(
            HardwareProfile::new(XoVersion::Xo1, 2).current_divisor(),
            1_000_000.0
        );
    }

    #[test]
    fn test_header_defaults() {
        let header = LogHeader::default();
        assert_eq!(header.xo_version(), "1");
        assert_eq!(header.kernel_api(), 0);
        assert_eq!(header.build(), "Unknown");
        assert_eq!(header.timezone(), utc_offset());
    }

    #[test]
    fn test_header_keeps_run_timezone() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let date = DateTime::parse_from_rfc3339("2010-03-16T14:00:00-05:00").unwrap();
        let header = LogHeader::new(BTreeMap::new(), Some(date), offset, Some(3), None);

        let copy = header.clone();
        assert_eq!(copy.timezone(), offset);
        assert_eq!(copy.run_date(), Some(date));
        assert_eq!(copy.charge_ticks(), Some(3));
        assert_eq!(copy.kernel_api(), 0);
    }

    #[test]
    fn test_build_is_truncated() {
        let mut fields = BTreeMap::new();
        fields.insert("BUILD".to_string(), "os852-custom-build".to_string());
        let header = LogHeader::new(fields, None, utc_offset(), None, None);
        assert_eq!(header.build(), "os852-cust");
        assert_eq!(header.xo_version(), "1");
    }

    #[test]
    fn test_zero_deltas_keeps_position_fields() {
        let mut result = IntervalResult {
            elapsed_hours: 0.5,
            delta_seconds: 120.0,
            cumulative_watt_hours: 1.0,
            time_of_day_hours: 13.5,
            ..Default::default()
        };
        result.zero_deltas();
        assert_eq!(result.delta_seconds, 0.0);
        assert_eq!(result.cumulative_watt_hours, 0.0);
        assert_eq!(result.elapsed_hours, 0.5);
        assert_eq!(result.time_of_day_hours, 13.5);
    }
}
