//! Application constants for the power-log processor
//!
//! Unit conversions, file-format markers and default limits used by the
//! reader and the batch processor.

// =============================================================================
// File Format
// =============================================================================

/// Line that separates the metadata header from the CSV telemetry
pub const START_DATA_MARKER: &str = "<StartData>";

/// Number of positional fields in a telemetry row
pub const RAW_FIELD_COUNT: usize = 6;

/// Prefix of the per-file processed output (`processed-<stem>.csv`)
pub const PROCESSED_FILE_PREFIX: &str = "processed-";

/// Header keys written by the OLPC power logging script
pub mod header_keys {
    pub const XOVER: &str = "XOVER";
    pub const KERNAPI: &str = "KERNAPI";
    pub const DATE: &str = "DATE";
    pub const BUILD: &str = "BUILD";
    pub const BATSER: &str = "BATSER";
    pub const SERNUM: &str = "SERNUM";
    pub const COMMENT: &str = "COMMENT";
    pub const CHGCNT: &str = "CHGCNT";
    pub const CHGSOC: &str = "CHGSOC";
    pub const DISCNT: &str = "DISCNT";
    pub const DISSOC: &str = "DISSOC";
}

/// Header value defaults for logs that predate the field
pub const DEFAULT_XOVER: &str = "1";
pub const DEFAULT_KERNAPI: &str = "0";

/// BUILD values are truncated to this many characters in reports
pub const BUILD_DISPLAY_WIDTH: usize = 10;

// =============================================================================
// Unit Conversion
// =============================================================================

/// 6.25uV / 0.015 mOhm sense resistor / 1000: raw ACR counts to mAh
pub const ACR_TO_MAH: f64 = 6.25 / 0.015 / 1000.0;

/// Raw voltage is reported in microvolts
pub const MICROVOLTS_PER_VOLT: f64 = 1_000_000.0;

/// Raw current divisor for kernel API 1 (uA to mA)
pub const CURRENT_DIVISOR_API1: f64 = 1_000.0;

/// Raw current divisor for kernel API 2
pub const CURRENT_DIVISOR_API2: f64 = 1_000_000.0;

/// Raw temperature is reported in hundredths of a degree C
pub const CENTI_DEGREES_PER_DEGREE: f64 = 100.0;

/// XO-1.5 and kernel API 2 report the ACR already converted to uAh
pub const MICRO_AMP_HOURS_PER_MAH: f64 = 1_000.0;

pub const SECONDS_PER_HOUR: f64 = 3_600.0;

// =============================================================================
// Processing Defaults
// =============================================================================

/// Minimum seconds between samples for an interval to count
pub const DEFAULT_MIN_SAMPLE_INTERVAL_SECS: f64 = 60.0;

/// Charge deltas below this (mAh) are dominated by register noise
pub const MIN_DELTA_CHARGE_MAH: f64 = 0.5;

/// Physical wattage bounds; readings outside indicate a corrupt log
pub const DEFAULT_MIN_WATTS: f64 = -15.0;
pub const DEFAULT_MAX_WATTS: f64 = 20.0;

/// Upper bound on elapsed hours for a single run
pub const DEFAULT_MAX_ELAPSED_HOURS: f64 = 50.0;

/// Average voltage below which the pack is considered critical
pub const DEFAULT_CRITICAL_VOLTAGE: f64 = 5.725;

/// Average voltage at which the charger enters constant-voltage mode
pub const DEFAULT_CV_POINT_VOLTAGE: f64 = 7.2;
