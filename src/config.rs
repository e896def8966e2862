//! Configuration management and validation.
//!
//! Processing limits, per-file filters, batch selection rules and output
//! settings. Values come from defaults, an optional YAML file and finally
//! command-line overrides.

use crate::constants::{
    DEFAULT_CRITICAL_VOLTAGE, DEFAULT_CV_POINT_VOLTAGE, DEFAULT_MAX_ELAPSED_HOURS,
    DEFAULT_MAX_WATTS, DEFAULT_MIN_SAMPLE_INTERVAL_SECS, DEFAULT_MIN_WATTS,
};
use crate::error::{PwrLogError, Result};
use crate::models::{FileSummary, LogHeader};
use chrono::{DateTime, Utc};
use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name looked up under the user config directory
const CONFIG_DIR_NAME: &str = "pwrlog";
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Thresholds applied by the interval processor and summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingLimits {
    /// Intervals shorter than this many seconds are too noisy to use
    pub min_sample_interval_secs: f64,
    pub min_watts: f64,
    pub max_watts: f64,
    pub max_elapsed_hours: f64,
    /// Average voltage marking the start of the critical region
    pub critical_voltage: f64,
    /// Average voltage at which charging switches to constant voltage
    pub cv_point_voltage: f64,
}

impl Default for ProcessingLimits {
    fn default() -> Self {
        Self {
            min_sample_interval_secs: DEFAULT_MIN_SAMPLE_INTERVAL_SECS,
            min_watts: DEFAULT_MIN_WATTS,
            max_watts: DEFAULT_MAX_WATTS,
            max_elapsed_hours: DEFAULT_MAX_ELAPSED_HOURS,
            critical_voltage: DEFAULT_CRITICAL_VOLTAGE,
            cv_point_voltage: DEFAULT_CV_POINT_VOLTAGE,
        }
    }
}

impl ProcessingLimits {
    pub fn with_min_sample_interval(mut self, secs: f64) -> Self {
        self.min_sample_interval_secs = secs;
        self
    }

    pub fn with_watt_limits(mut self, min_watts: f64, max_watts: f64) -> Self {
        self.min_watts = min_watts;
        self.max_watts = max_watts;
        self
    }

    pub fn with_max_elapsed_hours(mut self, hours: f64) -> Self {
        self.max_elapsed_hours = hours;
        self
    }

    pub fn watts_in_range(&self, watts: f64) -> bool {
        watts >= self.min_watts && watts <= self.max_watts
    }

    pub fn elapsed_in_range(&self, hours: f64) -> bool {
        (0.0..=self.max_elapsed_hours).contains(&hours)
    }
}

/// Header-based filters deciding whether a file is processed at all
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileFilter {
    /// Case-insensitive substrings of `BUILD`
    pub builds: Vec<String>,
    /// Laptop serial numbers (`SERNUM`), case-insensitive
    pub serials: Vec<String>,
    /// Exact `XOVER` values
    pub xovers: Vec<String>,
    /// Skip runs whose DATE is before this instant
    pub ignore_before: Option<DateTime<Utc>>,
}

impl FileFilter {
    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
            && self.serials.is_empty()
            && self.xovers.is_empty()
            && self.ignore_before.is_none()
    }

    /// Returns the reason a header is excluded, if any
    pub fn exclusion_reason(&self, header: &LogHeader) -> Option<String> {
        if !self.builds.is_empty() {
            let build = header.get(crate::constants::header_keys::BUILD).unwrap_or("");
            let build = build.to_lowercase();
            if !self
                .builds
                .iter()
                .any(|b| build.contains(&b.to_lowercase()))
            {
                return Some(format!("build '{}' not selected", build));
            }
        }

        if !self.serials.is_empty() {
            let serial = header.laptop_serial().unwrap_or("").to_uppercase();
            if !self.serials.iter().any(|s| s.to_uppercase() == serial) {
                return Some(format!("serial '{}' not selected", serial));
            }
        }

        if !self.xovers.is_empty() && !self.xovers.iter().any(|x| x == header.xo_version()) {
            return Some(format!("XO version '{}' not selected", header.xo_version()));
        }

        if let Some(cutoff) = self.ignore_before {
            match header.run_date() {
                Some(date) if date.with_timezone(&Utc) < cutoff => {
                    return Some(format!("run date {} before {}", date, cutoff));
                }
                Some(_) => {}
                None => debug!("No run date to compare with ignore-before cutoff"),
            }
        }

        None
    }
}

/// Which files make it into the cross-file summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySelection {
    /// Keep files that failed the validity checks
    pub include_errors: bool,
    /// Keep only files that failed the validity checks
    pub only_errors: bool,
    /// Keep runs with net charge gained
    pub positive: bool,
    /// Keep runs with net charge lost
    pub negative: bool,
}

impl SummarySelection {
    pub fn accepts(&self, summary: &FileSummary) -> bool {
        let valid = summary.is_valid();
        if self.only_errors {
            if valid {
                return false;
            }
        } else if !valid && !self.include_errors {
            return false;
        }

        if self.positive || self.negative {
            let net = summary.net_accumulated_charge_mah;
            (self.positive && net > 0.0) || (self.negative && net < 0.0)
        } else {
            true
        }
    }
}

/// Format of the batch summary file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

/// Supported compression algorithms for parquet files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Snappy compression - good balance of speed and compression
    #[default]
    Snappy,
    /// ZSTD compression - better compression ratio, slower
    Zstd,
    /// LZ4 compression - fastest, lower compression ratio
    Lz4,
    /// No compression
    Uncompressed,
}

impl CompressionAlgorithm {
    /// Convert to polars ParquetCompression type
    pub fn to_polars_compression(&self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

/// Ordering of rows in the batch summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    File,
    Battery,
    Serial,
    Date,
}

impl SortKey {
    /// Summary column sorted on
    pub fn column(&self) -> &'static str {
        match self {
            SortKey::File => "file",
            SortKey::Battery => "battery_serial",
            SortKey::Serial => "laptop_serial",
            SortKey::Date => "run_date_utc",
        }
    }
}

/// Main configuration for power-log processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PwrLogConfig {
    pub limits: ProcessingLimits,
    pub filter: FileFilter,
    pub selection: SummarySelection,

    /// Treat an out-of-range wattage as fatal for the file
    pub abort_on_wattage_error: bool,

    /// Treat an out-of-range elapsed time as fatal for the file
    pub abort_on_elapsed_error: bool,

    /// Maximum files processed concurrently
    pub workers: usize,

    pub output_format: OutputFormat,
    pub compression: CompressionAlgorithm,
    pub sort_by: SortKey,

    /// Write `processed-<stem>.csv` for every file kept in the summary
    pub write_processed: bool,

    /// Directory for processed files; beside the input when unset
    pub processed_dir: Option<PathBuf>,
}

impl Default for PwrLogConfig {
    fn default() -> Self {
        Self {
            limits: ProcessingLimits::default(),
            filter: FileFilter::default(),
            selection: SummarySelection::default(),
            abort_on_wattage_error: false,
            abort_on_elapsed_error: false,
            workers: num_cpus::get(),
            output_format: OutputFormat::default(),
            compression: CompressionAlgorithm::default(),
            sort_by: SortKey::default(),
            write_processed: false,
            processed_dir: None,
        }
    }
}

impl PwrLogConfig {
    /// Load from a YAML file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PwrLogError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let config: PwrLogConfig = serde_yaml::from_str(&text)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Explicit file if given, otherwise the user config file when present
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_limits(mut self, limits: ProcessingLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_filter(mut self, filter: FileFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_selection(mut self, selection: SummarySelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_abort_on_wattage_error(mut self) -> Self {
        self.abort_on_wattage_error = true;
        self
    }

    pub fn with_abort_on_elapsed_error(mut self) -> Self {
        self.abort_on_elapsed_error = true;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Enable per-file processed output
    pub fn with_processed_output(mut self, dir: Option<PathBuf>) -> Self {
        self.write_processed = true;
        self.processed_dir = dir;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;

        if !limits.min_sample_interval_secs.is_finite() || limits.min_sample_interval_secs < 0.0
        {
            return Err(PwrLogError::configuration(
                "min_sample_interval_secs must be a non-negative number",
            ));
        }

        if !(limits.min_watts < limits.max_watts) {
            return Err(PwrLogError::configuration(format!(
                "min_watts ({}) must be below max_watts ({})",
                limits.min_watts, limits.max_watts
            )));
        }

        if !(limits.max_elapsed_hours > 0.0) {
            return Err(PwrLogError::configuration(
                "max_elapsed_hours must be greater than 0",
            ));
        }

        if self.workers == 0 {
            return Err(PwrLogError::configuration("workers must be greater than 0"));
        }

        Ok(())
    }
}

/// `<config dir>/pwrlog/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::header_keys;
    use chrono::{FixedOffset, Offset, TimeZone};
    use std::collections::BTreeMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn header_with(pairs: &[(&str, &str)]) -> LogHeader {
        let fields: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogHeader::new(fields, None, Utc.fix(), None, None)
    }

    #[test]
    fn test_default_config() {
        let config = PwrLogConfig::default();
        assert_eq!(config.limits.min_sample_interval_secs, 60.0);
        assert_eq!(config.limits.min_watts, -15.0);
        assert_eq!(config.limits.max_watts, 20.0);
        assert_eq!(config.limits.max_elapsed_hours, 50.0);
        assert!(config.workers > 0);
        assert!(!config.abort_on_wattage_error);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder_pattern() {
        let config = PwrLogConfig::default()
            .with_workers(2)
            .with_limits(ProcessingLimits::default().with_min_sample_interval(30.0))
            .with_abort_on_wattage_error()
            .with_output_format(OutputFormat::Parquet);

        assert_eq!(config.workers, 2);
        assert_eq!(config.limits.min_sample_interval_secs, 30.0);
        assert!(config.abort_on_wattage_error);
        assert_eq!(config.output_format, OutputFormat::Parquet);
    }

    #[test]
    fn test_validation_rejects_bad_limits() {
        let config = PwrLogConfig::default()
            .with_limits(ProcessingLimits::default().with_watt_limits(10.0, -10.0));
        assert!(matches!(
            config.validate(),
            Err(PwrLogError::Configuration { .. })
        ));

        let config = PwrLogConfig::default().with_workers(0);
        assert!(config.validate().is_err());

        let config = PwrLogConfig::default()
            .with_limits(ProcessingLimits::default().with_max_elapsed_hours(0.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "limits:\n  min_sample_interval_secs: 120\nfilter:\n  xovers: ['1.5']\noutput_format: parquet\nworkers: 3"
        )
        .unwrap();

        let config = PwrLogConfig::from_file(file.path()).unwrap();
        assert_eq!(config.limits.min_sample_interval_secs, 120.0);
        assert_eq!(config.limits.max_watts, 20.0);
        assert_eq!(config.filter.xovers, vec!["1.5".to_string()]);
        assert_eq!(config.output_format, OutputFormat::Parquet);
        assert_eq!(config.workers, 3);
    }

    #[test]
    fn test_yaml_errors_and_missing_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "limits: [not, a, map]").unwrap();
        assert!(matches!(
            PwrLogConfig::from_file(file.path()),
            Err(PwrLogError::ConfigFile(_))
        ));

        assert!(matches!(
            PwrLogConfig::load(Some(Path::new("/nonexistent/pwrlog.yaml"))),
            Err(PwrLogError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_build_filter_is_case_insensitive_substring() {
        let filter = FileFilter {
            builds: vec!["OS85".to_string()],
            ..Default::default()
        };
        assert!(
            filter
                .exclusion_reason(&header_with(&[(header_keys::BUILD, "os852")]))
                .is_none()
        );
        assert!(
            filter
                .exclusion_reason(&header_with(&[(header_keys::BUILD, "802")]))
                .is_some()
        );
        // missing BUILD never matches a build filter
        assert!(filter.exclusion_reason(&header_with(&[])).is_some());
    }

    #[test]
    fn test_serial_and_xover_filters() {
        let filter = FileFilter {
            serials: vec!["shc123".to_string()],
            xovers: vec!["1.5".to_string()],
            ..Default::default()
        };
        let header = header_with(&[(header_keys::SERNUM, "SHC123"), (header_keys::XOVER, "1.5")]);
        assert!(filter.exclusion_reason(&header).is_none());

        let header = header_with(&[(header_keys::SERNUM, "SHC123")]);
        assert!(filter.exclusion_reason(&header).is_some());
    }

    #[test]
    fn test_ignore_before_filter() {
        let cutoff = Utc.with_ymd_and_hms(2010, 6, 1, 0, 0, 0).unwrap();
        let filter = FileFilter {
            ignore_before: Some(cutoff),
            ..Default::default()
        };
        let zone = FixedOffset::east_opt(0).unwrap();
        let early = zone.with_ymd_and_hms(2010, 5, 1, 0, 0, 0).unwrap();
        let late = zone.with_ymd_and_hms(2010, 7, 1, 0, 0, 0).unwrap();

        let header = LogHeader::new(BTreeMap::new(), Some(early), Utc.fix(), None, None);
        assert!(filter.exclusion_reason(&header).is_some());
        let header = LogHeader::new(BTreeMap::new(), Some(late), Utc.fix(), None, None);
        assert!(filter.exclusion_reason(&header).is_none());
        // undated runs are kept
        assert!(filter.exclusion_reason(&header_with(&[])).is_none());
    }

    #[test]
    fn test_summary_selection() {
        let valid = FileSummary {
            time_period_valid: true,
            power_output_valid: true,
            net_accumulated_charge_mah: -100.0,
            ..Default::default()
        };
        let invalid = FileSummary {
            time_period_valid: false,
            power_output_valid: true,
            ..Default::default()
        };

        let default = SummarySelection::default();
        assert!(default.accepts(&valid));
        assert!(!default.accepts(&invalid));

        let include = SummarySelection {
            include_errors: true,
            ..Default::default()
        };
        assert!(include.accepts(&invalid));

        let only = SummarySelection {
            only_errors: true,
            ..Default::default()
        };
        assert!(only.accepts(&invalid));
        assert!(!only.accepts(&valid));

        let positive = SummarySelection {
            positive: true,
            ..Default::default()
        };
        assert!(!positive.accepts(&valid));
        let negative = SummarySelection {
            negative: true,
            ..Default::default()
        };
        assert!(negative.accepts(&valid));
    }
}
