//! Error handling for power-log processing.
//!
//! Row-level failures (bad numbers, short intervals) are recoverable and only
//! cost the offending row. File-level failures stop one file but never a batch.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why the interval processor refused an interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RejectReason {
    /// Sample period or charge delta below the configured minimum
    TooShort,
    /// Computed wattage outside the physical limits
    WattageOutOfRange,
    /// Elapsed hours negative or above the configured cap
    ElapsedTimeOutOfRange,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::TooShort => "interval too short",
            RejectReason::WattageOutOfRange => "wattage out of range",
            RejectReason::ElapsedTimeOutOfRange => "elapsed time out of range",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
pub enum PwrLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] serde_yaml::Error),

    #[error("Log file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Log file is empty: {path}")]
    EmptyFile { path: PathBuf },

    #[error("No <StartData> marker found in file: {path}")]
    NoDataMarker { path: PathBuf },

    #[error("No convertible data rows in file: {path}")]
    NoSamples { path: PathBuf },

    #[error("Malformed header line {line}: {reason}")]
    HeaderParse { line: usize, reason: String },

    #[error("Unparseable DATE '{text}': {reason}")]
    DateParse { text: String, reason: String },

    #[error("Conversion error in field '{field}': '{value}'")]
    Conversion { field: &'static str, value: String },

    #[error("Accumulated charge register is not an integer: '{value}'")]
    AccumulatedChargeDecode { value: String },

    #[error("{path}: {reason} at line {line}")]
    IntervalRejected {
        path: PathBuf,
        line: usize,
        reason: RejectReason,
    },

    #[error("No interval in {path} met the minimum sample period")]
    FileTooShort { path: PathBuf },

    #[error("File {path} excluded by filter: {reason}")]
    Filtered { path: PathBuf, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Processing failed for file: {path} - {reason}")]
    ProcessingFailed { path: PathBuf, reason: String },

    #[error("Processing interrupted: {reason}")]
    Interrupted { reason: String },
}

impl PwrLogError {
    pub fn conversion(field: &'static str, value: impl Into<String>) -> Self {
        Self::Conversion {
            field,
            value: value.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Row-level errors that the reader absorbs by skipping the row
    pub fn is_recoverable(&self) -> bool {
        match self {
            PwrLogError::HeaderParse { .. }
            | PwrLogError::DateParse { .. }
            | PwrLogError::Conversion { .. }
            | PwrLogError::AccumulatedChargeDecode { .. } => true,
            PwrLogError::IntervalRejected { reason, .. } => *reason == RejectReason::TooShort,
            _ => false,
        }
    }

    /// File was deliberately left out rather than broken
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            PwrLogError::Filtered { .. } | PwrLogError::FileTooShort { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PwrLogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_errors_are_recoverable() {
        assert!(PwrLogError::conversion("volts", "abc").is_recoverable());
        assert!(
            PwrLogError::AccumulatedChargeDecode {
                value: "x".to_string()
            }
            .is_recoverable()
        );
        assert!(
            !PwrLogError::EmptyFile {
                path: PathBuf::from("a.csv")
            }
            .is_recoverable()
        );
    }

    #[test]
    fn test_abort_rejections_are_not_recoverable() {
        let err = PwrLogError::IntervalRejected {
            path: PathBuf::from("pwr.csv"),
            line: 12,
            reason: RejectReason::WattageOutOfRange,
        };
        assert!(!err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "pwr.csv: wattage out of range at line 12"
        );
    }

    #[test]
    fn test_skip_classification() {
        let err = PwrLogError::FileTooShort {
            path: PathBuf::from("short.csv"),
        };
        assert!(err.is_skip());
        assert!(!PwrLogError::configuration("bad").is_skip());
    }
}
