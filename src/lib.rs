//! OLPC power-log processor library
//!
//! Reads battery telemetry logs written by the OLPC power logging script and
//! turns raw charge-register samples into per-interval power and energy
//! figures plus a per-run summary.
//!
//! This library provides tools for:
//! - Parsing the `KEY: value` metadata header and its loosely formatted dates
//! - Converting raw counters for every XO hardware generation and kernel API
//! - Validating intervals against configurable physical limits
//! - Repairing a truncated trailing interval
//! - Writing processed files and batch summaries as CSV or Parquet

pub mod cli;
pub mod config;
pub mod constants;
pub mod convert;
pub mod date_parser;
pub mod error;
pub mod header;
pub mod interval;
pub mod models;
pub mod processor;
pub mod reader;
pub mod summary;

// Re-export commonly used types
pub use config::{FileFilter, ProcessingLimits, PwrLogConfig, SummarySelection};
pub use error::{PwrLogError, RejectReason, Result};
pub use models::{DerivedRecord, FileSummary, IntervalResult, LogHeader, ProcessingStats};
pub use processor::BatchProcessor;
pub use reader::{FileOutcome, FileReader};
