//! Command-line argument definitions for the power-log processor
//!
//! Flags override values loaded from the YAML configuration file.

use crate::config::{CompressionAlgorithm, OutputFormat, PwrLogConfig, SortKey};
use crate::date_parser::parse_fuzzy_date;
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the OLPC power-log processor
///
/// Reads battery telemetry logs recorded by the OLPC power logging script,
/// derives per-interval power and energy figures and writes a per-run summary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pwrlog",
    version,
    about = "Process OLPC battery power logs into watts, watt-hours and run summaries"
)]
pub struct Args {
    /// Power-log files, directories or glob patterns
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<String>,

    /// Summary output file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Summary file format
    #[arg(short = 'f', long = "format", value_enum)]
    pub format: Option<OutputFormat>,

    /// Parquet compression algorithm
    #[arg(long = "compression", value_enum)]
    pub compression: Option<CompressionAlgorithm>,

    /// Summary sort order
    #[arg(long = "sort", value_enum)]
    pub sort: Option<SortKey>,

    /// Write processed-<name>.csv per kept file, optionally into DIR
    #[arg(long = "processed", value_name = "DIR", num_args = 0..=1)]
    pub processed: Option<Option<PathBuf>>,

    /// Minimum seconds between samples for an interval to count
    #[arg(long = "min-interval", value_name = "SECS")]
    pub min_interval: Option<f64>,

    /// Lowest plausible wattage (negative for discharge)
    #[arg(long = "min-watts", value_name = "WATTS", allow_negative_numbers = true)]
    pub min_watts: Option<f64>,

    /// Highest plausible wattage
    #[arg(long = "max-watts", value_name = "WATTS", allow_negative_numbers = true)]
    pub max_watts: Option<f64>,

    /// Longest plausible run in hours
    #[arg(long = "max-hours", value_name = "HOURS")]
    pub max_hours: Option<f64>,

    /// Only process logs whose BUILD contains one of these
    #[arg(long = "build", value_name = "LIST", value_delimiter = ',')]
    pub builds: Vec<String>,

    /// Only process logs from these laptop serial numbers
    #[arg(long = "serial", value_name = "LIST", value_delimiter = ',')]
    pub serials: Vec<String>,

    /// Only process logs from these XO hardware versions
    #[arg(long = "xover", value_name = "LIST", value_delimiter = ',')]
    pub xovers: Vec<String>,

    /// Skip runs recorded before this date
    #[arg(long = "ignore-before", value_name = "DATE", value_parser = parse_cutoff)]
    pub ignore_before: Option<DateTime<Utc>>,

    /// Keep invalid runs in the summary
    #[arg(long = "include-errors")]
    pub include_errors: bool,

    /// Keep only invalid runs in the summary
    #[arg(long = "only-errors")]
    pub only_errors: bool,

    /// Keep runs with a net charge gain
    #[arg(long = "positive")]
    pub positive: bool,

    /// Keep runs with a net charge loss
    #[arg(long = "negative")]
    pub negative: bool,

    /// Fail a file on the first out-of-range wattage
    #[arg(long = "abort-on-wattage")]
    pub abort_on_wattage: bool,

    /// Fail a file on the first out-of-range elapsed time
    #[arg(long = "abort-on-elapsed")]
    pub abort_on_elapsed: bool,

    /// Number of files processed concurrently
    #[arg(short = 'j', long = "workers", value_name = "COUNT")]
    pub workers: Option<usize>,

    /// Path to a YAML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

fn parse_cutoff(text: &str) -> std::result::Result<DateTime<Utc>, String> {
    parse_fuzzy_date(text)
        .map(|parsed| parsed.datetime.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

impl Args {
    /// Determine the appropriate log level based on verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    pub fn show_progress(&self) -> bool {
        !self.quiet
    }

    /// Layer command-line flags over a loaded configuration
    pub fn apply_to(&self, mut config: PwrLogConfig) -> Result<PwrLogConfig> {
        let limits = &mut config.limits;
        if let Some(secs) = self.min_interval {
            limits.min_sample_interval_secs = secs;
        }
        if let Some(watts) = self.min_watts {
            limits.min_watts = watts;
        }
        if let Some(watts) = self.max_watts {
            limits.max_watts = watts;
        }
        if let Some(hours) = self.max_hours {
            limits.max_elapsed_hours = hours;
        }

        let filter = &mut config.filter;
        if !self.builds.is_empty() {
            filter.builds = self.builds.clone();
        }
        if !self.serials.is_empty() {
            filter.serials = self.serials.clone();
        }
        if !self.xovers.is_empty() {
            filter.xovers = self.xovers.clone();
        }
        if self.ignore_before.is_some() {
            filter.ignore_before = self.ignore_before;
        }

        let selection = &mut config.selection;
        selection.include_errors |= self.include_errors;
        selection.only_errors |= self.only_errors;
        selection.positive |= self.positive;
        selection.negative |= self.negative;

        config.abort_on_wattage_error |= self.abort_on_wattage;
        config.abort_on_elapsed_error |= self.abort_on_elapsed;

        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(format) = self.format {
            config.output_format = format;
        }
        if let Some(compression) = self.compression {
            config.compression = compression;
        }
        if let Some(sort) = self.sort {
            config.sort_by = sort;
        }
        if let Some(dir) = &self.processed {
            config = config.with_processed_output(dir.clone());
        }

        config.validate()?;
        Ok(config)
    }
}
