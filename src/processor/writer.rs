//! Tabular output for processed power logs.
//!
//! Converts record sequences and file summaries into polars frames and writes
//! them as CSV or Parquet, plus the per-file `processed-<stem>.csv`.

use crate::config::{CompressionAlgorithm, OutputFormat, SortKey};
use crate::constants::PROCESSED_FILE_PREFIX;
use crate::error::{PwrLogError, Result};
use crate::reader::FileOutcome;

use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One row per derived record
pub fn records_to_frame(outcome: &FileOutcome) -> Result<DataFrame> {
    let records = &outcome.records;
    let df = df!(
        "line" => records.iter().map(|r| r.line as u64).collect::<Vec<_>>(),
        "kind" => records.iter().map(|r| r.kind.as_str()).collect::<Vec<_>>(),
        "seconds" => records.iter().map(|r| r.sample.seconds).collect::<Vec<_>>(),
        "soc" => records.iter().map(|r| r.sample.state_of_charge).collect::<Vec<_>>(),
        "volts" => records.iter().map(|r| r.sample.volts).collect::<Vec<_>>(),
        "milliamps" => records.iter().map(|r| r.sample.milliamps).collect::<Vec<_>>(),
        "temperature_c" => records.iter().map(|r| r.sample.temperature_c).collect::<Vec<_>>(),
        "acr_mah" => records.iter().map(|r| r.sample.accumulated_charge_mah).collect::<Vec<_>>(),
        "elapsed_hours" => records.iter().map(|r| r.interval.elapsed_hours).collect::<Vec<_>>(),
        "delta_seconds" => records.iter().map(|r| r.interval.delta_seconds).collect::<Vec<_>>(),
        "delta_acr_mah" => records.iter().map(|r| r.interval.delta_accumulated_charge).collect::<Vec<_>>(),
        "avg_current_ma" => records.iter().map(|r| r.interval.avg_current_ma).collect::<Vec<_>>(),
        "net_acr_mah" => records.iter().map(|r| r.interval.net_accumulated_charge_mah).collect::<Vec<_>>(),
        "avg_volts" => records.iter().map(|r| r.interval.avg_volts).collect::<Vec<_>>(),
        "watts" => records.iter().map(|r| r.interval.watts).collect::<Vec<_>>(),
        "watt_hours" => records.iter().map(|r| r.interval.cumulative_watt_hours).collect::<Vec<_>>(),
        "charge_wh" => records.iter().map(|r| r.interval.charge_watt_hours).collect::<Vec<_>>(),
        "discharge_wh" => records.iter().map(|r| r.interval.discharge_watt_hours).collect::<Vec<_>>(),
        "avg_watts" => records.iter().map(|r| r.interval.avg_watts).collect::<Vec<_>>(),
        "delta_temp_c" => records.iter().map(|r| r.interval.delta_temperature_c).collect::<Vec<_>>(),
        "impedance" => records.iter().map(|r| r.interval.impedance).collect::<Vec<_>>(),
        "time_of_day" => records.iter().map(|r| r.interval.time_of_day_hours).collect::<Vec<_>>(),
    )?;
    Ok(df)
}

/// One row per file, in input order
pub fn summaries_to_frame(outcomes: &[FileOutcome]) -> Result<DataFrame> {
    let file: Vec<String> = outcomes
        .iter()
        .map(|o| o.path.display().to_string())
        .collect();
    let build: Vec<String> = outcomes.iter().map(|o| o.header.build()).collect();
    let run_date: Vec<Option<String>> = outcomes
        .iter()
        .map(|o| {
            o.header
                .run_date()
                .map(|d| d.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string())
        })
        .collect();
    let s = |f: fn(&FileOutcome) -> f64| outcomes.iter().map(f).collect::<Vec<f64>>();
    let opt = |f: fn(&FileOutcome) -> Option<f64>| outcomes.iter().map(f).collect::<Vec<_>>();

    let df = df!(
        "file" => file,
        "build" => build,
        "battery_serial" => outcomes.iter().map(|o| o.header.battery_serial()).collect::<Vec<_>>(),
        "laptop_serial" => outcomes.iter().map(|o| o.header.laptop_serial()).collect::<Vec<_>>(),
        "xo_version" => outcomes.iter().map(|o| o.header.xo_version()).collect::<Vec<_>>(),
        "kernel_api" => outcomes.iter().map(|o| o.header.kernel_api()).collect::<Vec<_>>(),
        "run_date_utc" => run_date,
        "net_hours" => s(|o| o.summary.net_elapsed_hours),
        "net_acr_mah" => s(|o| o.summary.net_accumulated_charge_mah),
        "cv_acr_mah" => opt(|o| o.summary.cv_accumulated_charge_mah),
        "cv_hours" => opt(|o| o.summary.cv_hours),
        "watt_hours" => s(|o| o.summary.total_watt_hours),
        "min_watts" => opt(|o| o.summary.min_watts),
        "max_watts" => opt(|o| o.summary.max_watts),
        "avg_watts" => s(|o| o.summary.avg_watts),
        "charge_wh" => s(|o| o.summary.charge_watt_hours),
        "discharge_wh" => s(|o| o.summary.discharge_watt_hours),
        "critical_onset_hours" => opt(|o| o.summary.critical_voltage_onset_hours),
        "critical_minutes" => s(|o| o.summary.critical_voltage_duration_minutes),
        "critical_acr_mah" => s(|o| o.summary.critical_accumulated_charge_mah),
        "max_temp_c" => opt(|o| o.summary.max_temperature_c),
        "max_temp_rise_c" => s(|o| o.summary.max_temperature_rise_c),
        "start_volts" => s(|o| o.summary.starting_voltage),
        "charge_ticks" => outcomes.iter().map(|o| o.summary.charge_ticks).collect::<Vec<_>>(),
        "discharge_ticks" => outcomes.iter().map(|o| o.summary.discharge_ticks).collect::<Vec<_>>(),
        "valid_intervals" => outcomes.iter().map(|o| o.summary.valid_intervals as u64).collect::<Vec<_>>(),
        "valid" => outcomes.iter().map(|o| o.is_valid()).collect::<Vec<_>>(),
    )?;
    Ok(df)
}

/// Order a summary frame; nulls sort last
pub fn sort_summary(df: DataFrame, key: SortKey) -> Result<DataFrame> {
    let sorted = df
        .lazy()
        .sort_by_exprs(
            [col(key.column()), col("file")],
            SortMultipleOptions::default().with_nulls_last(true),
        )
        .collect()?;
    Ok(sorted)
}

/// Writes frames in the configured format
#[derive(Debug, Clone)]
pub struct OutputWriter {
    format: OutputFormat,
    compression: CompressionAlgorithm,
}

impl OutputWriter {
    pub fn new(format: OutputFormat, compression: CompressionAlgorithm) -> Self {
        Self {
            format,
            compression,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Write a frame, creating parent directories as needed
    pub fn write_frame(&self, df: &mut DataFrame, path: &Path) -> Result<usize> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let rows = df.height();
        match self.format {
            OutputFormat::Csv => write_csv(df, path)?,
            OutputFormat::Parquet => {
                let file = File::create(path)?;
                ParquetWriter::new(file)
                    .with_compression(self.compression.to_polars_compression())
                    .finish(df)
                    .map_err(|e| PwrLogError::ProcessingFailed {
                        path: path.to_path_buf(),
                        reason: format!("Failed to write parquet: {}", e),
                    })?;
            }
        }

        debug!("Wrote {} rows to {}", rows, path.display());
        Ok(rows)
    }
}

/// `processed-<stem>.csv` in `dir`, or beside the source file
pub fn processed_path(source: &Path, dir: Option<&Path>) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "log".to_string());
    let name = format!("{}{}.csv", PROCESSED_FILE_PREFIX, stem);
    match dir {
        Some(dir) => dir.join(name),
        None => source
            .parent()
            .map(|p| p.join(&name))
            .unwrap_or_else(|| PathBuf::from(&name)),
    }
}

/// Write the per-record table for one file as CSV
pub fn write_processed(outcome: &FileOutcome, dir: Option<&Path>) -> Result<PathBuf> {
    let path = processed_path(&outcome.path, dir);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut df = records_to_frame(outcome)?;
    write_csv(&mut df, &path)?;
    Ok(path)
}

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .map_err(|e| PwrLogError::ProcessingFailed {
            path: path.to_path_buf(),
            reason: format!("Failed to write CSV: {}", e),
        })
}
