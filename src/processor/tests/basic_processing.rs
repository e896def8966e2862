//! Basic processing integration tests

use super::{CHARGE_LOG, DISCHARGE_LOG, SHORT_LOG, write_log};
use crate::config::{OutputFormat, PwrLogConfig, SortKey, SummarySelection};
use crate::processor::BatchProcessor;
use polars::prelude::*;
use std::fs;
use tempfile::TempDir;

fn create_log_dir(temp_dir: &TempDir) -> std::path::PathBuf {
    let logs = temp_dir.path().join("logs");
    fs::create_dir_all(&logs).unwrap();
    write_log(&logs, "pwr-discharge", DISCHARGE_LOG);
    write_log(&logs, "pwr-charge", CHARGE_LOG);
    write_log(&logs, "pwr-short", SHORT_LOG);
    logs
}

fn read_summary(path: &std::path::Path) -> DataFrame {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .unwrap()
        .finish()
        .unwrap()
}

#[tokio::test]
async fn test_basic_processing_pipeline() {
    let temp_dir = TempDir::new().unwrap();
    let logs = create_log_dir(&temp_dir);
    let output_path = temp_dir.path().join("out").join("summary.csv");

    let processor = BatchProcessor::new(
        vec![logs.display().to_string()],
        Some(output_path.clone()),
    )
    .with_progress(false);

    let stats = processor.process().await.unwrap();

    assert_eq!(stats.files_found, 3);
    assert_eq!(stats.files_processed, 3);
    assert_eq!(stats.files_invalid, 1);
    assert_eq!(stats.files_failed, 0);
    assert_eq!(stats.total_records, 6);
    assert_eq!(stats.output_path, Some(output_path.clone()));

    let df = read_summary(&output_path);
    assert_eq!(df.height(), 2);
    assert!(df.column("battery_serial").is_ok());
    assert!(df.column("watt_hours").is_ok());
}

#[tokio::test]
async fn test_summary_sorted_by_battery() {
    let temp_dir = TempDir::new().unwrap();
    let logs = create_log_dir(&temp_dir);
    let output_path = temp_dir.path().join("summary.csv");

    let config = PwrLogConfig {
        sort_by: SortKey::Battery,
        ..Default::default()
    };
    let processor = BatchProcessor::new(
        vec![logs.display().to_string()],
        Some(output_path.clone()),
    )
    .with_config(config)
    .with_progress(false);
    processor.process().await.unwrap();

    let df = read_summary(&output_path);
    let serials: Vec<Option<&str>> = df
        .column("battery_serial")
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(serials, vec![Some("BAT-A"), Some("BAT-B")]);
}

#[tokio::test]
async fn test_positive_selection_keeps_charge_runs() {
    let temp_dir = TempDir::new().unwrap();
    let logs = create_log_dir(&temp_dir);

    let config = PwrLogConfig::default().with_selection(SummarySelection {
        positive: true,
        ..Default::default()
    });
    let processor = BatchProcessor::new(Vec::new(), None)
        .with_config(config)
        .with_progress(false);
    let files = vec![logs.join("pwr-charge"), logs.join("pwr-discharge")];
    let (outcomes, stats) = processor.process_files(&files).await.unwrap();

    assert_eq!(stats.files_processed, 2);
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].summary.net_accumulated_charge_mah > 0.0);
    assert_eq!(outcomes[0].header.battery_serial(), Some("BAT-A"));
}

#[tokio::test]
async fn test_only_errors_keeps_short_run() {
    let temp_dir = TempDir::new().unwrap();
    let logs = create_log_dir(&temp_dir);

    let config = PwrLogConfig::default().with_selection(SummarySelection {
        only_errors: true,
        ..Default::default()
    });
    let processor = BatchProcessor::new(Vec::new(), None)
        .with_config(config)
        .with_progress(false);
    let files = vec![
        logs.join("pwr-charge"),
        logs.join("pwr-discharge"),
        logs.join("pwr-short"),
    ];
    let (outcomes, stats) = processor.process_files(&files).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].is_valid());
    assert_eq!(stats.files_invalid, 1);
}

#[tokio::test]
async fn test_processed_files_written() {
    let temp_dir = TempDir::new().unwrap();
    let logs = create_log_dir(&temp_dir);
    let processed_dir = temp_dir.path().join("processed");

    let config = PwrLogConfig::default().with_processed_output(Some(processed_dir.clone()));
    let processor = BatchProcessor::new(vec![logs.display().to_string()], None)
        .with_config(config)
        .with_progress(false);
    processor.process().await.unwrap();

    let processed = processed_dir.join("processed-pwr-discharge.csv");
    assert!(processed.exists());
    let df = read_summary(&processed);
    assert_eq!(df.height(), 3);
    assert!(df.column("watts").is_ok());
    // invalid runs are not selected and get no processed file
    assert!(!processed_dir.join("processed-pwr-short.csv").exists());
}

#[tokio::test]
async fn test_parquet_summary_output() {
    let temp_dir = TempDir::new().unwrap();
    let logs = create_log_dir(&temp_dir);
    let output_path = temp_dir.path().join("summary.parquet");

    let config = PwrLogConfig::default().with_output_format(OutputFormat::Parquet);
    let processor = BatchProcessor::new(
        vec![logs.display().to_string()],
        Some(output_path.clone()),
    )
    .with_config(config)
    .with_progress(false);
    processor.process().await.unwrap();

    let file = fs::File::open(&output_path).unwrap();
    let df = ParquetReader::new(file).finish().unwrap();
    assert_eq!(df.height(), 2);
}
