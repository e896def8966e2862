//! Batch processing engine.
//!
//! Discovers power-log files, reads them concurrently on the blocking pool,
//! applies the summary selection rules and writes the batch outputs.

pub mod discovery;
pub mod writer;

#[cfg(test)]
pub mod tests;

use self::discovery::FileDiscovery;
use self::writer::{OutputWriter, sort_summary, summaries_to_frame, write_processed};

use crate::config::PwrLogConfig;
use crate::error::{PwrLogError, Result};
use crate::models::ProcessingStats;
use crate::reader::{FileOutcome, FileReader, describe};

use colored::*;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::task;
use tracing::{debug, error, info, warn};

/// Outcome of reading one file inside a batch
#[derive(Debug)]
enum FileResult {
    Kept(Box<FileOutcome>),
    Deselected(Box<FileOutcome>),
    Filtered(PwrLogError),
    Failed(PwrLogError),
}

/// Processor for a batch of power logs
#[derive(Debug)]
pub struct BatchProcessor {
    inputs: Vec<String>,
    output_path: Option<PathBuf>,
    config: PwrLogConfig,
    show_progress: bool,
}

impl BatchProcessor {
    pub fn new(inputs: Vec<String>, output_path: Option<PathBuf>) -> Self {
        Self {
            inputs,
            output_path,
            config: PwrLogConfig::default(),
            show_progress: true,
        }
    }

    /// Configure the processor
    pub fn with_config(mut self, config: PwrLogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Main processing entry point
    pub async fn process(&self) -> Result<ProcessingStats> {
        let start_time = Instant::now();
        self.config.validate()?;

        if self.show_progress {
            println!("{}", "Starting power log processing".bright_green().bold());
        }

        let mut discovery = FileDiscovery::new(self.inputs.clone());
        let files = discovery.discover()?;
        if self.show_progress {
            println!(
                "  {} {} files",
                "Found".bright_green(),
                files.len().to_string().bright_white().bold()
            );
        }

        let (outcomes, mut stats) = self.process_files(&files).await?;

        if self.config.write_processed {
            let dir = self.config.processed_dir.as_deref();
            for outcome in &outcomes {
                let path = write_processed(outcome, dir)?;
                debug!("Wrote {}", path.display());
            }
        }

        if let Some(output_path) = &self.output_path {
            self.write_summary(&outcomes, output_path)?;
            stats.output_path = Some(output_path.clone());
        }

        stats.processing_time_ms = start_time.elapsed().as_millis();
        if self.show_progress {
            print_summary(&stats);
        }
        Ok(stats)
    }

    /// Read files concurrently and keep those passing the selection rules.
    ///
    /// Returned outcomes are in path order regardless of completion order.
    pub async fn process_files(
        &self,
        files: &[PathBuf],
    ) -> Result<(Vec<FileOutcome>, ProcessingStats)> {
        let progress = if self.show_progress {
            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                    .map_err(|e| PwrLogError::configuration(format!("Invalid progress template: {}", e)))?
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };
        progress.set_message("Processing files");

        let reader = FileReader::from_config(&self.config);
        let selection = self.config.selection;
        let concurrent_limit = self.config.workers.max(1);

        let results: Vec<FileResult> = stream::iter(files.iter().cloned())
            .map(|path| {
                let reader = reader.clone();
                let pb = progress.clone();
                async move {
                    if let Some(name) = path.file_name() {
                        pb.set_message(format!("Processing: {}", name.to_string_lossy()));
                    }
                    let task_path = path.clone();
                    let result = task::spawn_blocking(move || reader.read(&task_path))
                        .await
                        .unwrap_or_else(|e| {
                            Err(PwrLogError::ProcessingFailed {
                                path: path.clone(),
                                reason: format!("Reader task failed: {}", e),
                            })
                        });
                    pb.inc(1);

                    match result {
                        Ok(outcome) if selection.accepts(&outcome.summary) => {
                            FileResult::Kept(Box::new(outcome))
                        }
                        Ok(outcome) => FileResult::Deselected(Box::new(outcome)),
                        Err(e) if e.is_skip() => FileResult::Filtered(e),
                        Err(e) => FileResult::Failed(e),
                    }
                }
            })
            .buffer_unordered(concurrent_limit)
            .collect()
            .await;

        progress.finish_with_message("Processing complete");

        let mut stats = ProcessingStats {
            files_found: files.len(),
            ..Default::default()
        };
        let mut kept = Vec::new();

        for result in results {
            match result {
                FileResult::Kept(outcome) => {
                    stats.files_processed += 1;
                    if !outcome.is_valid() {
                        stats.files_invalid += 1;
                    }
                    stats.total_records += outcome.records.len();
                    kept.push(*outcome);
                }
                FileResult::Deselected(outcome) => {
                    stats.files_processed += 1;
                    if let Some(reason) = outcome.validity_error() {
                        stats.files_invalid += 1;
                        warn!("Excluded from summary ({}): {}", describe(&outcome.header), reason);
                    } else {
                        debug!("Not selected: {}", outcome.path.display());
                    }
                }
                FileResult::Filtered(e) => {
                    stats.files_filtered += 1;
                    info!("{}", e);
                }
                FileResult::Failed(e) => {
                    stats.files_failed += 1;
                    error!("{}", e);
                }
            }
        }

        kept.sort_by(|a, b| a.path.cmp(&b.path));
        Ok((kept, stats))
    }

    fn write_summary(&self, outcomes: &[FileOutcome], output_path: &Path) -> Result<()> {
        let df = summaries_to_frame(outcomes)?;
        let mut df = sort_summary(df, self.config.sort_by)?;
        let writer = OutputWriter::new(self.config.output_format, self.config.compression);
        let rows = writer.write_frame(&mut df, output_path)?;
        info!(
            "Wrote {} summary rows as {:?} to {}",
            rows,
            writer.format(),
            output_path.display()
        );
        Ok(())
    }
}

fn print_summary(stats: &ProcessingStats) {
    println!("\n{}", "Processing Summary".bright_green().bold());
    println!(
        "  {} {}ms",
        "Time elapsed:".bright_cyan(),
        stats.processing_time_ms.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Files processed:".bright_cyan(),
        stats.files_processed.to_string().bright_white()
    );
    if stats.files_invalid > 0 {
        println!(
            "  {} {}",
            "Files invalid:".bright_yellow(),
            stats.files_invalid.to_string().bright_yellow()
        );
    }
    if stats.files_filtered > 0 {
        println!(
            "  {} {}",
            "Files filtered:".bright_cyan(),
            stats.files_filtered.to_string().bright_white()
        );
    }
    if stats.files_failed > 0 {
        println!(
            "  {} {}",
            "Files failed:".bright_red(),
            stats.files_failed.to_string().bright_red().bold()
        );
    }
    println!(
        "  {} {}",
        "Total records:".bright_cyan(),
        stats.total_records.to_string().bright_white().bold()
    );
    if let Some(path) = &stats.output_path {
        println!("  {} {}", "Output:".bright_cyan(), path.display());
    }
}
