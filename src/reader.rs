//! Per-file orchestration: header, conversion, intervals, repair, summary.
//!
//! A file moves through header parsing, first-sample synthesis and sample
//! streaming, then an end-of-file repair of a truncated trailing interval
//! before its summary is computed. Row-level failures are counted and
//! skipped; only the abort policies turn a rejected interval into a file error.

use crate::config::{FileFilter, ProcessingLimits, PwrLogConfig};
use crate::constants::header_keys;
use crate::convert::SampleConverter;
use crate::error::{PwrLogError, Result};
use crate::header::parse_header;
use crate::interval::{IntervalProcessor, ProcessingContext};
use crate::models::{
    ConvertedSample, DerivedRecord, FileSummary, IntervalVerdict, LogHeader, RawSample,
    ReadStats, RecordKind,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Everything produced for one power-log file
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub header: LogHeader,
    pub records: Vec<DerivedRecord>,
    pub summary: FileSummary,
    pub stats: ReadStats,
}

impl FileOutcome {
    pub fn is_valid(&self) -> bool {
        self.summary.is_valid()
    }

    /// Why the file is excluded from summaries by default, if it is
    pub fn validity_error(&self) -> Option<PwrLogError> {
        if !self.summary.time_period_valid {
            Some(PwrLogError::FileTooShort {
                path: self.path.clone(),
            })
        } else if !self.summary.power_output_valid {
            Some(PwrLogError::ProcessingFailed {
                path: self.path.clone(),
                reason: format!(
                    "{} interval(s) with wattage outside limits",
                    self.stats.wattage_rejections
                ),
            })
        } else {
            None
        }
    }
}

/// Reads and processes power-log files with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct FileReader {
    limits: ProcessingLimits,
    filter: FileFilter,
    abort_on_wattage_error: bool,
    abort_on_elapsed_error: bool,
}

impl FileReader {
    pub fn new(limits: ProcessingLimits) -> Self {
        Self {
            limits,
            ..Default::default()
        }
    }

    pub fn from_config(config: &PwrLogConfig) -> Self {
        Self {
            limits: config.limits,
            filter: config.filter.clone(),
            abort_on_wattage_error: config.abort_on_wattage_error,
            abort_on_elapsed_error: config.abort_on_elapsed_error,
        }
    }

    pub fn with_filter(mut self, filter: FileFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_abort_policy(mut self, on_wattage: bool, on_elapsed: bool) -> Self {
        self.abort_on_wattage_error = on_wattage;
        self.abort_on_elapsed_error = on_elapsed;
        self
    }

    /// Read and process one file from disk
    pub fn read(&self, path: &Path) -> Result<FileOutcome> {
        if !path.exists() {
            return Err(PwrLogError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        if std::fs::metadata(path)?.len() == 0 {
            return Err(PwrLogError::EmptyFile {
                path: path.to_path_buf(),
            });
        }

        let bytes = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);
        self.read_str(path, &text)
    }

    /// Process a log from any buffered source; `name` labels errors and output
    pub fn read_lines<R: BufRead>(&self, name: &Path, mut source: R) -> Result<FileOutcome> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            return Err(PwrLogError::EmptyFile {
                path: name.to_path_buf(),
            });
        }
        self.read_str(name, &String::from_utf8_lossy(&bytes))
    }

    /// Process a log already held in memory
    pub fn read_str(&self, name: &Path, text: &str) -> Result<FileOutcome> {
        if text.trim().is_empty() {
            return Err(PwrLogError::EmptyFile {
                path: name.to_path_buf(),
            });
        }

        // Header section; track bytes so the data section can be sliced off
        let mut header_bytes = 0;
        let mut lines = text
            .split_inclusive('\n')
            .inspect(|line| header_bytes += line.len())
            .map(|line| line.trim_end_matches(['\r', '\n']));
        let parsed = parse_header(&mut lines);
        drop(lines);

        if !parsed.found_marker {
            return Err(PwrLogError::NoDataMarker {
                path: name.to_path_buf(),
            });
        }
        let header = parsed.header;

        if let Some(reason) = self.filter.exclusion_reason(&header) {
            return Err(PwrLogError::Filtered {
                path: name.to_path_buf(),
                reason,
            });
        }

        let mut stats = ReadStats {
            header_lines: parsed.lines_consumed,
            ..Default::default()
        };
        debug!(
            "{}: XO {} kernel API {} build {}",
            name.display(),
            header.xo_version(),
            header.kernel_api(),
            header.build()
        );

        let converter = SampleConverter::new(header.hardware());
        let processor = IntervalProcessor::new(self.limits, header.timezone());
        let mut session: Option<SampleSession> = None;

        let mut row_builder = csv::ReaderBuilder::new();
        row_builder
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All);

        // One record per physical line so line numbers hold for CRLF input
        for (offset, text_line) in text[header_bytes..].split_inclusive('\n').enumerate() {
            let line = parsed.lines_consumed + offset + 1;
            if text_line.trim().is_empty() {
                continue;
            }
            stats.data_rows += 1;

            let mut record = csv::StringRecord::new();
            match row_builder
                .from_reader(text_line.as_bytes())
                .read_record(&mut record)
            {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    debug!("{}: unreadable line {}: {}", name.display(), line, e);
                    stats.conversion_errors += 1;
                    continue;
                }
            }

            let sample = match RawSample::from_record(&record).and_then(|raw| converter.convert(&raw))
            {
                Ok(sample) => sample,
                Err(e) if e.is_recoverable() => {
                    if matches!(e, PwrLogError::AccumulatedChargeDecode { .. }) {
                        stats.charge_decode_errors += 1;
                    } else {
                        stats.conversion_errors += 1;
                    }
                    debug!("{}: skipping line {}: {}", name.display(), line, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match session.as_mut() {
                None => session = Some(SampleSession::start(line, sample, &processor)),
                Some(session) => {
                    let verdict = session.push(line, sample, &processor, &mut stats);
                    self.apply_policy(name, line, verdict)?;
                }
            }
        }

        let Some(session) = session else {
            return Err(PwrLogError::NoSamples {
                path: name.to_path_buf(),
            });
        };

        let (records, power_output_valid) = session.finish(&processor, &mut stats);
        let summary = FileSummary::from_records(&records, &header, &self.limits, power_output_valid);

        if stats.rows_skipped() > 0 {
            warn!(
                "{}: skipped {} unconvertible row(s)",
                name.display(),
                stats.rows_skipped()
            );
        }
        debug!(
            "{}: {} valid intervals, {} short, {:.3} Wh over {:.2} h",
            name.display(),
            stats.valid_intervals,
            stats.short_intervals,
            summary.total_watt_hours,
            summary.net_elapsed_hours
        );

        Ok(FileOutcome {
            path: name.to_path_buf(),
            header,
            records,
            summary,
            stats,
        })
    }

    fn apply_policy(&self, name: &Path, line: usize, verdict: IntervalVerdict) -> Result<()> {
        let abort = match verdict {
            IntervalVerdict::WattageOutOfRange => self.abort_on_wattage_error,
            IntervalVerdict::ElapsedTimeOutOfRange => self.abort_on_elapsed_error,
            _ => false,
        };
        match verdict.reject_reason() {
            Some(reason) if abort => Err(PwrLogError::IntervalRejected {
                path: name.to_path_buf(),
                line,
                reason,
            }),
            _ => Ok(()),
        }
    }
}

/// Running state between the first sample and end of file
struct SampleSession {
    ctx: ProcessingContext,
    records: Vec<DerivedRecord>,
    /// Sample that produced the last valid interval
    baseline: ConvertedSample,
    /// Baseline the last valid interval was measured from
    last_full_baseline: Option<ConvertedSample>,
    /// Final sample so far, when it was rejected as too short
    pending_tail: Option<(usize, ConvertedSample)>,
    power_output_valid: bool,
}

impl SampleSession {
    /// Seed the context from the first sample against a synthetic predecessor
    /// one second earlier
    fn start(line: usize, first: ConvertedSample, processor: &IntervalProcessor) -> Self {
        let ctx = ProcessingContext::start(&first);
        let synthetic = ConvertedSample {
            seconds: first.seconds - 1.0,
            ..first
        };

        let mut interval = processor.process(&first, &synthetic, &ctx, false).result;
        interval.zero_deltas();

        Self {
            ctx,
            records: vec![DerivedRecord {
                line,
                kind: RecordKind::Initial,
                sample: first,
                interval,
            }],
            baseline: first,
            last_full_baseline: None,
            pending_tail: None,
            power_output_valid: true,
        }
    }

    fn push(
        &mut self,
        line: usize,
        sample: ConvertedSample,
        processor: &IntervalProcessor,
        stats: &mut ReadStats,
    ) -> IntervalVerdict {
        let outcome = processor.process(&sample, &self.baseline, &self.ctx, false);

        match outcome.verdict {
            IntervalVerdict::Valid => {
                self.ctx.commit(&outcome);
                self.records.push(DerivedRecord {
                    line,
                    kind: RecordKind::Interval,
                    sample,
                    interval: outcome.result,
                });
                self.last_full_baseline = Some(self.baseline);
                self.baseline = sample;
                self.pending_tail = None;
                stats.valid_intervals += 1;
            }
            IntervalVerdict::TooShort => {
                self.pending_tail = Some((line, sample));
                stats.short_intervals += 1;
            }
            IntervalVerdict::WattageOutOfRange => {
                debug!("Line {}: {:.3} W outside limits", line, outcome.result.watts);
                self.power_output_valid = false;
                self.pending_tail = None;
                stats.wattage_rejections += 1;
            }
            IntervalVerdict::ElapsedTimeOutOfRange => {
                debug!(
                    "Line {}: elapsed {:.2} h outside limits",
                    line, outcome.result.elapsed_hours
                );
                self.pending_tail = None;
                stats.elapsed_rejections += 1;
            }
        }

        outcome.verdict
    }

    /// Repair a short trailing interval, returning the records and the
    /// power-output validity
    fn finish(
        mut self,
        processor: &IntervalProcessor,
        stats: &mut ReadStats,
    ) -> (Vec<DerivedRecord>, bool) {
        if let (Some((line, sample)), Some(full_baseline)) =
            (self.pending_tail, self.last_full_baseline)
        {
            let mut trial = self.ctx.clone();
            trial.back_out_last_interval();
            let outcome = processor.process(&sample, &full_baseline, &trial, true);

            if outcome.verdict.is_valid() {
                trial.commit(&outcome);
                self.ctx = trial;
                if let Some(last) = self.records.last_mut() {
                    *last = DerivedRecord {
                        line,
                        kind: RecordKind::Repaired,
                        sample,
                        interval: outcome.result,
                    };
                }
                stats.repaired_tail = true;
                debug!("Repaired trailing interval ending at line {}", line);
            } else {
                debug!(
                    "Trailing interval at line {} not repaired: {:?}",
                    line, outcome.verdict
                );
            }
        }

        (self.records, self.power_output_valid)
    }
}

/// Serial-number label used in log messages
pub fn describe(header: &LogHeader) -> String {
    format!(
        "{} / {}",
        header.get(header_keys::SERNUM).unwrap_or("?"),
        header.get(header_keys::BATSER).unwrap_or("?")
    )
}
