use anyhow::{Context, Result};
use clap::Parser;
use pwrlog_processor::cli::Args;
use pwrlog_processor::config::PwrLogConfig;
use pwrlog_processor::error::PwrLogError;
use pwrlog_processor::models::ProcessingStats;
use pwrlog_processor::processor::BatchProcessor;
use std::process;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let args = Args::parse();

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        let shutdown_signal = async {
            if tokio::signal::ctrl_c().await.is_err() {
                // no signal handler; let the batch run to completion
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            result = run(args) => result,
            _ = shutdown_signal => {
                eprintln!("\nReceived CTRL+C, shutting down...");
                Err(PwrLogError::Interrupted {
                    reason: "Processing interrupted by user".to_string(),
                }
                .into())
            }
        }
    });

    match result {
        Ok(stats) if stats.files_found > 0 && stats.files_failed == stats.files_found => {
            eprintln!("Error: all {} files failed to process", stats.files_found);
            process::exit(1);
        }
        Ok(_stats) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<ProcessingStats> {
    setup_logging(args.get_log_level(), args.quiet)?;

    let config = PwrLogConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    let config = args
        .apply_to(config)
        .context("Invalid command-line options")?;
    debug!("Effective configuration: {:?}", config);

    let processor = BatchProcessor::new(args.inputs.clone(), args.output.clone())
        .with_config(config)
        .with_progress(args.show_progress());

    let stats = processor
        .process()
        .await
        .context("Power log processing failed")?;
    info!(
        "Processed {} of {} files in {}ms",
        stats.files_processed, stats.files_found, stats.processing_time_ms
    );
    Ok(stats)
}

/// Install the tracing subscriber; `RUST_LOG` takes precedence over flags
fn setup_logging(level: &str, quiet: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pwrlog_processor={}", level)));

    if quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("Failed to initialize logging")?;
    }
    Ok(())
}
