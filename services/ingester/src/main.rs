//! Observation ingester.
//!
//! Binds a column mapping to a platform, then streams the rows of one or
//! more CSV files into the xenia `multi_obs` table through the background
//! writer.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ingester::{CsvSource, IngesterConfig, IngestionPipeline};
use obs_mapping::ObsMapping;
use xenia_common::PlatformHandle;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Load sensor observations into a xenia database")]
struct Args {
    /// Configuration file path (environment variables are used when absent)
    #[arg(short, long, env = "XENIA_CONFIG")]
    config: Option<PathBuf>,

    /// JSON column mapping file
    #[arg(short, long)]
    mapping: PathBuf,

    /// Platform handle, e.g. noaa.buoy1
    #[arg(short, long)]
    platform: String,

    /// CSV files to ingest
    #[arg(short, long, required = true, num_args = 1..)]
    input: Vec<PathBuf>,

    /// Create missing observation and unit types while binding the mapping
    #[arg(long)]
    add_missing: bool,

    /// Override the number of records per commit
    #[arg(long)]
    records_before_commit: Option<usize>,

    /// Create missing tables before ingesting
    #[arg(long)]
    init_schema: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing; RUST_LOG overrides --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match args.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    info!("Starting observation ingester");

    let mut config = IngesterConfig::load(args.config.as_deref())?;
    if args.add_missing {
        config.add_missing = true;
    }
    if let Some(records) = args.records_before_commit {
        config.records_before_commit = records;
        config.writer_config()?;
    }
    info!(
        database = %config.database.database_name(),
        records_before_commit = config.records_before_commit,
        add_missing = config.add_missing,
        "Loaded configuration"
    );

    let handle = PlatformHandle::parse(&args.platform)?;
    let mapping = ObsMapping::load_file(&args.mapping)
        .with_context(|| format!("Failed to load mapping {}", args.mapping.display()))?;

    let mut pipeline = IngestionPipeline::new(&config, args.init_schema).await?;
    pipeline.register_platform(&handle, mapping).await?;

    let mut failures = 0usize;
    for path in &args.input {
        let result = match CsvSource::open(path) {
            Ok(mut source) => pipeline.ingest(&handle, &mut source).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(summary) => info!(
                file = %path.display(),
                rows = summary.rows,
                committed = summary.writer.committed,
                duplicates = summary.writer.duplicates,
                "File ingested"
            ),
            Err(e) => {
                let message = format!("{:#}", e);
                error!(file = %path.display(), error = %message, "File ingestion failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} files failed", failures, args.input.len());
    }
    info!(files = args.input.len(), "Ingestion finished");
    Ok(())
}
