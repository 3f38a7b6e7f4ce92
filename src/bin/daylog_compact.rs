use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use daylog::{
    Compactor, CompactorConfig, DayKey, FetchFailurePolicy, GzipCsvSink, LocalStore,
    MalformedPolicy, RunOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "daylog-compact")]
#[command(about = "Compact per-request access-log objects into one sorted gzip CSV per day")]
struct Cli {
    /// JSON config file; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding one subdirectory per bucket
    #[arg(long)]
    store_root: PathBuf,

    /// Source bucket
    #[arg(long)]
    bucket: Option<String>,

    /// Key prefix to compact (e.g. logs/)
    #[arg(long)]
    prefix: Option<String>,

    /// Output directory for <day>.csv.gz archives
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Wall-clock budget for the whole run, in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Fetch workers per day (default: available parallelism)
    #[arg(long)]
    workers: Option<usize>,

    /// Characters of the object base name forming the day token
    #[arg(long, conflicts_with = "day_from_dir")]
    token_len: Option<usize>,

    /// Use the object's parent directory as the day token
    #[arg(long)]
    day_from_dir: bool,

    /// Drop a whole object when one of its records is malformed
    #[arg(long)]
    reject_malformed_objects: bool,

    /// Fail a day as soon as one of its objects cannot be fetched
    #[arg(long)]
    abort_day_on_fetch_failure: bool,

    /// Fail any day holding more lines than this
    #[arg(long)]
    max_day_lines: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let sink = GzipCsvSink::create(&config.output_dir)
        .with_context(|| format!("create output dir {}", config.output_dir.display()))?;
    let store = Arc::new(LocalStore::new(&cli.store_root));
    let mut compactor = Compactor::new(store, sink, config).context("invalid configuration")?;

    let report = compactor.run();
    for day in &report.days_written {
        let coverage = if day.stats.is_complete() {
            String::new()
        } else {
            format!(
                " failed={} skipped={}",
                day.stats.failed.len(),
                day.stats.skipped
            )
        };
        println!(
            "day={} lines={} objects={} path={}{}",
            day.day, day.lines, day.stats.objects, day.location, coverage
        );
    }
    for failure in &report.days_failed {
        println!("day={} error={}", failure.day, failure.error);
    }

    match report.outcome {
        RunOutcome::Done => {
            println!("done: {} days, {} lines", report.days_written.len(), report.total_lines());
            Ok(())
        }
        RunOutcome::TimedOut => {
            println!(
                "timed out: {} days, {} lines",
                report.days_written.len(),
                report.total_lines()
            );
            Ok(())
        }
        RunOutcome::Failed(err) => Err(anyhow!(err).context("compaction stopped")),
    }
}

fn build_config(cli: &Cli) -> Result<CompactorConfig> {
    let mut config = match cli.config.as_ref() {
        Some(path) => CompactorConfig::read(path)
            .with_context(|| format!("read config {}", path.display()))?,
        None => CompactorConfig::default(),
    };

    if let Some(bucket) = cli.bucket.as_ref() {
        config.source_bucket = bucket.clone();
    }
    if let Some(prefix) = cli.prefix.as_ref() {
        config.source_prefix = prefix.clone();
    }
    if let Some(dir) = cli.output_dir.as_ref() {
        config.output_dir = dir.clone();
    }
    if let Some(timeout) = cli.timeout_secs {
        config.timeout_secs = timeout;
    }
    if cli.workers.is_some() {
        config.workers = cli.workers;
    }
    if let Some(len) = cli.token_len {
        config.day_key = DayKey::base_name(len);
    }
    if cli.day_from_dir {
        config.day_key = DayKey::ParentDir;
    }
    if cli.reject_malformed_objects {
        config.malformed_policy = MalformedPolicy::RejectObject;
    }
    if cli.abort_day_on_fetch_failure {
        config.fetch_failure_policy = FetchFailurePolicy::AbortDay;
    }
    if cli.max_day_lines.is_some() {
        config.max_day_lines = cli.max_day_lines;
    }
    if config.source_bucket.is_empty() {
        return Err(anyhow!("--bucket or a config file with source_bucket is required"));
    }
    Ok(config)
}
