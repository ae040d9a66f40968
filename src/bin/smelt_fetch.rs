//! smelt-fetch: Download a JSON API response and write it out as CSV
//!
//! Usage:
//!   # 100 random users into data/results.csv
//!   smelt-fetch
//!
//!   # Different API and record count, custom output path
//!   smelt-fetch --url https://randomuser.me/api/?nat=no --results 500 -o out/users.csv
//!
//!   # Quote cells that contain delimiters, quotes, or newlines
//!   smelt-fetch --quote

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use smelt::{PipelineConfig, Quoting};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "smelt-fetch")]
#[command(about = "Fetch a JSON API response and convert it to CSV", long_about = None)]
struct Args {
    /// Base URL of the API (default: https://randomuser.me/api/)
    #[arg(long)]
    url: Option<String>,

    /// Number of records to request; 0 sends no count parameter (default: 100)
    #[arg(long, short = 'n')]
    results: Option<u32>,

    /// Output CSV file (default: data/results.csv)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Top-level key holding the records (default: "results")
    #[arg(long)]
    results_key: Option<String>,

    /// Fail if the records list is missing instead of writing an empty file
    #[arg(long)]
    strict: bool,

    /// Quote cells containing the delimiter, quotes, or newlines
    #[arg(long)]
    quote: bool,

    /// Field delimiter (default: ",")
    #[arg(long)]
    delimiter: Option<char>,

    /// Overall request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Connection timeout in seconds (default: 10)
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Number of CSV chunks buffered between conversion and file writes (default: 16)
    #[arg(long)]
    channel_capacity: Option<usize>,

    /// Print the run report as JSON instead of text
    #[arg(long)]
    json_report: bool,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = build_config(&args)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match runtime.block_on(smelt::run(&config)) {
        Ok(report) => {
            if args.json_report {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "CSV file written to {} ({} rows, {} columns)",
                    report.output_path.display(),
                    report.rows,
                    report.columns
                );
                println!("Elapsed: {:.3}s", report.elapsed.as_secs_f64());
            }
            Ok(())
        }
        Err(e) => {
            error!(stage = %e.stage(), "{}", e);
            let stage = e.stage();
            Err(anyhow::Error::new(e).context(format!("{} stage failed", stage)))
        }
    }
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::default();

    if let Some(url) = &args.url {
        config.fetch.base_url = url.clone();
    }
    if let Some(count) = args.results {
        config.fetch.result_count = count;
    }
    if let Some(secs) = args.timeout {
        config.fetch.timeout = Some(Duration::from_secs(secs));
    }
    if let Some(secs) = args.connect_timeout {
        config.fetch.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(output) = &args.output {
        config.output_path = output.clone();
    }
    if let Some(capacity) = args.channel_capacity {
        config.channel_capacity = capacity;
    }
    if let Some(key) = &args.results_key {
        config.convert.results_key = key.clone();
    }
    if let Some(delimiter) = args.delimiter {
        config.convert.delimiter = u8::try_from(delimiter)
            .with_context(|| format!("Delimiter {:?} is not a single byte", delimiter))?;
    }
    if args.quote {
        config.convert.quoting = Quoting::Rfc4180;
    }
    config.convert.strict_results = args.strict;

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "smelt=debug" } else { "smelt=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
