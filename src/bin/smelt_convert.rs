//! smelt-convert: Convert a local JSON document to CSV
//!
//! Runs the same flattening and encoding as smelt-fetch, without the network.
//!
//! Usage:
//!   # Read from file, output to stdout
//!   smelt-convert response.json
//!
//!   # Read from stdin, write to a file with quoting
//!   curl -s 'https://randomuser.me/api/?results=5' | smelt-convert --quote -o users.csv

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use smelt::{convert_reader, convert_to_file, ConvertConfig, Quoting};
use std::fs::File;
use std::io::{stdin, stdout, BufReader, BufWriter, Read};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "smelt-convert")]
#[command(about = "Convert a JSON document of records to CSV", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output file (use stdout if omitted)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Top-level key holding the records (default: "results")
    #[arg(long)]
    results_key: Option<String>,

    /// Fail if the records list is missing
    #[arg(long)]
    strict: bool,

    /// Quote cells containing the delimiter, quotes, or newlines
    #[arg(long)]
    quote: bool,

    /// Field delimiter (default: ",")
    #[arg(long)]
    delimiter: Option<char>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ConvertConfig::default();
    if let Some(key) = args.results_key {
        config.results_key = key;
    }
    if args.quote {
        config.quoting = Quoting::Rfc4180;
    }
    if let Some(delimiter) = args.delimiter {
        config.delimiter = u8::try_from(delimiter)
            .with_context(|| format!("Delimiter {:?} is not a single byte", delimiter))?;
    }
    config.strict_results = args.strict;
    config.validate().context("Invalid configuration")?;

    let reader: Box<dyn Read> = if let Some(path) = &args.input {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Box::new(BufReader::new(file))
    } else {
        Box::new(stdin())
    };

    // A file destination is only replaced once the conversion succeeded
    let summary = match &args.output {
        Some(path) => convert_to_file(reader, path, &config)
            .with_context(|| format!("Conversion to {} failed", path.display()))?,
        None => {
            let mut writer = BufWriter::new(stdout().lock());
            convert_reader(reader, &mut writer, &config).context("Conversion failed")?
        }
    };

    if summary.rows == 0 {
        eprintln!("Warning: No records found in input");
    }

    Ok(())
}
