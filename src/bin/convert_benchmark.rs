//! Benchmark comparing verbatim vs quoted CSV encoding
//!
//! Converts a synthetic API response of nested user records, delivered in
//! network-sized chunks, with both quoting policies.

use smelt::{ConvertConfig, JsonToCsv, Quoting};
use serde_json::json;
use std::time::{Duration, Instant};

const RECORDS: usize = 5000;
const CHUNK_SIZE: usize = 16 * 1024;

fn main() -> anyhow::Result<()> {
    println!("=== Smelt Conversion Benchmark ===\n");

    let records: Vec<_> = (0..RECORDS)
        .map(|i| {
            json!({
                "gender": if i % 2 == 0 { "female" } else { "male" },
                "name": {"title": "Ms", "first": format!("User{}", i), "last": "Example"},
                "location": {
                    "street": {"number": i, "name": "Main Street"},
                    "city": "Oslo",
                    "coordinates": {"latitude": "59.91", "longitude": "10.75"}
                },
                "email": format!("user{}@example.com", i),
                "login": {"uuid": format!("00000000-0000-0000-0000-{:012}", i), "username": format!("user{}", i)},
                "dob": {"date": "1990-01-01T00:00:00.000Z", "age": 34},
                "tags": ["a", "b, c"],
                "nat": "NO"
            })
        })
        .collect();
    let document = serde_json::to_vec(&json!({"results": records, "info": {"seed": "bench"}}))?;

    println!(
        "Document: {} records, {:.1} MiB, {} chunks of {} KiB\n",
        RECORDS,
        document.len() as f64 / (1024.0 * 1024.0),
        document.len().div_ceil(CHUNK_SIZE),
        CHUNK_SIZE / 1024
    );

    let verbatim = bench(&document, Quoting::Never)?;
    let quoted = bench(&document, Quoting::Rfc4180)?;

    println!("=== Results ===\n");
    println!("Verbatim: {:?} ({:.2}μs per record)", verbatim, per_record(verbatim));
    println!("Quoted:   {:?} ({:.2}μs per record)", quoted, per_record(quoted));
    println!(
        "\nQuoting overhead: {:.2}x",
        quoted.as_secs_f64() / verbatim.as_secs_f64()
    );

    Ok(())
}

fn bench(document: &[u8], quoting: Quoting) -> anyhow::Result<Duration> {
    let config = ConvertConfig {
        quoting,
        ..ConvertConfig::default()
    };

    let start = Instant::now();
    let mut stage = JsonToCsv::new(config);
    for chunk in document.chunks(CHUNK_SIZE) {
        stage.push(chunk);
    }

    let mut bytes = 0usize;
    let chunks = stage.finish()?;
    let (rows, columns) = (chunks.rows(), chunks.columns());
    for chunk in chunks {
        bytes += chunk?.len();
    }
    let elapsed = start.elapsed();

    println!(
        "{:?}: {} rows x {} columns, {} bytes of CSV in {:?}",
        quoting, rows, columns, bytes, elapsed
    );
    Ok(elapsed)
}

fn per_record(duration: Duration) -> f64 {
    duration.as_micros() as f64 / RECORDS as f64
}
