//! # Smelt - JSON API to CSV
//!
//! Fetches a JSON document of records from an HTTP API and writes it out as
//! a CSV file, streaming the response body through a conversion stage into
//! an atomically persisted output file.
//!
//! ## Modules
//!
//! - **convert**: Flatten nested records into dotted-path columns and encode CSV rows
//! - **pipeline**: HTTP source, atomic file sink, and the driver that joins them
//!
//! ## Quick Start
//!
//! ### Converting a document
//!
//! ```rust
//! use smelt::convert::{ConvertConfig, JsonToCsv};
//!
//! # fn main() -> Result<(), smelt::PipelineError> {
//! let mut stage = JsonToCsv::new(ConvertConfig::default());
//! stage.push(br#"{"results":[{"name":{"first":"Ann"}},"#);
//! stage.push(br#"{"name":{"first":"Bo"}}]}"#);
//!
//! let csv: String = stage.finish()?.collect::<Result<_, _>>()?;
//! assert_eq!(csv, "name.first\nAnn\nBo\n");
//! # Ok(())
//! # }
//! ```
//!
//! ### Flattening a record
//!
//! ```rust
//! use smelt::convert::flatten;
//! use serde_json::json;
//!
//! let record = json!({"a": {"b": 1, "c": {"d": 2}}, "tags": [1, 2]});
//! let flat = flatten(record.as_object().unwrap().clone());
//!
//! assert_eq!(flat["a.b"], json!(1));
//! assert_eq!(flat["a.c.d"], json!(2));
//! assert_eq!(flat["tags"], json!([1, 2]));
//! ```

use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub mod convert;
pub mod error;
pub mod pipeline;

// Re-export commonly used types for convenience
pub use convert::{flatten, ConvertConfig, CsvChunks, FlatRecord, HeaderSet, JsonToCsv, Quoting};
pub use error::{PipelineError, PipelineStage};
pub use pipeline::{run, AtomicFileSink, FetchConfig, PipelineConfig, RunReport};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Counts from a completed offline conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertSummary {
    pub rows: usize,
    pub columns: usize,
    pub bytes_read: usize,
}

/// Convert a JSON document read from `reader` into CSV written to `writer`
///
/// Runs the same transform stage as the HTTP pipeline, fed from a blocking
/// reader in fixed-size chunks. Nothing is written if the document fails to
/// parse.
pub fn convert_reader<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    config: &ConvertConfig,
) -> Result<ConvertSummary, PipelineError> {
    config.validate()?;

    let mut stage = JsonToCsv::new(config.clone());
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => stage.push(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(PipelineError::Input {
                    context: "failed to read input".into(),
                    source,
                })
            }
        }
    }

    let bytes_read = stage.buffered_len();
    let chunks = stage.finish()?;
    let summary = ConvertSummary {
        rows: chunks.rows(),
        columns: chunks.columns(),
        bytes_read,
    };

    for chunk in chunks {
        writer
            .write_all(chunk?.as_bytes())
            .map_err(|e| PipelineError::sink("failed to write output", e))?;
    }
    writer
        .flush()
        .map_err(|e| PipelineError::sink("failed to flush output", e))?;

    Ok(summary)
}

/// Convert a JSON document from `reader` into a CSV file at `path`
///
/// Output goes to a temporary file in the destination directory and is
/// renamed over `path` only after the whole conversion succeeded, so a
/// failure leaves any existing file untouched. Missing parent directories
/// are created.
pub fn convert_to_file<R: Read>(
    reader: R,
    path: impl AsRef<Path>,
    config: &ConvertConfig,
) -> Result<ConvertSummary, PipelineError> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| {
        PipelineError::sink(
            format!("failed to create output directory {}", parent.display()),
            e,
        )
    })?;

    let temp = tempfile::Builder::new()
        .prefix(".smelt-")
        .suffix(".tmp")
        .tempfile_in(&parent)
        .map_err(|e| {
            PipelineError::sink(
                format!("failed to create temporary file in {}", parent.display()),
                e,
            )
        })?;

    let mut writer = BufWriter::new(temp);
    let summary = convert_reader(reader, &mut writer, config)?;

    let temp = writer
        .into_inner()
        .map_err(|e| PipelineError::sink("failed to flush output", e.into_error()))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| PipelineError::sink("failed to sync output", e))?;
    temp.persist(path).map_err(|e| {
        PipelineError::sink(format!("failed to persist {}", path.display()), e.error)
    })?;

    Ok(summary)
}
