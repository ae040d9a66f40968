//! Buffered JSON to CSV transform stage
//!
//! The stage accumulates raw chunks until the upstream signals end of input,
//! then parses the whole document once. Every record is flattened and scanned
//! for columns before the first row is produced, so the header always covers
//! every record and rows never change width.

use crate::convert::flatten::flatten;
use crate::convert::render::{render_cell, RowEncoder};
use crate::convert::types::{ConvertConfig, FlatRecord, HeaderSet};
use crate::error::PipelineError;
use serde_json::Value;
use tracing::{debug, warn};

/// Accumulating half of the transform stage
///
/// `finish` consumes the stage, so the document can only be parsed once.
pub struct JsonToCsv {
    config: ConvertConfig,
    buffer: Vec<u8>,
    chunks_received: usize,
}

impl JsonToCsv {
    pub fn new(config: ConvertConfig) -> Self {
        JsonToCsv {
            config,
            buffer: Vec::new(),
            chunks_received: 0,
        }
    }

    /// Append a chunk to the document buffer
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        self.chunks_received += 1;
    }

    /// Total bytes buffered so far
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn chunks_received(&self) -> usize {
        self.chunks_received
    }

    /// Parse the buffered document and prepare its CSV output
    ///
    /// Parse failures are returned before any output exists. A missing or
    /// non-array records list yields empty output unless `strict_results`
    /// is set.
    pub fn finish(self) -> Result<CsvChunks, PipelineError> {
        debug!(
            bytes = self.buffer.len(),
            chunks = self.chunks_received,
            "Parsing buffered document"
        );

        let document = parse_document(self.buffer)?;

        let encoder = RowEncoder::new(&self.config);
        let Some(records) = extract_records(document, &self.config)? else {
            return Ok(CsvChunks::empty(encoder));
        };

        let mut header = HeaderSet::new();
        let mut flat_records = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let flat = match record {
                Value::Object(map) => flatten(map),
                other => {
                    debug!(
                        index,
                        kind = json_kind(&other),
                        "Record is not an object, emitting empty row"
                    );
                    FlatRecord::new()
                }
            };
            header.observe(&flat);
            flat_records.push(flat);
        }

        debug!(
            records = flat_records.len(),
            columns = header.len(),
            "Flattened records"
        );

        Ok(CsvChunks::new(header, flat_records, encoder))
    }
}

/// Parse with simd-json, falling back to serde_json
///
/// simd-json rejects some valid documents (integers beyond 64 bits) and
/// rewrites its input while parsing, so the fallback reads a pristine copy.
/// serde_json's error is the one reported when both fail.
fn parse_document(mut buffer: Vec<u8>) -> Result<Value, PipelineError> {
    let original = buffer.clone();
    let parsed = simd_json::serde::from_slice::<Value>(&mut buffer);
    match parsed {
        Ok(document) => Ok(document),
        Err(simd_err) => {
            drop(buffer);
            debug!(error = %simd_err, "simd-json rejected document, retrying with serde_json");
            serde_json::from_slice(&original)
                .map_err(|e| PipelineError::MalformedDocument(e.to_string()))
        }
    }
}

fn extract_records(
    document: Value,
    config: &ConvertConfig,
) -> Result<Option<Vec<Value>>, PipelineError> {
    let found = match document {
        Value::Object(mut root) => root.remove(&config.results_key),
        _ => None,
    };

    match found {
        Some(Value::Array(records)) => Ok(Some(records)),
        other => {
            let detail = match other {
                Some(value) => format!(
                    "`{}` is {}, not an array",
                    config.results_key,
                    json_kind(&value)
                ),
                None => format!("document has no `{}` array", config.results_key),
            };
            if config.strict_results {
                Err(PipelineError::MalformedDocument(detail))
            } else {
                warn!("{}, producing no rows", detail);
                Ok(None)
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The flushing half of the transform stage: an iterator of CSV text chunks
///
/// Yields the header line first, then one line per record in input order.
/// Rows are encoded lazily as the iterator is advanced. When there are no
/// records the iterator is empty.
pub struct CsvChunks {
    header: HeaderSet,
    header_pending: bool,
    records: std::vec::IntoIter<FlatRecord>,
    rows: usize,
    encoder: RowEncoder,
}

impl CsvChunks {
    fn new(header: HeaderSet, records: Vec<FlatRecord>, encoder: RowEncoder) -> Self {
        let rows = records.len();
        CsvChunks {
            header,
            header_pending: rows > 0,
            records: records.into_iter(),
            rows,
            encoder,
        }
    }

    fn empty(encoder: RowEncoder) -> Self {
        CsvChunks::new(HeaderSet::new(), Vec::new(), encoder)
    }

    /// Number of data rows this output contains
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns in the header
    pub fn columns(&self) -> usize {
        self.header.len()
    }

    pub fn header(&self) -> &HeaderSet {
        &self.header
    }

    fn encode_record(&self, record: &FlatRecord) -> Result<String, PipelineError> {
        let cells: Vec<_> = self
            .header
            .columns()
            .iter()
            .map(|column| record.get(column).map(render_cell).unwrap_or_default())
            .collect();
        self.encoder.encode(&cells)
    }
}

impl Iterator for CsvChunks {
    type Item = Result<String, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.header_pending {
            self.header_pending = false;
            return Some(self.encoder.encode(self.header.columns()));
        }

        let record = self.records.next()?;
        Some(self.encode_record(&record))
    }
}
