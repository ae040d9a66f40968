use crate::error::PipelineError;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A record flattened to a single level, keyed by dotted path (e.g. `name.first`)
///
/// Backed by an insertion-ordered map, so keys keep the order they were
/// first written in.
pub type FlatRecord = Map<String, Value>;

/// How cell text is written into a CSV row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quoting {
    /// Cells are joined verbatim. Values containing the delimiter, quotes,
    /// or newlines will corrupt the row.
    #[default]
    Never,
    /// Cells are quoted when necessary, with embedded quotes doubled
    Rfc4180,
}

/// Configuration for the JSON to CSV conversion
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Field delimiter, must be a single ASCII byte
    pub delimiter: u8,

    /// Quoting policy for cell values
    pub quoting: Quoting,

    /// Top-level key holding the list of records
    pub results_key: String,

    /// Fail with a malformed-document error when the records list is missing
    /// or not an array, instead of producing empty output
    pub strict_results: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        ConvertConfig {
            delimiter: b',',
            quoting: Quoting::Never,
            results_key: String::from("results"),
            strict_results: false,
        }
    }
}

impl ConvertConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.delimiter.is_ascii() || matches!(self.delimiter, b'\n' | b'\r' | b'"') {
            return Err(PipelineError::Config(format!(
                "delimiter {:?} must be an ASCII byte other than a quote or line break",
                self.delimiter as char
            )));
        }
        if self.results_key.is_empty() {
            return Err(PipelineError::Config("results key must not be empty".into()));
        }
        Ok(())
    }
}

/// Ordered set of every column seen across all flat records
///
/// Columns appear in first-seen order and are never removed, so the header
/// width is fixed once every record has been observed.
#[derive(Debug, Clone, Default)]
pub struct HeaderSet {
    columns: Vec<String>,
    seen: HashSet<String>,
}

impl HeaderSet {
    pub fn new() -> Self {
        HeaderSet::default()
    }

    /// Append any keys of `record` not already present
    pub fn observe(&mut self, record: &FlatRecord) {
        for key in record.keys() {
            if !self.seen.contains(key) {
                self.seen.insert(key.clone());
                self.columns.push(key.clone());
            }
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
