//! Cell and row rendering for CSV output

use crate::convert::types::{ConvertConfig, Quoting};
use crate::error::PipelineError;
use serde_json::Value;
use std::borrow::Cow;

/// Render a single JSON value as cell text
///
/// Null renders empty. Arrays render their elements joined with `,`, with
/// nested arrays rendered the same way and objects inside arrays rendered as
/// compact JSON.
pub fn render_cell(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::Bool(true) => Cow::Borrowed("true"),
        Value::Bool(false) => Cow::Borrowed("false"),
        Value::Number(n) => Cow::Owned(n.to_string()),
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Array(items) => Cow::Owned(
            items
                .iter()
                .map(render_cell)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Cow::Owned(value.to_string()),
    }
}

/// Encodes rows of cell text into newline-terminated CSV lines
#[derive(Debug, Clone)]
pub struct RowEncoder {
    delimiter: u8,
    quoting: Quoting,
}

impl RowEncoder {
    pub fn new(config: &ConvertConfig) -> Self {
        RowEncoder {
            delimiter: config.delimiter,
            quoting: config.quoting,
        }
    }

    pub fn encode<S: AsRef<str>>(&self, cells: &[S]) -> Result<String, PipelineError> {
        match self.quoting {
            Quoting::Never => Ok(self.join_verbatim(cells)),
            Quoting::Rfc4180 => self.encode_quoted(cells),
        }
    }

    fn join_verbatim<S: AsRef<str>>(&self, cells: &[S]) -> String {
        let delimiter = self.delimiter as char;
        let mut line = String::new();
        for (i, cell) in cells.iter().enumerate() {
            if i > 0 {
                line.push(delimiter);
            }
            line.push_str(cell.as_ref());
        }
        line.push('\n');
        line
    }

    fn encode_quoted<S: AsRef<str>>(&self, cells: &[S]) -> Result<String, PipelineError> {
        // A lone empty field would otherwise be written as `""`
        if cells.iter().all(|c| c.as_ref().is_empty()) && cells.len() <= 1 {
            return Ok(String::from("\n"));
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .terminator(csv::Terminator::Any(b'\n'))
            .quote_style(csv::QuoteStyle::Necessary)
            .from_writer(Vec::new());

        writer
            .write_record(cells.iter().map(|c| c.as_ref()))
            .map_err(|e| PipelineError::Encode(e.to_string()))?;
        let bytes = writer
            .into_inner()
            .map_err(|e| PipelineError::Encode(e.error().to_string()))?;

        String::from_utf8(bytes).map_err(|e| PipelineError::Encode(e.to_string()))
    }
}
