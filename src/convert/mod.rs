//! JSON to CSV conversion
//!
//! Turns a single JSON document of the shape `{"results": [record, ...]}`
//! into CSV text. Nested objects in each record are flattened into
//! dotted-path columns; the header is the union of every record's columns
//! in first-seen order.

pub mod flatten;
pub mod render;
pub mod stage;
pub mod types;

pub use flatten::{flatten, flatten_into};
pub use render::{render_cell, RowEncoder};
pub use stage::{CsvChunks, JsonToCsv};
pub use types::{ConvertConfig, FlatRecord, HeaderSet, Quoting};
