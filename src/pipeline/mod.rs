//! Fetch-and-convert pipeline
//!
//! Wires the upstream HTTP body through the transform stage into an atomic
//! file sink. The transform and sink run concurrently on the current task,
//! connected by a bounded channel, and the first error from any stage ends
//! the run.

pub mod driver;
pub mod sink;
pub mod source;

pub use driver::{convert_stream, run, run_with_client, PipelineConfig, RunReport};
pub use sink::AtomicFileSink;
pub use source::{open_stream, ByteStream, FetchConfig};
