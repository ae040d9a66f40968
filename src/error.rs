use std::fmt;

use thiserror::Error;

/// The part of the pipeline an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Configuration was rejected before any I/O happened
    Config,
    /// The upstream HTTP request or its body stream
    Source,
    /// JSON parsing, flattening, or row encoding
    Transform,
    /// Creating, writing, or persisting the output file
    Sink,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Config => "config",
            PipelineStage::Source => "source",
            PipelineStage::Transform => "transform",
            PipelineStage::Sink => "sink",
        };
        f.write_str(name)
    }
}

/// Terminal error of a conversion run.
///
/// Every variant aborts the run; nothing is retried internally.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{context}")]
    Transport {
        context: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("{context}")]
    Input {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("failed to encode CSV row: {0}")]
    Encode(String),

    #[error("{context}")]
    Sink {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn transport(context: impl Into<String>, source: reqwest::Error) -> Self {
        PipelineError::Transport {
            context: context.into(),
            source: Some(source),
        }
    }

    pub fn sink(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Sink {
            context: context.into(),
            source,
        }
    }

    /// Which stage failed, for diagnostics at the process boundary
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::Config(_) => PipelineStage::Config,
            PipelineError::Transport { .. } | PipelineError::Input { .. } => {
                PipelineStage::Source
            }
            PipelineError::MalformedDocument(_) | PipelineError::Encode(_) => {
                PipelineStage::Transform
            }
            PipelineError::Sink { .. } => PipelineStage::Sink,
        }
    }
}
