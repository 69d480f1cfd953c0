//! Error types shared across the synthesis pipeline.

use thiserror::Error;

use crate::engine::SampleFormat;

/// Errors that can occur while splitting, synthesizing, assembling or
/// recording a request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TtsError {
    #[error("Synthesis engine unavailable at sentence {index}: {message}")]
    EngineUnavailable { index: usize, message: String },

    #[error("Synthesis engine error at sentence {index}: {message}")]
    EngineError { index: usize, message: String },

    #[error("Audio format mismatch at sentence {index}: expected {expected}, found {found}")]
    FormatMismatch {
        index: usize,
        expected: SampleFormat,
        found: SampleFormat,
    },

    #[error("No sentences to synthesize")]
    EmptyInput,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Meta info not found: {0}")]
    NotFound(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Meta store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl TtsError {
    /// Re-tag an engine failure with the sentence index it happened at.
    ///
    /// Engine adapters don't know where in a run they are called from, so
    /// they report index 0 and the pipeline fixes it up.
    pub fn at_sentence(self, index: usize) -> Self {
        match self {
            TtsError::EngineUnavailable { message, .. } => {
                TtsError::EngineUnavailable { index, message }
            }
            TtsError::EngineError { message, .. } => TtsError::EngineError { index, message },
            other => other,
        }
    }
}

impl From<std::io::Error> for TtsError {
    fn from(err: std::io::Error) -> Self {
        TtsError::Io(err.to_string())
    }
}

impl From<hound::Error> for TtsError {
    fn from(err: hound::Error) -> Self {
        TtsError::Encode(err.to_string())
    }
}

impl From<serde_json::Error> for TtsError {
    fn from(err: serde_json::Error) -> Self {
        TtsError::Store(err.to_string())
    }
}
