use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read {path}: {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open EPUB {path}: {reason}")]
    Epub { path: PathBuf, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid page range '{0}', expected START:END")]
    PageRange(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("no TTS engine found. Please install espeak-ng, espeak, or festival")]
    NoTtsEngine,

    #[error("no {format} encoder found. Please install {hint}")]
    NoEncoder {
        format: &'static str,
        hint: &'static str,
    },

    #[error("{tool} failed: {detail}")]
    Tool { tool: String, detail: String },

    #[error("failed to read WAV {path}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
}
