//! indic-nmt error types.
//!
//! Library code returns [`NmtError`] through the [`Result`] alias. The HTTP
//! layer never shows these messages to clients; they are logged and
//! replaced by a generic failure response (see [`crate::translate`]).

use std::path::PathBuf;

use thiserror::Error;

/// indic-nmt errors.
#[derive(Error, Debug)]
pub enum NmtError {
    /// Configuration could not be read or is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// A language's model or tokenizer artifacts failed to load.
    #[error("Failed to load model for '{language}' from {}: {reason}", path.display())]
    ModelLoad {
        /// Language code being loaded.
        language: String,
        /// Artifact path that failed.
        path: PathBuf,
        /// Underlying cause.
        reason: String,
    },

    /// Tokenizer encode/decode failure.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Model forward pass or tensor operation failure.
    #[error("Inference error: {0}")]
    Inference(String),

    /// Compute device could not be created.
    #[error("Device error: {0}")]
    Device(String),

    /// Generation produced no candidate sequences.
    #[error("Generation returned no candidates")]
    EmptyGeneration,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for indic-nmt operations
pub type Result<T> = std::result::Result<T, NmtError>;

impl NmtError {
    /// Build a [`NmtError::ModelLoad`] for `language` at `path`.
    pub fn model_load(
        language: impl Into<String>,
        path: impl Into<PathBuf>,
        reason: impl std::fmt::Display,
    ) -> Self {
        NmtError::ModelLoad {
            language: language.into(),
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<candle_core::Error> for NmtError {
    fn from(err: candle_core::Error) -> Self {
        NmtError::Inference(err.to_string())
    }
}

impl From<toml::de::Error> for NmtError {
    fn from(err: toml::de::Error) -> Self {
        NmtError::Config(err.to_string())
    }
}

impl From<safetensors::SafeTensorError> for NmtError {
    fn from(err: safetensors::SafeTensorError) -> Self {
        NmtError::Inference(format!("safetensors: {err}"))
    }
}
