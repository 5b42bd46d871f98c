//! The translation function and its typed failure modes.
//!
//! [`translate_text`] resolves a language in the [`ModelRegistry`] and runs
//! its [`Translator`]. Callers match on [`TranslateError`] to decide how a
//! failure is reported; only [`TranslateError::UnsupportedLanguage`] and the
//! input validation errors are meant to be shown to end users.

use thiserror::Error;

use crate::error::NmtError;
use crate::registry::ModelRegistry;

/// Longest accepted input, in characters
pub const MAX_TEXT_CHARS: usize = 512;

/// A loaded model/tokenizer pair for one language.
pub trait Translator: Send + Sync {
    /// Translate `text`, returning the best candidate.
    fn translate(&self, text: &str) -> crate::error::Result<String>;

    /// Short human readable description of the backing model
    fn describe(&self) -> String {
        "custom translator".to_string()
    }
}

/// Why a translation request did not produce text.
#[derive(Error, Debug)]
pub enum TranslateError {
    /// Blank input.
    #[error("Text input cannot be empty")]
    EmptyInput,

    /// Input longer than [`MAX_TEXT_CHARS`].
    #[error("Text input is too long, maximum length is 512 characters")]
    InputTooLong,

    /// No model is loaded for the requested language.
    #[error("Language '{0}' not supported")]
    UnsupportedLanguage(String),

    /// Tokenization, generation or decoding failed.
    #[error("Translation failed")]
    Failed(#[source] NmtError),
}

impl TranslateError {
    /// True for failures caused by the request rather than the service
    pub fn is_client_error(&self) -> bool {
        !matches!(self, TranslateError::Failed(_))
    }
}

impl From<NmtError> for TranslateError {
    fn from(err: NmtError) -> Self {
        TranslateError::Failed(err)
    }
}

/// Reject empty or over-long input.
///
/// Length is counted in characters, before and independently of the
/// tokenizer's own 512-token truncation.
pub fn validate_text(text: &str) -> Result<(), TranslateError> {
    if text.is_empty() {
        return Err(TranslateError::EmptyInput);
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(TranslateError::InputTooLong);
    }
    Ok(())
}

/// Translate `text` with the model registered for `language`.
pub fn translate_text(
    registry: &ModelRegistry,
    text: &str,
    language: &str,
) -> Result<String, TranslateError> {
    let translator = registry
        .get(language)
        .ok_or_else(|| TranslateError::UnsupportedLanguage(language.to_string()))?;

    Ok(translator.translate(text)?)
}
