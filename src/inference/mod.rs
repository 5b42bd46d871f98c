//! Marian neural machine translation inference.
//!
//! Models are Helsinki-NLP OPUS-MT style Marian checkpoints, executed with
//! [candle](https://github.com/huggingface/candle) and tokenized with
//! HuggingFace `tokenizers`.
//!
//! # Pipeline
//!
//! ```text
//! text ─ source tokenizer (truncate to 512) ─> encoder ─> decoder loop ─> target tokenizer ─> text
//!                                                          (greedy | beam search)
//! ```
//!
//! # Download
//!
//! ```bash
//! huggingface-cli download Helsinki-NLP/opus-mt-en-hi --local-dir ./Indian/hi
//! ```
//!
//! The SentencePiece vocabularies must be converted to `tokenizer.json`
//! (see [`tokenizer`] for the expected file names).
//!
//! # Example
//!
//! ```rust,ignore
//! use indic_nmt::inference::{parse_device, MarianTranslator, GenerationOverrides};
//! use indic_nmt::translate::Translator;
//!
//! let device = parse_device("cpu")?;
//! let hi = MarianTranslator::load("hi", "./Indian/hi".as_ref(), &device, &GenerationOverrides::default())?;
//! println!("{}", hi.translate("How are you?")?);
//! ```

pub mod generation;
mod marian;
pub mod tokenizer;

pub use generation::{GenerationConfig, GenerationOverrides, SpecialTokens, StepModel};
pub use marian::{
    parse_device, MarianTranslator, ModelInfo, CONFIG_FILE, GENERATION_CONFIG_FILE, WEIGHTS_FILE,
};
pub use tokenizer::{MarianTokenizer, MAX_INPUT_TOKENS};
