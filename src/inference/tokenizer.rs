//! Source/target tokenizer pair for Marian models.
//!
//! Marian checkpoints ship separate SentencePiece vocabularies for the
//! source and target side. Both are expected as HuggingFace `tokenizer.json`
//! files; a single `tokenizer.json` may stand in for either side.

use std::path::{Path, PathBuf};

use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::error::{NmtError, Result};

/// Maximum number of source tokens fed to the encoder
pub const MAX_INPUT_TOKENS: usize = 512;

/// Source side tokenizer file name
pub const SOURCE_TOKENIZER_FILE: &str = "source_tokenizer.json";
/// Target side tokenizer file name
pub const TARGET_TOKENIZER_FILE: &str = "target_tokenizer.json";
/// Shared fallback for either side
pub const SHARED_TOKENIZER_FILE: &str = "tokenizer.json";

/// Encodes source text and decodes generated target ids.
pub struct MarianTokenizer {
    source: Tokenizer,
    target: Tokenizer,
    eos_token_id: u32,
}

impl MarianTokenizer {
    /// Load both sides from a model directory
    pub fn from_dir(dir: &Path, pad_token_id: u32, eos_token_id: u32) -> Result<Self> {
        let source_path = tokenizer_path(dir, SOURCE_TOKENIZER_FILE);
        let target_path = tokenizer_path(dir, TARGET_TOKENIZER_FILE);

        let source = Tokenizer::from_file(&source_path).map_err(|e| {
            NmtError::Tokenizer(format!("{}: {e}", source_path.display()))
        })?;
        let target = Tokenizer::from_file(&target_path).map_err(|e| {
            NmtError::Tokenizer(format!("{}: {e}", target_path.display()))
        })?;

        Self::new(source, target, pad_token_id, eos_token_id)
    }

    /// Wrap already loaded tokenizers, enabling truncation and padding on the source side
    pub fn new(
        mut source: Tokenizer,
        target: Tokenizer,
        pad_token_id: u32,
        eos_token_id: u32,
    ) -> Result<Self> {
        source
            .with_truncation(Some(TruncationParams {
                max_length: MAX_INPUT_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| NmtError::Tokenizer(format!("Failed to enable truncation: {e}")))?;

        let pad_token = source
            .id_to_token(pad_token_id)
            .unwrap_or_else(|| "<pad>".to_string());
        source.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            pad_id: pad_token_id,
            pad_token,
            ..Default::default()
        }));

        Ok(Self {
            source,
            target,
            eos_token_id,
        })
    }

    /// Encode `text` into encoder input ids, EOS terminated and at most 512 ids long
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encodings = self
            .source
            .encode_batch(vec![text], true)
            .map_err(|e| NmtError::Tokenizer(format!("Tokenization failed: {e}")))?;
        let encoding = encodings
            .into_iter()
            .next()
            .ok_or_else(|| NmtError::Tokenizer("Tokenizer returned no encoding".to_string()))?;

        let mut ids = encoding.get_ids().to_vec();
        // The encoder expects an EOS terminator whatever the post-processor does
        if ids.last() != Some(&self.eos_token_id) {
            if ids.len() >= MAX_INPUT_TOKENS {
                ids.truncate(MAX_INPUT_TOKENS - 1);
            }
            ids.push(self.eos_token_id);
        }
        Ok(ids)
    }

    /// Decode every candidate, dropping special tokens
    pub fn decode_batch(&self, sequences: &[Vec<u32>]) -> Result<Vec<String>> {
        let slices: Vec<&[u32]> = sequences.iter().map(Vec::as_slice).collect();
        let decoded = self
            .target
            .decode_batch(&slices, true)
            .map_err(|e| NmtError::Tokenizer(format!("Decoding failed: {e}")))?;
        Ok(decoded.into_iter().map(|s| s.trim().to_string()).collect())
    }
}

fn tokenizer_path(dir: &Path, preferred: &str) -> PathBuf {
    let path = dir.join(preferred);
    if path.is_file() {
        path
    } else {
        dir.join(SHARED_TOKENIZER_FILE)
    }
}
