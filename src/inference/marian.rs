//! Marian (OPUS-MT) translator backed by candle.
//!
//! ## Artifact layout
//!
//! ```text
//! <dir>/config.json               Marian architecture + token ids (+ generation defaults)
//! <dir>/generation_config.json    optional, overrides generation fields of config.json
//! <dir>/model.safetensors         weights
//! <dir>/source_tokenizer.json     source vocabulary  (or tokenizer.json)
//! <dir>/target_tokenizer.json     target vocabulary  (or tokenizer.json)
//! ```

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::marian;
use safetensors::SafeTensors;
use serde::Deserialize;

use super::generation::{generate, GenerationConfig, GenerationOverrides, SpecialTokens, StepModel};
use super::tokenizer::MarianTokenizer;
use crate::error::{NmtError, Result};
use crate::translate::Translator;

/// Model config file name
pub const CONFIG_FILE: &str = "config.json";
/// Optional generation config file name
pub const GENERATION_CONFIG_FILE: &str = "generation_config.json";
/// Weights file name
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Parse a device spec: `cpu`, `cuda`, `cuda:N`, `metal`, `metal:N`
pub fn parse_device(spec: &str) -> Result<Device> {
    let spec = spec.trim().to_ascii_lowercase();
    let (kind, ordinal) = match spec.split_once(':') {
        Some((kind, ordinal)) => {
            let ordinal = ordinal
                .parse::<usize>()
                .map_err(|_| NmtError::Device(format!("Invalid device ordinal in '{spec}'")))?;
            (kind, ordinal)
        },
        None => (spec.as_str(), 0),
    };

    match kind {
        "cpu" => Ok(Device::Cpu),
        "cuda" => Device::new_cuda(ordinal).map_err(|e| NmtError::Device(e.to_string())),
        "metal" => Device::new_metal(ordinal).map_err(|e| NmtError::Device(e.to_string())),
        other => Err(NmtError::Device(format!("Unknown device '{other}'"))),
    }
}

/// Token ids and generation fields read from `config.json` / `generation_config.json`
#[derive(Debug, Clone, Default, Deserialize)]
struct ModelFileFields {
    pad_token_id: Option<u32>,
    eos_token_id: Option<u32>,
    decoder_start_token_id: Option<u32>,
    max_length: Option<usize>,
    num_beams: Option<usize>,
    length_penalty: Option<f32>,
    // HF allows `true`, `false` or `"never"`
    early_stopping: Option<serde_json::Value>,
    bad_words_ids: Option<Vec<Vec<u32>>>,
}

impl ModelFileFields {
    fn overrides(&self) -> GenerationOverrides {
        GenerationOverrides {
            max_length: self.max_length,
            num_beams: self.num_beams,
            length_penalty: self.length_penalty,
            early_stopping: self.early_stopping.as_ref().map(|v| match v {
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::String(s) => s != "never",
                _ => false,
            }),
        }
    }

    /// Single-token bad word entries; multi-token phrases are not banned
    fn bad_token_ids(&self) -> Vec<u32> {
        self.bad_words_ids
            .iter()
            .flatten()
            .filter(|ids| ids.len() == 1)
            .map(|ids| ids[0])
            .collect()
    }
}

/// Summary of a loaded checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Encoder layers
    pub encoder_layers: usize,
    /// Decoder layers
    pub decoder_layers: usize,
    /// Hidden size
    pub d_model: usize,
    /// Tensors in the weights file
    pub tensor_count: usize,
    /// Scalar parameters in the weights file
    pub parameter_count: usize,
}

impl std::fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "marian {}+{} layers, d_model {}, {:.1}M params",
            self.encoder_layers,
            self.decoder_layers,
            self.d_model,
            self.parameter_count as f64 / 1_000_000.0
        )
    }
}

/// One language's Marian model and tokenizer pair.
pub struct MarianTranslator {
    language: String,
    model: Mutex<marian::MTModel>,
    tokenizer: MarianTokenizer,
    generation: GenerationConfig,
    special: SpecialTokens,
    device: Device,
    info: ModelInfo,
}

impl MarianTranslator {
    /// Load a translator from `dir`.
    ///
    /// `overrides` (from the service config) win over the model's own
    /// generation defaults.
    pub fn load(
        language: &str,
        dir: &Path,
        device: &Device,
        overrides: &GenerationOverrides,
    ) -> Result<Self> {
        let started = Instant::now();

        let config_path = dir.join(CONFIG_FILE);
        let raw_config = std::fs::read_to_string(&config_path)
            .map_err(|e| NmtError::model_load(language, &config_path, e))?;
        let model_config: marian::Config = serde_json::from_str(&raw_config)
            .map_err(|e| NmtError::model_load(language, &config_path, e))?;
        let mut fields: ModelFileFields = serde_json::from_str(&raw_config)
            .map_err(|e| NmtError::model_load(language, &config_path, e))?;

        let generation_path = dir.join(GENERATION_CONFIG_FILE);
        let mut model_overrides = fields.overrides();
        if generation_path.is_file() {
            let raw = std::fs::read_to_string(&generation_path)
                .map_err(|e| NmtError::model_load(language, &generation_path, e))?;
            let generation_fields: ModelFileFields = serde_json::from_str(&raw)
                .map_err(|e| NmtError::model_load(language, &generation_path, e))?;
            model_overrides = model_overrides.merge(&generation_fields.overrides());
            if generation_fields.bad_words_ids.is_some() {
                fields.bad_words_ids = generation_fields.bad_words_ids;
            }
        }

        let special = SpecialTokens {
            pad: fields.pad_token_id.unwrap_or(model_config.pad_token_id),
            eos: fields.eos_token_id.unwrap_or(model_config.eos_token_id),
            decoder_start: fields
                .decoder_start_token_id
                .unwrap_or(model_config.decoder_start_token_id),
        };
        let generation =
            GenerationConfig::resolve(&model_overrides, overrides, fields.bad_token_ids());

        let weights_path = dir.join(WEIGHTS_FILE);
        let weights = std::fs::read(&weights_path)
            .map_err(|e| NmtError::model_load(language, &weights_path, e))?;
        let (tensor_count, parameter_count) = inspect_weights(&weights)
            .map_err(|e| NmtError::model_load(language, &weights_path, e))?;

        let vb = VarBuilder::from_buffered_safetensors(weights, DType::F32, device)
            .map_err(|e| NmtError::model_load(language, &weights_path, e))?;
        let model = marian::MTModel::new(&model_config, vb)
            .map_err(|e| NmtError::model_load(language, &weights_path, e))?;

        let tokenizer = MarianTokenizer::from_dir(dir, special.pad, special.eos)
            .map_err(|e| NmtError::model_load(language, dir, e))?;

        let info = ModelInfo {
            encoder_layers: model_config.encoder_layers,
            decoder_layers: model_config.decoder_layers,
            d_model: model_config.d_model,
            tensor_count,
            parameter_count,
        };

        tracing::info!(
            language,
            path = %dir.display(),
            tensors = info.tensor_count,
            num_beams = generation.num_beams,
            max_length = generation.max_length,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Loaded {info}"
        );

        Ok(Self {
            language: language.to_string(),
            model: Mutex::new(model),
            tokenizer,
            generation,
            special,
            device: device.clone(),
            info,
        })
    }

    /// Checkpoint summary
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    /// Resolved generation settings
    pub fn generation(&self) -> &GenerationConfig {
        &self.generation
    }

    /// Generate candidate id sequences for encoder input `input_ids`, best first
    fn generate_ids(&self, input_ids: &[u32]) -> Result<Vec<Vec<u32>>> {
        // A panic mid-generation only leaves a stale KV cache, which is reset below
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);

        model.reset_kv_cache();
        let input = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let encoder_xs = model.encoder().forward(&input, 0)?;

        let mut session = DecoderSession {
            model: &mut *model,
            encoder_xs,
            expanded: None,
            device: &self.device,
            cached_prefix: Vec::new(),
        };
        generate(&mut session, &self.generation, self.special)
    }
}

impl Translator for MarianTranslator {
    fn translate(&self, text: &str) -> Result<String> {
        let input_ids = self.tokenizer.encode(text)?;
        tracing::debug!(language = %self.language, tokens = input_ids.len(), "Encoded input");

        let candidates = self.generate_ids(&input_ids)?;
        let decoded = self.tokenizer.decode_batch(&candidates)?;
        decoded.into_iter().next().ok_or(NmtError::EmptyGeneration)
    }

    fn describe(&self) -> String {
        self.info.to_string()
    }
}

/// Sum tensor and scalar counts from a safetensors buffer
fn inspect_weights(bytes: &[u8]) -> Result<(usize, usize)> {
    let tensors = SafeTensors::deserialize(bytes)?;
    let parameters = tensors
        .tensors()
        .iter()
        .map(|(_, view)| view.shape().iter().product::<usize>())
        .sum();
    Ok((tensors.len(), parameters))
}

/// Decoder state for one generation call.
///
/// A single prefix that extends the previous call by one token reuses the
/// KV cache; anything else (first step, beams) resets it and runs the full
/// prefix.
struct DecoderSession<'a> {
    model: &'a mut marian::MTModel,
    encoder_xs: Tensor,
    expanded: Option<(usize, Tensor)>,
    device: &'a Device,
    cached_prefix: Vec<u32>,
}

impl DecoderSession<'_> {
    fn encoder_for_batch(&mut self, batch: usize) -> Result<Tensor> {
        if batch == 1 {
            return Ok(self.encoder_xs.clone());
        }
        if let Some((size, xs)) = &self.expanded {
            if *size == batch {
                return Ok(xs.clone());
            }
        }
        let xs = self.encoder_xs.repeat((batch, 1, 1))?;
        self.expanded = Some((batch, xs.clone()));
        Ok(xs)
    }
}

impl StepModel for DecoderSession<'_> {
    fn next_token_logits(&mut self, sequences: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
        let batch = sequences.len();
        let Some(first) = sequences.first() else {
            return Ok(Vec::new());
        };
        let seq_len = first.len();
        if sequences.iter().any(|s| s.len() != seq_len) {
            return Err(NmtError::Inference("ragged decoder batch".to_string()));
        }

        let incremental = batch == 1
            && !self.cached_prefix.is_empty()
            && seq_len == self.cached_prefix.len() + 1
            && first.starts_with(&self.cached_prefix);

        let (input, past_kv_len) = if incremental {
            let last = first[seq_len - 1];
            (Tensor::new(&[last], self.device)?.unsqueeze(0)?, seq_len - 1)
        } else {
            self.model.reset_kv_cache();
            let flat: Vec<u32> = sequences.iter().flatten().copied().collect();
            (Tensor::new(flat.as_slice(), self.device)?.reshape((batch, seq_len))?, 0)
        };

        let encoder_xs = self.encoder_for_batch(batch)?;
        let logits = self.model.decode(&input, &encoder_xs, past_kv_len)?;
        let steps = logits.dim(1)?;
        let last = logits.i((.., steps - 1, ..))?.to_dtype(DType::F32)?;
        let rows = last.to_vec2::<f32>()?;

        self.cached_prefix = if batch == 1 { first.clone() } else { Vec::new() };
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use candle_nn::VarMap;

    use super::*;
    use crate::inference::tokenizer::tests::TINY_TOKENIZER_JSON;
    use crate::inference::tokenizer::SHARED_TOKENIZER_FILE;

    const TINY_CONFIG: &str = r#"{
        "vocab_size": 6,
        "decoder_vocab_size": 6,
        "max_position_embeddings": 64,
        "encoder_layers": 1,
        "encoder_ffn_dim": 16,
        "encoder_attention_heads": 2,
        "decoder_layers": 1,
        "decoder_ffn_dim": 16,
        "decoder_attention_heads": 2,
        "use_cache": true,
        "is_encoder_decoder": true,
        "activation_function": "swish",
        "d_model": 8,
        "decoder_start_token_id": 2,
        "scale_embedding": true,
        "pad_token_id": 2,
        "eos_token_id": 0,
        "forced_eos_token_id": 0,
        "share_encoder_decoder_embeddings": true,
        "max_length": 8,
        "num_beams": 2,
        "bad_words_ids": [[2]]
    }"#;

    /// Write a randomly initialised tiny Marian checkpoint into `dir`
    fn write_tiny_checkpoint(dir: &Path) {
        std::fs::write(dir.join(CONFIG_FILE), TINY_CONFIG).unwrap();
        std::fs::write(dir.join(SHARED_TOKENIZER_FILE), TINY_TOKENIZER_JSON).unwrap();

        let config: marian::Config = serde_json::from_str(TINY_CONFIG).unwrap();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        marian::MTModel::new(&config, vb).unwrap();
        varmap.save(dir.join(WEIGHTS_FILE)).unwrap();
    }

    #[test]
    fn test_parse_device() {
        assert!(matches!(parse_device("cpu").unwrap(), Device::Cpu));
        assert!(matches!(parse_device(" CPU ").unwrap(), Device::Cpu));
        assert!(matches!(parse_device("tpu"), Err(NmtError::Device(_))));
        assert!(matches!(parse_device("cuda:x"), Err(NmtError::Device(_))));
    }

    #[test]
    fn test_model_file_fields() {
        let fields: ModelFileFields = serde_json::from_str(
            r#"{"num_beams": 4, "early_stopping": "never", "bad_words_ids": [[58100], [1, 2]]}"#,
        )
        .unwrap();
        let overrides = fields.overrides();
        assert_eq!(overrides.num_beams, Some(4));
        assert_eq!(overrides.early_stopping, Some(false));
        assert_eq!(fields.bad_token_ids(), vec![58100]);
    }

    #[test]
    fn test_load_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = MarianTranslator::load(
            "hi",
            &dir.path().join("hi"),
            &Device::Cpu,
            &GenerationOverrides::default(),
        )
        .err()
        .unwrap();
        match err {
            NmtError::ModelLoad { language, path, .. } => {
                assert_eq!(language, "hi");
                assert!(path.ends_with(CONFIG_FILE));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_tiny_checkpoint_translates_deterministically() {
        let dir = tempfile::tempdir().unwrap();
        write_tiny_checkpoint(dir.path());

        let user = GenerationOverrides {
            num_beams: Some(1),
            ..Default::default()
        };
        let translator = MarianTranslator::load("hi", dir.path(), &Device::Cpu, &user).unwrap();
        assert_eq!(translator.generation().num_beams, 1);
        assert_eq!(translator.generation().max_length, 8);
        assert_eq!(translator.generation().bad_token_ids, vec![2]);
        assert_eq!(translator.info().encoder_layers, 1);
        assert!(translator.info().parameter_count > 0);

        let first = translator.translate("hello world").unwrap();
        let second = translator.translate("hello world").unwrap();
        assert_eq!(first, second);
        assert!(!first.contains("<pad>"));
    }

    #[test]
    fn test_tiny_checkpoint_beam_search() {
        let dir = tempfile::tempdir().unwrap();
        write_tiny_checkpoint(dir.path());

        let translator = MarianTranslator::load(
            "ur",
            dir.path(),
            &Device::Cpu,
            &GenerationOverrides::default(),
        )
        .unwrap();
        assert_eq!(translator.generation().num_beams, 2);

        let candidates = translator.generate_ids(&[3, 4, 0]).unwrap();
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|c| c.len() < 8 && !c.contains(&2)));
        assert_eq!(candidates, translator.generate_ids(&[3, 4, 0]).unwrap());
    }

    #[test]
    fn test_translates_after_panic_while_model_locked() {
        let dir = tempfile::tempdir().unwrap();
        write_tiny_checkpoint(dir.path());

        let translator = MarianTranslator::load(
            "tl",
            dir.path(),
            &Device::Cpu,
            &GenerationOverrides::default(),
        )
        .unwrap();
        let before = translator.translate("hello").unwrap();

        std::thread::scope(|scope| {
            let crashed = scope
                .spawn(|| {
                    let _guard = translator.model.lock().unwrap();
                    panic!("decoder crashed");
                })
                .join();
            assert!(crashed.is_err());
        });
        assert!(translator.model.is_poisoned());

        for _ in 0..3 {
            assert_eq!(translator.translate("hello").unwrap(), before);
        }
    }
}
