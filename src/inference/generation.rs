//! Sequence generation over an encoder-decoder model.
//!
//! Decoding is written against [`StepModel`], which only has to produce
//! next-token logits for a batch of decoder prefixes. Greedy decoding is used
//! when `num_beams == 1`, beam search otherwise.

use serde::{Deserialize, Serialize};

use crate::error::{NmtError, Result};

/// Default cap on decoder length (includes the decoder start token)
pub const DEFAULT_MAX_LENGTH: usize = 512;

/// Resolved generation settings for one model
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    /// Maximum decoder length, counting the decoder start token
    pub max_length: usize,
    /// Beam width; `1` selects greedy decoding
    pub num_beams: usize,
    /// Exponent applied to hypothesis length when ranking beams
    pub length_penalty: f32,
    /// Stop as soon as `num_beams` hypotheses are finished
    pub early_stopping: bool,
    /// Token ids that are never generated
    pub bad_token_ids: Vec<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            num_beams: 1,
            length_penalty: 1.0,
            early_stopping: false,
            bad_token_ids: Vec::new(),
        }
    }
}

impl GenerationConfig {
    /// Layer `model` defaults and then `user` overrides on top of the built-in defaults
    pub fn resolve(
        model: &GenerationOverrides,
        user: &GenerationOverrides,
        bad_token_ids: Vec<u32>,
    ) -> Self {
        let merged = model.merge(user);
        let defaults = Self::default();
        Self {
            // Room for the start token plus at least one generated token
            max_length: merged.max_length.unwrap_or(defaults.max_length).max(2),
            num_beams: merged.num_beams.unwrap_or(defaults.num_beams).max(1),
            length_penalty: merged.length_penalty.unwrap_or(defaults.length_penalty),
            early_stopping: merged.early_stopping.unwrap_or(defaults.early_stopping),
            bad_token_ids,
        }
    }

    /// Greedy decoding is selected
    pub fn is_greedy(&self) -> bool {
        self.num_beams <= 1
    }
}

/// Optional generation settings, as found in TOML config or model files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOverrides {
    /// Maximum decoder length
    pub max_length: Option<usize>,
    /// Beam width
    pub num_beams: Option<usize>,
    /// Length penalty exponent
    pub length_penalty: Option<f32>,
    /// Early stopping for beam search
    pub early_stopping: Option<bool>,
}

impl GenerationOverrides {
    /// Merge with another set of overrides (other takes precedence)
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            max_length: other.max_length.or(self.max_length),
            num_beams: other.num_beams.or(self.num_beams),
            length_penalty: other.length_penalty.or(self.length_penalty),
            early_stopping: other.early_stopping.or(self.early_stopping),
        }
    }
}

/// Token ids that drive decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    /// First decoder input token
    pub decoder_start: u32,
    /// End of sequence
    pub eos: u32,
    /// Padding
    pub pad: u32,
}

/// A decoder that scores the next token for a batch of prefixes.
pub trait StepModel {
    /// Return one logits row (vocabulary sized) per prefix in `sequences`.
    ///
    /// All prefixes in a call have the same length and start with the
    /// decoder start token.
    fn next_token_logits(&mut self, sequences: &[Vec<u32>]) -> Result<Vec<Vec<f32>>>;
}

/// Generate candidate sequences, best first.
///
/// Returned sequences exclude the decoder start token and the EOS token.
pub fn generate<M: StepModel + ?Sized>(
    model: &mut M,
    config: &GenerationConfig,
    special: SpecialTokens,
) -> Result<Vec<Vec<u32>>> {
    if config.is_greedy() {
        greedy(model, config, special)
    } else {
        beam_search(model, config, special)
    }
}

fn greedy<M: StepModel + ?Sized>(
    model: &mut M,
    config: &GenerationConfig,
    special: SpecialTokens,
) -> Result<Vec<Vec<u32>>> {
    let mut sequence = vec![special.decoder_start];

    while sequence.len() < config.max_length {
        let logits = model.next_token_logits(std::slice::from_ref(&sequence))?;
        let row = logits
            .first()
            .ok_or_else(|| NmtError::Inference("model returned no logits".to_string()))?;
        let next = argmax(row, &config.bad_token_ids)
            .ok_or_else(|| NmtError::Inference("no selectable token in logits".to_string()))?;

        if next == special.eos {
            break;
        }
        sequence.push(next);
    }

    Ok(vec![sequence.split_off(1)])
}

/// Index of the largest finite logit, skipping banned ids
fn argmax(row: &[f32], banned: &[u32]) -> Option<u32> {
    row.iter()
        .enumerate()
        .filter(|(id, v)| v.is_finite() && !banned.contains(&(*id as u32)))
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(id, _)| id as u32)
}

/// Log-softmax of a logits row with banned ids forced to -inf
fn log_softmax(row: &[f32], banned: &[u32]) -> Vec<f32> {
    let mut masked = row.to_vec();
    for &id in banned {
        if let Some(v) = masked.get_mut(id as usize) {
            *v = f32::NEG_INFINITY;
        }
    }

    let max = masked
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![f32::NEG_INFINITY; masked.len()];
    }

    let sum: f32 = masked.iter().map(|v| (v - max).exp()).sum();
    let log_sum = sum.ln() + max;
    masked.iter().map(|v| v - log_sum).collect()
}

/// The `k` best finite (id, log-prob) pairs, best first
fn top_k(log_probs: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut scored: Vec<(u32, f32)> = log_probs
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(id, v)| (id as u32, *v))
        .collect();

    if scored.len() > k {
        scored.select_nth_unstable_by(k, |a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
    }
    scored.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored
}

#[derive(Debug, Clone)]
struct Hypothesis {
    /// Decoder tokens, starting with the decoder start token
    tokens: Vec<u32>,
    /// Sum of token log-probabilities
    score: f32,
}

fn length_normalized(score: f32, generated: usize, length_penalty: f32) -> f32 {
    score / (generated.max(1) as f32).powf(length_penalty)
}

struct FinishedHypotheses {
    hypotheses: Vec<(f32, Hypothesis)>,
    num_beams: usize,
    length_penalty: f32,
}

impl FinishedHypotheses {
    fn new(num_beams: usize, length_penalty: f32) -> Self {
        Self {
            hypotheses: Vec::with_capacity(num_beams + 1),
            num_beams,
            length_penalty,
        }
    }

    /// `generated` counts produced tokens, including a terminating EOS
    fn add(&mut self, hypothesis: Hypothesis, generated: usize) {
        let normalized = length_normalized(hypothesis.score, generated, self.length_penalty);
        if self.hypotheses.len() < self.num_beams || normalized > self.worst() {
            self.hypotheses.push((normalized, hypothesis));
            self.hypotheses.sort_by(|a, b| b.0.total_cmp(&a.0));
            self.hypotheses.truncate(self.num_beams);
        }
    }

    fn worst(&self) -> f32 {
        self.hypotheses
            .last()
            .map_or(f32::NEG_INFINITY, |(score, _)| *score)
    }

    fn is_done(&self, early_stopping: bool, best_live_score: f32, generated: usize) -> bool {
        if self.hypotheses.len() < self.num_beams {
            return false;
        }
        if early_stopping {
            return true;
        }
        let attainable = length_normalized(best_live_score, generated, self.length_penalty);
        self.worst() >= attainable
    }
}

fn beam_search<M: StepModel + ?Sized>(
    model: &mut M,
    config: &GenerationConfig,
    special: SpecialTokens,
) -> Result<Vec<Vec<u32>>> {
    let num_beams = config.num_beams;
    let mut finished = FinishedHypotheses::new(num_beams, config.length_penalty);
    let mut beams = vec![Hypothesis {
        tokens: vec![special.decoder_start],
        score: 0.0,
    }];

    loop {
        if beams[0].tokens.len() >= config.max_length {
            break;
        }

        let prefixes: Vec<Vec<u32>> = beams.iter().map(|b| b.tokens.clone()).collect();
        let logits = model.next_token_logits(&prefixes)?;
        if logits.len() != beams.len() {
            return Err(NmtError::Inference(format!(
                "expected {} logits rows, got {}",
                beams.len(),
                logits.len()
            )));
        }

        let mut candidates: Vec<(f32, usize, u32)> = Vec::with_capacity(beams.len() * num_beams * 2);
        for (beam_idx, (beam, row)) in beams.iter().zip(&logits).enumerate() {
            let log_probs = log_softmax(row, &config.bad_token_ids);
            for (token, log_prob) in top_k(&log_probs, num_beams * 2) {
                candidates.push((beam.score + log_prob, beam_idx, token));
            }
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        candidates.truncate(num_beams * 2);

        let mut next_beams = Vec::with_capacity(num_beams);
        for (rank, (score, beam_idx, token)) in candidates.into_iter().enumerate() {
            let parent = &beams[beam_idx];
            if token == special.eos {
                // EOS only counts when it ranks among the top `num_beams` continuations
                if rank < num_beams {
                    let hypothesis = Hypothesis {
                        tokens: parent.tokens.clone(),
                        score,
                    };
                    finished.add(hypothesis, parent.tokens.len());
                }
            } else {
                let mut tokens = parent.tokens.clone();
                tokens.push(token);
                next_beams.push(Hypothesis { tokens, score });
            }
            if next_beams.len() == num_beams {
                break;
            }
        }

        if next_beams.is_empty() {
            beams.clear();
            break;
        }
        beams = next_beams;

        let generated = beams[0].tokens.len() - 1;
        if finished.is_done(config.early_stopping, beams[0].score, generated) {
            beams.clear();
            break;
        }
    }

    // Live beams that hit the length cap compete with the finished ones
    for beam in beams {
        let generated = beam.tokens.len() - 1;
        finished.add(beam, generated);
    }

    Ok(finished
        .hypotheses
        .into_iter()
        .map(|(_, mut h)| h.tokens.split_off(1))
        .collect())
}
