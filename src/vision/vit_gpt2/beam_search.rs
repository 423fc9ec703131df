// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Deterministic beam search
//!
//! Follows the HuggingFace `BeamSearchScorer` rules:
//! - each step keeps the top `2 * num_beams` (beam, token) continuations
//! - an EOS continuation ranked below `num_beams` closes a hypothesis
//! - hypotheses are scored `sum_logprobs / len^length_penalty`
//! - an image stops once its worst kept hypothesis beats anything its
//!   live beams could still reach
//!
//! The search is independent of the model: a scorer closure receives the
//! live prefixes of all unfinished images as one batch and returns the
//! next-token logits for each row.

use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView1};
use std::cmp::Ordering;
use tracing::debug;

/// Beam search parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamSearchConfig {
    pub num_beams: usize,
    /// Maximum sequence length including the start token
    pub max_length: usize,
    /// Hypotheses returned per image
    pub num_return_sequences: usize,
    pub length_penalty: f32,
    pub decoder_start_token_id: u32,
    pub eos_token_id: u32,
}

/// A finished sequence and its length-normalized score
#[derive(Debug, Clone, PartialEq)]
pub struct BeamHypothesis {
    /// Generated tokens, start token and EOS excluded
    pub tokens: Vec<u32>,
    pub score: f32,
}

#[derive(Debug, Clone)]
struct Beam {
    tokens: Vec<u32>,
    sum_logprobs: f32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    sum_logprobs: f32,
    beam: usize,
    token: u32,
}

/// Best `num_beams` finished hypotheses for one image
#[derive(Debug)]
struct Hypotheses {
    capacity: usize,
    length_penalty: f32,
    // (score, insertion order, tokens including the start token)
    entries: Vec<(f32, usize, Vec<u32>)>,
    inserted: usize,
}

impl Hypotheses {
    fn new(capacity: usize, length_penalty: f32) -> Self {
        Self {
            capacity,
            length_penalty,
            entries: Vec::with_capacity(capacity + 1),
            inserted: 0,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn normalize(&self, sum_logprobs: f32, length: usize) -> f32 {
        sum_logprobs / (length as f32).powf(self.length_penalty)
    }

    fn worst_score(&self) -> Option<f32> {
        self.entries.iter().map(|(score, _, _)| *score).min_by(f32::total_cmp)
    }

    fn add(&mut self, tokens: Vec<u32>, sum_logprobs: f32) {
        let score = self.normalize(sum_logprobs, tokens.len());
        let admit = match self.worst_score() {
            Some(worst) if self.len() >= self.capacity => score > worst,
            _ => true,
        };
        if !admit {
            return;
        }

        self.entries.push((score, self.inserted, tokens));
        self.inserted += 1;

        if self.entries.len() > self.capacity {
            // Drop the lowest score; among equals the newest goes
            if let Some(pos) = self
                .entries
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.0.total_cmp(&b.0).then(b.1.cmp(&a.1)))
                .map(|(pos, _)| pos)
            {
                self.entries.remove(pos);
            }
        }
    }

    /// True when no live beam can still improve the kept set
    fn is_done(&self, best_sum_logprobs: f32, cur_len: usize) -> bool {
        if self.len() < self.capacity {
            return false;
        }
        match self.worst_score() {
            Some(worst) => worst >= self.normalize(best_sum_logprobs, cur_len),
            None => false,
        }
    }

    fn into_sorted(mut self) -> Vec<BeamHypothesis> {
        self.entries
            .sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        self.entries
            .into_iter()
            .map(|(score, _, tokens)| BeamHypothesis {
                tokens: tokens.into_iter().skip(1).collect(),
                score,
            })
            .collect()
    }
}

struct ImageState {
    live: Vec<Beam>,
    hypotheses: Hypotheses,
    done: bool,
}

/// Log-probabilities of one logits row
fn log_softmax(row: ArrayView1<'_, f32>) -> Result<Vec<f32>> {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        bail!("Decoder produced no finite logits");
    }
    let sum: f32 = row.iter().map(|&x| (x - max).exp()).sum();
    let log_sum = max + sum.ln();
    if !log_sum.is_finite() {
        bail!("Decoder logits overflowed during normalization");
    }
    Ok(row.iter().map(|&x| x - log_sum).collect())
}

/// Indices of the `k` largest values, best first, lower index first on ties
fn top_k(values: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut best: Vec<(u32, f32)> = Vec::with_capacity(k + 1);
    for (idx, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        if best.len() == k && best.last().map_or(false, |(_, last)| value <= *last) {
            continue;
        }
        let pos = best
            .iter()
            .position(|(_, v)| value > *v)
            .unwrap_or(best.len());
        best.insert(pos, (idx as u32, value));
        best.truncate(k);
    }
    best
}

fn rank_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.sum_logprobs
        .total_cmp(&a.sum_logprobs)
        .then(a.beam.cmp(&b.beam))
        .then(a.token.cmp(&b.token))
}

/// Run beam search for `batch_size` images
///
/// `score_fn(sources, input_ids)` gets one row per live beam: `sources[r]`
/// is the image that row belongs to and `input_ids` is `[rows, cur_len]`.
/// It must return `[rows, vocab]` logits for the next position.
///
/// Returns `num_return_sequences` hypotheses per image, best first.
pub fn beam_search<F>(batch_size: usize, config: &BeamSearchConfig, mut score_fn: F) -> Result<Vec<Vec<BeamHypothesis>>>
where
    F: FnMut(&[usize], &Array2<i64>) -> Result<Array2<f32>>,
{
    if config.num_beams == 0 {
        bail!("num_beams must be at least 1");
    }
    if config.max_length < 2 {
        bail!("max_length must be at least 2, got {}", config.max_length);
    }
    if config.num_return_sequences == 0 || config.num_return_sequences > config.num_beams {
        bail!(
            "num_return_sequences ({}) must be between 1 and num_beams ({})",
            config.num_return_sequences,
            config.num_beams
        );
    }

    let num_beams = config.num_beams;
    let mut images: Vec<ImageState> = (0..batch_size)
        .map(|_| ImageState {
            // One start beam: the num_beams identical copies HF keeps at
            // step 0 would only produce duplicate candidates
            live: vec![Beam {
                tokens: vec![config.decoder_start_token_id],
                sum_logprobs: 0.0,
            }],
            hypotheses: Hypotheses::new(num_beams, config.length_penalty),
            done: false,
        })
        .collect();

    let mut cur_len = 1;
    while cur_len < config.max_length && images.iter().any(|img| !img.done) {
        let mut sources = Vec::new();
        for (image_idx, image) in images.iter().enumerate() {
            if !image.done {
                sources.extend(std::iter::repeat(image_idx).take(image.live.len()));
            }
        }

        let mut input_ids = Array2::<i64>::zeros((sources.len(), cur_len));
        let mut row = 0;
        for image in images.iter().filter(|img| !img.done) {
            for beam in &image.live {
                for (pos, &token) in beam.tokens.iter().enumerate() {
                    input_ids[[row, pos]] = token as i64;
                }
                row += 1;
            }
        }

        let logits = score_fn(&sources, &input_ids)?;
        if logits.nrows() != sources.len() {
            bail!(
                "Scorer returned {} rows for {} live beams",
                logits.nrows(),
                sources.len()
            );
        }
        if (config.eos_token_id as usize) >= logits.ncols() {
            bail!(
                "EOS token {} outside vocabulary of {}",
                config.eos_token_id,
                logits.ncols()
            );
        }

        let mut row = 0;
        for image in images.iter_mut().filter(|img| !img.done) {
            let mut candidates = Vec::with_capacity(image.live.len() * 2 * num_beams);
            for (beam_idx, beam) in image.live.iter().enumerate() {
                let logprobs = log_softmax(logits.row(row))?;
                row += 1;
                for (token, logprob) in top_k(&logprobs, 2 * num_beams) {
                    candidates.push(Candidate {
                        sum_logprobs: beam.sum_logprobs + logprob,
                        beam: beam_idx,
                        token,
                    });
                }
            }
            candidates.sort_by(rank_candidates);
            candidates.truncate(2 * num_beams);

            let mut next_live = Vec::with_capacity(num_beams);
            for (rank, candidate) in candidates.iter().enumerate() {
                let parent = &image.live[candidate.beam];
                if candidate.token == config.eos_token_id {
                    if rank >= num_beams {
                        continue;
                    }
                    image
                        .hypotheses
                        .add(parent.tokens.clone(), candidate.sum_logprobs);
                } else {
                    let mut tokens = Vec::with_capacity(cur_len + 1);
                    tokens.extend_from_slice(&parent.tokens);
                    tokens.push(candidate.token);
                    next_live.push(Beam {
                        tokens,
                        sum_logprobs: candidate.sum_logprobs,
                    });
                }
                if next_live.len() == num_beams {
                    break;
                }
            }

            let best = candidates
                .first()
                .map_or(f32::NEG_INFINITY, |c| c.sum_logprobs);
            // Hypotheses finished this step hold cur_len tokens
            image.done = next_live.is_empty() || image.hypotheses.is_done(best, cur_len);
            image.live = next_live;
        }

        cur_len += 1;
        debug!(
            "Beam search step {}: {} image(s) still running",
            cur_len,
            images.iter().filter(|img| !img.done).count()
        );
    }

    let mut results = Vec::with_capacity(batch_size);
    for (image_idx, mut image) in images.into_iter().enumerate() {
        if !image.done {
            for beam in image.live.drain(..) {
                image.hypotheses.add(beam.tokens, beam.sum_logprobs);
            }
        }
        let mut ranked = image.hypotheses.into_sorted();
        if ranked.len() < config.num_return_sequences {
            bail!(
                "Image {} produced {} hypotheses, {} requested",
                image_idx,
                ranked.len(),
                config.num_return_sequences
            );
        }
        ranked.truncate(config.num_return_sequences);
        results.push(ranked);
    }

    Ok(results)
}
