// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ViT-GPT2 vision encoder-decoder
//!
//! This module ties together:
//! - Model file discovery (local directory or HuggingFace Hub)
//! - Special token ids from the model's JSON configs
//! - The encoder + decoder sessions driven by beam search

use anyhow::{bail, Context, Result};
use ndarray::Axis;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use super::beam_search::{beam_search, BeamSearchConfig};
use super::decoder::Gpt2Decoder;
use super::encoder::VitEncoder;
use super::preprocessing::PREPROCESSOR_CONFIG_FILE;
use crate::config::ComputeDevice;
use crate::vision::captioner::{FeatureTensor, GenerationConfig, SequenceGenerator};

/// GPT-2 `<|endoftext|>`, used as start, end and padding token
pub const GPT2_ENDOFTEXT_ID: u32 = 50256;

const ENCODER_CANDIDATES: &[&str] = &[
    "onnx/encoder_model.onnx",
    "encoder_model.onnx",
    "onnx/vision_encoder.onnx",
    "vision_encoder.onnx",
    "encoder.onnx",
];

const DECODER_CANDIDATES: &[&str] = &[
    "onnx/decoder_model.onnx",
    "decoder_model.onnx",
    "decoder.onnx",
];

const TOKENIZER_FILE: &str = "tokenizer.json";
const GENERATION_CONFIG_FILE: &str = "generation_config.json";
const MODEL_CONFIG_FILE: &str = "config.json";

/// First existing file among `candidates` under `dir`
pub fn find_model_file(dir: &Path, candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// Resolved paths of every file the captioner reads
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFiles {
    pub encoder: PathBuf,
    pub decoder: PathBuf,
    pub tokenizer: PathBuf,
    pub preprocessor_config: Option<PathBuf>,
    pub generation_config: Option<PathBuf>,
    pub model_config: Option<PathBuf>,
}

impl ModelFiles {
    /// Locate model files in a local directory
    pub fn locate<P: AsRef<Path>>(model_dir: P) -> Result<Self> {
        let dir = model_dir.as_ref();
        if !dir.is_dir() {
            bail!("Model directory not found: {}", dir.display());
        }

        let encoder = find_model_file(dir, ENCODER_CANDIDATES).with_context(|| {
            format!(
                "ViT encoder not found in {} (tried {:?})",
                dir.display(),
                ENCODER_CANDIDATES
            )
        })?;
        let decoder = find_model_file(dir, DECODER_CANDIDATES).with_context(|| {
            format!(
                "GPT-2 decoder not found in {} (tried {:?})",
                dir.display(),
                DECODER_CANDIDATES
            )
        })?;

        let tokenizer = dir.join(TOKENIZER_FILE);
        if !tokenizer.exists() {
            bail!("Tokenizer not found: {}", tokenizer.display());
        }

        let optional = |name: &str| Some(dir.join(name)).filter(|p| p.exists());

        Ok(Self {
            encoder,
            decoder,
            tokenizer,
            preprocessor_config: optional(PREPROCESSOR_CONFIG_FILE),
            generation_config: optional(GENERATION_CONFIG_FILE),
            model_config: optional(MODEL_CONFIG_FILE),
        })
    }

    /// Download (or reuse from the local cache) a HuggingFace repository
    pub fn from_hub(repo_id: &str) -> Result<Self> {
        let api = hf_hub::api::sync::Api::new().context("Failed to initialise HuggingFace Hub client")?;
        let repo = api.model(repo_id.to_string());

        info!("Fetching model files from HuggingFace repo {}", repo_id);

        let fetch_first = |candidates: &[&str]| -> Result<PathBuf> {
            let mut last_err = None;
            for name in candidates {
                match repo.get(name) {
                    Ok(path) => return Ok(path),
                    Err(e) => last_err = Some(e),
                }
            }
            match last_err {
                Some(e) => Err(e).with_context(|| format!("None of {:?} found in {}", candidates, repo_id)),
                None => bail!("No candidate files given"),
            }
        };

        let encoder = fetch_first(ENCODER_CANDIDATES)?;
        let decoder = fetch_first(DECODER_CANDIDATES)?;
        let tokenizer = repo
            .get(TOKENIZER_FILE)
            .with_context(|| format!("{} not found in {}", TOKENIZER_FILE, repo_id))?;

        let optional = |name: &str| match repo.get(name) {
            Ok(path) => Some(path),
            Err(e) => {
                debug!("Optional file {} unavailable in {}: {}", name, repo_id, e);
                None
            }
        };

        Ok(Self {
            encoder,
            decoder,
            tokenizer,
            preprocessor_config: optional(PREPROCESSOR_CONFIG_FILE),
            generation_config: optional(GENERATION_CONFIG_FILE),
            model_config: optional(MODEL_CONFIG_FILE),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenIdField {
    One(u32),
    Many(Vec<u32>),
}

impl TokenIdField {
    fn first(&self) -> Option<u32> {
        match self {
            Self::One(id) => Some(*id),
            Self::Many(ids) => ids.first().copied(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenIdsJson {
    decoder_start_token_id: Option<TokenIdField>,
    bos_token_id: Option<TokenIdField>,
    eos_token_id: Option<TokenIdField>,
    pad_token_id: Option<TokenIdField>,
    decoder: Option<Box<TokenIdsJson>>,
}

impl TokenIdsJson {
    fn start(&self) -> Option<u32> {
        self.decoder_start_token_id
            .as_ref()
            .and_then(TokenIdField::first)
            .or_else(|| self.decoder.as_ref().and_then(|d| d.start()))
            .or_else(|| self.bos_token_id.as_ref().and_then(TokenIdField::first))
    }

    fn eos(&self) -> Option<u32> {
        self.eos_token_id
            .as_ref()
            .and_then(TokenIdField::first)
            .or_else(|| self.decoder.as_ref().and_then(|d| d.eos()))
    }

    fn pad(&self) -> Option<u32> {
        self.pad_token_id
            .as_ref()
            .and_then(TokenIdField::first)
            .or_else(|| self.decoder.as_ref().and_then(|d| d.pad()))
    }
}

/// Token ids that steer generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub decoder_start_token_id: u32,
    pub eos_token_id: u32,
    pub pad_token_id: u32,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self {
            decoder_start_token_id: GPT2_ENDOFTEXT_ID,
            eos_token_id: GPT2_ENDOFTEXT_ID,
            pad_token_id: GPT2_ENDOFTEXT_ID,
        }
    }
}

impl SpecialTokens {
    /// Read ids from `generation_config.json`, then `config.json`, then
    /// fall back to the GPT-2 defaults
    pub fn from_files(generation_config: Option<&Path>, model_config: Option<&Path>) -> Result<Self> {
        let mut sources = Vec::new();
        for path in [generation_config, model_config].into_iter().flatten() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let parsed: TokenIdsJson = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            sources.push(parsed);
        }

        let defaults = Self::default();
        let pick = |get: fn(&TokenIdsJson) -> Option<u32>, fallback: u32| {
            sources.iter().find_map(get).unwrap_or(fallback)
        };

        Ok(Self {
            decoder_start_token_id: pick(TokenIdsJson::start, defaults.decoder_start_token_id),
            eos_token_id: pick(TokenIdsJson::eos, defaults.eos_token_id),
            pad_token_id: pick(TokenIdsJson::pad, defaults.pad_token_id),
        })
    }
}

/// Encoder + decoder pair producing caption token sequences
#[derive(Debug, Clone)]
pub struct VitGpt2Model {
    encoder: VitEncoder,
    decoder: Gpt2Decoder,
    special_tokens: SpecialTokens,
}

impl VitGpt2Model {
    /// Create sessions for both graphs on `device`
    pub fn load(files: &ModelFiles, device: ComputeDevice, intra_threads: usize) -> Result<Self> {
        let start = Instant::now();

        let special_tokens = SpecialTokens::from_files(
            files.generation_config.as_deref(),
            files.model_config.as_deref(),
        )?;
        debug!("Special tokens: {:?}", special_tokens);

        let encoder = VitEncoder::new(&files.encoder, device, intra_threads)?;
        let decoder = Gpt2Decoder::new(&files.decoder, device, intra_threads)?;

        info!(
            "✅ ViT-GPT2 model ready on {} in {}ms",
            device,
            start.elapsed().as_millis()
        );

        Ok(Self {
            encoder,
            decoder,
            special_tokens,
        })
    }

    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }
}

impl SequenceGenerator for VitGpt2Model {
    fn generate(&self, features: &FeatureTensor, config: &GenerationConfig) -> Result<Vec<Vec<u32>>> {
        let encoder_states = self.encoder.encode(features)?;
        let batch = encoder_states.len_of(Axis(0));

        let search = BeamSearchConfig {
            num_beams: config.num_beams,
            max_length: config.max_length,
            num_return_sequences: config.candidates_per_image,
            length_penalty: 1.0,
            decoder_start_token_id: self.special_tokens.decoder_start_token_id,
            eos_token_id: self.special_tokens.eos_token_id,
        };

        let hypotheses = beam_search(batch, &search, |sources, input_ids| {
            let rows = encoder_states.select(Axis(0), sources);
            self.decoder.next_token_logits(&rows, input_ids)
        })?;

        Ok(hypotheses
            .into_iter()
            .flat_map(|per_image| per_image.into_iter().map(|hyp| hyp.tokens))
            .collect())
    }
}
