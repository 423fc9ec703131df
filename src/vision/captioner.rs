// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption generation for uploaded images
//!
//! `CaptionGenerator` turns raw uploads into caption strings:
//! - decode every upload to RGB (all-or-nothing)
//! - normalize the batch into one feature tensor
//! - run beam search with a fixed max length and beam width
//! - detokenize and trim
//!
//! The three model-facing steps sit behind traits so the pipeline can be
//! driven by the ONNX model in production and by stand-ins in tests.

use image::RgbImage;
use ndarray::Array4;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::image_utils::{decode_rgb_image, ImageError};

/// Caption text, trimmed of surrounding whitespace
pub type Caption = String;

/// Normalized pixel batch, NCHW
pub type FeatureTensor = Array4<f32>;

/// Default maximum sequence length (tokens, start token included)
pub const DEFAULT_MAX_LENGTH: usize = 16;

/// Default beam width
pub const DEFAULT_NUM_BEAMS: usize = 4;

/// Decoding parameters for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationConfig {
    /// Maximum sequence length including the start token
    pub max_length: usize,
    /// Beam width
    pub num_beams: usize,
    /// Sequences returned per image, best first
    pub candidates_per_image: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            num_beams: DEFAULT_NUM_BEAMS,
            candidates_per_image: 1,
        }
    }
}

impl GenerationConfig {
    /// Same decoding setup with a different candidate count
    pub fn with_candidates(self, candidates_per_image: usize) -> Self {
        Self {
            candidates_per_image,
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), CaptionError> {
        if self.max_length < 2 {
            return Err(CaptionError::InvalidConfig(format!(
                "max_length must be at least 2 (start token plus one generated token), got {}",
                self.max_length
            )));
        }
        if self.num_beams == 0 {
            return Err(CaptionError::InvalidConfig(
                "num_beams must be at least 1".to_string(),
            ));
        }
        if self.candidates_per_image == 0 {
            return Err(CaptionError::InvalidConfig(
                "candidates_per_image must be at least 1".to_string(),
            ));
        }
        if self.candidates_per_image > self.num_beams {
            return Err(CaptionError::InvalidConfig(format!(
                "candidates_per_image ({}) cannot exceed num_beams ({})",
                self.candidates_per_image, self.num_beams
            )));
        }
        Ok(())
    }
}

/// Converts RGB images into a model-ready feature tensor
#[cfg_attr(test, mockall::automock)]
pub trait ImageNormalizer: Send + Sync {
    /// Output shape is `[images.len(), 3, H, W]`
    fn normalize(&self, images: &[RgbImage]) -> anyhow::Result<FeatureTensor>;
}

/// Produces token sequences from a feature tensor
#[cfg_attr(test, mockall::automock)]
pub trait SequenceGenerator: Send + Sync {
    /// Returns `batch * config.candidates_per_image` sequences, image-major,
    /// best first within an image.
    fn generate(
        &self,
        features: &FeatureTensor,
        config: &GenerationConfig,
    ) -> anyhow::Result<Vec<Vec<u32>>>;
}

/// Converts token sequences back into text, skipping special tokens
#[cfg_attr(test, mockall::automock)]
pub trait Detokenizer: Send + Sync {
    fn decode_batch(&self, sequences: &[Vec<u32>]) -> anyhow::Result<Vec<String>>;
}

/// Why a caption call failed
#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("image {index} could not be decoded: {source}")]
    Decode {
        index: usize,
        #[source]
        source: ImageError,
    },

    #[error("invalid generation config: {0}")]
    InvalidConfig(String),

    #[error("caption inference failed: {0:#}")]
    Inference(anyhow::Error),
}

impl CaptionError {
    /// Short machine-readable tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Inference(_) => "inference",
        }
    }
}

/// Image captioning pipeline
pub struct CaptionGenerator {
    normalizer: Arc<dyn ImageNormalizer>,
    model: Arc<dyn SequenceGenerator>,
    detokenizer: Arc<dyn Detokenizer>,
    config: GenerationConfig,
    model_name: String,
}

impl fmt::Debug for CaptionGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptionGenerator")
            .field("config", &self.config)
            .field("model_name", &self.model_name)
            .finish_non_exhaustive()
    }
}

impl CaptionGenerator {
    /// Build a generator from its collaborators
    ///
    /// `config.candidates_per_image` is the default used by callers that
    /// pass 1; the max length and beam width stay fixed for every call.
    pub fn new(
        normalizer: Arc<dyn ImageNormalizer>,
        model: Arc<dyn SequenceGenerator>,
        detokenizer: Arc<dyn Detokenizer>,
        config: GenerationConfig,
    ) -> Result<Self, CaptionError> {
        config.validate()?;
        Ok(Self {
            normalizer,
            model,
            detokenizer,
            config,
            model_name: "vit-gpt2-image-captioning".to_string(),
        })
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Caption a batch of uploads
    ///
    /// Any failure is logged and yields an empty list, so callers cannot
    /// tell "no images" from "inference failed". Use [`try_generate`] to
    /// see the error.
    ///
    /// [`try_generate`]: Self::try_generate
    pub fn generate<B: AsRef<[u8]>>(&self, images: &[B], candidates_per_image: usize) -> Vec<Caption> {
        match self.try_generate(images, candidates_per_image) {
            Ok(captions) => captions,
            Err(e) => {
                warn!(kind = e.kind(), "Caption generation failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Caption a batch of uploads, surfacing failures
    ///
    /// Output has `images.len() * candidates_per_image` entries, image-major
    /// in input order, best candidate first.
    pub fn try_generate<B: AsRef<[u8]>>(
        &self,
        images: &[B],
        candidates_per_image: usize,
    ) -> Result<Vec<Caption>, CaptionError> {
        let config = self.config.with_candidates(candidates_per_image);
        config.validate()?;

        if images.is_empty() {
            return Ok(Vec::new());
        }

        let decoded = images
            .iter()
            .enumerate()
            .map(|(index, bytes)| {
                decode_rgb_image(bytes.as_ref()).map_err(|source| CaptionError::Decode { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.caption_images(&decoded, &config)
    }

    /// Caption already-decoded RGB images
    pub fn caption_images(
        &self,
        images: &[RgbImage],
        config: &GenerationConfig,
    ) -> Result<Vec<Caption>, CaptionError> {
        config.validate()?;
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();

        let features = self
            .normalizer
            .normalize(images)
            .map_err(CaptionError::Inference)?;
        if features.shape()[0] != images.len() {
            return Err(CaptionError::Inference(anyhow::anyhow!(
                "normalizer returned batch of {} for {} images",
                features.shape()[0],
                images.len()
            )));
        }
        debug!("Normalized batch shape: {:?}", features.shape());

        let sequences = self
            .model
            .generate(&features, config)
            .map_err(CaptionError::Inference)?;
        let expected = images.len() * config.candidates_per_image;
        if sequences.len() != expected {
            return Err(CaptionError::Inference(anyhow::anyhow!(
                "model returned {} sequences, expected {}",
                sequences.len(),
                expected
            )));
        }

        let texts = self
            .detokenizer
            .decode_batch(&sequences)
            .map_err(CaptionError::Inference)?;
        if texts.len() != sequences.len() {
            return Err(CaptionError::Inference(anyhow::anyhow!(
                "detokenizer returned {} texts for {} sequences",
                texts.len(),
                sequences.len()
            )));
        }

        let captions: Vec<Caption> = texts.into_iter().map(|t| t.trim().to_string()).collect();

        info!(
            "Captioned {} image(s), {} candidate(s) each, in {}ms",
            images.len(),
            config.candidates_per_image,
            start.elapsed().as_millis()
        );

        Ok(captions)
    }
}
