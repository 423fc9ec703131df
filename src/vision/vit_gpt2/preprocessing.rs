// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the ViT encoder
//!
//! Mirrors the HuggingFace `ViTImageProcessor`: resize to a fixed size,
//! rescale to [0, 1], normalize per channel, emit NCHW.

use anyhow::{bail, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::vision::captioner::{FeatureTensor, ImageNormalizer};

/// Preprocessor config file name inside a model directory
pub const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor_config.json";

/// ViT input resolution
pub const VIT_INPUT_SIZE: u32 = 224;

/// Per-channel mean used by vit-gpt2-image-captioning
pub const MEAN: [f32; 3] = [0.5, 0.5, 0.5];

/// Per-channel std used by vit-gpt2-image-captioning
pub const STD: [f32; 3] = [0.5, 0.5, 0.5];

/// Target size, written either as a single integer or as `{height, width}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ImageSize {
    Square(u32),
    Dims { height: u32, width: u32 },
}

impl ImageSize {
    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        match *self {
            Self::Square(side) => (side, side),
            Self::Dims { height, width } => (width, height),
        }
    }
}

/// Contents of `preprocessor_config.json`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreprocessorConfig {
    #[serde(default = "default_true")]
    pub do_resize: bool,
    #[serde(default = "default_size")]
    pub size: ImageSize,
    /// PIL resampling code (2 = bilinear)
    #[serde(default = "default_resample")]
    pub resample: u32,
    #[serde(default = "default_true")]
    pub do_rescale: bool,
    #[serde(default = "default_rescale_factor")]
    pub rescale_factor: f32,
    #[serde(default = "default_true")]
    pub do_normalize: bool,
    #[serde(default = "default_mean")]
    pub image_mean: [f32; 3],
    #[serde(default = "default_std")]
    pub image_std: [f32; 3],
}

fn default_true() -> bool {
    true
}

fn default_size() -> ImageSize {
    ImageSize::Square(VIT_INPUT_SIZE)
}

fn default_resample() -> u32 {
    2
}

fn default_rescale_factor() -> f32 {
    1.0 / 255.0
}

fn default_mean() -> [f32; 3] {
    MEAN
}

fn default_std() -> [f32; 3] {
    STD
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            do_resize: true,
            size: default_size(),
            resample: default_resample(),
            do_rescale: true,
            rescale_factor: default_rescale_factor(),
            do_normalize: true,
            image_mean: MEAN,
            image_std: STD,
        }
    }
}

impl PreprocessorConfig {
    /// Map the PIL resampling code onto an `image` filter
    pub fn filter(&self) -> FilterType {
        match self.resample {
            0 => FilterType::Nearest,
            1 => FilterType::Lanczos3,
            3 => FilterType::CatmullRom,
            _ => FilterType::Triangle,
        }
    }
}

/// ViT image processor
#[derive(Debug, Clone, Default)]
pub struct VitImageProcessor {
    config: PreprocessorConfig,
}

impl VitImageProcessor {
    pub fn new(config: PreprocessorConfig) -> Result<Self> {
        if config.image_std.iter().any(|s| *s == 0.0) {
            bail!("image_std must not contain zeros: {:?}", config.image_std);
        }
        let (w, h) = config.size.dimensions();
        if w == 0 || h == 0 {
            bail!("Invalid target size {}x{}", w, h);
        }
        Ok(Self { config })
    }

    /// Load `preprocessor_config.json` from a model directory, falling back
    /// to the ViT defaults when the file is absent
    pub fn from_model_dir<P: AsRef<Path>>(model_dir: P) -> Result<Self> {
        let path = model_dir.as_ref().join(PREPROCESSOR_CONFIG_FILE);
        if !path.exists() {
            debug!(
                "No {} in {}, using ViT defaults",
                PREPROCESSOR_CONFIG_FILE,
                model_dir.as_ref().display()
            );
            return Self::new(PreprocessorConfig::default());
        }
        Self::from_file(&path)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: PreprocessorConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Self::new(config)
    }

    pub fn config(&self) -> &PreprocessorConfig {
        &self.config
    }
}

impl ImageNormalizer for VitImageProcessor {
    fn normalize(&self, images: &[RgbImage]) -> Result<FeatureTensor> {
        let Some(first) = images.first() else {
            bail!("Cannot normalize an empty batch");
        };

        let (width, height) = if self.config.do_resize {
            self.config.size.dimensions()
        } else {
            first.dimensions()
        };

        let scale = if self.config.do_rescale {
            self.config.rescale_factor
        } else {
            1.0
        };
        let (mean, std) = if self.config.do_normalize {
            (self.config.image_mean, self.config.image_std)
        } else {
            ([0.0; 3], [1.0; 3])
        };

        let mut tensor = Array4::<f32>::zeros((images.len(), 3, height as usize, width as usize));

        for (n, image) in images.iter().enumerate() {
            let resized;
            let source = if image.dimensions() == (width, height) {
                image
            } else if self.config.do_resize {
                resized = image::imageops::resize(image, width, height, self.config.filter());
                &resized
            } else {
                bail!(
                    "Image {} is {}x{}, expected {}x{} with resizing disabled",
                    n,
                    image.width(),
                    image.height(),
                    width,
                    height
                );
            };

            for (x, y, pixel) in source.enumerate_pixels() {
                for c in 0..3 {
                    let value = pixel[c] as f32 * scale;
                    tensor[[n, c, y as usize, x as usize]] = (value - mean[c]) / std[c];
                }
            }
        }

        Ok(tensor)
    }
}
