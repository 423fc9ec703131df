// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image captioning
//!
//! This module provides:
//! - Upload decoding (`image_utils`)
//! - The `CaptionGenerator` pipeline and its collaborator traits
//! - The ViT-GPT2 ONNX implementation of those collaborators

pub mod captioner;
pub mod image_utils;
pub mod model_manager;
pub mod vit_gpt2;

pub use captioner::{
    Caption, CaptionError, CaptionGenerator, Detokenizer, FeatureTensor, GenerationConfig,
    ImageNormalizer, SequenceGenerator,
};
pub use image_utils::{decode_base64_bytes, decode_image_bytes, decode_rgb_image, ImageError};
pub use model_manager::{build_caption_generator, load_caption_generator};
