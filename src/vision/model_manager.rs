// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Startup loading of the captioning pipeline

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::{CaptionModelConfig, ModelSource};
use crate::vision::captioner::{CaptionGenerator, GenerationConfig};
use crate::vision::vit_gpt2::{Gpt2Detokenizer, ModelFiles, VitGpt2Model, VitImageProcessor};

/// Display name for a model source
pub fn model_name(source: &ModelSource) -> String {
    match source {
        ModelSource::Hub(repo) => repo.clone(),
        ModelSource::Directory(dir) => dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string()),
    }
}

/// Resolve model files, create the ONNX sessions and assemble a generator
///
/// Blocking: downloads and session creation run on the current thread.
pub fn build_caption_generator(
    config: &CaptionModelConfig,
    generation: GenerationConfig,
) -> Result<CaptionGenerator> {
    let files = match &config.source {
        ModelSource::Directory(dir) => ModelFiles::locate(dir)?,
        ModelSource::Hub(repo) => ModelFiles::from_hub(repo)?,
    };

    let normalizer = match &files.preprocessor_config {
        Some(path) => VitImageProcessor::from_file(path)?,
        None => VitImageProcessor::default(),
    };
    let detokenizer = Gpt2Detokenizer::from_file(&files.tokenizer)?;
    let model = VitGpt2Model::load(&files, config.device, config.intra_threads)?;

    let generator = CaptionGenerator::new(
        Arc::new(normalizer),
        Arc::new(model),
        Arc::new(detokenizer),
        generation,
    )?
    .with_model_name(model_name(&config.source));

    Ok(generator)
}

/// Load the captioning pipeline without blocking the async runtime
pub async fn load_caption_generator(
    config: &CaptionModelConfig,
    generation: GenerationConfig,
) -> Result<CaptionGenerator> {
    info!(
        "Loading caption model from {:?} on {}",
        config.source, config.device
    );

    let config = config.clone();
    let generator = tokio::task::spawn_blocking(move || build_caption_generator(&config, generation))
        .await
        .context("Model loading task panicked")??;

    info!(
        "✅ Caption model {} loaded (max_length={}, num_beams={})",
        generator.model_name(),
        generator.config().max_length,
        generator.config().num_beams
    );

    Ok(generator)
}
