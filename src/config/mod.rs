// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Server configuration
//!
//! Settings come from command-line flags with environment variable
//! fallbacks (a `.env` file is loaded first by the binary).

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::vision::GenerationConfig;

/// Default model directory (ONNX export of nlpconnect/vit-gpt2-image-captioning)
pub const DEFAULT_MODEL_DIR: &str = "./models/vit-gpt2-image-captioning";

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8000";

/// Compute device for ONNX Runtime sessions
///
/// Chosen explicitly at startup. There is no runtime probe: asking for
/// `cuda` on a machine without a usable GPU fails model loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ComputeDevice {
    #[default]
    Cpu,
    Cuda,
}

impl ComputeDevice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caption server command line
#[derive(Parser, Debug, Clone)]
#[command(name = "caption-server")]
#[command(version = crate::version::VERSION_NUMBER)]
#[command(about = "Caption uploaded images with a ViT-GPT2 model", long_about = None)]
pub struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "CAPTION_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,

    /// Directory holding encoder_model.onnx, decoder_model.onnx and tokenizer.json
    #[arg(long, env = "CAPTION_MODEL_DIR", default_value = DEFAULT_MODEL_DIR)]
    pub model_dir: PathBuf,

    /// HuggingFace repository to fetch the ONNX model from (overrides --model-dir)
    #[arg(long, env = "CAPTION_HF_REPO")]
    pub hf_repo: Option<String>,

    /// Compute device for inference
    #[arg(long, env = "CAPTION_DEVICE", value_enum, default_value_t = ComputeDevice::Cpu)]
    pub device: ComputeDevice,

    /// Maximum caption length in tokens, including the start token
    #[arg(long, env = "CAPTION_MAX_LENGTH", default_value_t = 16)]
    pub max_length: usize,

    /// Beam width
    #[arg(long, env = "CAPTION_NUM_BEAMS", default_value_t = 4)]
    pub num_beams: usize,

    /// ONNX Runtime intra-op threads per session
    #[arg(long, env = "CAPTION_INTRA_THREADS", default_value_t = 4)]
    pub intra_threads: usize,

    /// Maximum request body size in megabytes
    #[arg(long, env = "CAPTION_MAX_UPLOAD_MB", default_value_t = 32)]
    pub max_upload_mb: usize,

    /// Show a failure notice on the upload page instead of an empty caption list
    #[arg(long, env = "CAPTION_SHOW_ERRORS")]
    pub show_errors: bool,
}

/// Where the model files come from
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// Local directory
    Directory(PathBuf),
    /// HuggingFace Hub repository id
    Hub(String),
}

/// Settings needed to load the captioning model
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionModelConfig {
    pub source: ModelSource,
    pub device: ComputeDevice,
    pub intra_threads: usize,
}

impl Default for CaptionModelConfig {
    fn default() -> Self {
        Self {
            source: ModelSource::Directory(PathBuf::from(DEFAULT_MODEL_DIR)),
            device: ComputeDevice::Cpu,
            intra_threads: 4,
        }
    }
}

/// Validated server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub model: CaptionModelConfig,
    pub generation: GenerationConfig,
    pub max_upload_bytes: usize,
    pub show_errors: bool,
}

impl ServerArgs {
    /// Validate flags and build the server configuration
    pub fn into_config(self) -> Result<ServerConfig> {
        if self.intra_threads == 0 {
            bail!("--intra-threads must be at least 1");
        }
        if self.max_upload_mb == 0 {
            bail!("--max-upload-mb must be at least 1");
        }
        let max_upload_bytes = match self.max_upload_mb.checked_mul(1024 * 1024) {
            Some(bytes) => bytes,
            None => bail!("--max-upload-mb {} is too large", self.max_upload_mb),
        };

        let generation = GenerationConfig {
            max_length: self.max_length,
            num_beams: self.num_beams,
            candidates_per_image: 1,
        };
        generation.validate()?;

        let source = match self.hf_repo {
            Some(repo) if !repo.trim().is_empty() => ModelSource::Hub(repo.trim().to_string()),
            _ => ModelSource::Directory(self.model_dir),
        };

        Ok(ServerConfig {
            listen: self.listen,
            model: CaptionModelConfig {
                source,
                device: self.device,
                intra_threads: self.intra_threads,
            },
            generation,
            max_upload_bytes,
            show_errors: self.show_errors,
        })
    }
}
