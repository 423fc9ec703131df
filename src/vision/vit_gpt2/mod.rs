// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ViT-GPT2 image captioning on ONNX Runtime
//!
//! Components:
//! - `preprocessing` - ViT image normalization
//! - `encoder` - ViT vision encoder session
//! - `decoder` - GPT-2 decoder session
//! - `beam_search` - model-independent beam search
//! - `tokenizer` - GPT-2 detokenizer
//! - `model` - file discovery and the combined sequence generator

pub mod beam_search;
pub mod decoder;
pub mod encoder;
pub mod model;
pub mod preprocessing;
pub mod session;
pub mod tokenizer;

pub use beam_search::{beam_search, BeamHypothesis, BeamSearchConfig};
pub use decoder::Gpt2Decoder;
pub use encoder::VitEncoder;
pub use model::{ModelFiles, SpecialTokens, VitGpt2Model};
pub use preprocessing::{PreprocessorConfig, VitImageProcessor};
pub use tokenizer::Gpt2Detokenizer;
