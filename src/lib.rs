// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod version;
pub mod vision;

// Re-export main types
pub use config::{CaptionModelConfig, ComputeDevice, ModelSource, ServerArgs, ServerConfig};
pub use vision::{Caption, CaptionError, CaptionGenerator, GenerationConfig};
