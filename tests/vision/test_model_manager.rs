// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Model loading tests
//!
//! These tests verify that startup loading:
//! - Reports missing directories and files by path
//! - Finds the ONNX export layout
//! - Produces a working generator when real weights are present

use caption_server::config::{CaptionModelConfig, ComputeDevice, ModelSource, DEFAULT_MODEL_DIR};
use caption_server::vision::load_caption_generator;
use caption_server::vision::vit_gpt2::ModelFiles;
use caption_server::GenerationConfig;
use std::path::PathBuf;
use tempfile::TempDir;

use crate::common::png_bytes;

#[cfg(test)]
mod model_manager_tests {
    use super::*;

    /// Test 1: Default config points at the local model directory on CPU
    #[test]
    fn test_default_config() {
        let config = CaptionModelConfig::default();
        assert_eq!(config.device, ComputeDevice::Cpu);
        assert_eq!(
            config.source,
            ModelSource::Directory(PathBuf::from(DEFAULT_MODEL_DIR))
        );
    }

    /// Test 2: Missing directory fails with its path
    #[tokio::test]
    async fn test_missing_directory() {
        let config = CaptionModelConfig {
            source: ModelSource::Directory(PathBuf::from("/nonexistent/models/vit")),
            ..Default::default()
        };
        let err = load_caption_generator(&config, GenerationConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/models/vit"));
    }

    /// Test 3: Directory without a decoder names the missing piece
    #[tokio::test]
    async fn test_missing_decoder() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("onnx")).unwrap();
        std::fs::write(dir.path().join("onnx/encoder_model.onnx"), b"").unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let config = CaptionModelConfig {
            source: ModelSource::Directory(dir.path().to_path_buf()),
            ..Default::default()
        };
        let err = load_caption_generator(&config, GenerationConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("decoder not found"));
    }

    /// Test 4: Export layout is discovered
    #[test]
    fn test_locate_export_layout() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("onnx")).unwrap();
        for name in ["onnx/encoder_model.onnx", "onnx/decoder_model.onnx", "tokenizer.json", "config.json"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let files = ModelFiles::locate(dir.path()).unwrap();
        assert!(files.model_config.is_some());
        assert!(files.preprocessor_config.is_none());
    }

    /// Test 5: Real model captions an image (requires downloaded weights)
    #[tokio::test]
    #[ignore] // Only run if model files are downloaded
    async fn test_real_model_captions() {
        let generator =
            load_caption_generator(&CaptionModelConfig::default(), GenerationConfig::default())
                .await
                .unwrap();

        let captions = generator.try_generate(&[png_bytes(30), png_bytes(220)], 2).unwrap();
        assert_eq!(captions.len(), 4);
        assert!(captions.iter().all(|c| c == c.trim()));
    }
}
