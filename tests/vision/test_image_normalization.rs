// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! ViT image normalization tests

use caption_server::vision::vit_gpt2::VitImageProcessor;
use caption_server::vision::{decode_rgb_image, ImageNormalizer};

use crate::common::png_bytes;

#[cfg(test)]
mod normalization_tests {
    use super::*;

    /// Test 1: Batch of uploads becomes [N, 3, 224, 224]
    #[test]
    fn test_batch_shape() {
        let images: Vec<_> = [png_bytes(0), png_bytes(128), png_bytes(255)]
            .iter()
            .map(|bytes| decode_rgb_image(bytes).unwrap())
            .collect();

        let tensor = VitImageProcessor::default().normalize(&images).unwrap();
        assert_eq!(tensor.shape(), &[3, 3, 224, 224]);
    }

    /// Test 2: Values follow (x/255 - 0.5) / 0.5
    #[test]
    fn test_value_range() {
        let images = vec![
            decode_rgb_image(&png_bytes(0)).unwrap(),
            decode_rgb_image(&png_bytes(255)).unwrap(),
        ];
        let tensor = VitImageProcessor::default().normalize(&images).unwrap();

        assert!(tensor.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert!((tensor[[0, 0, 112, 112]] + 1.0).abs() < 1e-2);
        assert!((tensor[[1, 1, 112, 112]] - 1.0).abs() < 1e-2);
    }
}
