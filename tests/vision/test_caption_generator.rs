// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! CaptionGenerator tests
//!
//! These tests drive the full pipeline (decode, normalize, generate,
//! detokenize, trim) with the real ViT normalizer and stand-in model
//! collaborators, verifying:
//! - Output count is images x candidates
//! - Input order and best-first candidate order are preserved
//! - Empty input makes no model calls
//! - A single corrupt upload fails the whole batch

use caption_server::vision::{CaptionError, ImageError};
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::common::{
    encode, expected_caption, failing_generator, generator_with, png_bytes, stub_generator,
    BrightnessModel, BRIGHT, DARK,
};

#[cfg(test)]
mod caption_generator_tests {
    use super::*;

    /// Test 1: Two valid images give two non-empty trimmed captions
    #[test]
    fn test_two_images_two_captions() {
        let generator = stub_generator();
        let captions = generator.generate(&[png_bytes(20), png_bytes(240)], 1);

        assert_eq!(captions.len(), 2);
        for caption in &captions {
            assert!(!caption.is_empty());
            assert_eq!(caption, caption.trim());
        }
    }

    /// Test 2: Captions follow input order
    #[test]
    fn test_order_preserved() {
        let generator = stub_generator();
        let captions = generator.generate(&[png_bytes(240), png_bytes(10), png_bytes(250)], 1);

        assert_eq!(
            captions,
            vec![
                expected_caption(BRIGHT, 0),
                expected_caption(DARK, 0),
                expected_caption(BRIGHT, 0),
            ]
        );
    }

    /// Test 3: Multiple candidates are grouped per image, best first
    #[test]
    fn test_candidates_grouped_per_image() {
        let generator = stub_generator();
        let captions = generator.generate(&[png_bytes(5), png_bytes(250)], 3);

        assert_eq!(captions.len(), 6);
        assert_eq!(captions[0], expected_caption(DARK, 0));
        assert_eq!(captions[2], expected_caption(DARK, 2));
        assert_eq!(captions[3], expected_caption(BRIGHT, 0));
        assert_eq!(captions[5], expected_caption(BRIGHT, 2));
    }

    /// Test 4: Same input gives same output
    #[test]
    fn test_idempotent() {
        let generator = stub_generator();
        let images = [png_bytes(100), png_bytes(200)];
        assert_eq!(generator.generate(&images, 2), generator.generate(&images, 2));
    }

    /// Test 5: Empty input returns empty output without touching the model
    #[test]
    fn test_empty_input_no_model_call() {
        let model = Arc::new(BrightnessModel::default());
        let generator = generator_with(model.clone());

        let images: Vec<Vec<u8>> = Vec::new();
        assert!(generator.generate(&images, 1).is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    /// Test 6: One corrupt upload empties the whole result
    #[test]
    fn test_corrupt_image_fails_batch() {
        let model = Arc::new(BrightnessModel::default());
        let generator = generator_with(model.clone());
        let images = vec![png_bytes(10), b"definitely not an image".to_vec(), png_bytes(200)];

        assert!(generator.generate(&images, 1).is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);

        match generator.try_generate(&images, 1) {
            Err(CaptionError::Decode { index, source }) => {
                assert_eq!(index, 1);
                assert!(matches!(source, ImageError::UnsupportedFormat));
            }
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    /// Test 7: Grayscale and RGBA uploads are converted to RGB
    #[test]
    fn test_non_rgb_inputs_accepted() {
        let generator = stub_generator();
        let gray = encode(DynamicImage::ImageLuma8(GrayImage::from_pixel(9, 9, Luma([250]))));
        let rgba = encode(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            9,
            9,
            Rgba([5, 5, 5, 128]),
        )));

        let captions = generator.try_generate(&[gray, rgba], 1).unwrap();
        assert_eq!(
            captions,
            vec![expected_caption(BRIGHT, 0), expected_caption(DARK, 0)]
        );
    }

    /// Test 8: Model failure is swallowed by generate, surfaced by try_generate
    #[test]
    fn test_model_failure() {
        let generator = failing_generator();
        assert!(generator.generate(&[png_bytes(1)], 1).is_empty());

        let err = generator.try_generate(&[png_bytes(1)], 1).unwrap_err();
        assert_eq!(err.kind(), "inference");
        assert!(err.to_string().contains("decoder session failed"));
    }

    /// Test 9: Candidate count is bounded by the beam width
    #[test]
    fn test_candidate_bounds() {
        let generator = stub_generator();
        let beams = generator.config().num_beams;

        assert_eq!(generator.generate(&[png_bytes(1)], beams).len(), beams);
        assert!(matches!(
            generator.try_generate(&[png_bytes(1)], beams + 1),
            Err(CaptionError::InvalidConfig(_))
        ));
        assert!(matches!(
            generator.try_generate(&[png_bytes(1)], 0),
            Err(CaptionError::InvalidConfig(_))
        ));
    }
}
