// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption request types and validation

use axum_extra::extract::Multipart;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::errors::ApiError;

/// Multipart field carrying uploaded files
pub const IMAGES_FIELD: &str = "images";

/// Multipart field carrying the candidate count
pub const CANDIDATES_FIELD: &str = "candidates";

fn default_candidates() -> usize {
    1
}

fn validate_candidates(candidates: usize, max_candidates: usize) -> Result<(), ApiError> {
    if candidates < 1 || candidates > max_candidates {
        return Err(ApiError::ValidationError {
            field: CANDIDATES_FIELD.to_string(),
            message: format!(
                "candidates must be between 1 and {}, got {}",
                max_candidates, candidates
            ),
        });
    }
    Ok(())
}

/// JSON caption request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionRequest {
    /// Base64-encoded images (data URLs accepted)
    #[serde(default)]
    pub images: Vec<String>,

    /// Captions returned per image
    #[serde(default = "default_candidates")]
    pub candidates: usize,
}

impl CaptionRequest {
    pub fn validate(&self, max_candidates: usize) -> Result<(), ApiError> {
        validate_candidates(self.candidates, max_candidates)
    }
}

/// Parsed upload form
#[derive(Debug, Clone, PartialEq)]
pub struct UploadForm {
    pub images: Vec<Bytes>,
    pub candidates: usize,
}

impl Default for UploadForm {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            candidates: default_candidates(),
        }
    }
}

impl UploadForm {
    pub fn validate(&self, max_candidates: usize) -> Result<(), ApiError> {
        validate_candidates(self.candidates, max_candidates)
    }
}

/// Collect the `images` files and optional `candidates` value
///
/// Unknown fields are ignored. A file input left empty (no filename, no
/// content) is skipped; any other `images` part is kept, even when empty.
pub async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            IMAGES_FIELD => {
                let file_chosen = field.file_name().is_some_and(|name| !name.is_empty());
                let data = field.bytes().await.map_err(|e| {
                    ApiError::InvalidRequest(format!("Failed to read upload: {}", e))
                })?;
                // Named zero-byte files go through and fail decoding
                if !file_chosen && data.is_empty() {
                    debug!("Skipping file input with no file chosen");
                    continue;
                }
                form.images.push(data);
            }
            CANDIDATES_FIELD => {
                let text = field.text().await.map_err(|e| {
                    ApiError::InvalidRequest(format!("Failed to read candidates: {}", e))
                })?;
                let text = text.trim();
                if !text.is_empty() {
                    form.candidates = text.parse().map_err(|_| ApiError::ValidationError {
                        field: CANDIDATES_FIELD.to_string(),
                        message: format!("candidates must be a positive integer, got '{}'", text),
                    })?;
                }
            }
            other => debug!("Ignoring form field '{}'", other),
        }
    }

    Ok(form)
}
