// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption endpoint handlers

use axum::{extract::State, response::Html, Json};
use axum_extra::extract::Multipart;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::page::render_page;
use super::request::{read_upload_form, CaptionRequest};
use super::response::{CaptionResponse, HealthResponse};
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::vision::{decode_base64_bytes, Caption, CaptionError, CaptionGenerator};

const FAILURE_NOTICE: &str = "Captioning failed, check the server log for details.";

/// Run `try_generate` on the blocking pool
async fn run_captioner(
    captioner: Arc<CaptionGenerator>,
    images: Vec<Bytes>,
    candidates: usize,
) -> Result<Result<Vec<Caption>, CaptionError>, ApiError> {
    tokio::task::spawn_blocking(move || captioner.try_generate(&images, candidates))
        .await
        .map_err(|e| ApiError::InternalError(format!("Caption task failed: {}", e)))
}

/// GET / - Upload form
pub async fn index_handler(State(state): State<AppState>) -> Html<String> {
    Html(render_page(&[], None, state.captioner.config().num_beams))
}

/// POST / - Caption uploaded images and render them
///
/// Failures never surface as HTTP errors: the page renders with no captions
/// (plus a short notice when `show_errors` is on).
pub async fn upload_handler(State(state): State<AppState>, multipart: Multipart) -> Html<String> {
    let max_candidates = state.captioner.config().num_beams;

    let outcome = match read_upload_form(multipart).await {
        Ok(form) => match form.validate(max_candidates) {
            Ok(()) => {
                info!("Captioning {} uploaded image(s)", form.images.len());
                run_captioner(state.captioner.clone(), form.images, form.candidates)
                    .await
                    .and_then(|result| result.map_err(ApiError::from))
            }
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };

    let (captions, notice) = match outcome {
        Ok(captions) => (captions, None),
        Err(e) => {
            warn!("Upload captioning failed: {}", e);
            let notice = state.settings.show_errors.then_some(FAILURE_NOTICE);
            (Vec::new(), notice)
        }
    };

    Html(render_page(&captions, notice, max_candidates))
}

/// POST /v1/captions - Caption base64 images, returning typed errors
pub async fn captions_handler(
    State(state): State<AppState>,
    Json(request): Json<CaptionRequest>,
) -> Result<Json<CaptionResponse>, ApiError> {
    let start = Instant::now();
    request.validate(state.captioner.config().num_beams)?;

    let images = request
        .images
        .iter()
        .enumerate()
        .map(|(index, encoded)| {
            decode_base64_bytes(encoded)
                .map(Bytes::from)
                .map_err(|e| ApiError::ImageDecode {
                    index,
                    message: e.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let captions = run_captioner(state.captioner.clone(), images, request.candidates).await??;

    Ok(Json(CaptionResponse {
        captions,
        model: state.captioner.model_name().to_string(),
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model: state.captioner.model_name().to_string(),
        device: state.settings.device.to_string(),
        version: crate::version::VERSION_NUMBER.to_string(),
    })
}
