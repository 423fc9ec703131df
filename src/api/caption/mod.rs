// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption endpoints
//!
//! Provides the upload page (GET/POST /) and POST /v1/captions.

pub mod handler;
pub mod page;
pub mod request;
pub mod response;

pub use handler::{captions_handler, health_handler, index_handler, upload_handler};
pub use page::render_page;
pub use request::{read_upload_form, CaptionRequest, UploadForm, CANDIDATES_FIELD, IMAGES_FIELD};
pub use response::{CaptionResponse, HealthResponse};
