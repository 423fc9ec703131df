// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::caption::{captions_handler, health_handler, index_handler, upload_handler};
use crate::config::{ComputeDevice, ServerConfig};
use crate::vision::CaptionGenerator;

/// Per-server settings handlers read
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub device: ComputeDevice,
    pub max_upload_bytes: usize,
    pub show_errors: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            device: ComputeDevice::Cpu,
            max_upload_bytes: 32 * 1024 * 1024,
            show_errors: false,
        }
    }
}

impl From<&ServerConfig> for ServerSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            device: config.model.device,
            max_upload_bytes: config.max_upload_bytes,
            show_errors: config.show_errors,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub captioner: Arc<CaptionGenerator>,
    pub settings: Arc<ServerSettings>,
}

impl AppState {
    pub fn new(captioner: CaptionGenerator, settings: ServerSettings) -> Self {
        Self {
            captioner: Arc::new(captioner),
            settings: Arc::new(settings),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.settings.max_upload_bytes;

    Router::new()
        // Upload page
        .route("/", get(index_handler).post(upload_handler))
        // JSON captions
        .route("/v1/captions", post(captions_handler))
        // Health check
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub async fn start_server(config: &ServerConfig, captioner: CaptionGenerator) -> anyhow::Result<()> {
    let state = AppState::new(captioner, ServerSettings::from(config));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen).await?;

    info!("Caption server listening on http://{}", config.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
