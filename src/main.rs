// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use caption_server::{
    api::start_server,
    config::ServerArgs,
    version,
    vision::load_caption_generator,
};
use clap::Parser;
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before clap reads the environment
    dotenv::dotenv().ok();

    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    println!("🚀 Starting Caption Server...\n");
    println!("📦 BUILD VERSION: {}", version::VERSION);
    println!("📅 Build Date: {}", version::BUILD_DATE);
    println!("🧩 Features: {}", version::FEATURES.join(", "));
    println!();
    info!("{}", version::get_version_string());

    let config = ServerArgs::parse().into_config()?;

    println!("🧠 Loading caption model on {}...", config.model.device);
    let captioner = load_caption_generator(&config.model, config.generation).await?;
    println!("✅ Caption model ready: {}", captioner.model_name());

    println!("🌐 Listening on http://{}", config.listen);
    start_server(&config, captioner).await?;

    println!("👋 Caption server stopped");
    Ok(())
}
