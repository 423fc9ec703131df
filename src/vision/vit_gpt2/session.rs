// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX Runtime session construction

use anyhow::{bail, Context, Result};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;
use tracing::info;

use crate::config::ComputeDevice;

fn execution_provider(device: ComputeDevice) -> ExecutionProviderDispatch {
    match device {
        ComputeDevice::Cpu => CPUExecutionProvider::default().build(),
        // No silent CPU fallback: a missing GPU must fail the load
        ComputeDevice::Cuda => CUDAExecutionProvider::default().build().error_on_failure(),
    }
}

/// Build a session for one ONNX graph on the requested device
pub fn build_session(model_path: &Path, device: ComputeDevice, intra_threads: usize) -> Result<Session> {
    if !model_path.exists() {
        bail!("ONNX model not found: {}", model_path.display());
    }

    info!(
        "Loading {} on {} ({} intra-op threads)",
        model_path.display(),
        device,
        intra_threads
    );

    let session = Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([execution_provider(device)])
        .with_context(|| format!("Failed to register {} execution provider", device))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(intra_threads)
        .context("Failed to set intra threads")?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;

    Ok(session)
}

/// Names of a session's inputs, in graph order
pub fn input_names(session: &Session) -> Vec<String> {
    session.inputs.iter().map(|input| input.name.clone()).collect()
}
