// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ViT vision encoder
//!
//! Runs `encoder_model.onnx`: `pixel_values [N, 3, 224, 224]` in,
//! `last_hidden_state [N, 197, 768]` out.

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array3, Array4, Ix3};
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::preprocessing::VIT_INPUT_SIZE;
use super::session::build_session;
use crate::config::ComputeDevice;

/// ViT encoder session
#[derive(Clone)]
pub struct VitEncoder {
    session: Arc<Mutex<Session>>,
    input_name: String,
}

impl std::fmt::Debug for VitEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VitEncoder")
            .field("input_name", &self.input_name)
            .finish_non_exhaustive()
    }
}

impl VitEncoder {
    /// Load the encoder graph
    ///
    /// # Errors
    /// Returns error if the file is missing or ONNX Runtime cannot create
    /// the session on the requested device.
    pub fn new<P: AsRef<Path>>(model_path: P, device: ComputeDevice, intra_threads: usize) -> Result<Self> {
        let model_path = model_path.as_ref();
        let session = build_session(model_path, device, intra_threads)
            .context("ViT encoder failed to load")?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "pixel_values".to_string());

        info!("✅ ViT encoder loaded (input: {})", input_name);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
        })
    }

    /// Encode a normalized pixel batch into hidden states
    pub fn encode(&self, pixel_values: &Array4<f32>) -> Result<Array3<f32>> {
        let shape = pixel_values.shape();
        if shape[0] == 0 || shape[1] != 3 {
            bail!("Invalid encoder input shape: {:?}, expected [N, 3, H, W]", shape);
        }
        if shape[2] != VIT_INPUT_SIZE as usize || shape[3] != VIT_INPUT_SIZE as usize {
            debug!(
                "Encoder input {}x{} differs from {}x{}",
                shape[2], shape[3], VIT_INPUT_SIZE, VIT_INPUT_SIZE
            );
        }

        let input_value =
            Value::from_array(pixel_values.to_owned()).context("Failed to create pixel_values tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("Encoder session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .context("Encoder inference failed")?;

        let hidden_states = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract encoder output")?
            .into_dimensionality::<Ix3>()
            .context("Encoder output is not [batch, seq, hidden]")?
            .to_owned();

        if hidden_states.shape()[0] != shape[0] {
            bail!(
                "Encoder returned batch of {} for {} images",
                hidden_states.shape()[0],
                shape[0]
            );
        }

        debug!("Encoder output shape: {:?}", hidden_states.shape());
        Ok(hidden_states)
    }
}
