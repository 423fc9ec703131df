// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! GPT-2 language decoder
//!
//! Runs `decoder_model.onnx` without a KV cache: every step feeds the whole
//! prefix and reads the logits at the last position.

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{s, Array2, Array3, Ix3};
use ort::session::Session;
use ort::value::{DynValue, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::session::{build_session, input_names};
use crate::config::ComputeDevice;

/// Resolved decoder input names
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderInputs {
    pub input_ids: String,
    pub encoder_hidden_states: String,
    pub encoder_attention_mask: Option<String>,
    pub attention_mask: Option<String>,
}

impl DecoderInputs {
    /// Match graph input names to the roles the decoder fills
    pub fn resolve(names: &[String]) -> Result<Self> {
        let mut input_ids = None;
        let mut encoder_hidden_states = None;
        let mut encoder_attention_mask = None;
        let mut attention_mask = None;
        let mut unknown = Vec::new();

        for name in names {
            match name.as_str() {
                "input_ids" => input_ids = Some(name.clone()),
                "encoder_hidden_states" => encoder_hidden_states = Some(name.clone()),
                "encoder_attention_mask" => encoder_attention_mask = Some(name.clone()),
                "attention_mask" | "decoder_attention_mask" => attention_mask = Some(name.clone()),
                other => unknown.push(other.to_string()),
            }
        }

        if !unknown.is_empty() {
            bail!(
                "Decoder has unsupported inputs {:?} (export decoder_model.onnx without past key values)",
                unknown
            );
        }

        Ok(Self {
            input_ids: input_ids.ok_or_else(|| anyhow!("Decoder is missing an input_ids input"))?,
            encoder_hidden_states: encoder_hidden_states
                .ok_or_else(|| anyhow!("Decoder is missing an encoder_hidden_states input"))?,
            encoder_attention_mask,
            attention_mask,
        })
    }
}

/// GPT-2 decoder session
#[derive(Clone)]
pub struct Gpt2Decoder {
    session: Arc<Mutex<Session>>,
    inputs: DecoderInputs,
}

impl std::fmt::Debug for Gpt2Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gpt2Decoder")
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

impl Gpt2Decoder {
    pub fn new<P: AsRef<Path>>(model_path: P, device: ComputeDevice, intra_threads: usize) -> Result<Self> {
        let model_path = model_path.as_ref();
        let session = build_session(model_path, device, intra_threads)
            .context("GPT-2 decoder failed to load")?;

        let names = input_names(&session);
        debug!("Decoder inputs: {:?}", names);
        let inputs = DecoderInputs::resolve(&names)?;

        info!("✅ GPT-2 decoder loaded");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            inputs,
        })
    }

    /// Logits for the next token of every row in `input_ids`
    ///
    /// `encoder_hidden_states` is `[B, seq, hidden]` with one row per
    /// sequence in `input_ids` (`[B, len]`). Returns `[B, vocab]`.
    pub fn next_token_logits(
        &self,
        encoder_hidden_states: &Array3<f32>,
        input_ids: &Array2<i64>,
    ) -> Result<Array2<f32>> {
        let (batch, seq_len) = input_ids.dim();
        if batch == 0 || seq_len == 0 {
            bail!("Empty decoder input {:?}", input_ids.shape());
        }
        if encoder_hidden_states.shape()[0] != batch {
            bail!(
                "Encoder states batch {} does not match input_ids batch {}",
                encoder_hidden_states.shape()[0],
                batch
            );
        }
        let encoder_len = encoder_hidden_states.shape()[1];

        let mut feeds: Vec<(String, DynValue)> = vec![
            (
                self.inputs.input_ids.clone(),
                Value::from_array(input_ids.to_owned())
                    .context("Failed to create input_ids tensor")?
                    .into_dyn(),
            ),
            (
                self.inputs.encoder_hidden_states.clone(),
                Value::from_array(encoder_hidden_states.to_owned())
                    .context("Failed to create encoder_hidden_states tensor")?
                    .into_dyn(),
            ),
        ];
        if let Some(name) = &self.inputs.encoder_attention_mask {
            let mask = Array2::<i64>::ones((batch, encoder_len));
            feeds.push((
                name.clone(),
                Value::from_array(mask)
                    .context("Failed to create encoder_attention_mask tensor")?
                    .into_dyn(),
            ));
        }
        if let Some(name) = &self.inputs.attention_mask {
            let mask = Array2::<i64>::ones((batch, seq_len));
            feeds.push((
                name.clone(),
                Value::from_array(mask)
                    .context("Failed to create attention_mask tensor")?
                    .into_dyn(),
            ));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("Decoder session lock poisoned"))?;
        let outputs = session.run(feeds).context("Decoder inference failed")?;

        let logits = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract decoder logits")?
            .into_dimensionality::<Ix3>()
            .context("Decoder logits are not [batch, seq, vocab]")?;

        if logits.shape()[0] != batch || logits.shape()[1] == 0 {
            bail!("Unexpected decoder logits shape {:?}", logits.shape());
        }
        let last = logits.shape()[1] - 1;

        let next = logits.slice(s![.., last, ..]).to_owned();
        Ok(next)
    }
}
