// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! GPT-2 detokenizer

use anyhow::{anyhow, bail, Result};
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::info;

use crate::vision::captioner::Detokenizer;

/// Space-before-punctuation pairs removed after decoding, in order
const TOKENIZATION_SPACE_FIXES: &[(&str, &str)] = &[
    (" .", "."),
    (" ?", "?"),
    (" !", "!"),
    (" ,", ","),
    (" ' ", "'"),
    (" n't", "n't"),
    (" 'm", "'m"),
    (" 's", "'s"),
    (" 've", "'ve"),
    (" 're", "'re"),
];

/// Drop the spaces byte-level decoding leaves before punctuation and
/// English contractions (`"a dog 's bed ."` -> `"a dog's bed."`)
pub fn clean_up_tokenization(text: &str) -> String {
    TOKENIZATION_SPACE_FIXES
        .iter()
        .fold(text.to_string(), |acc, &(from, to)| acc.replace(from, to))
}

/// Wraps a HuggingFace `tokenizer.json`
#[derive(Clone)]
pub struct Gpt2Detokenizer {
    tokenizer: Arc<Tokenizer>,
}

impl std::fmt::Debug for Gpt2Detokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gpt2Detokenizer")
            .field("vocab_size", &self.vocab_size())
            .finish_non_exhaustive()
    }
}

impl Gpt2Detokenizer {
    pub fn from_file<P: AsRef<Path>>(tokenizer_path: P) -> Result<Self> {
        let tokenizer_path = tokenizer_path.as_ref();
        if !tokenizer_path.exists() {
            bail!("Tokenizer not found: {}", tokenizer_path.display());
        }

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        info!("Loaded tokenizer with {} tokens", tokenizer.get_vocab_size(true));

        Ok(Self {
            tokenizer: Arc::new(tokenizer),
        })
    }

    pub fn from_tokenizer(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer: Arc::new(tokenizer),
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }
}

impl Detokenizer for Gpt2Detokenizer {
    fn decode_batch(&self, sequences: &[Vec<u32>]) -> Result<Vec<String>> {
        let refs: Vec<&[u32]> = sequences.iter().map(Vec::as_slice).collect();
        let texts = self
            .tokenizer
            .decode_batch(&refs, true)
            .map_err(|e| anyhow!("Decoding failed: {}", e))?;
        Ok(texts.iter().map(|text| clean_up_tokenization(text)).collect())
    }
}
