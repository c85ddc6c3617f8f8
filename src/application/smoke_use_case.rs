// ============================================================
// Layer 2 — Smoke Use Case
// ============================================================
// Builds a randomly initialized model and pushes a synthetic
// batch through it, end to end: batching, packing, the full
// encoder stack, span decoding. No training is involved — the
// point is an executable check that shapes, masking and order
// bookkeeping hold together on a real backend.

use anyhow::{ensure, Result};
use burn::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::batcher::DocumentBatcher;
use crate::domain::span::{best_span, softmax};
use crate::ml::embedding::{CharCnnConfig, WordEmbeddingConfig};
use crate::ml::encoder::{AttentionEncoderConfig, SentenceEncodingConfig};
use crate::ml::model::{RNetConfig, RNetQaModelConfig};
use crate::ml::pointer::PointerNetworkConfig;

// CPU backend — the smoke pass verifies shapes, not throughput
type SmokeBackend = burn::backend::NdArray;

const CHAR_VOCAB_SIZE: usize = 60;
const CHAR_EMBEDDING_SIZE: usize = 8;
const CHAR_FILTERS: usize = 25;
const CHAR_FILTER_WIDTH: usize = 3;
const MAX_ANSWER_LEN: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmokeConfig {
    pub batch_size: usize,
    pub question_len: usize,
    pub passage_len: usize,
    pub hidden_size: usize,
    pub vocab_size: usize,
    pub word_dim: usize,
    pub residual: bool,
    pub ungated: bool,
}

pub struct SmokeUseCase {
    config: SmokeConfig,
}

impl SmokeUseCase {
    pub fn new(config: SmokeConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;
        ensure!(cfg.batch_size >= 1, "smoke batch must hold at least one example");
        ensure!(
            cfg.question_len >= 1 && cfg.passage_len >= 1,
            "smoke sequences must hold at least one token",
        );

        let device = Default::default();
        let model = self.model_config().init::<SmokeBackend>(
            Tensor::random(
                [cfg.vocab_size, cfg.word_dim],
                burn::tensor::Distribution::Normal(0.0, 1.0),
                &device,
            ),
            &device,
        );
        tracing::info!(
            "Smoke model ready: hidden={}, embedding={}+{}",
            cfg.hidden_size,
            cfg.word_dim,
            CHAR_FILTERS,
        );

        // Synthetic batch with genuinely ragged lengths so the sort /
        // restore path is exercised, not just the happy square case
        let batcher = DocumentBatcher::<SmokeBackend>::new(device);
        let question_ids = self.random_batch(cfg.question_len);
        let passage_ids = self.random_batch(cfg.passage_len);

        let question = batcher.documents(&question_ids);
        let passage = batcher.documents(&passage_ids);
        let question_chars =
            batcher.char_documents(&random_chars(&question_ids), CHAR_FILTER_WIDTH);
        let passage_chars =
            batcher.char_documents(&random_chars(&passage_ids), CHAR_FILTER_WIDTH);

        let logits = model.forward(&question, &question_chars, &passage, &passage_chars);

        let [batch, passage_len] = logits.begin.dims();
        ensure!(
            batch == cfg.batch_size && passage_len == passage.max_len(),
            "span logits came back as [{batch}, {passage_len}]",
        );

        let begin = logits.begin.into_data().to_vec::<f32>().unwrap_or_default();
        let end = logits.end.into_data().to_vec::<f32>().unwrap_or_default();
        ensure!(
            begin.iter().chain(end.iter()).all(|v| v.is_finite()),
            "span logits contain NaN or Inf",
        );

        for row in 0..batch {
            let begin_probs = softmax(&begin[row * passage_len..(row + 1) * passage_len]);
            let end_probs = softmax(&end[row * passage_len..(row + 1) * passage_len]);
            if let Some((span, score)) = best_span(&begin_probs, &end_probs, MAX_ANSWER_LEN) {
                println!(
                    "example {row}: passage_len={} span=[{}, {}] p={score:.4}",
                    passage.lengths[row], span.begin, span.end,
                );
            }
        }

        println!("Smoke pass OK: [{batch}, {passage_len}] begin/end logits, all finite.");
        Ok(())
    }

    fn model_config(&self) -> RNetQaModelConfig {
        let cfg = &self.config;
        RNetQaModelConfig::new(
            WordEmbeddingConfig::new(),
            CharCnnConfig::new(CHAR_VOCAB_SIZE, CHAR_EMBEDDING_SIZE, CHAR_FILTERS)
                .with_filter_widths(vec![CHAR_FILTER_WIDTH]),
            RNetConfig::new(
                SentenceEncodingConfig::new(cfg.hidden_size),
                AttentionEncoderConfig::new(cfg.hidden_size).with_gated(!cfg.ungated),
                AttentionEncoderConfig::new(cfg.hidden_size).with_gated(!cfg.ungated),
                PointerNetworkConfig::new(),
            )
            .with_residual(cfg.residual),
        )
    }

    /// Token id rows with lengths between half the maximum and the
    /// maximum, so the batch is properly ragged.
    fn random_batch(&self, max_len: usize) -> Vec<Vec<u32>> {
        let cfg = &self.config;
        let mut rng = rand::thread_rng();
        let min_len = (max_len / 2).max(1);

        (0..cfg.batch_size)
            .map(|row| {
                // The longest row keeps the full length so max_len is hit
                let len = if row == 0 {
                    max_len
                } else {
                    rng.gen_range(min_len..=max_len)
                };
                (0..len)
                    .map(|_| rng.gen_range(2..cfg.vocab_size as u32))
                    .collect()
            })
            .collect()
    }
}

/// Character ids shaped after the token rows: one short char sequence
/// per token.
fn random_chars(token_rows: &[Vec<u32>]) -> Vec<Vec<Vec<u32>>> {
    let mut rng = rand::thread_rng();
    token_rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|_| {
                    let len = rng.gen_range(1..=8usize);
                    (0..len)
                        .map(|_| rng.gen_range(2..CHAR_VOCAB_SIZE as u32))
                        .collect()
                })
                .collect()
        })
        .collect()
}
