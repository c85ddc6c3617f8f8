// ============================================================
// Layer 2 — Ask Use Case
// ============================================================
// Real-text inference path:
//   1. Load pretrained word vectors and build the char vocab
//   2. Build the model (restoring a checkpoint when one exists)
//   3. Tokenize question + passage, batch, forward
//   4. Decode the best answer span from the begin/end scores

use anyhow::{ensure, Context, Result};
use burn::prelude::*;

use crate::data::batcher::DocumentBatcher;
use crate::data::preprocessor::{CharVocab, Preprocessor};
use crate::domain::span::{best_span, softmax, Span};
use crate::domain::traits::EmbeddingSource;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::embedding_store::EmbeddingTable;
use crate::ml::embedding::{CharCnnConfig, WordEmbeddingConfig};
use crate::ml::encoder::{AttentionEncoderConfig, SentenceEncodingConfig};
use crate::ml::model::{RNetConfig, RNetQaModel, RNetQaModelConfig};
use crate::ml::pointer::PointerNetworkConfig;

type InferBackend = burn::backend::Wgpu;

const MAX_ANSWER_LEN: usize = 30;
const CHAR_EMBEDDING_SIZE: usize = 8;
const CHAR_FILTERS: usize = 50;

pub struct AskUseCase {
    table: EmbeddingTable,
    char_vocab: CharVocab,
    model: RNetQaModel<InferBackend>,
    min_char_len: usize,
    preprocessor: Preprocessor,
}

impl AskUseCase {
    pub fn new(embedding_path: &str, checkpoint_dir: &str, hidden_size: usize) -> Result<Self> {
        let table = EmbeddingTable::load(embedding_path)?;
        let char_vocab = CharVocab::from_words(table.words());
        let checkpoints = CheckpointManager::new(checkpoint_dir);

        // A stored config wins over CLI defaults so the weights always
        // match the architecture they were trained with
        let config = match checkpoints.load_config() {
            Ok(config) => config,
            Err(_) => default_config(&char_vocab, hidden_size),
        };
        let min_char_len = config
            .char_embedding
            .filter_widths
            .iter()
            .copied()
            .max()
            .unwrap_or(1);

        let device = Default::default();
        let model = config.init::<InferBackend>(table.to_tensor(&device), &device);
        let model = if checkpoints.has_checkpoint() {
            checkpoints.load_model(model, &device)?
        } else {
            tracing::warn!("No checkpoint found — answering with untrained weights");
            model
        };

        Ok(Self {
            table,
            char_vocab,
            model,
            min_char_len,
            preprocessor: Preprocessor::new(),
        })
    }

    /// Predict the best answer span for a question over a passage.
    /// Returns the answer text, the span, and its probability.
    pub fn answer(&self, question: &str, passage: &str) -> Result<(String, Span, f32)> {
        let question_tokens = self.preprocessor.tokenize(question);
        let passage_tokens = self.preprocessor.tokenize(passage);
        ensure!(!question_tokens.is_empty(), "the question contains no tokens");
        ensure!(!passage_tokens.is_empty(), "the passage contains no tokens");

        let device = self.model.device();
        let batcher = DocumentBatcher::<InferBackend>::new(device);

        let question_docs = batcher.documents(&[self.table.encode(&question_tokens)]);
        let passage_docs = batcher.documents(&[self.table.encode(&passage_tokens)]);
        let question_chars =
            batcher.char_documents(&[self.char_ids(&question_tokens)], self.min_char_len);
        let passage_chars =
            batcher.char_documents(&[self.char_ids(&passage_tokens)], self.min_char_len);

        let logits = self
            .model
            .forward(&question_docs, &question_chars, &passage_docs, &passage_chars);

        let begin = softmax(&logits.begin.into_data().to_vec::<f32>().unwrap_or_default());
        let end = softmax(&logits.end.into_data().to_vec::<f32>().unwrap_or_default());

        let (span, score) =
            best_span(&begin, &end, MAX_ANSWER_LEN).context("no valid span found")?;
        let answer = passage_tokens[span.begin..=span.end].join(" ");

        tracing::debug!(
            "span [{}, {}] p={score:.4} answer='{answer}'",
            span.begin,
            span.end,
        );
        Ok((answer, span, score))
    }

    fn char_ids(&self, tokens: &[String]) -> Vec<Vec<u32>> {
        tokens.iter().map(|t| self.char_vocab.encode(t)).collect()
    }
}

fn default_config(char_vocab: &CharVocab, hidden_size: usize) -> RNetQaModelConfig {
    RNetQaModelConfig::new(
        WordEmbeddingConfig::new(),
        CharCnnConfig::new(char_vocab.size(), CHAR_EMBEDDING_SIZE, CHAR_FILTERS),
        RNetConfig::new(
            SentenceEncodingConfig::new(hidden_size),
            AttentionEncoderConfig::new(hidden_size),
            AttentionEncoderConfig::new(hidden_size),
            PointerNetworkConfig::new(),
        ),
    )
}
