// ============================================================
// Layer 5 — Pointer Network
// ============================================================
// Produces the answer span as two distributions over passage
// positions. A learned query pools the question into a summary
// vector; attending over the passage with that summary yields
// the begin logits; the pooled passage context advances a
// stacked recurrent cell whose new state yields the end logits.
//
// Reference: Vinyals et al. (2015) Pointer Networks;
//            Wang et al. (2017) R-NET, section 3.4

use burn::{
    module::Param,
    nn::Initializer,
    prelude::*,
};

use crate::ml::attention::{AttentionPooling, AttentionPoolingConfig};
use crate::ml::recurrent::{CellType, StackedCell, StackedCellConfig};

#[derive(Config, Debug)]
pub struct PointerNetworkConfig {
    #[config(default = 1)]
    pub num_layers: usize,
    #[config(default = 0.0)]
    pub dropout: f64,
    #[config(default = false)]
    pub residual: bool,
    #[config(default = "CellType::Gru")]
    pub cell: CellType,
    /// Attention size for both pooling steps; defaults to the question
    /// encoding size.
    pub attn_size: Option<usize>,
}

impl PointerNetworkConfig {
    pub fn init<B: Backend>(
        &self,
        question_size: usize,
        passage_size: usize,
        device: &B::Device,
    ) -> PointerNetwork<B> {
        assert!(question_size > 0, "pointer question size must be positive");
        assert!(passage_size > 0, "pointer passage size must be positive");
        let attn_size = self.attn_size.unwrap_or(question_size);

        // The learned query that summarizes the question (V_q); its
        // size is tied to the question encoding size.
        let summary_query_size = question_size;

        PointerNetwork {
            question_pooling: AttentionPoolingConfig::new(question_size, summary_query_size)
                .with_attn_size(attn_size)
                .init(device),
            passage_pooling: AttentionPoolingConfig::new(passage_size, question_size)
                .with_attn_size(attn_size)
                .init(device),
            summary_query: Initializer::Normal {
                mean: 0.0,
                std: 1.0,
            }
            .init([1, summary_query_size], device),
            cell: StackedCellConfig::new()
                .with_num_layers(self.num_layers)
                .with_dropout(self.dropout)
                .with_residual(self.residual)
                .with_cell(self.cell.clone())
                .init(passage_size, question_size, device),
        }
    }
}

/// Two-step attention pointer over the passage.
#[derive(Module, Debug)]
pub struct PointerNetwork<B: Backend> {
    question_pooling: AttentionPooling<B>,
    passage_pooling: AttentionPooling<B>,
    summary_query: Param<Tensor<B, 2>>,
    cell: StackedCell<B>,
}

impl<B: Backend> PointerNetwork<B> {
    /// All four tensors must share one batch ordering.
    ///
    /// Returns `(begin, end)` logits, each [batch, passage_len],
    /// unnormalized; masked passage positions carry a large negative
    /// score so any downstream softmax gives them zero probability.
    pub fn forward(
        &self,
        question: Tensor<B, 3>,
        question_mask: &Tensor<B, 2>,
        passage: Tensor<B, 3>,
        passage_mask: &Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let batch = question.dims()[0];
        assert_eq!(
            batch,
            passage.dims()[0],
            "pointer question batch {batch} does not match passage batch {}",
            passage.dims()[0],
        );

        // 1. Question summary under the learned query
        let summary_query = self.summary_query.val();
        let query_size = summary_query.dims()[1];
        let query = summary_query.expand([batch, query_size]);
        let (hidden, _) = self
            .question_pooling
            .forward(question, query, Some(question_mask));

        // 2. First passage pass: begin logits + context for the cell
        let (context, begin) =
            self.passage_pooling
                .forward(passage.clone(), hidden.clone(), Some(passage_mask));

        // 3. Advance the stacked cell; its output conditions the end pass
        let states = self.cell.states_from_hidden(hidden);
        let (output, _) = self.cell.step(context, states);

        let (_, end) = self
            .passage_pooling
            .forward(passage, output, Some(passage_mask));

        (begin, end)
    }
}
