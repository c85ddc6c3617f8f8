// ============================================================
// Layer 5 — Attention Pooling
// ============================================================
// Additive (Bahdanau-style) attention: score every key against
// a query through a shared tanh layer, softmax over the valid
// keys, and return the weighted key summary together with the
// raw scores. The same module serves the pair encoder, the
// self-matching encoder and both pointer steps — what differs
// between them is only which keys are offered and how the query
// is composed, never the pooling itself.
//
// Reference: Wang et al. (2017) Gated Self-Matching Networks
//            for Reading Comprehension (R-NET), section 3

use burn::{
    nn::Linear,
    prelude::*,
    tensor::activation::softmax,
};

use crate::ml::init::OrthogonalPolicy;

/// Additive score given to masked-out key positions. Large and
/// negative enough that softmax assigns them exactly zero weight in
/// f32, while keeping every logit finite.
pub const MASKED_SCORE: f32 = -1.0e9;

// ─── AttentionMode ────────────────────────────────────────────────────────────

/// How the per-step attention query is composed inside an attention
/// encoder. A closed set, fixed at construction — the encoder never
/// branches on strings at call time.
#[derive(Config, Debug, PartialEq)]
pub enum AttentionMode {
    /// Query is the current input concatenated with the previous
    /// recurrent state (question-aware passage encoding).
    PairEncoding,
    /// Query is the current input alone (passage attending to itself).
    SelfMatching,
}

impl AttentionMode {
    /// Feature size of the composed query.
    pub fn query_size(&self, input_size: usize, hidden_size: usize) -> usize {
        match self {
            AttentionMode::PairEncoding => input_size + hidden_size,
            AttentionMode::SelfMatching => input_size,
        }
    }

    /// Compose the query for one time step.
    pub fn compose_query<B: Backend>(
        &self,
        input: &Tensor<B, 2>,
        hidden: &Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        match self {
            AttentionMode::PairEncoding => {
                Tensor::cat(vec![input.clone(), hidden.clone()], 1)
            }
            AttentionMode::SelfMatching => input.clone(),
        }
    }
}

// ─── AttentionPooling ─────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct AttentionPoolingConfig {
    pub key_size: usize,
    pub query_size: usize,
    #[config(default = 75)]
    pub attn_size: usize,
}

impl AttentionPoolingConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionPooling<B> {
        assert!(self.attn_size > 0, "attention size must be positive");
        let policy = OrthogonalPolicy::default();
        AttentionPooling {
            key_layer: policy.linear(self.key_size, self.attn_size, false, device),
            query_layer: policy.linear(self.query_size, self.attn_size, false, device),
            score_layer: policy.linear(self.attn_size, 1, false, device),
        }
    }
}

/// Masked attention pooling over a key sequence.
#[derive(Module, Debug)]
pub struct AttentionPooling<B: Backend> {
    key_layer: Linear<B>,
    query_layer: Linear<B>,
    score_layer: Linear<B>,
}

impl<B: Backend> AttentionPooling<B> {
    /// Pool `keys` under `query`.
    ///
    /// * `keys`  — [batch, key_len, key_size]
    /// * `query` — [batch, query_size]
    /// * `key_mask` — optional [batch, key_len] validity mask; `None`
    ///   means every key position is valid (documented default, not an
    ///   error).
    ///
    /// Returns `(summary, scores)` where `summary` is the
    /// [batch, key_size] weighted combination of valid keys and
    /// `scores` is the [batch, key_len] unnormalized logits with
    /// masked positions pushed to `MASKED_SCORE`.
    pub fn forward(
        &self,
        keys: Tensor<B, 3>,
        query: Tensor<B, 2>,
        key_mask: Option<&Tensor<B, 2>>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [batch, key_len, key_size] = keys.dims();

        let projected_keys = self.key_layer.forward(keys.clone());
        let projected_query = self.query_layer.forward(query);
        let attn_size = projected_query.dims()[1];
        let projected_query = projected_query.reshape([batch, 1, attn_size]);

        // score_tj = v . tanh(W_k k_j + W_q q_t), broadcast over key_len
        let scores = self
            .score_layer
            .forward((projected_keys + projected_query).tanh())
            .reshape([batch, key_len]);

        let scores = match key_mask {
            Some(mask) => {
                assert_eq!(
                    [batch, key_len],
                    mask.dims(),
                    "key mask shape {:?} does not match keys shape {:?}",
                    mask.dims(),
                    [batch, key_len],
                );
                scores + mask.clone().add_scalar(-1.0).mul_scalar(-MASKED_SCORE)
            }
            None => scores,
        };

        let weights = softmax(scores.clone(), 1);
        let summary = weights
            .reshape([batch, 1, key_len])
            .matmul(keys)
            .reshape([batch, key_size]);

        (summary, scores)
    }
}
