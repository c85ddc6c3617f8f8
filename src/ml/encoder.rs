// ============================================================
// Layer 5 — Sentence and Attention Encoders
// ============================================================
// SentenceEncoding runs two independent bidirectional RNNs over
// question and passage. AttentionEncoder is the shared machinery
// behind PairEncoder (passage attends to question) and
// SelfMatchingEncoder (passage attends to itself): at every time
// step it pools the key sequence under a composed query, gates
// the input‖summary combination, and feeds a recurrent cell.
//
// Reference: Wang et al. (2017) R-NET, sections 3.2–3.3

use burn::{
    module::Ignored,
    nn::{Dropout, DropoutConfig, Linear},
    prelude::*,
    tensor::activation::sigmoid,
};

use crate::ml::attention::{AttentionMode, AttentionPooling, AttentionPoolingConfig};
use crate::ml::init::OrthogonalPolicy;
use crate::ml::recurrent::{CellState, CellType, Rnn, RnnCell, RnnConfig};
use crate::ml::sequence::PackedSequence;

// ─── SentenceEncoding ─────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct SentenceEncodingConfig {
    pub hidden_size: usize,
    #[config(default = 1)]
    pub num_layers: usize,
    #[config(default = true)]
    pub bidirectional: bool,
    #[config(default = 0.0)]
    pub dropout: f64,
    #[config(default = "CellType::Gru")]
    pub cell: CellType,
}

impl SentenceEncodingConfig {
    pub fn output_size(&self) -> usize {
        self.hidden_size * if self.bidirectional { 2 } else { 1 }
    }

    pub fn init<B: Backend>(
        &self,
        input_size: usize,
        device: &B::Device,
    ) -> SentenceEncoding<B> {
        let rnn = RnnConfig::new(self.hidden_size)
            .with_num_layers(self.num_layers)
            .with_bidirectional(self.bidirectional)
            .with_dropout(self.dropout)
            .with_cell(self.cell.clone());
        SentenceEncoding {
            question_encoder: rnn.init(input_size, device),
            passage_encoder: rnn.init(input_size, device),
        }
    }
}

/// Two independently parameterized contextual encoders — one for the
/// question, one for the passage. No weights are shared between them.
#[derive(Module, Debug)]
pub struct SentenceEncoding<B: Backend> {
    question_encoder: Rnn<B>,
    passage_encoder: Rnn<B>,
}

impl<B: Backend> SentenceEncoding<B> {
    pub fn forward(
        &self,
        question: &PackedSequence<B>,
        passage: &PackedSequence<B>,
    ) -> (PackedSequence<B>, PackedSequence<B>) {
        (
            self.question_encoder.forward(question),
            self.passage_encoder.forward(passage),
        )
    }
}

// ─── AttentionEncoder ─────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct AttentionEncoderConfig {
    pub hidden_size: usize,
    #[config(default = 1)]
    pub num_layers: usize,
    #[config(default = true)]
    pub bidirectional: bool,
    #[config(default = 0.0)]
    pub dropout: f64,
    /// Residual additions between stacked layers of equal width.
    #[config(default = false)]
    pub residual: bool,
    /// Sigmoid gate over the input‖summary combination.
    #[config(default = true)]
    pub gated: bool,
    #[config(default = 75)]
    pub attn_size: usize,
    #[config(default = "CellType::Gru")]
    pub cell: CellType,
}

impl AttentionEncoderConfig {
    pub fn output_size(&self) -> usize {
        self.hidden_size * if self.bidirectional { 2 } else { 1 }
    }

    pub fn init<B: Backend>(
        &self,
        mode: AttentionMode,
        input_size: usize,
        key_size: usize,
        device: &B::Device,
    ) -> AttentionEncoder<B> {
        assert!(self.num_layers >= 1, "attention encoder needs at least one layer");
        assert!(self.hidden_size > 0, "attention encoder hidden size must be positive");

        let layers = (0..self.num_layers)
            .map(|layer| {
                let layer_input = if layer == 0 {
                    input_size
                } else {
                    self.output_size()
                };
                AttentionEncoderLayer {
                    forward: self.build_cell(mode.clone(), layer_input, key_size, device),
                    backward: self
                        .bidirectional
                        .then(|| self.build_cell(mode.clone(), layer_input, key_size, device)),
                }
            })
            .collect();

        AttentionEncoder {
            layers,
            dropout: DropoutConfig::new(self.dropout).init(),
            residual: self.residual,
        }
    }

    fn build_cell<B: Backend>(
        &self,
        mode: AttentionMode,
        input_size: usize,
        key_size: usize,
        device: &B::Device,
    ) -> AttentionEncoderCell<B> {
        let combined_size = input_size + key_size;
        let attention = AttentionPoolingConfig::new(
            key_size,
            mode.query_size(input_size, self.hidden_size),
        )
        .with_attn_size(self.attn_size)
        .init(device);

        AttentionEncoderCell {
            attention,
            gate: self
                .gated
                .then(|| OrthogonalPolicy::default().linear(combined_size, combined_size, false, device)),
            cell: self.cell.build(combined_size, self.hidden_size, device),
            mode: Ignored(mode),
        }
    }
}

/// One direction of one attention-encoder layer: attention pooling,
/// optional gate, recurrent cell.
#[derive(Module, Debug)]
pub struct AttentionEncoderCell<B: Backend> {
    attention: AttentionPooling<B>,
    gate: Option<Linear<B>>,
    cell: RnnCell<B>,
    mode: Ignored<AttentionMode>,
}

impl<B: Backend> AttentionEncoderCell<B> {
    /// One time step: pool keys under the composed query, combine with
    /// the input, gate, and update the recurrent state.
    fn step(
        &self,
        input: Tensor<B, 2>,
        keys: &Tensor<B, 3>,
        key_mask: &Tensor<B, 2>,
        state: CellState<B>,
    ) -> CellState<B> {
        let query = self.mode.0.compose_query(&input, &state.hidden);
        let (summary, _) = self.attention.forward(keys.clone(), query, Some(key_mask));

        let mut combined = Tensor::cat(vec![input, summary], 1);
        if let Some(gate) = &self.gate {
            combined = sigmoid(gate.forward(combined.clone())) * combined;
        }

        self.cell.step(combined, state)
    }

    /// Scan a whole sequence in one direction, masked by `step_mask`.
    fn scan(
        &self,
        sequence: &Tensor<B, 3>,
        keys: &Tensor<B, 3>,
        key_mask: &Tensor<B, 2>,
        step_mask: &Tensor<B, 2>,
        reverse: bool,
    ) -> Tensor<B, 3> {
        let [batch, steps, features] = sequence.dims();
        let device = sequence.device();

        let mut state = self.cell.init_state(batch, &device);
        let mut outputs: Vec<Tensor<B, 2>> = Vec::with_capacity(steps);

        let order: Vec<usize> = if reverse {
            (0..steps).rev().collect()
        } else {
            (0..steps).collect()
        };

        for t in order {
            let input = sequence
                .clone()
                .slice([0..batch, t..t + 1, 0..features])
                .reshape([batch, features]);
            let mask_t = step_mask.clone().slice([0..batch, t..t + 1]);

            let next = self.step(input, keys, key_mask, state.clone());
            state = CellState::blend(&state, next, &mask_t);
            outputs.push(state.hidden.clone() * mask_t);
        }

        if reverse {
            outputs.reverse();
        }
        Tensor::stack::<3>(outputs, 1)
    }
}

#[derive(Module, Debug)]
struct AttentionEncoderLayer<B: Backend> {
    forward: AttentionEncoderCell<B>,
    backward: Option<AttentionEncoderCell<B>>,
}

/// Attention-augmented recurrent encoder over a packed passage.
#[derive(Module, Debug)]
pub struct AttentionEncoder<B: Backend> {
    layers: Vec<AttentionEncoderLayer<B>>,
    dropout: Dropout,
    residual: bool,
}

impl<B: Backend> AttentionEncoder<B> {
    /// Encode `input` while attending to `keys` at every step.
    ///
    /// `keys` and `key_mask` must be aligned with `input`'s batch order.
    ///
    /// # Panics
    /// Panics when the key batch does not line up with the input batch.
    pub fn forward(
        &self,
        input: &PackedSequence<B>,
        keys: Tensor<B, 3>,
        key_mask: &Tensor<B, 2>,
    ) -> PackedSequence<B> {
        let batch = input.batch_size();
        assert_eq!(
            batch,
            keys.dims()[0],
            "attention keys have batch {} but the input batch is {batch}",
            keys.dims()[0],
        );

        let step_mask = input.step_mask();
        let mut sequence = input.tensor.clone();

        for (index, layer) in self.layers.iter().enumerate() {
            if index > 0 {
                sequence = self.dropout.forward(sequence);
            }
            let layer_input = sequence.clone();

            let forward_states =
                layer
                    .forward
                    .scan(&sequence, &keys, key_mask, &step_mask, false);
            sequence = match &layer.backward {
                Some(backward) => Tensor::cat(
                    vec![
                        forward_states,
                        backward.scan(&sequence, &keys, key_mask, &step_mask, true),
                    ],
                    2,
                ),
                None => forward_states,
            };

            // Equal-width layers can skip; the first layer usually
            // changes width and is left alone.
            if self.residual && index > 0 {
                sequence = sequence + layer_input;
            }
        }

        PackedSequence::new(sequence, input.lengths.clone())
    }
}

// ─── PairEncoder ──────────────────────────────────────────────────────────────

/// Question-aware passage encoder: every passage step attends to the
/// question states.
#[derive(Module, Debug)]
pub struct PairEncoder<B: Backend> {
    encoder: AttentionEncoder<B>,
}

impl<B: Backend> PairEncoder<B> {
    pub fn new(
        config: &AttentionEncoderConfig,
        passage_size: usize,
        question_size: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            encoder: config.init(AttentionMode::PairEncoding, passage_size, question_size, device),
        }
    }

    /// `question` and `question_mask` must already be permuted into the
    /// passage's sorted batch order.
    pub fn forward(
        &self,
        passage: &PackedSequence<B>,
        question: Tensor<B, 3>,
        question_mask: &Tensor<B, 2>,
    ) -> PackedSequence<B> {
        self.encoder.forward(passage, question, question_mask)
    }
}

// ─── SelfMatchingEncoder ──────────────────────────────────────────────────────

/// Passage-to-passage encoder: each step attends over the entire
/// passage representation to pick up long-distance evidence.
#[derive(Module, Debug)]
pub struct SelfMatchingEncoder<B: Backend> {
    encoder: AttentionEncoder<B>,
}

impl<B: Backend> SelfMatchingEncoder<B> {
    pub fn new(
        config: &AttentionEncoderConfig,
        passage_size: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            encoder: config.init(AttentionMode::SelfMatching, passage_size, passage_size, device),
        }
    }

    pub fn forward(
        &self,
        passage: &PackedSequence<B>,
        passage_mask: &Tensor<B, 2>,
    ) -> PackedSequence<B> {
        // The key sequence is the passage itself
        self.encoder
            .forward(passage, passage.tensor.clone(), passage_mask)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::documents::BatchOrder;

    type TB = burn::backend::NdArray;

    fn device() -> <TB as Backend>::Device {
        Default::default()
    }

    fn random(shape: [usize; 3]) -> Tensor<TB, 3> {
        Tensor::random(shape, burn::tensor::Distribution::Normal(0.0, 1.0), &device())
    }

    fn packed(shape: [usize; 3], lengths: &[usize]) -> PackedSequence<TB> {
        let order = BatchOrder::from_lengths(lengths);
        PackedSequence::pack(random(shape), &order, lengths)
    }

    #[test]
    fn test_sentence_encoding_shapes() {
        let config = SentenceEncodingConfig::new(4);
        let encoding = config.init::<TB>(6, &device());

        let question = packed([2, 3, 6], &[3, 2]);
        let passage = packed([2, 7, 6], &[7, 5]);
        let (q, p) = encoding.forward(&question, &passage);

        assert_eq!(q.tensor.dims(), [2, 3, 8]);
        assert_eq!(p.tensor.dims(), [2, 7, 8]);
        assert_eq!(config.output_size(), 8);
    }

    #[test]
    fn test_pair_encoder_shapes() {
        let config = AttentionEncoderConfig::new(5).with_attn_size(8);
        let encoder = PairEncoder::new(&config, 6, 4, &device());

        let passage = packed([2, 7, 6], &[7, 4]);
        let question = random([2, 3, 4]);
        let question_mask = crate::ml::sequence::length_mask::<TB>(&[3, 2], 3, &device());

        let out = encoder.forward(&passage, question, &question_mask);
        assert_eq!(out.tensor.dims(), [2, 7, 10]);
        assert_eq!(out.lengths, vec![7, 4]);
    }

    #[test]
    fn test_self_matching_shapes() {
        let config = AttentionEncoderConfig::new(5)
            .with_attn_size(8)
            .with_bidirectional(false);
        let encoder = SelfMatchingEncoder::new(&config, 6, &device());

        let passage = packed([2, 4, 6], &[4, 2]);
        let mask = passage.step_mask();

        let out = encoder.forward(&passage, &mask);
        assert_eq!(out.tensor.dims(), [2, 4, 5]);
    }

    #[test]
    fn test_gate_disabled_equals_direct_cell_input() {
        // With the gate off, a step must equal: pool keys, concatenate,
        // feed the cell directly.
        let config = AttentionEncoderConfig::new(5)
            .with_attn_size(8)
            .with_gated(false)
            .with_bidirectional(false);
        let encoder = config.init::<TB>(AttentionMode::PairEncoding, 6, 4, &device());
        let cell = &encoder.layers[0].forward;
        assert!(cell.gate.is_none());

        let input = random([3, 1, 6]).reshape([3, 6]);
        let keys = random([3, 4, 4]);
        let key_mask = Tensor::<TB, 2>::ones([3, 4], &device());
        let state = cell.cell.init_state(3, &device());

        let stepped = cell.step(input.clone(), &keys, &key_mask, state.clone());

        let query = AttentionMode::PairEncoding.compose_query(&input, &state.hidden);
        let (summary, _) = cell.attention.forward(keys.clone(), query, Some(&key_mask));
        let combined = Tensor::cat(vec![input, summary], 1);
        let expected = cell.cell.step(combined, state);

        let got = stepped.hidden.into_data().to_vec::<f32>().unwrap();
        let want = expected.hidden.into_data().to_vec::<f32>().unwrap();
        for (g, w) in got.iter().zip(&want) {
            assert!((g - w).abs() < 1e-6, "gate-off step diverged: {g} vs {w}");
        }
    }

    #[test]
    #[should_panic]
    fn test_encoder_rejects_misaligned_keys() {
        let config = AttentionEncoderConfig::new(5).with_attn_size(8);
        let encoder = config.init::<TB>(AttentionMode::PairEncoding, 6, 4, &device());

        let passage = packed([2, 4, 6], &[4, 2]);
        // Key batch of three cannot align with a passage batch of two
        let keys = random([3, 3, 4]);
        let key_mask = Tensor::<TB, 2>::ones([3, 3], &device());
        let _ = encoder.forward(&passage, keys, &key_mask);
    }
}
