// ============================================================
// Layer 5 — R-NET Model
// ============================================================
// RNet chains the encoder stack over packed sequences:
//
//   pack → sentence-encode → reorder question into the
//   passage's sorted order → pair-encode [+ residual] →
//   self-match [+ residual] → pointer → restore caller order
//
// Question and passage are sorted independently (each by its own
// lengths), so before pairing, the question states and mask are
// restored to the caller's order and re-sorted by the passage's
// permutation. Every reorder is applied to tensor and mask
// together; a tensor reordered without its mask would silently
// attend to padding.
//
// RNetQaModel is the composition root on top: word + char
// embedding concat, device placement at the boundary, then RNet.

use burn::prelude::*;

use crate::data::documents::{CharDocuments, Documents};
use crate::ml::embedding::{
    CharCnnConfig, CharLevelWordEmbeddingCnn, WordEmbedding, WordEmbeddingConfig,
};
use crate::ml::encoder::{
    AttentionEncoderConfig, PairEncoder, SelfMatchingEncoder, SentenceEncoding,
    SentenceEncodingConfig,
};
use crate::ml::pointer::{PointerNetwork, PointerNetworkConfig};
use crate::ml::sequence::{pack_residual, PackedSequence};

// ─── RNet ─────────────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct RNetConfig {
    pub sentence_encoding: SentenceEncodingConfig,
    pub pair_encoding: AttentionEncoderConfig,
    pub self_matching: AttentionEncoderConfig,
    pub pointer: PointerNetworkConfig,
    /// Additive skip connections around the pair and self-matching
    /// encoders.
    #[config(default = false)]
    pub residual: bool,
}

impl RNetConfig {
    /// # Panics
    /// Panics when `residual` is requested but the stage output widths
    /// cannot be added together.
    pub fn init<B: Backend>(&self, embedding_size: usize, device: &B::Device) -> RNet<B> {
        let sentence_size = self.sentence_encoding.output_size();
        let paired_size = self.pair_encoding.output_size();
        let matched_size = self.self_matching.output_size();

        if self.residual {
            assert_eq!(
                sentence_size, paired_size,
                "residual around the pair encoder needs matching widths \
                 (sentence encoding {sentence_size}, pair encoding {paired_size})",
            );
            assert_eq!(
                paired_size, matched_size,
                "residual around the self-matching encoder needs matching widths \
                 (pair encoding {paired_size}, self-matching {matched_size})",
            );
        }

        RNet {
            sentence_encoding: self.sentence_encoding.init(embedding_size, device),
            pair_encoder: PairEncoder::new(
                &self.pair_encoding,
                sentence_size,
                sentence_size,
                device,
            ),
            self_matching_encoder: SelfMatchingEncoder::new(
                &self.self_matching,
                paired_size,
                device,
            ),
            pointer: self.pointer.init(sentence_size, matched_size, device),
            residual: self.residual,
        }
    }
}

/// The attention-driven encoder stack from embeddings to span logits.
#[derive(Module, Debug)]
pub struct RNet<B: Backend> {
    sentence_encoding: SentenceEncoding<B>,
    pair_encoder: PairEncoder<B>,
    self_matching_encoder: SelfMatchingEncoder<B>,
    pointer: PointerNetwork<B>,
    residual: bool,
}

impl<B: Backend> RNet<B> {
    /// Run the full stack. `embedded_question` / `embedded_passage`
    /// are [batch, len, embedding] in the caller's batch order; the
    /// returned begin/end logits are [batch, passage_len], restored to
    /// that same order.
    pub fn forward(
        &self,
        question: &Documents<B>,
        passage: &Documents<B>,
        embedded_question: Tensor<B, 3>,
        embedded_passage: Tensor<B, 3>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        // Contextual encoding over length-sorted packs
        let question_pack = PackedSequence::pack(
            embedded_question,
            &question.order,
            &question.lengths,
        );
        let passage_pack =
            PackedSequence::pack(embedded_passage, &passage.order, &passage.lengths);
        let (question_encoded, passage_encoded) =
            self.sentence_encoding.forward(&question_pack, &passage_pack);

        // The question pack is sorted by question lengths; pairing
        // happens row-by-row against the passage, so bring the question
        // states and mask into the passage's sorted order.
        let question_in_passage_order = passage.to_sorted_order(
            question.restore_original_order(question_encoded.tensor.clone(), 0),
            0,
        );
        let question_mask_in_passage_order = passage.to_sorted_order(question.mask.clone(), 0);
        let passage_mask_sorted = passage.sorted_mask();

        let mut paired = self.pair_encoder.forward(
            &passage_encoded,
            question_in_passage_order.clone(),
            &question_mask_in_passage_order,
        );
        if self.residual {
            paired = pack_residual(&paired, &passage_encoded);
        }

        let mut matched = self
            .self_matching_encoder
            .forward(&paired, &passage_mask_sorted);
        if self.residual {
            matched = pack_residual(&paired, &matched);
        }

        let (begin, end) = self.pointer.forward(
            question_in_passage_order,
            &question_mask_in_passage_order,
            matched.tensor,
            &passage_mask_sorted,
        );

        // Hand the spans back in the order the caller gave us
        (
            passage.restore_original_order(begin, 0),
            passage.restore_original_order(end, 0),
        )
    }
}

// ─── RNetQaModel ──────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct RNetQaModelConfig {
    pub word_embedding: WordEmbeddingConfig,
    pub char_embedding: CharCnnConfig,
    pub rnet: RNetConfig,
}

impl RNetQaModelConfig {
    /// Build the full model around a pretrained [vocab, dim] word
    /// matrix. All sub-components land on `device`.
    pub fn init<B: Backend>(
        &self,
        word_vectors: Tensor<B, 2>,
        device: &B::Device,
    ) -> RNetQaModel<B> {
        let word_embedding = self.word_embedding.init(word_vectors, device);
        let char_embedding = self.char_embedding.init(device);

        // Word and char vectors are concatenated per token
        let embedding_size = word_embedding.output_dim() + char_embedding.output_dim();
        tracing::debug!(
            "r-net init: word {} + char {} = {embedding_size} embedding features",
            word_embedding.output_dim(),
            char_embedding.output_dim(),
        );

        RNetQaModel {
            word_embedding,
            char_embedding,
            r_net: self.rnet.init(embedding_size, device),
        }
    }
}

/// Raw span scores over passage positions, in the caller's batch
/// order. Not normalized — softmax belongs to the loss/decoding layer.
pub struct SpanLogits<B: Backend> {
    pub begin: Tensor<B, 2>,
    pub end: Tensor<B, 2>,
}

/// Composition root: embeds, places tensors on the compute device,
/// and delegates to the encoder stack.
#[derive(Module, Debug)]
pub struct RNetQaModel<B: Backend> {
    word_embedding: WordEmbedding<B>,
    char_embedding: CharLevelWordEmbeddingCnn<B>,
    r_net: RNet<B>,
}

impl<B: Backend> RNetQaModel<B> {
    /// The device this model's parameters live on; inputs are moved
    /// here uniformly before any of them interact.
    pub fn device(&self) -> B::Device {
        self.word_embedding.device()
    }

    pub fn forward(
        &self,
        question: &Documents<B>,
        question_chars: &CharDocuments<B>,
        passage: &Documents<B>,
        passage_chars: &CharDocuments<B>,
    ) -> SpanLogits<B> {
        let device = self.device();
        let question = question.to_device(&device);
        let passage = passage.to_device(&device);
        let question_chars = question_chars.to_device(&device);
        let passage_chars = passage_chars.to_device(&device);

        let embedded = self
            .word_embedding
            .forward_all(&[question.tokens.clone(), passage.tokens.clone()]);
        let embedded_question_chars = self
            .char_embedding
            .forward(question_chars.chars.clone(), question_chars.mask.as_ref());
        let embedded_passage_chars = self
            .char_embedding
            .forward(passage_chars.chars.clone(), passage_chars.mask.as_ref());

        let embedded_question =
            Tensor::cat(vec![embedded[0].clone(), embedded_question_chars], 2);
        let embedded_passage =
            Tensor::cat(vec![embedded[1].clone(), embedded_passage_chars], 2);

        let (begin, end) =
            self.r_net
                .forward(&question, &passage, embedded_question, embedded_passage);
        SpanLogits { begin, end }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::DocumentBatcher;

    type TB = burn::backend::NdArray;

    fn device() -> <TB as Backend>::Device {
        Default::default()
    }

    fn rnet_config(hidden: usize) -> RNetConfig {
        RNetConfig::new(
            SentenceEncodingConfig::new(hidden),
            AttentionEncoderConfig::new(hidden).with_gated(false),
            AttentionEncoderConfig::new(hidden).with_gated(false),
            PointerNetworkConfig::new(),
        )
    }

    fn random(shape: [usize; 3]) -> Tensor<TB, 3> {
        Tensor::random(shape, burn::tensor::Distribution::Normal(0.0, 1.0), &device())
    }

    fn token_documents(lengths: &[usize], max_len: usize) -> Documents<TB> {
        let batcher = DocumentBatcher::<TB>::new(device());
        let sequences: Vec<Vec<u32>> = lengths
            .iter()
            .map(|&len| (0..len as u32).map(|t| t % 5 + 2).collect())
            .collect();
        let docs = batcher.documents(&sequences);
        assert_eq!(docs.max_len(), max_len);
        docs
    }

    #[test]
    fn test_rnet_end_to_end_shapes_and_masking() {
        // Batch of 2: question lengths [4, 3], passage lengths [10, 7],
        // hidden 16, bidirectional, one layer, no residual, no gating.
        let question = token_documents(&[4, 3], 4);
        let passage = token_documents(&[10, 7], 10);

        let rnet = rnet_config(16).init::<TB>(12, &device());
        let (begin, end) = rnet.forward(
            &question,
            &passage,
            random([2, 4, 12]),
            random([2, 10, 12]),
        );

        assert_eq!(begin.dims(), [2, 10]);
        assert_eq!(end.dims(), [2, 10]);

        let begin = begin.into_data().to_vec::<f32>().unwrap();
        let end = end.into_data().to_vec::<f32>().unwrap();
        for logits in [&begin, &end] {
            assert!(logits.iter().all(|v| v.is_finite()), "logits must be finite");
            // Row 0 is fully valid
            assert!(logits[0..10].iter().all(|&v| v > -1.0e8));
            // Row 1 is valid up to length 7; padding is excluded
            assert!(logits[10..17].iter().all(|&v| v > -1.0e8));
            assert!(logits[17..20].iter().all(|&v| v < -1.0e8));
        }
    }

    #[test]
    fn test_rnet_restores_caller_batch_order() {
        // Ascending lengths force a non-identity sort permutation on
        // both sides, and the two sides sort differently.
        let question = token_documents(&[3, 4], 4);
        let passage = token_documents(&[7, 10], 10);

        let rnet = rnet_config(8).init::<TB>(6, &device());
        let (begin, _) = rnet.forward(
            &question,
            &passage,
            random([2, 4, 6]),
            random([2, 10, 6]),
        );

        let begin = begin.into_data().to_vec::<f32>().unwrap();
        // Row 0 must still be the length-7 example: padding masked
        assert!(begin[0..7].iter().all(|&v| v > -1.0e8));
        assert!(begin[7..10].iter().all(|&v| v < -1.0e8));
        // Row 1 is the full-length example: nothing masked
        assert!(begin[10..20].iter().all(|&v| v > -1.0e8));
    }

    #[test]
    fn test_rnet_residual_stack() {
        // Residual needs equal widths across stages: 16*2 everywhere
        let config = RNetConfig::new(
            SentenceEncodingConfig::new(16),
            AttentionEncoderConfig::new(16),
            AttentionEncoderConfig::new(16),
            PointerNetworkConfig::new(),
        )
        .with_residual(true);

        let question = token_documents(&[5, 2], 5);
        let passage = token_documents(&[6, 4], 6);

        let rnet = config.init::<TB>(8, &device());
        let (begin, end) = rnet.forward(
            &question,
            &passage,
            random([2, 5, 8]),
            random([2, 6, 8]),
        );

        assert_eq!(begin.dims(), [2, 6]);
        assert!(end
            .into_data()
            .to_vec::<f32>()
            .unwrap()
            .iter()
            .all(|v| v.is_finite()));
    }

    #[test]
    #[should_panic]
    fn test_residual_width_mismatch_is_rejected_at_construction() {
        let config = RNetConfig::new(
            SentenceEncodingConfig::new(16),
            // 8*2 = 16 output cannot be added to the 32-wide sentence encoding
            AttentionEncoderConfig::new(8),
            AttentionEncoderConfig::new(8),
            PointerNetworkConfig::new(),
        )
        .with_residual(true);
        let _ = config.init::<TB>(8, &device());
    }

    #[test]
    fn test_full_model_with_char_embeddings() {
        let word_vectors = Tensor::<TB, 2>::random(
            [30, 12],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device(),
        );
        let config = RNetQaModelConfig::new(
            WordEmbeddingConfig::new(),
            CharCnnConfig::new(20, 8, 6).with_filter_widths(vec![2, 3]),
            rnet_config(8),
        );
        let model = config.init(word_vectors, &device());

        let batcher = DocumentBatcher::<TB>::new(device());
        let question = batcher.documents(&[vec![2, 3, 4], vec![5, 6]]);
        let passage = batcher.documents(&[vec![2, 3, 4, 5, 6, 7], vec![8, 9, 10, 11]]);
        let question_chars = batcher.char_documents(
            &[
                vec![vec![1, 2], vec![3], vec![4, 5, 6]],
                vec![vec![7], vec![8, 9]],
            ],
            3,
        );
        let passage_chars = batcher.char_documents(
            &[
                (0..6).map(|_| vec![1, 2, 3]).collect(),
                (0..4).map(|_| vec![4, 5]).collect(),
            ],
            3,
        );

        let logits = model.forward(&question, &question_chars, &passage, &passage_chars);

        assert_eq!(logits.begin.dims(), [2, 6]);
        assert_eq!(logits.end.dims(), [2, 6]);
        let values = logits.begin.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }
}
