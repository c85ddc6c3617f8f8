// ============================================================
// Layer 5 — Word and Character Embeddings
// ============================================================
// Two embedding paths that get concatenated per token:
//   1. WordEmbedding — a shared lookup table seeded from
//      pretrained vectors (GloVe), optionally fine-tuned.
//   2. CharLevelWordEmbeddingCnn — per-word character
//      convolutions, max-pooled into one fixed vector per word.
//
// Reference: Kim (2014) Convolutional Neural Networks for
//            Sentence Classification (char-CNN pooling)

use burn::{
    module::{Ignored, Param},
    nn::{
        conv::{Conv1d, Conv1dConfig},
        Embedding, EmbeddingConfig, Linear,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::ml::init::OrthogonalPolicy;

// ─── WordEmbedding ────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct WordEmbeddingConfig {
    /// Token id reserved for padding; always embeds to the zero vector.
    #[config(default = 0)]
    pub padding_idx: usize,
    /// Whether the pretrained table receives gradient updates.
    #[config(default = false)]
    pub trainable: bool,
}

impl WordEmbeddingConfig {
    /// Build the lookup table from a pretrained [vocab, dim] matrix.
    /// The padding row is zeroed regardless of what the matrix holds.
    pub fn init<B: Backend>(
        &self,
        weights: Tensor<B, 2>,
        device: &B::Device,
    ) -> WordEmbedding<B> {
        let [vocab_size, dim] = weights.dims();
        assert!(
            self.padding_idx < vocab_size,
            "padding index {} is outside the vocabulary of {vocab_size}",
            self.padding_idx,
        );

        let zero_row = Tensor::zeros([1, dim], device);
        let weights = weights.slice_assign(
            [self.padding_idx..self.padding_idx + 1, 0..dim],
            zero_row,
        );

        let mut table = EmbeddingConfig::new(vocab_size, dim).init(device);
        table.weight = Param::from_tensor(weights);

        let embedding = WordEmbedding {
            table,
            padding_idx: self.padding_idx,
            output_dim: dim,
        };
        if self.trainable {
            embedding
        } else {
            embedding.no_grad()
        }
    }
}

/// Shared word-level lookup table for questions and passages.
#[derive(Module, Debug)]
pub struct WordEmbedding<B: Backend> {
    table: Embedding<B>,
    padding_idx: usize,
    output_dim: usize,
}

impl<B: Backend> WordEmbedding<B> {
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn device(&self) -> B::Device {
        self.table.weight.val().device()
    }

    /// Embed one batch of token ids — [batch, len] -> [batch, len, dim].
    /// Padding positions come out as exact zero vectors, so no gradient
    /// reaches the padding row through them.
    pub fn forward(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch, len] = tokens.dims();
        let valid = tokens
            .clone()
            .not_equal_elem(self.padding_idx as i32)
            .float()
            .reshape([batch, len, 1]);
        self.table.forward(tokens) * valid
    }

    /// Embed several batches through the same table, one output per
    /// input (question and passage share these weights).
    pub fn forward_all(&self, inputs: &[Tensor<B, 2, Int>]) -> Vec<Tensor<B, 3>> {
        inputs.iter().map(|t| self.forward(t.clone())).collect()
    }
}

// ─── CharLevelWordEmbeddingCnn ────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct CharCnnConfig {
    pub char_vocab_size: usize,
    pub char_embedding_size: usize,
    /// Feature maps per filter width.
    pub num_filters: usize,
    /// Convolution widths over the character axis.
    #[config(default = "vec![5]")]
    pub filter_widths: Vec<usize>,
    /// Optional projection of the concatenated pools; when `None` the
    /// output dimension is `num_filters * filter_widths.len()`.
    pub output_dim: Option<usize>,
    #[config(default = 0)]
    pub padding_idx: usize,
}

impl CharCnnConfig {
    /// Output feature size per word.
    pub fn output_dim(&self) -> usize {
        self.output_dim
            .unwrap_or(self.num_filters * self.filter_widths.len())
    }

    /// # Panics
    /// Panics on an inconsistent configuration: no filter widths, a
    /// zero width, zero filters, or a zero projection size.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CharLevelWordEmbeddingCnn<B> {
        assert!(
            !self.filter_widths.is_empty(),
            "char cnn needs at least one filter width",
        );
        assert!(
            self.filter_widths.iter().all(|&w| w >= 1),
            "char cnn filter widths must be >= 1, got {:?}",
            self.filter_widths,
        );
        assert!(self.num_filters > 0, "char cnn needs at least one filter");
        assert!(
            self.padding_idx < self.char_vocab_size,
            "char padding index {} is outside the vocabulary of {}",
            self.padding_idx,
            self.char_vocab_size,
        );
        if let Some(dim) = self.output_dim {
            assert!(dim > 0, "char cnn projection size must be positive");
        }

        let embed = EmbeddingConfig::new(self.char_vocab_size, self.char_embedding_size)
            .init(device);
        let convs = self
            .filter_widths
            .iter()
            .map(|&width| {
                Conv1dConfig::new(self.char_embedding_size, self.num_filters, width)
                    .init(device)
            })
            .collect();
        let project = self.output_dim.map(|dim| {
            OrthogonalPolicy::default().linear(
                self.num_filters * self.filter_widths.len(),
                dim,
                true,
                device,
            )
        });

        CharLevelWordEmbeddingCnn {
            embed,
            convs,
            widths: Ignored(self.filter_widths.clone()),
            project,
            output_dim: self.output_dim(),
        }
    }
}

/// Character-level word encoder: embed chars, convolve at each width,
/// max-pool over positions, concatenate, optionally project.
#[derive(Module, Debug)]
pub struct CharLevelWordEmbeddingCnn<B: Backend> {
    embed: Embedding<B>,
    convs: Vec<Conv1d<B>>,
    widths: Ignored<Vec<usize>>,
    project: Option<Linear<B>>,
    output_dim: usize,
}

impl<B: Backend> CharLevelWordEmbeddingCnn<B> {
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Encode [batch, word_count, char_count] ids into
    /// [batch, word_count, output_dim] word vectors.
    ///
    /// An optional mask zeroes excluded character positions (back to
    /// the padding id) before embedding; `None` means no masking.
    ///
    /// # Panics
    /// Panics if the character axis is shorter than the widest filter.
    pub fn forward(
        &self,
        chars: Tensor<B, 3, Int>,
        mask: Option<&Tensor<B, 3, Int>>,
    ) -> Tensor<B, 3> {
        let chars = match mask {
            Some(mask) => chars * mask.clone(),
            None => chars,
        };

        let [batch, word_count, char_count] = chars.dims();
        for &width in self.widths.0.iter() {
            assert!(
                char_count >= width,
                "char sequence length {char_count} is shorter than filter width {width}",
            );
        }

        // Fold words into the batch axis and put the embedding channel
        // first, as Conv1d expects: [batch*words, embed, chars]
        let embedded = self
            .embed
            .forward(chars.reshape([batch * word_count, char_count]))
            .swap_dims(1, 2);

        let mut pooled: Vec<Tensor<B, 2>> = self
            .convs
            .iter()
            .map(|conv| {
                let convolved = relu(conv.forward(embedded.clone()));
                let [rows, filters, _] = convolved.dims();
                convolved.max_dim(2).reshape([rows, filters])
            })
            .collect();

        // Single filter width: plain passthrough, nothing to concatenate
        let merged = if pooled.len() == 1 {
            pooled.remove(0)
        } else {
            Tensor::cat(pooled, 1)
        };

        let merged = match &self.project {
            Some(project) => project.forward(merged),
            None => merged,
        };

        merged.reshape([batch, word_count, self.output_dim])
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TB = burn::backend::NdArray;

    fn device() -> <TB as Backend>::Device {
        Default::default()
    }

    fn char_ids(batch: usize, words: usize, chars: usize) -> Tensor<TB, 3, Int> {
        let total = batch * words * chars;
        let flat: Vec<i32> = (0..total).map(|v| (v % 7 + 1) as i32).collect();
        Tensor::<TB, 1, Int>::from_ints(flat.as_slice(), &device())
            .reshape([batch, words, chars])
    }

    #[test]
    fn test_char_cnn_output_shape_inferred() {
        let cnn = CharCnnConfig::new(10, 8, 6)
            .with_filter_widths(vec![2, 3])
            .init::<TB>(&device());

        // Two widths x six filters = twelve features per word
        let out = cnn.forward(char_ids(2, 5, 9), None);
        assert_eq!(out.dims(), [2, 5, 12]);

        // Character count must not influence the output shape
        let out = cnn.forward(char_ids(2, 5, 4), None);
        assert_eq!(out.dims(), [2, 5, 12]);
    }

    #[test]
    fn test_char_cnn_output_shape_projected() {
        let cnn = CharCnnConfig::new(10, 8, 6)
            .with_filter_widths(vec![2, 3])
            .with_output_dim(Some(20))
            .init::<TB>(&device());

        let out = cnn.forward(char_ids(3, 4, 6), None);
        assert_eq!(out.dims(), [3, 4, 20]);
    }

    #[test]
    fn test_char_cnn_single_width_passthrough() {
        let cnn = CharCnnConfig::new(10, 8, 5)
            .with_filter_widths(vec![3])
            .init::<TB>(&device());

        let out = cnn.forward(char_ids(1, 2, 5), None);
        assert_eq!(out.dims(), [1, 2, 5]);
    }

    #[test]
    #[should_panic]
    fn test_char_cnn_rejects_short_char_axis() {
        let cnn = CharCnnConfig::new(10, 8, 4).init::<TB>(&device());
        // Default width is 5, but only 3 character positions given
        let _ = cnn.forward(char_ids(1, 2, 3), None);
    }

    #[test]
    #[should_panic]
    fn test_char_cnn_rejects_empty_widths() {
        let _ = CharCnnConfig::new(10, 8, 4)
            .with_filter_widths(Vec::new())
            .init::<TB>(&device());
    }

    #[test]
    fn test_word_embedding_zeroes_padding() {
        let weights = Tensor::<TB, 2>::ones([5, 3], &device());
        let embedding = WordEmbeddingConfig::new().init(weights, &device());

        let tokens = Tensor::<TB, 1, Int>::from_ints([0, 2], &device()).reshape([1, 2]);
        let out = embedding.forward(tokens).into_data().to_vec::<f32>().unwrap();

        // Token 0 is padding -> zero vector; token 2 keeps its row
        assert_eq!(&out[0..3], &[0.0, 0.0, 0.0]);
        assert_eq!(&out[3..6], &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_word_embedding_shared_across_inputs() {
        let weights = Tensor::<TB, 2>::random(
            [6, 4],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device(),
        );
        let embedding = WordEmbeddingConfig::new().init(weights, &device());

        let question = Tensor::<TB, 1, Int>::from_ints([1, 2], &device()).reshape([1, 2]);
        let passage = Tensor::<TB, 1, Int>::from_ints([2, 1], &device()).reshape([1, 2]);
        let embedded = embedding.forward_all(&[question, passage]);

        assert_eq!(embedded.len(), 2);
        let q = embedded[0].clone().into_data().to_vec::<f32>().unwrap();
        let p = embedded[1].clone().into_data().to_vec::<f32>().unwrap();
        // Same table: question token 2 equals passage token 2
        assert_eq!(&q[4..8], &p[0..4]);
    }
}
