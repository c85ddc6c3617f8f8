// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The model core depends on collaborators only through these
// traits, so the concrete providers can be swapped without
// touching the encoder stack:
//   - EmbeddingTable (infra) implements EmbeddingSource from
//     GloVe-style text files
//   - a test double can implement it from a handful of
//     hard-coded vectors

/// A provider of pretrained word vectors and their vocabulary.
///
/// Ids 0 and 1 are reserved by convention (padding and unknown);
/// implementations must hand out word ids starting at 2.
pub trait EmbeddingSource {
    /// Dimensionality of each word vector.
    fn dim(&self) -> usize;

    /// Total vocabulary size, including reserved ids.
    fn vocab_size(&self) -> usize;

    /// Id for a word, if it is in the vocabulary.
    fn id_of(&self, word: &str) -> Option<usize>;

    /// Id for a word, falling back to the unknown id.
    fn id_or_unknown(&self, word: &str) -> usize;
}
