// ============================================================
// Layer 4 — Document Batcher
// ============================================================
// Turns ragged id sequences into the padded tensors the model
// consumes: token ids, validity masks, true lengths, and the
// descending-length batch order — all built on the target
// device in one place so they cannot drift apart.
//
// How batching works here:
//   Input:  N id sequences of varying length
//   Output: Documents with tensors of shape [N, max_len]
//
//   Sequences are right-padded with the reserved padding id (0),
//   the mask marks real positions with 1.0, and the stored
//   BatchOrder records how to sort the batch for packing.

use burn::prelude::*;

use crate::data::documents::{CharDocuments, Documents};

/// Reserved id that embeds to the zero vector.
pub const PADDING_ID: u32 = 0;

/// Builds `Documents` / `CharDocuments` on a fixed device.
#[derive(Clone, Debug)]
pub struct DocumentBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> DocumentBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Pad a batch of token id sequences into `Documents`.
    ///
    /// # Panics
    /// Panics on an empty batch or an empty sequence — a batch with
    /// nothing to encode is a caller bug, not a recoverable state.
    pub fn documents(&self, sequences: &[Vec<u32>]) -> Documents<B> {
        assert!(!sequences.is_empty(), "cannot batch zero documents");
        assert!(
            sequences.iter().all(|s| !s.is_empty()),
            "every document needs at least one token",
        );

        let batch = sequences.len();
        let lengths: Vec<usize> = sequences.iter().map(Vec::len).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(1);

        let mut token_flat = vec![PADDING_ID as i32; batch * max_len];
        let mut mask_flat = vec![0.0f32; batch * max_len];
        for (row, sequence) in sequences.iter().enumerate() {
            for (pos, &token) in sequence.iter().enumerate() {
                token_flat[row * max_len + pos] = token as i32;
                mask_flat[row * max_len + pos] = 1.0;
            }
        }

        let tokens = Tensor::<B, 1, Int>::from_ints(token_flat.as_slice(), &self.device)
            .reshape([batch, max_len]);
        let mask = Tensor::<B, 1>::from_floats(mask_flat.as_slice(), &self.device)
            .reshape([batch, max_len]);

        Documents::new(tokens, lengths, mask)
    }

    /// Pad per-word character ids into `CharDocuments`.
    ///
    /// The word axis is padded to the longest document in the batch
    /// (matching the parent `Documents`); the character axis is padded
    /// to the longest word, but never below `min_char_len` so every
    /// configured convolution width fits.
    pub fn char_documents(
        &self,
        documents: &[Vec<Vec<u32>>],
        min_char_len: usize,
    ) -> CharDocuments<B> {
        assert!(!documents.is_empty(), "cannot batch zero char documents");

        let batch = documents.len();
        let max_words = documents.iter().map(Vec::len).max().unwrap_or(1).max(1);
        let max_chars = documents
            .iter()
            .flat_map(|doc| doc.iter().map(Vec::len))
            .max()
            .unwrap_or(1)
            .max(min_char_len)
            .max(1);

        let mut flat = vec![PADDING_ID as i32; batch * max_words * max_chars];
        for (row, document) in documents.iter().enumerate() {
            for (word, chars) in document.iter().enumerate() {
                for (pos, &ch) in chars.iter().enumerate() {
                    flat[(row * max_words + word) * max_chars + pos] = ch as i32;
                }
            }
        }

        let chars = Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device)
            .reshape([batch, max_words, max_chars]);
        // Padding chars are already the zero id; no extra mask needed
        CharDocuments::new(chars, None)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TB = burn::backend::NdArray;

    fn batcher() -> DocumentBatcher<TB> {
        DocumentBatcher::new(Default::default())
    }

    #[test]
    fn test_documents_pad_and_mask() {
        let docs = batcher().documents(&[vec![5, 6, 7], vec![8]]);

        assert_eq!(docs.batch_size(), 2);
        assert_eq!(docs.max_len(), 3);
        assert_eq!(docs.lengths, vec![3, 1]);

        let tokens = docs.tokens.clone().into_data().to_vec::<i64>().unwrap();
        assert_eq!(tokens, vec![5, 6, 7, 8, 0, 0]);

        let mask = docs.mask.clone().into_data().to_vec::<f32>().unwrap();
        assert_eq!(mask, vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_documents_order_sorts_by_length() {
        let docs = batcher().documents(&[vec![1], vec![2, 3, 4], vec![5, 6]]);
        assert_eq!(docs.sorted_lengths(), vec![3, 2, 1]);
    }

    #[test]
    fn test_char_documents_pad_to_min_width() {
        let chars = batcher().char_documents(&[vec![vec![1, 2], vec![3]]], 5);
        // One doc, two words, char axis padded up to the minimum of 5
        assert_eq!(chars.chars.dims(), [1, 2, 5]);

        let flat = chars.chars.into_data().to_vec::<i64>().unwrap();
        assert_eq!(flat, vec![1, 2, 0, 0, 0, 3, 0, 0, 0, 0]);
    }

    #[test]
    #[should_panic]
    fn test_empty_batch_is_rejected() {
        let _ = batcher().documents(&[]);
    }

    #[test]
    #[should_panic]
    fn test_empty_document_is_rejected() {
        let _ = batcher().documents(&[vec![1], vec![]]);
    }
}
