// ============================================================
// Layer 4 — Batched Documents and Order Bookkeeping
// ============================================================
// A batch of variable-length token sequences, plus the
// permutation that links the caller's batch order to the
// descending-length order the recurrent encoders require.
//
// Why track a permutation at all?
//   Length-aware recurrent computation wants the batch sorted
//   by descending sequence length. The caller, however, hands
//   us examples in an arbitrary order and expects outputs in
//   that same order. Instead of scattering sort/unsort calls
//   through the pipeline, each batch carries one invertible
//   `BatchOrder` and every stage threads it explicitly.
//
// Invariant: `restore_original_order(to_sorted_order(x)) == x`
// for any tensor aligned to the batch dimension.

use burn::prelude::*;

// ─── BatchOrder ───────────────────────────────────────────────────────────────

/// An invertible permutation over the batch dimension.
///
/// `apply` maps a tensor from the caller's original order into
/// descending-length order; `restore` maps it back. Both sides of the
/// permutation are precomputed so either direction is a single `select`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOrder {
    /// sorted position -> original position
    sorted_to_original: Vec<i32>,
    /// original position -> sorted position
    original_to_sorted: Vec<i32>,
}

impl BatchOrder {
    /// Build the descending-length sort permutation for a batch.
    /// Ties keep their original relative order (stable sort).
    pub fn from_lengths(lengths: &[usize]) -> Self {
        let mut sorted: Vec<usize> = (0..lengths.len()).collect();
        sorted.sort_by(|&a, &b| lengths[b].cmp(&lengths[a]));

        let mut inverse = vec![0i32; lengths.len()];
        for (sorted_pos, &original_pos) in sorted.iter().enumerate() {
            inverse[original_pos] = sorted_pos as i32;
        }

        Self {
            sorted_to_original: sorted.into_iter().map(|i| i as i32).collect(),
            original_to_sorted: inverse,
        }
    }

    /// Number of examples in the batch this permutation describes.
    pub fn batch_size(&self) -> usize {
        self.sorted_to_original.len()
    }

    /// The inverse permutation (sorted order becomes "original" and
    /// vice versa). `order.invert().apply(..)` equals `order.restore(..)`.
    pub fn invert(&self) -> Self {
        Self {
            sorted_to_original: self.original_to_sorted.clone(),
            original_to_sorted: self.sorted_to_original.clone(),
        }
    }

    /// Reorder a float tensor from original order into sorted order
    /// along `dim`.
    pub fn apply<B: Backend, const D: usize>(
        &self,
        tensor: Tensor<B, D>,
        dim: usize,
    ) -> Tensor<B, D> {
        let indices = self.index_tensor::<B>(&self.sorted_to_original, &tensor.device());
        tensor.select(dim, indices)
    }

    /// Reorder a float tensor from sorted order back into original order.
    pub fn restore<B: Backend, const D: usize>(
        &self,
        tensor: Tensor<B, D>,
        dim: usize,
    ) -> Tensor<B, D> {
        let indices = self.index_tensor::<B>(&self.original_to_sorted, &tensor.device());
        tensor.select(dim, indices)
    }

    /// `apply` for integer tensors (token ids).
    pub fn apply_int<B: Backend, const D: usize>(
        &self,
        tensor: Tensor<B, D, Int>,
        dim: usize,
    ) -> Tensor<B, D, Int> {
        let indices = self.index_tensor::<B>(&self.sorted_to_original, &tensor.device());
        tensor.select(dim, indices)
    }

    /// `restore` for integer tensors.
    pub fn restore_int<B: Backend, const D: usize>(
        &self,
        tensor: Tensor<B, D, Int>,
        dim: usize,
    ) -> Tensor<B, D, Int> {
        let indices = self.index_tensor::<B>(&self.original_to_sorted, &tensor.device());
        tensor.select(dim, indices)
    }

    /// Permute a plain slice (typically the per-example lengths) into
    /// sorted order.
    pub fn sort_slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        assert_eq!(
            items.len(),
            self.batch_size(),
            "cannot permute {} items with a batch order of size {}",
            items.len(),
            self.batch_size(),
        );
        self.sorted_to_original
            .iter()
            .map(|&i| items[i as usize].clone())
            .collect()
    }

    fn index_tensor<B: Backend>(&self, perm: &[i32], device: &B::Device) -> Tensor<B, 1, Int> {
        Tensor::<B, 1, Int>::from_ints(perm, device)
    }
}

// ─── Documents ────────────────────────────────────────────────────────────────

/// A batch of token sequences in the caller's original order.
///
/// Holds everything a downstream encoder needs: the padded token ids,
/// the true per-example lengths, a 1/0 validity mask over positions,
/// and the descending-length `BatchOrder` for packing.
#[derive(Debug, Clone)]
pub struct Documents<B: Backend> {
    /// Padded token ids — shape [batch, max_len], original order
    pub tokens: Tensor<B, 2, Int>,

    /// True sequence lengths, original order
    pub lengths: Vec<usize>,

    /// 1.0 for real tokens, 0.0 for padding — shape [batch, max_len]
    pub mask: Tensor<B, 2>,

    /// Permutation between original and descending-length order
    pub order: BatchOrder,
}

impl<B: Backend> Documents<B> {
    /// Bundle padded tokens, lengths and mask into a batch.
    ///
    /// # Panics
    /// Panics if the tensor shapes and the length vector disagree.
    pub fn new(tokens: Tensor<B, 2, Int>, lengths: Vec<usize>, mask: Tensor<B, 2>) -> Self {
        let [batch, max_len] = tokens.dims();
        assert_eq!(
            batch,
            lengths.len(),
            "documents batch is {batch} rows but {} lengths were given",
            lengths.len(),
        );
        assert_eq!(
            [batch, max_len],
            mask.dims(),
            "documents mask shape {:?} does not match tokens shape {:?}",
            mask.dims(),
            [batch, max_len],
        );
        for &len in &lengths {
            assert!(
                len <= max_len,
                "sequence length {len} exceeds padded width {max_len}",
            );
        }

        let order = BatchOrder::from_lengths(&lengths);
        Self { tokens, lengths, mask, order }
    }

    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    pub fn max_len(&self) -> usize {
        self.tokens.dims()[1]
    }

    /// Per-example lengths permuted into descending order.
    pub fn sorted_lengths(&self) -> Vec<usize> {
        self.order.sort_slice(&self.lengths)
    }

    /// The validity mask permuted into descending-length order.
    /// Whenever a tensor is converted, its mask must be converted the
    /// same way — attention over a reordered tensor with an unordered
    /// mask silently attends to padding.
    pub fn sorted_mask(&self) -> Tensor<B, 2> {
        self.order.apply(self.mask.clone(), 0)
    }

    /// Reorder a batch-aligned tensor into this batch's sorted order.
    pub fn to_sorted_order<const D: usize>(
        &self,
        tensor: Tensor<B, D>,
        dim: usize,
    ) -> Tensor<B, D> {
        self.order.apply(tensor, dim)
    }

    /// Reorder a batch-aligned tensor back into the caller's order.
    pub fn restore_original_order<const D: usize>(
        &self,
        tensor: Tensor<B, D>,
        dim: usize,
    ) -> Tensor<B, D> {
        self.order.restore(tensor, dim)
    }

    /// Copy the batch onto another device. The permutation is
    /// device-independent and carried over as-is.
    pub fn to_device(&self, device: &B::Device) -> Self {
        Self {
            tokens: self.tokens.clone().to_device(device),
            lengths: self.lengths.clone(),
            mask: self.mask.clone().to_device(device),
            order: self.order.clone(),
        }
    }
}

// ─── CharDocuments ────────────────────────────────────────────────────────────

/// Per-token character ids for a batch of sequences.
///
/// Shares the batch ordering of its parent `Documents` — rows line up
/// one-to-one, so the parent's `BatchOrder` applies to this tensor too.
/// The char-level encoder runs before any packing, so no separate
/// permutation is stored here.
#[derive(Debug, Clone)]
pub struct CharDocuments<B: Backend> {
    /// Character ids — shape [batch, max_len, max_chars]
    pub chars: Tensor<B, 3, Int>,

    /// Optional 1/0 validity over character positions; `None` means
    /// "no masking" (padding chars already map to the zero id)
    pub mask: Option<Tensor<B, 3, Int>>,
}

impl<B: Backend> CharDocuments<B> {
    pub fn new(chars: Tensor<B, 3, Int>, mask: Option<Tensor<B, 3, Int>>) -> Self {
        if let Some(mask) = &mask {
            assert_eq!(
                chars.dims(),
                mask.dims(),
                "char mask shape {:?} does not match chars shape {:?}",
                mask.dims(),
                chars.dims(),
            );
        }
        Self { chars, mask }
    }

    pub fn to_device(&self, device: &B::Device) -> Self {
        Self {
            chars: self.chars.clone().to_device(device),
            mask: self.mask.as_ref().map(|m| m.clone().to_device(device)),
        }
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

    #[test]
    fn test_order_roundtrip_is_identity() {
        let order = BatchOrder::from_lengths(&[3, 7, 5, 7]);
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let x = Tensor::<TB, 1>::from_floats(data.as_slice(), &device()).reshape([4, 3]);

        let roundtrip = order.restore(order.apply(x.clone(), 0), 0);

        assert_eq!(
            x.into_data().to_vec::<f32>().unwrap(),
            roundtrip.into_data().to_vec::<f32>().unwrap(),
        );
    }

    #[test]
    fn test_invert_swaps_directions() {
        let order = BatchOrder::from_lengths(&[1, 4, 2]);
        let x = Tensor::<TB, 1>::from_floats([10.0, 20.0, 30.0], &device()).reshape([3, 1]);

        let via_restore = order.restore(x.clone(), 0);
        let via_invert = order.invert().apply(x, 0);

        assert_eq!(
            via_restore.into_data().to_vec::<f32>().unwrap(),
            via_invert.into_data().to_vec::<f32>().unwrap(),
        );
    }

    #[test]
    fn test_sorted_lengths_descend() {
        let lengths = vec![2, 9, 9, 4];
        let order = BatchOrder::from_lengths(&lengths);
        let sorted = order.sort_slice(&lengths);

        assert_eq!(sorted, vec![9, 9, 4, 2]);
        // Stable: the first 9 in original order stays first
        assert_eq!(order.sorted_to_original[0], 1);
        assert_eq!(order.sorted_to_original[1], 2);
    }

    #[test]
    fn test_int_roundtrip() {
        let order = BatchOrder::from_lengths(&[2, 5, 3]);
        let ids = Tensor::<TB, 1, Int>::from_ints([7, 8, 9], &device()).reshape([3, 1]);

        let roundtrip = order.restore_int(order.apply_int(ids.clone(), 0), 0);

        assert_eq!(
            ids.into_data().to_vec::<i64>().unwrap(),
            roundtrip.into_data().to_vec::<i64>().unwrap(),
        );
    }

    #[test]
    #[should_panic]
    fn test_length_mismatch_rejected() {
        let tokens = Tensor::<TB, 1, Int>::from_ints([1, 2, 3, 4], &device()).reshape([2, 2]);
        let mask = Tensor::<TB, 2>::ones([2, 2], &device());
        // Three lengths for a batch of two rows must fail loudly
        let _ = Documents::new(tokens, vec![2, 1, 1], mask);
    }
}
