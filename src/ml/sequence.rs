// ============================================================
// Layer 5 — Packed Sequences
// ============================================================
// The working representation between recurrent stages: a dense
// padded tensor whose batch rows are sorted by descending true
// length, carried together with those lengths so any stage can
// rebuild per-position masks or unpack back to caller order.

use burn::prelude::*;

use crate::data::documents::BatchOrder;

// ─── PackedSequence ───────────────────────────────────────────────────────────

/// A length-annotated dense tensor in descending-length batch order.
///
/// Shape is [batch, max_len, features]. Positions at or beyond a row's
/// true length hold zeros and are ignored by every consumer via
/// `step_mask`.
#[derive(Debug, Clone)]
pub struct PackedSequence<B: Backend> {
    /// Sorted, padded states — [batch, max_len, features]
    pub tensor: Tensor<B, 3>,

    /// True lengths, descending, one per batch row
    pub lengths: Vec<usize>,
}

impl<B: Backend> PackedSequence<B> {
    /// Wrap an already-sorted tensor and its lengths.
    ///
    /// # Panics
    /// Panics if the lengths are not descending or disagree with the
    /// tensor's batch dimension.
    pub fn new(tensor: Tensor<B, 3>, lengths: Vec<usize>) -> Self {
        let [batch, max_len, _] = tensor.dims();
        assert_eq!(
            batch,
            lengths.len(),
            "packed tensor has {batch} rows but {} lengths were given",
            lengths.len(),
        );
        assert!(
            lengths.windows(2).all(|pair| pair[0] >= pair[1]),
            "packed lengths must be descending, got {lengths:?}",
        );
        if let Some(&longest) = lengths.first() {
            assert!(
                longest <= max_len,
                "longest sequence ({longest}) exceeds padded width ({max_len})",
            );
        }
        Self { tensor, lengths }
    }

    /// Sort a padded batch (caller order) into descending-length order
    /// and wrap it. `lengths` is given in the caller's order.
    pub fn pack(padded: Tensor<B, 3>, order: &BatchOrder, lengths: &[usize]) -> Self {
        let sorted = order.apply(padded, 0);
        Self::new(sorted, order.sort_slice(lengths))
    }

    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    pub fn max_len(&self) -> usize {
        self.tensor.dims()[1]
    }

    pub fn feature_size(&self) -> usize {
        self.tensor.dims()[2]
    }

    /// 1/0 validity mask over [batch, max_len] derived from the lengths.
    pub fn step_mask(&self) -> Tensor<B, 2> {
        length_mask(&self.lengths, self.max_len(), &self.tensor.device())
    }

    /// Restore the dense tensor to the caller's batch order.
    pub fn unpack(&self, order: &BatchOrder) -> Tensor<B, 3> {
        order.restore(self.tensor.clone(), 0)
    }
}

// ─── Residual addition ────────────────────────────────────────────────────────

/// Elementwise sum of two packed sequences, used for residual skip
/// connections between encoder stages.
///
/// # Panics
/// Panics when the two sequences disagree on per-example lengths —
/// a residual over misaligned sequences must fail loudly, never
/// broadcast.
pub fn pack_residual<B: Backend>(
    x: &PackedSequence<B>,
    y: &PackedSequence<B>,
) -> PackedSequence<B> {
    assert_eq!(
        x.lengths, y.lengths,
        "residual operands have different lengths: {:?} vs {:?}",
        x.lengths, y.lengths,
    );
    assert_eq!(
        x.feature_size(),
        y.feature_size(),
        "residual operands have different feature sizes: {} vs {}",
        x.feature_size(),
        y.feature_size(),
    );
    PackedSequence::new(x.tensor.clone() + y.tensor.clone(), x.lengths.clone())
}

/// Build a [batch, max_len] mask with 1.0 at positions below each
/// row's length and 0.0 elsewhere.
pub fn length_mask<B: Backend>(
    lengths: &[usize],
    max_len: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let batch = lengths.len();
    let mut flat = vec![0.0f32; batch * max_len];
    for (row, &len) in lengths.iter().enumerate() {
        for pos in 0..len.min(max_len) {
            flat[row * max_len + pos] = 1.0;
        }
    }
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([batch, max_len])
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TB = burn::backend::NdArray;

    fn device() -> <TB as Backend>::Device {
        Default::default()
    }

    fn packed(values: &[f32], lengths: &[usize], max_len: usize) -> PackedSequence<TB> {
        let batch = lengths.len();
        let tensor = Tensor::<TB, 1>::from_floats(values, &device()).reshape([batch, max_len, 1]);
        PackedSequence::new(tensor, lengths.to_vec())
    }

    #[test]
    fn test_residual_is_elementwise_sum() {
        // Two packed sequences of lengths [3, 2], one feature each
        let x = packed(&[1.0, 2.0, 3.0, 4.0, 5.0, 0.0], &[3, 2], 3);
        let y = packed(&[10.0, 20.0, 30.0, 40.0, 50.0, 0.0], &[3, 2], 3);

        let sum = pack_residual(&x, &y);

        assert_eq!(sum.lengths, vec![3, 2]);
        assert_eq!(
            sum.tensor.into_data().to_vec::<f32>().unwrap(),
            vec![11.0, 22.0, 33.0, 44.0, 55.0, 0.0],
        );
    }

    #[test]
    #[should_panic]
    fn test_residual_rejects_mismatched_lengths() {
        let x = packed(&[1.0, 2.0, 3.0, 4.0, 5.0, 0.0], &[3, 2], 3);
        let y = packed(&[1.0, 2.0, 0.0, 3.0, 4.0, 5.0], &[2, 3], 3);
        let _ = pack_residual(&x, &y);
    }

    #[test]
    #[should_panic]
    fn test_pack_requires_descending_lengths() {
        let tensor = Tensor::<TB, 3>::zeros([2, 3, 1], &device());
        let _ = PackedSequence::new(tensor, vec![2, 3]);
    }

    #[test]
    fn test_pack_sorts_and_unpack_restores() {
        let lengths = vec![1, 3, 2];
        let order = BatchOrder::from_lengths(&lengths);
        let padded = Tensor::<TB, 1>::from_floats(
            [1.0, 0.0, 0.0, 2.0, 2.0, 2.0, 3.0, 3.0, 0.0],
            &device(),
        )
        .reshape([3, 3, 1]);

        let pack = PackedSequence::pack(padded.clone(), &order, &lengths);
        assert_eq!(pack.lengths, vec![3, 2, 1]);

        let restored = pack.unpack(&order);
        assert_eq!(
            restored.into_data().to_vec::<f32>().unwrap(),
            padded.into_data().to_vec::<f32>().unwrap(),
        );
    }

    #[test]
    fn test_length_mask_marks_valid_positions() {
        let mask = length_mask::<TB>(&[3, 1], 4, &device());
        assert_eq!(
            mask.into_data().to_vec::<f32>().unwrap(),
            vec![1.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        );
    }
}
