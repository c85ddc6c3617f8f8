// ============================================================
// Layer 5 — Weight Initialization Policy
// ============================================================
// Recurrent and attention weights are orthogonally initialized;
// biases and other one-dimensional parameters keep Burn's
// defaults. Rather than walking a parameter container after the
// fact, each component asks this policy for its layers at
// construction time, so the rule is explicit and testable.
//
// Reference: Saxe et al. (2014) Exact solutions to the nonlinear
//            dynamics of learning in deep linear networks

use burn::{
    nn::{Initializer, Linear, LinearConfig},
    prelude::*,
};

/// Orthogonal initialization for matrix-shaped parameters.
#[derive(Debug, Clone)]
pub struct OrthogonalPolicy {
    pub gain: f64,
}

impl Default for OrthogonalPolicy {
    fn default() -> Self {
        Self { gain: 1.0 }
    }
}

impl OrthogonalPolicy {
    /// Whether the policy applies to a parameter of the given shape.
    /// Only parameters with at least two non-unit dimensions qualify —
    /// biases and broadcast vectors keep their default initialization.
    pub fn applies(&self, dims: &[usize]) -> bool {
        dims.iter().filter(|&&d| d > 1).count() >= 2
    }

    /// Build a `Linear` layer whose weight matrix follows the policy.
    /// The bias (when present) keeps Burn's default initialization.
    pub fn linear<B: Backend>(
        &self,
        d_input: usize,
        d_output: usize,
        bias: bool,
        device: &B::Device,
    ) -> Linear<B> {
        let mut linear = LinearConfig::new(d_input, d_output)
            .with_bias(bias)
            .init(device);

        if self.applies(&[d_input, d_output]) {
            linear.weight = Initializer::Orthogonal { gain: self.gain }
                .init([d_input, d_output], device);
        }

        linear
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TB = burn::backend::NdArray;

    #[test]
    fn test_applies_to_matrices_only() {
        let policy = OrthogonalPolicy::default();
        assert!(policy.applies(&[64, 64]));
        assert!(policy.applies(&[3, 128]));
        assert!(!policy.applies(&[64]));
        // A leading broadcast dimension of one does not make a matrix
        assert!(!policy.applies(&[1, 64]));
    }

    #[test]
    fn test_orthogonal_weight_has_unit_columns() {
        let device = Default::default();
        let policy = OrthogonalPolicy::default();
        let linear: Linear<TB> = policy.linear(8, 8, false, &device);

        // W^T W should be close to the identity for a square orthogonal matrix
        let w = linear.weight.val();
        let gram = w.clone().transpose().matmul(w);
        let values = gram.into_data().to_vec::<f32>().unwrap();

        for row in 0..8 {
            for col in 0..8 {
                let expected = if row == col { 1.0 } else { 0.0 };
                assert!(
                    (values[row * 8 + col] - expected).abs() < 1e-4,
                    "gram[{row}][{col}] = {} too far from {expected}",
                    values[row * 8 + col],
                );
            }
        }
    }
}
