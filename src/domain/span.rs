// ============================================================
// Layer 3 — Answer Spans
// ============================================================
// The model emits one score per passage position for the span
// begin and one for the span end. Turning those into an actual
// answer — softmax, then the best (begin, end) pair under a
// length cap — is plain arithmetic over slices, so it lives in
// the domain layer where it can be tested without a backend.

/// A (begin, end) pair of token positions in the passage, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub begin: usize,
    pub end: usize,
}

impl Span {
    /// Number of tokens covered by the span; begin == end is a
    /// one-token span.
    pub fn token_count(&self) -> usize {
        self.end - self.begin + 1
    }
}

/// Numerically stable softmax over a logit slice.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    if total == 0.0 {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|v| v / total).collect()
}

/// Pick the span maximizing `begin_probs[b] * end_probs[e]` with
/// `e >= b` and at most `max_span_len` tokens. Returns the span and
/// its probability product, or `None` for empty inputs.
pub fn best_span(
    begin_probs: &[f32],
    end_probs: &[f32],
    max_span_len: usize,
) -> Option<(Span, f32)> {
    if begin_probs.is_empty() || begin_probs.len() != end_probs.len() || max_span_len == 0 {
        return None;
    }

    let mut best: Option<(Span, f32)> = None;
    for begin in 0..begin_probs.len() {
        let last = (begin + max_span_len).min(end_probs.len());
        for end in begin..last {
            let score = begin_probs[begin] * end_probs[end];
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((Span { begin, end }, score));
            }
        }
    }
    best
}
