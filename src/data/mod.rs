// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From raw text to model-ready batches:
//
//   preprocessor.rs — normalization, word/char tokenization,
//                     character vocabulary
//   batcher.rs      — ragged id sequences → padded tensors,
//                     masks and lengths on the target device
//   documents.rs    — the Documents / CharDocuments batch types
//                     and the BatchOrder permutation that links
//                     caller order to descending-length order
//
// The encoders consume Documents read-only; every derived
// tensor is allocated fresh per forward pass.

// Text cleanup and tokenization
pub mod preprocessor;

// Padding, masking and batching of id sequences
pub mod batcher;

// Batch types and order bookkeeping
pub mod documents;
