// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the filesystem lives here, behind
// small managers the application layer calls:
//
//   embedding_store.rs — GloVe-style pretrained vector files
//   checkpoint.rs      — model weights + config on disk
//
// The ml layer never reads files; it receives tensors and
// configs already materialized by this layer.

// Pretrained word vectors and vocabulary
pub mod embedding_store;

// Model weight and config persistence
pub mod checkpoint;
