// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// One module per user-facing operation. Use cases wire the
// data, ml and infra layers together; they never parse CLI
// arguments (Layer 1) and never touch tensors directly beyond
// handing batches to the model.

// Synthetic end-to-end forward pass for sanity checking
pub mod smoke_use_case;

// Real-text question answering over a passage
pub mod ask_use_case;
