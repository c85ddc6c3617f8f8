// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `smoke` and `ask`, and their
// flags. clap's derive macros generate help text, missing-arg
// errors and string-to-number conversion.

use clap::{Args, Subcommand};

use crate::application::smoke_use_case::SmokeConfig;

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a synthetic forward pass through a fresh model
    Smoke(SmokeArgs),

    /// Answer a question over a passage using pretrained vectors
    Ask(AskArgs),
}

/// All arguments for the `smoke` command.
#[derive(Args, Debug)]
pub struct SmokeArgs {
    /// Number of synthetic examples in the batch
    #[arg(long, default_value_t = 2)]
    pub batch_size: usize,

    /// Maximum question length in tokens
    #[arg(long, default_value_t = 8)]
    pub question_len: usize,

    /// Maximum passage length in tokens
    #[arg(long, default_value_t = 24)]
    pub passage_len: usize,

    /// Hidden size of every recurrent stage
    #[arg(long, default_value_t = 32)]
    pub hidden_size: usize,

    /// Synthetic word vocabulary size
    #[arg(long, default_value_t = 200)]
    pub vocab_size: usize,

    /// Word vector dimensionality
    #[arg(long, default_value_t = 50)]
    pub word_dim: usize,

    /// Add skip connections around the pair and self-matching stages
    #[arg(long)]
    pub residual: bool,

    /// Disable the attention gates
    #[arg(long)]
    pub ungated: bool,
}

/// Convert CLI SmokeArgs into the application-layer SmokeConfig —
/// the application layer never sees clap types.
impl From<SmokeArgs> for SmokeConfig {
    fn from(a: SmokeArgs) -> Self {
        SmokeConfig {
            batch_size:   a.batch_size,
            question_len: a.question_len,
            passage_len:  a.passage_len,
            hidden_size:  a.hidden_size,
            vocab_size:   a.vocab_size,
            word_dim:     a.word_dim,
            residual:     a.residual,
            ungated:      a.ungated,
        }
    }
}

/// All arguments for the `ask` command
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The natural language question to answer
    #[arg(long)]
    pub question: String,

    /// The passage to extract the answer span from
    #[arg(long)]
    pub passage: String,

    /// GloVe-style text file with pretrained word vectors
    #[arg(long, default_value = "data/glove.6B.100d.txt")]
    pub embeddings: String,

    /// Directory holding saved model weights, if any
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Hidden size used when no stored config exists
    #[arg(long, default_value_t = 75)]
    pub hidden_size: usize,
}
