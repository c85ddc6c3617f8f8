// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// This layer only routes — every computation is delegated to
// Layer 2 (application).

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{AskArgs, Commands, SmokeArgs};

#[derive(Parser, Debug)]
#[command(
    name = "rnet-qa",
    version = "0.1.0",
    about = "R-NET span extraction: gated attention encoders + pointer network."
)]
pub struct Cli {
    /// The subcommand to run (smoke or ask)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Smoke(args) => Self::run_smoke(args),
            Commands::Ask(args) => Self::run_ask(args),
        }
    }

    fn run_smoke(args: SmokeArgs) -> Result<()> {
        use crate::application::smoke_use_case::SmokeUseCase;

        tracing::info!(
            "Smoke pass: batch={}, question_len={}, passage_len={}",
            args.batch_size,
            args.question_len,
            args.passage_len,
        );
        SmokeUseCase::new(args.into()).execute()
    }

    fn run_ask(args: AskArgs) -> Result<()> {
        use crate::application::ask_use_case::AskUseCase;

        let use_case = AskUseCase::new(&args.embeddings, &args.checkpoint_dir, args.hidden_size)?;
        let (answer, span, score) = use_case.answer(&args.question, &args.passage)?;

        println!("\nAnswer: {answer}");
        println!("Span:   [{}, {}]  (p={score:.4})", span.begin, span.end);
        Ok(())
    }
}
