#![allow(dead_code, unused_imports)]
#![recursion_limit = "256"]

mod application;
mod cli;
mod data;
mod domain;
mod infra;
mod ml;

use anyhow::Result;
use clap::Parser;

use cli::Cli;

fn main() -> Result<()> {
    // RUST_LOG overrides the default crate-level filter
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rnet_qa=info".parse().unwrap()),
        )
        .init();

    Cli::parse().run()
}
