//! Coinpress CLI — content tooling for a crypto news site.
//!
//! Generates site data (related articles, search index, feeds), supervises
//! the static-site build with strategy fallback, and reports deployment errors.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
