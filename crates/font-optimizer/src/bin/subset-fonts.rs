//! Subsets the invitation fonts to the page text.

use clap::Parser;
use font_optimizer::{cli, PipelineConfig, Subsetter};

/// Subsets the invitation fonts to the glyphs used by the page.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    paths: cli::PathArgs,
}

fn main() -> anyhow::Result<()> {
    cli::init_tracing();
    let args = Cli::parse();
    let mut config = PipelineConfig::subsetter();
    args.paths.apply(&mut config);

    Subsetter::new(config).run(&mut std::io::stdout().lock())?;
    Ok(())
}
