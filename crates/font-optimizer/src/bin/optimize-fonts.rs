//! Subsets and compresses the invitation fonts, and emits a report and a CSS snippet.

use clap::Parser;
use font_optimizer::{cli, Optimizer, PipelineConfig};

/// Subsets and gzips the invitation fonts, writing a size report and a CSS snippet.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    paths: cli::PathArgs,
    /// Also write WOFF2 subsets and reference them from the CSS.
    #[arg(long)]
    woff2: bool,
    /// URL prefix under which the output directory is served.
    #[arg(long, value_name = "URL")]
    public_url: Option<String>,
}

fn main() -> anyhow::Result<()> {
    cli::init_tracing();
    let args = Cli::parse();
    let mut config = PipelineConfig::optimizer();
    args.paths.apply(&mut config);
    config.woff2 = args.woff2;
    if let Some(public_url) = args.public_url {
        config.public_url = public_url;
    }

    Optimizer::new(config).run(&mut std::io::stdout().lock())?;
    Ok(())
}
