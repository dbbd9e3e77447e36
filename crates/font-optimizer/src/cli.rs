//! Command-line helpers shared by the binaries.

use std::{io, path::PathBuf};

use clap::Args;
use tracing_subscriber::EnvFilter;

use crate::config::PipelineConfig;

/// Path overrides for the pipeline configuration.
#[derive(Debug, Args)]
pub struct PathArgs {
    /// Directory with source fonts.
    #[arg(long, value_name = "DIR")]
    pub font_dir: Option<PathBuf>,
    /// Directory to write outputs to.
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

impl PathArgs {
    /// Applies overrides to the provided configuration.
    pub fn apply(self, config: &mut PipelineConfig) {
        if let Some(font_dir) = self.font_dir {
            config.font_dir = font_dir;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
    }
}

/// Initializes diagnostic logging configured via the `RUST_LOG` env var. Logs are written
/// to stderr, so that they do not interleave with the console report.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
}
