//! Size optimization for the web fonts of the wedding invitation page.
//!
//! The pipeline subsets each configured TrueType font to the glyphs needed to render
//! a fixed [`Corpus`] using the [`font_subset`] crate. [`Optimizer`] additionally gzips the subsets,
//! writes a JSON [`Report`] with size savings and a CSS snippet with `@font-face` rules
//! and preload hints.
//!
//! Per-font failures (a corrupted font, an I/O error when compressing) never abort a run;
//! they are printed to the console and recorded in the report. Missing source fonts
//! are skipped with a warning.
//!
//! # Examples
//!
//! ```no_run
//! use font_optimizer::{Optimizer, PipelineConfig};
//!
//! let config = PipelineConfig {
//!     woff2: true,
//!     ..PipelineConfig::optimizer()
//! };
//! let report = Optimizer::new(config).run(&mut std::io::stdout())?;
//! println!("{:?}", report.summary());
//! # anyhow::Ok(())
//! ```

pub mod cli;
mod compress;
mod config;
pub mod corpus;
mod css;
mod pipeline;
mod report;
mod subset;

pub use crate::{
    compress::{gzip_file, CompressStats},
    config::{FontEntry, PipelineConfig},
    corpus::Corpus,
    css::{generate_css, FontFace, FontFormat},
    pipeline::{Optimizer, Subsetter},
    report::{FontRecord, Report, StepOutcome, Summary},
    subset::{subset_font, SubsetStats},
};
