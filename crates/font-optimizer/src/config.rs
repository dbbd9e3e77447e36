//! Pipeline configuration.

use std::path::{Path, PathBuf};

use font_subset::SubsetOptions;

use crate::corpus::Corpus;

/// Font processed by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontEntry {
    /// Logical name of the font (e.g., `title`). Used as a key in the report and as a prefix
    /// for output files.
    pub name: String,
    /// Name of the source file in [`PipelineConfig::font_dir`].
    pub file_name: String,
    /// CSS font family name.
    pub family: String,
}

impl FontEntry {
    /// Creates a new entry.
    pub fn new(
        name: impl Into<String>,
        file_name: impl Into<String>,
        family: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            family: family.into(),
        }
    }

    /// Returns the file name of the TrueType subset.
    pub fn subset_file_name(&self) -> String {
        format!("{}_subset.ttf", self.name)
    }

    /// Returns the file name of the WOFF2 subset.
    pub fn woff2_file_name(&self) -> String {
        format!("{}_subset.woff2", self.name)
    }

    /// Returns the file name of the gzipped TrueType subset.
    pub fn compressed_file_name(&self) -> String {
        format!("{}_subset.gz", self.name)
    }
}

/// Configuration shared by [`Subsetter`](crate::Subsetter) and [`Optimizer`](crate::Optimizer).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory with source fonts.
    pub font_dir: PathBuf,
    /// Directory to write outputs to. Created if necessary.
    pub output_dir: PathBuf,
    /// URL prefix under which the output directory is served; used in the generated CSS.
    pub public_url: String,
    /// Fonts to process, in the processing order.
    pub fonts: Vec<FontEntry>,
    /// Text to subset fonts to.
    pub corpus: Corpus,
    /// Subsetting options.
    pub subset_options: SubsetOptions,
    /// Gzip compression level (0..=9).
    pub compression_level: u32,
    /// Whether to write WOFF2 subsets in addition to TrueType ones.
    pub woff2: bool,
}

impl PipelineConfig {
    /// Name of the JSON report file in the output directory.
    pub const REPORT_FILE_NAME: &'static str = "optimization_report.json";
    /// Name of the stylesheet file in the output directory.
    pub const CSS_FILE_NAME: &'static str = "optimized_fonts.css";
    const FONT_DIR: &'static str = "public/font";
    const MAX_COMPRESSION_LEVEL: u32 = 9;

    fn default_fonts() -> Vec<FontEntry> {
        vec![
            FontEntry::new("title", "title.ttf", "TitleFont"),
            FontEntry::new("muyao", "Muyao-Softbrush.ttf", "MuyaoFont"),
        ]
    }

    /// Default configuration for subsetting fonts without compression.
    pub fn subsetter() -> Self {
        Self {
            font_dir: Self::FONT_DIR.into(),
            output_dir: Path::new(Self::FONT_DIR).join("subset"),
            public_url: "/font/subset".to_owned(),
            fonts: Self::default_fonts(),
            corpus: Corpus::invitation_with_management(),
            subset_options: SubsetOptions::default(),
            compression_level: Self::MAX_COMPRESSION_LEVEL,
            woff2: false,
        }
    }

    /// Default configuration for subsetting and compressing fonts.
    pub fn optimizer() -> Self {
        Self {
            output_dir: Path::new(Self::FONT_DIR).join("optimized"),
            public_url: "/font/optimized".to_owned(),
            corpus: Corpus::invitation(),
            ..Self::subsetter()
        }
    }

    /// Returns the path to the source file of the font.
    pub fn input_path(&self, font: &FontEntry) -> PathBuf {
        self.font_dir.join(&font.file_name)
    }

    /// Returns the path to an output file with the specified name.
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// Returns the public URL of an output file with the specified name.
    pub fn public_url(&self, file_name: &str) -> String {
        let prefix = self.public_url.trim_end_matches('/');
        format!("{prefix}/{file_name}")
    }
}
