//! Pipeline orchestrators.

use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{self, BufWriter, Write as _},
    path::Path,
};

use anyhow::Context as _;
use tracing::{debug, info, warn};

use crate::{
    compress::{gzip_file, CompressStats},
    config::{FontEntry, PipelineConfig},
    css::{generate_css, FontFace},
    report::{print_compress_stats, print_subset_stats, FontRecord, Report, StepOutcome},
    subset::{subset_font, SubsetStats},
};

fn create_output_dir(config: &PipelineConfig) -> anyhow::Result<()> {
    let dir = &config.output_dir;
    fs::create_dir_all(dir)
        .with_context(|| format!("failed creating output directory `{}`", dir.display()))
}

/// Checks that the font source exists, printing a warning if it doesn't.
fn check_input(
    config: &PipelineConfig,
    font: &FontEntry,
    console: &mut impl io::Write,
) -> io::Result<bool> {
    let input = config.input_path(font);
    if input.exists() {
        return Ok(true);
    }
    warn!(font = %font.name, path = %input.display(), "font file not found; skipping");
    writeln!(console, "❌ Font file not found: {}", input.display())?;
    Ok(false)
}

fn subset_step(
    config: &PipelineConfig,
    font: &FontEntry,
    chars: &BTreeSet<char>,
) -> StepOutcome<SubsetStats> {
    let input = config.input_path(font);
    let output = config.output_path(&font.subset_file_name());
    let woff2_output = config
        .woff2
        .then(|| config.output_path(&font.woff2_file_name()));
    info!(
        font = %font.name,
        input = %input.display(),
        output = %output.display(),
        "subsetting font"
    );

    let result = subset_font(
        &input,
        &output,
        chars,
        &config.subset_options,
        woff2_output.as_deref(),
    );
    match &result {
        Ok(stats) => info!(font = %font.name, ?stats, "subsetting succeeded"),
        Err(err) => warn!(font = %font.name, "subsetting failed: {err:#}"),
    }
    StepOutcome::from_result(result)
}

fn compress_step(config: &PipelineConfig, font: &FontEntry) -> StepOutcome<CompressStats> {
    let input = config.output_path(&font.subset_file_name());
    let output = config.output_path(&font.compressed_file_name());
    debug!(
        font = %font.name,
        output = %output.display(),
        level = config.compression_level,
        "compressing subset"
    );

    let result = gzip_file(&input, &output, config.compression_level);
    match &result {
        Ok(stats) => info!(font = %font.name, ?stats, "compression succeeded"),
        Err(err) => warn!(font = %font.name, "compression failed: {err:#}"),
    }
    StepOutcome::from_result(result)
}

fn print_header(console: &mut impl io::Write, title: &str, width: usize) -> io::Result<()> {
    writeln!(console, "🎨 {title}")?;
    writeln!(console, "{}", "=".repeat(width))
}

/// Subsets configured fonts to the corpus without compressing them.
#[derive(Debug, Clone)]
pub struct Subsetter {
    config: PipelineConfig,
}

impl Default for Subsetter {
    fn default() -> Self {
        Self::new(PipelineConfig::subsetter())
    }
}

impl Subsetter {
    /// Creates a subsetter with the specified configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes all configured fonts, printing progress to `console`. Per-font failures
    /// are printed and recorded in the returned report; the report is not persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the output directory cannot be created, or writing to `console` fails.
    pub fn run(&self, console: &mut impl io::Write) -> anyhow::Result<Report> {
        let config = &self.config;
        print_header(console, "Font subsetting tool", 50)?;
        create_output_dir(config)?;
        let chars = config.corpus.chars();
        debug!(char_count = chars.len(), "prepared corpus");

        let mut records = vec![];
        for font in &config.fonts {
            if !check_input(config, font, console)? {
                continue;
            }

            writeln!(console, "\n📝 Processing font: {}", font.name)?;
            let subset = subset_step(config, font, &chars);
            match &subset {
                StepOutcome::Succeeded(stats) => {
                    writeln!(console, "✅ Font subset created!")?;
                    writeln!(console, "📁 Input file: {}", config.input_path(font).display())?;
                    let output = config.output_path(&font.subset_file_name());
                    writeln!(console, "📁 Output file: {}", output.display())?;
                    print_subset_stats(console, stats)?;
                    writeln!(console, "✅ {} subset successfully!", font.name)?;
                }
                StepOutcome::Failed(err) => {
                    writeln!(console, "❌ Font subsetting failed: {err}")?;
                    writeln!(console, "❌ {} subsetting failed!", font.name)?;
                }
            }
            records.push((
                font.name.clone(),
                FontRecord {
                    subset,
                    compress: None,
                },
            ));
        }

        writeln!(console, "\n🎉 All fonts processed!")?;
        writeln!(
            console,
            "📁 Subset fonts are saved to: {}",
            config.output_dir.display()
        )?;
        Ok(Report::new(records))
    }
}

/// Subsets and compresses configured fonts, and writes a JSON report and a CSS snippet.
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: PipelineConfig,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(PipelineConfig::optimizer())
    }
}

impl Optimizer {
    /// Creates an optimizer with the specified configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes all configured fonts, printing progress to `console`. Per-font failures
    /// are printed and recorded in the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the output directory cannot be created, the CSS or the report
    /// cannot be written, or writing to `console` fails.
    pub fn run(&self, console: &mut impl io::Write) -> anyhow::Result<Report> {
        let config = &self.config;
        print_header(console, "Font optimization tool", 60)?;
        create_output_dir(config)?;
        let chars = config.corpus.chars();
        debug!(char_count = chars.len(), "prepared corpus");

        let mut records = vec![];
        let mut faces = vec![];
        for font in &config.fonts {
            if !check_input(config, font, console)? {
                continue;
            }

            writeln!(console, "\n📝 Processing font: {}", font.name)?;
            writeln!(console, "📁 Input file: {}", config.input_path(font).display())?;
            let subset = subset_step(config, font, &chars);
            let compress = match &subset {
                StepOutcome::Succeeded(stats) => {
                    writeln!(console, "✅ Subsetting succeeded!")?;
                    print_subset_stats(console, stats)?;
                    faces.push(FontFace::new(config, font));

                    let compress = compress_step(config, font);
                    match &compress {
                        StepOutcome::Succeeded(stats) => {
                            writeln!(console, "✅ Compression succeeded!")?;
                            print_compress_stats(console, stats)?;
                        }
                        StepOutcome::Failed(err) => {
                            writeln!(console, "❌ Compression failed: {err}")?;
                        }
                    }
                    Some(compress)
                }
                StepOutcome::Failed(err) => {
                    writeln!(console, "❌ Subsetting failed: {err}")?;
                    None
                }
            };
            records.push((font.name.clone(), FontRecord { subset, compress }));
        }

        let css_path = config.output_path(PipelineConfig::CSS_FILE_NAME);
        fs::write(&css_path, generate_css(&faces))
            .with_context(|| format!("failed writing CSS to `{}`", css_path.display()))?;
        info!(path = %css_path.display(), faces = faces.len(), "written CSS");
        writeln!(console, "\n📄 Optimized CSS saved to: {}", css_path.display())?;

        let report = Report::new(records);
        let report_path = config.output_path(PipelineConfig::REPORT_FILE_NAME);
        write_report(&report, &report_path)?;
        info!(path = %report_path.display(), "written report");
        report.print_summary(console)?;
        writeln!(
            console,
            "📄 Detailed report saved to: {}",
            report_path.display()
        )?;
        writeln!(console, "🎉 All fonts optimized!")?;
        Ok(report)
    }
}

fn write_report(report: &Report, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed creating report file `{}`", path.display()))?;
    let mut writer = BufWriter::new(file);
    report
        .write_json(&mut writer)
        .with_context(|| format!("failed writing report to `{}`", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed writing report to `{}`", path.display()))
}
