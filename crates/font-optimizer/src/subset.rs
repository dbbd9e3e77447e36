//! Subsetting step.

use std::{collections::BTreeSet, fs, path::Path};

use anyhow::Context as _;
use font_subset::{Font, SubsetOptions};
use serde::Serialize;
use tracing::debug;

use crate::report::saving_percent;

/// Statistics of a successful subsetting step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubsetStats {
    /// Size of the source font in bytes.
    pub original_size: u64,
    /// Size of the TrueType subset in bytes.
    pub subset_size: u64,
    /// Size reduction in percent. Absent if the source font is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduction: Option<f64>,
    /// Size of the WOFF2 subset in bytes, if one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub woff2_size: Option<u64>,
}

/// Subsets the font at `input` to `chars` and writes the result to `output`. If `woff2_output`
/// is specified, the subset is additionally written there in the WOFF2 format.
///
/// # Errors
///
/// Returns an error if reading, parsing, subsetting or writing the font fails.
pub fn subset_font(
    input: &Path,
    output: &Path,
    chars: &BTreeSet<char>,
    options: &SubsetOptions,
    woff2_output: Option<&Path>,
) -> anyhow::Result<SubsetStats> {
    let font_bytes =
        fs::read(input).with_context(|| format!("failed reading `{}`", input.display()))?;
    let font = Font::new(&font_bytes)
        .with_context(|| format!("failed parsing font `{}`", input.display()))?;
    let subset = font.subset(chars, options).context("failed subsetting font")?;
    debug!(
        glyph_count = subset.glyph_count(),
        retained_glyphs = subset.retained_glyphs().count(),
        mapped_chars = subset.mapped_chars().count(),
        requested_chars = chars.len(),
        "created font subset"
    );

    fs::write(output, subset.to_truetype())
        .with_context(|| format!("failed writing `{}`", output.display()))?;
    let woff2_size = if let Some(woff2_output) = woff2_output {
        fs::write(woff2_output, subset.to_woff2())
            .with_context(|| format!("failed writing `{}`", woff2_output.display()))?;
        Some(file_size(woff2_output)?)
    } else {
        None
    };

    let original_size = file_size(input)?;
    let subset_size = file_size(output)?;
    Ok(SubsetStats {
        original_size,
        subset_size,
        reduction: saving_percent(original_size, subset_size),
        woff2_size,
    })
}

pub(crate) fn file_size(path: &Path) -> anyhow::Result<u64> {
    let metadata =
        fs::metadata(path).with_context(|| format!("failed reading `{}`", path.display()))?;
    Ok(metadata.len())
}
