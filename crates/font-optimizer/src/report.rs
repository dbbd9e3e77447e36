//! Aggregated size report.

use std::io;

use serde::{Serialize, Serializer};

use crate::{compress::CompressStats, subset::SubsetStats};

/// Computes the size reduction in percent. Returns `None` if `original` is zero.
#[allow(clippy::cast_precision_loss)] // font sizes are far below 2^52 bytes
pub(crate) fn saving_percent(original: u64, reduced: u64) -> Option<f64> {
    if original == 0 {
        return None;
    }
    let (original, reduced) = (original as f64, reduced as f64);
    Some((original - reduced) / original * 100.0)
}

#[allow(clippy::cast_precision_loss)]
fn kilobytes(size: u64) -> f64 {
    size as f64 / 1_024.0
}

#[allow(clippy::cast_precision_loss)]
fn megabytes(size: u64) -> f64 {
    size as f64 / 1_024.0 / 1_024.0
}

/// Outcome of a single processing step for a font.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<T> {
    /// Step has succeeded.
    Succeeded(T),
    /// Step has failed with the specified error message.
    Failed(String),
}

impl<T> StepOutcome<T> {
    /// Converts a step result, rendering an error together with its context chain.
    pub fn from_result(result: anyhow::Result<T>) -> Self {
        match result {
            Ok(stats) => Self::Succeeded(stats),
            Err(err) => Self::Failed(format!("{err:#}")),
        }
    }

    /// Returns the stats if the step has succeeded.
    pub fn stats(&self) -> Option<&T> {
        match self {
            Self::Succeeded(stats) => Some(stats),
            Self::Failed(_) => None,
        }
    }

    /// Checks whether the step has succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

impl<T: Serialize> Serialize for StepOutcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Succeeded<'a, T> {
            success: bool,
            #[serde(flatten)]
            stats: &'a T,
        }

        #[derive(Serialize)]
        struct Failed<'a> {
            success: bool,
            error: &'a str,
        }

        match self {
            Self::Succeeded(stats) => Succeeded {
                success: true,
                stats,
            }
            .serialize(serializer),
            Self::Failed(error) => Failed {
                success: false,
                error,
            }
            .serialize(serializer),
        }
    }
}

/// Per-font results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FontRecord {
    /// Subsetting outcome.
    pub subset: StepOutcome<SubsetStats>,
    /// Compression outcome. Absent if compression was not attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress: Option<StepOutcome<CompressStats>>,
}

/// Totals over all processed fonts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// Number of fonts for which processing was attempted.
    pub total_fonts: usize,
    /// Total size of source fonts with a successful subset.
    pub total_original_size: u64,
    /// Total size of successfully written subsets.
    pub total_subset_size: u64,
    /// Total size of successfully compressed subsets.
    pub total_compressed_size: u64,
    /// Saving from subsetting in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subset_saving_percent: Option<f64>,
    /// Saving from subsetting and compression in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_saving_percent: Option<f64>,
}

impl Summary {
    fn new<'a>(records: impl ExactSizeIterator<Item = &'a FontRecord>) -> Self {
        let mut summary = Self {
            total_fonts: records.len(),
            total_original_size: 0,
            total_subset_size: 0,
            total_compressed_size: 0,
            subset_saving_percent: None,
            total_saving_percent: None,
        };

        for record in records {
            let Some(subset) = record.subset.stats() else {
                continue;
            };
            summary.total_original_size += subset.original_size;
            summary.total_subset_size += subset.subset_size;
            if let Some(compress) = record.compress.as_ref().and_then(StepOutcome::stats) {
                summary.total_compressed_size += compress.compressed_size;
            }
        }

        summary.subset_saving_percent =
            saving_percent(summary.total_original_size, summary.total_subset_size);
        if summary.subset_saving_percent.is_some() && summary.total_compressed_size > 0 {
            summary.total_saving_percent =
                saving_percent(summary.total_original_size, summary.total_compressed_size);
        }
        summary
    }
}

/// Report over a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    summary: Summary,
    fonts: Vec<(String, FontRecord)>,
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Fonts<'a>(&'a [(String, FontRecord)]);

        impl Serialize for Fonts<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_map(self.0.iter().map(|(name, record)| (name, record)))
            }
        }

        #[derive(Serialize)]
        struct Raw<'a> {
            summary: &'a Summary,
            fonts: Fonts<'a>,
        }

        Raw {
            summary: &self.summary,
            fonts: Fonts(&self.fonts),
        }
        .serialize(serializer)
    }
}

impl Report {
    /// Creates a report from per-font records. Records are kept in the provided order.
    pub fn new(fonts: Vec<(String, FontRecord)>) -> Self {
        let summary = Summary::new(fonts.iter().map(|(_, record)| record));
        Self { summary, fonts }
    }

    /// Returns the summary.
    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Returns the record for the specified font.
    pub fn font(&self, name: &str) -> Option<&FontRecord> {
        self.fonts
            .iter()
            .find_map(|(font_name, record)| (font_name == name).then_some(record))
    }

    /// Iterates over per-font records in the processing order.
    pub fn fonts(&self) -> impl Iterator<Item = (&str, &FontRecord)> + '_ {
        self.fonts
            .iter()
            .map(|(name, record)| (name.as_str(), record))
    }

    /// Writes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors.
    pub fn write_json(&self, writer: impl io::Write) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(writer, self)
    }

    /// Prints a human-readable summary.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors.
    pub fn print_summary(&self, out: &mut impl io::Write) -> io::Result<()> {
        let summary = &self.summary;
        writeln!(out, "\n📊 Optimization report:")?;
        writeln!(out, "📁 Total fonts: {}", summary.total_fonts)?;
        writeln!(
            out,
            "📊 Total original size: {:.2} MB",
            megabytes(summary.total_original_size)
        )?;
        writeln!(
            out,
            "📊 Total subset size: {:.2} MB",
            megabytes(summary.total_subset_size)
        )?;
        if let Some(percent) = summary.subset_saving_percent {
            writeln!(out, "📉 Saved by subsetting: {percent:.1}%")?;
        }
        if let Some(percent) = summary.total_saving_percent {
            writeln!(
                out,
                "📊 Total compressed size: {:.2} MB",
                megabytes(summary.total_compressed_size)
            )?;
            writeln!(out, "📉 Total saved: {percent:.1}%")?;
        }
        Ok(())
    }
}

pub(crate) fn print_subset_stats(out: &mut impl io::Write, stats: &SubsetStats) -> io::Result<()> {
    writeln!(out, "📊 Original size: {:.1} KB", kilobytes(stats.original_size))?;
    writeln!(out, "📊 Subset size: {:.1} KB", kilobytes(stats.subset_size))?;
    if let Some(reduction) = stats.reduction {
        writeln!(out, "📉 Reduced by: {reduction:.1}%")?;
    }
    if let Some(woff2_size) = stats.woff2_size {
        writeln!(out, "📊 WOFF2 size: {:.1} KB", kilobytes(woff2_size))?;
    }
    Ok(())
}

pub(crate) fn print_compress_stats(
    out: &mut impl io::Write,
    stats: &CompressStats,
) -> io::Result<()> {
    writeln!(
        out,
        "📊 Compressed size: {:.1} KB",
        kilobytes(stats.compressed_size)
    )?;
    if let Some(ratio) = stats.compression_ratio {
        writeln!(out, "📉 Compression ratio: {ratio:.1}%")?;
    }
    Ok(())
}
