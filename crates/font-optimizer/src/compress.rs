//! Gzip compression step.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::Context as _;
use flate2::{Compression, GzBuilder};
use serde::Serialize;

use crate::{report::saving_percent, subset::file_size};

/// Statistics of a successful compression step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompressStats {
    /// Size of the input file in bytes.
    pub original_size: u64,
    /// Size of the compressed file in bytes.
    pub compressed_size: u64,
    /// Size reduction in percent. Absent if the input file is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_ratio: Option<f64>,
}

/// Compresses `input` into a gzip file at `output`. The gzip header contains neither
/// a file name nor a modification time, so the output only depends on the input and `level`.
///
/// # Errors
///
/// Returns an error on I/O failures.
pub fn gzip_file(input: &Path, output: &Path, level: u32) -> anyhow::Result<CompressStats> {
    let data = fs::read(input).with_context(|| format!("failed reading `{}`", input.display()))?;
    let file =
        File::create(output).with_context(|| format!("failed creating `{}`", output.display()))?;

    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(BufWriter::new(file), Compression::new(level));
    encoder
        .write_all(&data)
        .and_then(|()| encoder.try_finish())
        .with_context(|| format!("failed compressing to `{}`", output.display()))?;
    encoder
        .finish()?
        .flush()
        .with_context(|| format!("failed writing `{}`", output.display()))?;

    let original_size = file_size(input)?;
    let compressed_size = file_size(output)?;
    Ok(CompressStats {
        original_size,
        compressed_size,
        compression_ratio: saving_percent(original_size, compressed_size),
    })
}
