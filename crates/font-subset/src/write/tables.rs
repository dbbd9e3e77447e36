//! Subsetting of auxiliary tables indexed by glyph IDs (`kern`, `hdmx`, `LTSH`, `vmtx`).

use std::collections::BTreeMap;

use super::{write_u16, write_u32, GlyphMap};
use crate::{
    errors::ParseErrorKind,
    font::{Cursor, HheaTable, HmtxTable},
    ParseError, TableTag,
};

/// Filters pairs in a Microsoft `kern` table. Only format 0 subtables are retained.
/// Returns `None` if no pairs remain, or the table has the Apple format.
pub(super) fn subset_kern(
    raw: &[u8],
    glyphs: &GlyphMap<'_>,
) -> Result<Option<Vec<u8>>, ParseError> {
    const HEADER_LEN: usize = 14;
    const PAIR_LEN: usize = 6;

    let mut cursor = Cursor::for_table(TableTag::KERN, raw);
    let version = cursor.read_u16()?;
    if version != 0 {
        return Ok(None);
    }
    let table_count = cursor.read_u16()?;

    let mut subtables = vec![];
    for _ in 0..table_count {
        let mut subtable = cursor;
        subtable.skip(2)?; // version
        let len = subtable.read_u16()?;
        let coverage = subtable.read_u16()?;
        let format = coverage >> 8;
        if format != 0 {
            cursor.skip(len.into())?;
            continue;
        }

        // The length field may overflow for large subtables; the pair count is used instead.
        let pair_count = usize::from(subtable.read_u16()?);
        cursor.skip(HEADER_LEN + PAIR_LEN * pair_count)?;
        subtable.skip(6)?; // searchRange, entrySelector, rangeShift

        let mut pairs = BTreeMap::new();
        for _ in 0..pair_count {
            let left = subtable.read_u16()?;
            let right = subtable.read_u16()?;
            let value = subtable.read_u16()?;
            if let (Some(left), Some(right)) = (glyphs.get(left), glyphs.get(right)) {
                pairs.insert((left, right), value);
            }
        }
        if !pairs.is_empty() {
            subtables.push((coverage, pairs));
        }
    }
    if subtables.is_empty() {
        return Ok(None);
    }

    let mut writer = vec![];
    write_u16(&mut writer, 0);
    write_u16(&mut writer, u16::try_from(subtables.len()).expect("too many subtables"));
    for (coverage, pairs) in subtables {
        let pair_count = u16::try_from(pairs.len()).expect("too many pairs");
        let entry_selector = pair_count.ilog2();
        let search_range = PAIR_LEN << entry_selector;
        let pairs_len = PAIR_LEN * pairs.len();
        // Fields may overflow for large subtables; readers rely on the pair count instead.
        #[allow(clippy::cast_possible_truncation)]
        let [len, search_range, range_shift] =
            [HEADER_LEN + pairs_len, search_range, pairs_len - search_range].map(|val| val as u16);

        write_u16(&mut writer, 0); // version
        write_u16(&mut writer, len);
        write_u16(&mut writer, coverage);
        write_u16(&mut writer, pair_count);
        write_u16(&mut writer, search_range);
        #[allow(clippy::cast_possible_truncation)] // `ilog2()` of `u16` is less than 16
        write_u16(&mut writer, entry_selector as u16);
        write_u16(&mut writer, range_shift);
        for ((left, right), value) in pairs {
            write_u16(&mut writer, left);
            write_u16(&mut writer, right);
            write_u16(&mut writer, value);
        }
    }
    Ok(Some(writer))
}

/// Retains device records for the retained glyphs in the `hdmx` table.
pub(super) fn subset_hdmx(
    raw: &[u8],
    glyphs: &GlyphMap<'_>,
    glyph_count: u16,
) -> Result<Vec<u8>, ParseError> {
    let mut cursor = Cursor::for_table(TableTag::HDMX, raw);
    let version = cursor.read_u16()?;
    let record_count = cursor.read_u16()?;
    let record_len = cursor.read_u32()? as usize;
    let min_record_len = 2 + usize::from(glyph_count);
    if record_len < min_record_len {
        return Err(cursor.err(ParseErrorKind::UnexpectedTableLen {
            expected: min_record_len,
            actual: record_len,
        }));
    }

    let new_record_len = (2 + glyphs.len()).next_multiple_of(4);
    let mut writer = vec![];
    write_u16(&mut writer, version);
    write_u16(&mut writer, record_count);
    write_u32(&mut writer, u32::try_from(new_record_len).expect("record len overflow"));
    for _ in 0..record_count {
        let record = cursor.split_at(record_len)?;
        let pixel_size = record.bytes[0];
        let widths = &record.bytes[2..min_record_len];
        let widths: Vec<_> = glyphs.iter().map(|(old, _)| widths[usize::from(old)]).collect();

        let start = writer.len();
        writer.push(pixel_size);
        writer.push(widths.iter().copied().max().unwrap_or(0));
        writer.extend_from_slice(&widths);
        writer.resize(start + new_record_len, 0);
    }
    Ok(writer)
}

/// Retains `yPels` values for the retained glyphs in the `LTSH` table.
pub(super) fn subset_ltsh(
    raw: &[u8],
    glyphs: &GlyphMap<'_>,
    glyph_count: u16,
) -> Result<Vec<u8>, ParseError> {
    let mut cursor = Cursor::for_table(TableTag::LTSH, raw);
    let version = cursor.read_u16()?;
    cursor.skip(2)?; // numGlyphs
    let y_pels = cursor.bytes_prefix(glyph_count.into())?;

    let mut writer = vec![];
    write_u16(&mut writer, version);
    write_u16(&mut writer, u16::try_from(glyphs.len()).expect("too many glyphs"));
    writer.extend(glyphs.iter().map(|(old, _)| y_pels[usize::from(old)]));
    Ok(writer)
}

/// Writes long metrics (as in `hmtx` or `vmtx`), omitting advances repeating at the end.
/// Returns the number of long metrics written.
pub(super) fn write_long_metrics(metrics: &[(u16, u16)], writer: &mut Vec<u8>) -> u16 {
    let mut long_metrics_count = metrics.len();
    while let Some([(prev, _), (current, _)]) = metrics[..long_metrics_count].last_chunk::<2>() {
        if prev != current {
            break;
        }
        long_metrics_count -= 1;
    }

    for (i, &(advance, side_bearing)) in metrics.iter().enumerate() {
        if i < long_metrics_count {
            write_u16(writer, advance);
        }
        write_u16(writer, side_bearing);
    }
    u16::try_from(long_metrics_count).expect("too many glyphs")
}

/// Subsets vertical metrics. Returns the `vhea` and `vmtx` tables.
pub(super) fn subset_vertical_metrics(
    vhea: &[u8],
    vmtx: &[u8],
    glyphs: &GlyphMap<'_>,
    glyph_count: u16,
) -> Result<(Vec<u8>, Vec<u8>), ParseError> {
    let vhea = HheaTable::parse(TableTag::VHEA, vhea)?;
    let vmtx = HmtxTable::new(TableTag::VMTX, vmtx, vhea.number_of_h_metrics, glyph_count)?;
    let metrics = glyphs
        .iter()
        .map(|(old, _)| vmtx.advance_and_lsb(old))
        .collect::<Result<Vec<_>, _>>()?;

    let mut vmtx_writer = vec![];
    let long_metrics_count = write_long_metrics(&metrics, &mut vmtx_writer);
    let mut vhea_writer = vec![];
    HheaTable {
        number_of_h_metrics: long_metrics_count,
        ..vhea
    }
    .write(&mut vhea_writer);
    Ok((vhea_writer, vmtx_writer))
}
