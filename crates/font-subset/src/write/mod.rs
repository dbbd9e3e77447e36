//! Logic for serializing `FontSubset`s in OpenType and WOFF2 formats.

use core::{iter, mem};
use std::collections::{BTreeMap, BTreeSet};

use self::{
    layout::{subset_gdef, subset_layout_table},
    tables::{subset_hdmx, subset_kern, subset_ltsh, subset_vertical_metrics, write_long_metrics},
};
use crate::{
    font::{
        covered_glyphs, ClassDef, CmapTable, Cursor, Glyph, GlyphComponent, GlyphComponentArgs,
        HheaTable, LocaFormat, LocaTable, NameRecord, NameTable, SegmentDeltas, SegmentWithDelta,
        SegmentedCoverage, SequentialMapGroup, TransformData,
    },
    Font, FontSubset, ParseError, SubsetOptions, TableTag,
};

mod brotli;
mod layout;
mod tables;

fn write_u16(writer: &mut Vec<u8>, value: u16) {
    writer.extend_from_slice(&value.to_be_bytes());
}

fn write_u32(writer: &mut Vec<u8>, value: u32) {
    writer.extend_from_slice(&value.to_be_bytes());
}

fn uint_base128_len(val: u32) -> usize {
    if val == 0 {
        1
    } else {
        val.ilog2() as usize / 7 + 1
    }
}

#[allow(clippy::cast_possible_truncation)] // intentional
fn write_uint_base128(buffer: &mut Vec<u8>, val: u32) {
    if val >= 1 << 28 {
        buffer.push(0x80 | (val >> 28) as u8);
    }
    if val >= 1 << 21 {
        buffer.push(0x80 | (val >> 21) as u8);
    }
    if val >= 1 << 14 {
        buffer.push(0x80 | (val >> 14) as u8);
    }
    if val >= 1 << 7 {
        buffer.push(0x80 | (val >> 7) as u8);
    }
    buffer.push((val & 127) as u8);
}

impl CmapTable<'static> {
    fn from_map(map: &[(char, u16)]) -> Self {
        let coverage = Self::create_coverage(map);
        let can_be_encoded_as_deltas = map
            .last()
            .is_none_or(|&(ch, _)| u32::from(ch) < u32::from(u16::MAX));
        if can_be_encoded_as_deltas {
            #[allow(clippy::cast_possible_truncation)]
            // `_ as u16` is safe due to the `can_be_encoded_as_deltas` check
            let delta_segments = coverage.groups.iter().map(|group| {
                let start_code = group.start_char_code as u16;
                SegmentWithDelta {
                    start_code,
                    end_code: group.end_char_code as u16,
                    id_delta: (group.start_glyph_id as u16).wrapping_sub(start_code),
                    id_range_offset: 0,
                }
            });
            // The last segment must have `start_code == end_code == 0xffff`.
            let delta_segments = delta_segments.chain([SegmentWithDelta {
                start_code: u16::MAX,
                end_code: u16::MAX,
                id_delta: 1, // maps `start_code` to the missing glyph
                id_range_offset: 0,
            }]);
            Self::Deltas(SegmentDeltas {
                segments: delta_segments.collect(),
                glyph_id_array: &[],
            })
        } else {
            Self::Coverage(coverage)
        }
    }

    fn create_coverage(map: &[(char, u16)]) -> SegmentedCoverage {
        let mut groups = vec![];
        let [(first_char, first_idx), rest @ ..] = map else {
            return SegmentedCoverage::default();
        };
        let mut current_group = SequentialMapGroup {
            start_char_code: (*first_char).into(),
            end_char_code: (*first_char).into(),
            start_glyph_id: (*first_idx).into(),
        };

        for &(ch, glyph_idx) in rest {
            if u32::from(ch) == current_group.end_char_code + 1
                && u32::from(glyph_idx) == current_group.map_unchecked(ch)
            {
                current_group.end_char_code += 1;
            } else {
                let prev_group = mem::replace(
                    &mut current_group,
                    SequentialMapGroup {
                        start_char_code: ch.into(),
                        end_char_code: ch.into(),
                        start_glyph_id: glyph_idx.into(),
                    },
                );
                groups.push(prev_group);
            }
        }

        groups.push(current_group);
        SegmentedCoverage { groups }
    }
}

impl CmapTable<'_> {
    /// Offset of the single subtable: the table header + 2 encoding records.
    const SUBTABLE_OFFSET: u32 = 4 + 2 * 8;

    fn write(&self, writer: &mut Vec<u8>) {
        write_u16(writer, 0); // table version
        write_u16(writer, 2); // num_tables

        // Both encoding records point to the same subtable. The Windows record is required
        // by some renderers; records must be sorted by the platform ID.
        let (unicode_encoding, windows_encoding) = match self {
            Self::Deltas(_) => (3, 1),
            Self::Coverage(_) => (4, 10),
        };
        for (platform_id, encoding_id) in [
            (CmapTable::UNICODE_PLATFORM, unicode_encoding),
            (CmapTable::WINDOWS_PLATFORM, windows_encoding),
        ] {
            write_u16(writer, platform_id);
            write_u16(writer, encoding_id);
            write_u32(writer, Self::SUBTABLE_OFFSET);
        }

        match self {
            Self::Deltas(deltas) => deltas.write(writer),
            Self::Coverage(coverage) => coverage.write(writer),
        }
    }
}

impl SegmentDeltas<'_> {
    fn subtable_len(&self) -> usize {
        16 + 8 * self.segments.len()
    }

    fn write(&self, writer: &mut Vec<u8>) {
        write_u16(writer, 4); // subtable format
        write_u16(
            writer,
            self.subtable_len()
                .try_into()
                .expect("subtable_len overflow"),
        );
        write_u16(writer, 0); // language

        let segment_count = u16::try_from(self.segments.len()).expect("segments.len() overflow");
        write_u16(writer, 2 * segment_count);
        let entry_selector = u16::try_from(segment_count.ilog2()).unwrap();
        let search_range = 1 << (entry_selector + 1);
        write_u16(writer, search_range);
        write_u16(writer, entry_selector);
        let range_shift = 2 * segment_count - search_range;
        write_u16(writer, range_shift);

        for segment in &self.segments {
            write_u16(writer, segment.end_code);
        }
        write_u16(writer, 0); // reserved padding
        for segment in &self.segments {
            write_u16(writer, segment.start_code);
        }
        for segment in &self.segments {
            write_u16(writer, segment.id_delta);
        }
        for segment in &self.segments {
            write_u16(writer, segment.id_range_offset);
        }
        writer.extend_from_slice(self.glyph_id_array);
    }
}

impl SegmentedCoverage {
    fn subtable_len(&self) -> usize {
        16 + 12 * self.groups.len()
    }

    fn write(&self, writer: &mut Vec<u8>) {
        write_u16(writer, 12); // subtable format
        write_u16(writer, 0); // reserved

        write_u32(
            writer,
            self.subtable_len()
                .try_into()
                .expect("subtable_len overflow"),
        );
        write_u32(writer, 0); // language
        write_u32(
            writer,
            self.groups.len().try_into().expect("groups.len() overflow"),
        );
        for group in &self.groups {
            write_u32(writer, group.start_char_code);
            write_u32(writer, group.end_char_code);
            write_u32(writer, group.start_glyph_id);
        }
    }
}

impl<'a> NameTable<'a> {
    fn retains_record(record: &NameRecord<'_>, options: &SubsetOptions) -> bool {
        options.name_ids.contains(&record.name_id)
            && options.name_languages.contains(&record.language_id)
            && (options.name_legacy || record.is_unicode())
    }

    fn write_subset(&self, options: &SubsetOptions, writer: &mut Vec<u8>) {
        if options.retains_all_names() {
            writer.extend_from_slice(self.raw);
            return;
        }

        let records: Vec<_> = self
            .records
            .iter()
            .filter(|record| Self::retains_record(record, options))
            .collect();

        // Strings are deduplicated in the storage. The storage cannot exceed the original one,
        // so offsets fit into `u16`.
        let mut storage = vec![];
        let mut string_offsets = BTreeMap::<&'a [u8], u16>::new();
        let mut place_string = |string: &'a [u8]| {
            *string_offsets.entry(string).or_insert_with(|| {
                let offset = u16::try_from(storage.len()).expect("name storage overflow");
                storage.extend_from_slice(string);
                offset
            })
        };
        let record_offsets: Vec<_> = records
            .iter()
            .map(|record| place_string(record.string))
            .collect();
        let lang_tag_offsets: Vec<_> = self
            .lang_tags
            .iter()
            .map(|&tag| place_string(tag))
            .collect();

        let mut header_len = 6 + Self::RECORD_LEN * records.len();
        if self.format == 1 {
            header_len += 2 + 4 * self.lang_tags.len();
        }
        // `unwrap()`s are safe: there are no more records than in the original table.
        write_u16(writer, self.format);
        write_u16(writer, records.len().try_into().unwrap());
        write_u16(writer, header_len.try_into().expect("name header overflow"));

        for (record, offset) in records.iter().zip(record_offsets) {
            write_u16(writer, record.platform_id);
            write_u16(writer, record.encoding_id);
            write_u16(writer, record.language_id);
            write_u16(writer, record.name_id);
            write_u16(writer, record.string.len().try_into().unwrap());
            write_u16(writer, offset);
        }
        if self.format == 1 {
            write_u16(writer, self.lang_tags.len().try_into().unwrap());
            for (tag, offset) in self.lang_tags.iter().zip(lang_tag_offsets) {
                write_u16(writer, tag.len().try_into().unwrap());
                write_u16(writer, offset);
            }
        }
        writer.extend_from_slice(&storage);
    }
}

/// Retained glyphs of a font subset together with their new indices.
#[derive(Debug)]
pub(crate) struct GlyphMap<'a> {
    old_to_new: &'a BTreeMap<u16, u16>,
    retained: BTreeSet<u16>,
}

/// Retained glyph covered by a coverage table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CoveredGlyph {
    pub(crate) old: u16,
    pub(crate) new: u16,
    /// Index of the glyph in the original coverage table.
    pub(crate) coverage_idx: usize,
}

impl<'a> GlyphMap<'a> {
    /// Creates a map from the monotonic mapping of the original glyph indices to the new ones.
    pub(crate) fn new(old_to_new: &'a BTreeMap<u16, u16>) -> Self {
        Self {
            old_to_new,
            retained: old_to_new.keys().copied().collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.old_to_new.len()
    }

    pub(crate) fn get(&self, old: u16) -> Option<u16> {
        self.old_to_new.get(&old).copied()
    }

    /// Maps all glyphs in a sequence. Returns `None` if any of glyphs is not retained.
    pub(crate) fn map_all(&self, glyphs: &[u16]) -> Option<Vec<u16>> {
        glyphs.iter().map(|&old| self.get(old)).collect()
    }

    /// Iterates over `(old, new)` index pairs in the increasing order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.old_to_new.iter().map(|(&old, &new)| (old, new))
    }

    /// Returns retained glyphs covered by the coverage table, ordered by their new indices.
    pub(crate) fn covered(&self, coverage: Cursor<'_>) -> Result<Vec<CoveredGlyph>, ParseError> {
        let mut covered: Vec<_> = covered_glyphs(coverage, &self.retained)?
            .into_iter()
            .map(|(old, coverage_idx)| CoveredGlyph {
                old,
                new: self.old_to_new[&old],
                coverage_idx,
            })
            .collect();
        covered.sort_unstable_by_key(|glyph| glyph.new);
        covered.dedup_by_key(|glyph| glyph.new);
        Ok(covered)
    }

    /// Returns `(new_glyph, class)` pairs for retained glyphs with a non-zero class.
    pub(crate) fn classes(&self, class_def: &ClassDef) -> Vec<(u16, u16)> {
        self.iter()
            .filter_map(|(old, new)| {
                let class = class_def.class(old);
                (class != 0).then_some((new, class))
            })
            .collect()
    }
}

/// Subsets tables referencing glyphs by their indices. Tables are returned in the order
/// they should be written.
pub(crate) fn subset_glyph_tables(
    font: &Font<'_>,
    old_to_new: &BTreeMap<u16, u16>,
    options: &SubsetOptions,
) -> Result<Vec<(TableTag, Vec<u8>)>, ParseError> {
    let glyphs = GlyphMap::new(old_to_new);
    let glyph_count = font.glyph_count();
    let mut tables = vec![];

    if let (Some(vhea), Some(vmtx)) = (font.table(TableTag::VHEA), font.table(TableTag::VMTX)) {
        let (vhea, vmtx) = subset_vertical_metrics(vhea, vmtx, &glyphs, glyph_count)?;
        tables.push((TableTag::VHEA, vhea));
        tables.push((TableTag::VMTX, vmtx));
    }
    if options.hinting {
        if let Some(hdmx) = font.table(TableTag::HDMX) {
            tables.push((TableTag::HDMX, subset_hdmx(hdmx, &glyphs, glyph_count)?));
        }
        if let Some(ltsh) = font.table(TableTag::LTSH) {
            tables.push((TableTag::LTSH, subset_ltsh(ltsh, &glyphs, glyph_count)?));
        }
    }

    if options.retains_layout() {
        let features = &options.layout_features;
        for tag in [TableTag::GSUB, TableTag::GPOS] {
            if let Some(raw) = font.table(tag) {
                tables.push((tag, subset_layout_table(tag, raw, &glyphs, features)?));
            }
        }
        if let Some(gdef) = font.table(TableTag::GDEF) {
            tables.push((TableTag::GDEF, subset_gdef(gdef, &glyphs)?));
        }
        // `GPOS` supersedes kerning pairs for modern shapers
        let has_gpos = font.table(TableTag::GPOS).is_some();
        if let (Some(kern), false) = (font.table(TableTag::KERN), has_gpos) {
            if let Some(kern) = subset_kern(kern, &glyphs)? {
                tables.push((TableTag::KERN, kern));
            }
        }
    }
    Ok(tables)
}

impl FontSubset<'_> {
    /// Tables not referencing glyphs that are copied to the subset as-is if they are present
    /// in the font and retained according to [`Self::retains_table()`].
    const VERBATIM_TABLES: [TableTag; 2] = [TableTag::GASP, TableTag::VDMX];

    /// Serializes this subset to the OpenType format.
    pub fn to_truetype(&self) -> Vec<u8> {
        self.to_writer().into_opentype()
    }

    /// Serializes this subset to the WOFF2 format.
    pub fn to_woff2(&self) -> Vec<u8> {
        self.to_writer().into_woff2()
    }

    /// Checks whether a table from [`Self::VERBATIM_TABLES`] is retained.
    fn retains_table(&self, tag: TableTag) -> bool {
        match tag {
            TableTag::VDMX => self.options.hinting,
            _ => true,
        }
    }

    fn to_writer(&self) -> FontWriter {
        let hinting = self.options.hinting;
        let cmap = CmapTable::from_map(&self.char_map);

        let mut writer = FontWriter::default();
        writer.write_table(TableTag::CMAP, |buffer| cmap.write(buffer));
        if hinting {
            for tag in [TableTag::CVT, TableTag::FPGM] {
                if let Some(table) = self.font.table(tag) {
                    writer.write_raw_table(tag, table);
                }
            }
        }

        let number_of_h_metrics = writer.write_table(TableTag::HMTX, |buffer| {
            let metrics: Vec<_> = self
                .glyphs
                .iter()
                .map(|glyph| (glyph.advance, glyph.lsb))
                .collect();
            write_long_metrics(&metrics, buffer)
        });
        let mut hhea = self.font.hhea;
        hhea.number_of_h_metrics = number_of_h_metrics;
        writer.write_table(TableTag::HHEA, |buffer| {
            hhea.write(buffer);
        });

        writer.write_table(TableTag::MAXP, |buffer| {
            // `unwrap()` should be safe: the subset shouldn't contain >65536 glyphs because the original font doesn't.
            let glyph_count = self.glyphs.len().try_into().unwrap();
            Self::write_maxp_table(self.font.maxp, glyph_count, hinting, buffer);
        });

        writer.write_table(TableTag::NAME, |buffer| {
            self.font.name.write_subset(&self.options, buffer);
        });
        if let Some(os2) = self.font.os2 {
            writer.write_table(TableTag::OS2, |buffer| {
                let start = buffer.len();
                buffer.extend_from_slice(os2);
                self.patch_os2_table(&mut buffer[start..]);
            });
        }

        let post = self.font.post;
        writer.write_table(TableTag::POST, |buffer| {
            // Truncate the `post` table to not contain glyph names
            write_u32(buffer, 0x_0003_0000); // version
            buffer.extend_from_slice(&post[4..Font::POST_HEADER_LEN]);
        });

        if hinting {
            if let Some(prep) = self.font.table(TableTag::PREP) {
                writer.write_raw_table(TableTag::PREP, prep);
            }
        }

        let locations = writer.write_table(TableTag::GLYF, |buffer| {
            let mut locations = vec![0];
            let initial_offset = buffer.len();
            for glyph in &self.glyphs {
                glyph.inner.write(buffer, hinting);
                locations.push(buffer.len() - initial_offset);
            }
            locations
        });

        let loca_format = writer.write_table(TableTag::LOCA, |buffer| {
            LocaTable::write(&locations, buffer)
        });
        writer.write_table(TableTag::HEAD, |buffer| {
            Self::write_head_table(self.font.head, loca_format, buffer);
        });

        for tag in Self::VERBATIM_TABLES {
            if !self.retains_table(tag) {
                continue;
            }
            if let Some(table) = self.font.table(tag) {
                writer.write_raw_table(tag, table);
            }
        }
        for (tag, table) in &self.glyph_tables {
            writer.write_raw_table(*tag, table);
        }
        writer
    }

    fn write_maxp_table(original: &[u8], glyph_count: u16, hinting: bool, writer: &mut Vec<u8>) {
        /// Offset of `maxZones`; the following fields up to `maxSizeOfInstructions` inclusive
        /// only make sense for hinted fonts.
        const MAX_ZONES_OFFSET: usize = 14;
        const HINTING_FIELDS_END: usize = 28;

        // Patch the number of glyphs (u16 at bytes 4..6), and leave other bytes intact.
        let start = writer.len();
        writer.extend_from_slice(&original[..4]);
        write_u16(writer, glyph_count);
        writer.extend_from_slice(&original[6..]);

        if !hinting && original.len() >= Font::MAXP_V1_LEN {
            let fields = &mut writer[start + MAX_ZONES_OFFSET..start + HINTING_FIELDS_END];
            fields.fill(0);
            fields[..2].copy_from_slice(&1_u16.to_be_bytes()); // `maxZones` must be at least 1
        }
    }

    /// Updates `usFirstCharIndex` and `usLastCharIndex` to reflect mapped chars.
    fn patch_os2_table(&self, os2: &mut [u8]) {
        const FIRST_CHAR_OFFSET: usize = 64;
        const LAST_CHAR_OFFSET: usize = 66;

        if os2.len() < LAST_CHAR_OFFSET + 2 {
            return;
        }
        let (Some(&(first_char, _)), Some(&(last_char, _))) =
            (self.char_map.first(), self.char_map.last())
        else {
            return;
        };
        // Chars outside the BMP are recorded as 0xffff.
        let clamp = |ch: char| u16::try_from(u32::from(ch)).unwrap_or(u16::MAX);
        os2[FIRST_CHAR_OFFSET..FIRST_CHAR_OFFSET + 2]
            .copy_from_slice(&clamp(first_char).to_be_bytes());
        os2[LAST_CHAR_OFFSET..LAST_CHAR_OFFSET + 2].copy_from_slice(&clamp(last_char).to_be_bytes());
    }

    fn write_head_table(original: &[u8], loca_format: LocaFormat, writer: &mut Vec<u8>) {
        const LOCA_FORMAT_OFFSET: usize = 50;

        writer.extend_from_slice(&original[..Font::HEAD_CHECKSUM_OFFSET]);
        write_u32(writer, 0); // zero the checksum; it will be adjusted later
        writer.extend_from_slice(&original[Font::HEAD_CHECKSUM_OFFSET + 4..LOCA_FORMAT_OFFSET]);
        write_u16(
            writer,
            match loca_format {
                LocaFormat::Short => 0,
                LocaFormat::Long => 1,
            },
        );
        writer.extend_from_slice(&original[LOCA_FORMAT_OFFSET + 2..]);
    }
}

impl HheaTable<'_> {
    fn write(&self, writer: &mut Vec<u8>) {
        writer.extend_from_slice(&self.raw[..Self::EXPECTED_LEN - 2]);
        write_u16(writer, self.number_of_h_metrics);
    }
}

impl LocaTable<'_> {
    fn write(locations: &[usize], writer: &mut Vec<u8>) -> LocaFormat {
        let all_even = locations.iter().all(|&loc| loc % 2 == 0);
        let in_bounds = locations
            .last()
            .is_none_or(|&loc| loc <= usize::from(u16::MAX) * 2);
        if all_even && in_bounds {
            for &loc in locations {
                #[allow(clippy::cast_possible_truncation)]
                // doesn't happen due to the preceding check
                write_u16(writer, (loc / 2) as u16);
            }
            LocaFormat::Short
        } else {
            for &loc in locations {
                write_u32(writer, u32::try_from(loc).expect("glyph location overflow"));
            }
            LocaFormat::Long
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(test, derive(PartialEq))]
struct TableRecord {
    tag: TableTag,
    checksum: u32,
    /// Offset is initially recorded relative to the table data start. It's always 4-byte aligned.
    offset: u32,
    length: u32,
}

impl TableRecord {
    const BYTE_LEN: usize = 16;

    /// Tags encoded in WOFF2 table directory flags by their index.
    const WOFF2_KNOWN_TAGS: [TableTag; 32] = [
        TableTag::CMAP,
        TableTag::HEAD,
        TableTag::HHEA,
        TableTag::HMTX,
        TableTag::MAXP,
        TableTag::NAME,
        TableTag::OS2,
        TableTag::POST,
        TableTag::CVT,
        TableTag::FPGM,
        TableTag::GLYF,
        TableTag::LOCA,
        TableTag::PREP,
        TableTag(*b"CFF "),
        TableTag(*b"VORG"),
        TableTag(*b"EBDT"),
        TableTag(*b"EBLC"),
        TableTag::GASP,
        TableTag::HDMX,
        TableTag::KERN,
        TableTag::LTSH,
        TableTag(*b"PCLT"),
        TableTag::VDMX,
        TableTag::VHEA,
        TableTag::VMTX,
        TableTag::BASE,
        TableTag::GDEF,
        TableTag::GPOS,
        TableTag::GSUB,
        TableTag(*b"EBSC"),
        TableTag::JSTF,
        TableTag::MATH,
    ];
    /// Flags value signaling that the tag is written explicitly after the flags.
    const WOFF2_ARBITRARY_TAG: u8 = 63;

    fn write_opentype(&self, writer: &mut Vec<u8>) {
        writer.extend_from_slice(&self.tag.0);
        write_u32(writer, self.checksum);
        write_u32(writer, self.offset);
        write_u32(writer, self.length);
    }

    fn self_checksum(&self) -> u32 {
        u32::from_be_bytes(self.tag.0)
            .wrapping_add(self.checksum)
            .wrapping_add(self.offset)
            .wrapping_add(self.length)
    }

    fn woff2_known_tag(&self) -> Option<u8> {
        let idx = Self::WOFF2_KNOWN_TAGS
            .iter()
            .position(|&tag| tag == self.tag)?;
        u8::try_from(idx).ok()
    }

    fn woff2_len(&self) -> usize {
        let tag_len = if self.woff2_known_tag().is_some() {
            0
        } else {
            4
        };
        1 /* flags */ + tag_len + uint_base128_len(self.length)
    }

    fn write_woff2(&self, buffer: &mut Vec<u8>) {
        const NULL_TRANSFORM: u8 = 0b_1100_0000;

        if let Some(mut flags) = self.woff2_known_tag() {
            if matches!(self.tag, TableTag::GLYF | TableTag::LOCA) {
                flags |= NULL_TRANSFORM;
            }
            buffer.push(flags);
        } else {
            buffer.push(Self::WOFF2_ARBITRARY_TAG);
            buffer.extend_from_slice(&self.tag.0);
        }
        write_uint_base128(buffer, self.length);
    }
}

#[derive(Debug, Clone, Default)]
struct FontWriter {
    tables: Vec<TableRecord>,
    /// Contains *aligned* table data
    table_data: Vec<u8>,
}

impl FontWriter {
    const SFNT_HEADER_LEN: usize = 12;
    const WOFF2_HEADER_LEN: usize = 48;

    fn write_table<T>(&mut self, tag: TableTag, with: impl FnOnce(&mut Vec<u8>) -> T) -> T {
        let offset = self.table_data.len();
        debug_assert_eq!(offset % 4, 0, "unaligned offset: {offset}");

        let output = with(&mut self.table_data);
        let length = self.table_data.len() - offset;
        // Pad the table heap to a 4-byte boundary.
        if length % 4 > 0 {
            let zero_padding = 4 - length % 4;
            self.table_data.extend(iter::repeat_n(0_u8, zero_padding));
        }

        let checksum = Font::checksum(&self.table_data[offset..]);
        self.tables.push(TableRecord {
            tag,
            checksum,
            offset: u32::try_from(offset).expect("table offset overflow"),
            length: u32::try_from(length).expect("table length overflow"),
        });
        output
    }

    fn write_raw_table(&mut self, tag: TableTag, content: &[u8]) {
        self.write_table(tag, |buffer| buffer.extend_from_slice(content));
    }

    fn write_sfnt_header(&self) -> Vec<u8> {
        let mut buffer = vec![];
        write_u32(&mut buffer, Font::SFNT_VERSION);

        // `unwrap()`s are safe: we don't have many tables written.
        let table_count = u16::try_from(self.tables.len()).unwrap();
        write_u16(&mut buffer, table_count);
        let entry_selector = u16::try_from(table_count.ilog2()).unwrap();
        let search_range = 1 << (4 + entry_selector);
        write_u16(&mut buffer, search_range);
        write_u16(&mut buffer, entry_selector);
        let range_shift = 16 * table_count - search_range;
        write_u16(&mut buffer, range_shift);

        debug_assert_eq!(buffer.len(), Self::SFNT_HEADER_LEN);
        buffer
    }

    /// Returns the starting offset of table data.
    fn data_offset(&self) -> usize {
        Self::SFNT_HEADER_LEN + self.tables.len() * TableRecord::BYTE_LEN
    }

    fn into_opentype(mut self) -> Vec<u8> {
        let mut buffer = self.write_sfnt_header();
        self.adjust_data(Font::checksum(&buffer));

        self.tables.sort_unstable_by_key(|record| record.tag);
        for record in &self.tables {
            record.write_opentype(&mut buffer);
        }
        buffer.extend(self.table_data);
        buffer
    }

    fn adjust_data(&mut self, sfnt_header_checksum: u32) {
        let data_offset = self.data_offset();
        let data_offset_u32 = u32::try_from(data_offset).expect("data_offset overflow");

        let mut file_checksum = sfnt_header_checksum;
        for record in &mut self.tables {
            record.offset += data_offset_u32;
            file_checksum = file_checksum
                .wrapping_add(record.self_checksum())
                .wrapping_add(record.checksum);
        }
        self.patch_head_table(file_checksum, data_offset);
    }

    fn checksum_adjustment_offset(&self) -> usize {
        let head_table = self
            .tables
            .iter()
            .find(|record| record.tag == TableTag::HEAD)
            .expect("head table is always present");
        head_table.offset as usize + Font::HEAD_CHECKSUM_OFFSET
    }

    fn patch_head_table(&mut self, file_checksum: u32, data_offset: usize) {
        let checksum_adjustment = Font::SFNT_CHECKSUM.wrapping_sub(file_checksum);

        // At this point, the table offset already includes the heap offset, so we need to subtract it.
        let offset = self.checksum_adjustment_offset() - data_offset;
        self.table_data[offset..offset + 4].copy_from_slice(&checksum_adjustment.to_be_bytes());
    }

    fn into_woff2(mut self) -> Vec<u8> {
        const WOFF2_SIGNATURE: u32 = 0x_774f_4632;

        self.adjust_data(Font::checksum(&self.write_sfnt_header()));

        let compressed_data = self.compress_data();
        let tables_len = self
            .tables
            .iter()
            .map(TableRecord::woff2_len)
            .sum::<usize>();
        let mut file_len = Self::WOFF2_HEADER_LEN + tables_len + compressed_data.len();
        if file_len % 4 != 0 {
            file_len += 4 - file_len % 4;
        }

        let mut buffer = vec![];
        write_u32(&mut buffer, WOFF2_SIGNATURE);
        write_u32(&mut buffer, Font::SFNT_VERSION);
        write_u32(
            &mut buffer,
            file_len.try_into().expect("file length overflow"),
        );
        // `unwrap()` is safe: we don't write many tables
        write_u16(&mut buffer, self.tables.len().try_into().unwrap());
        write_u16(&mut buffer, 0); // reserved

        let decompressed_len = self.data_offset() + self.table_data.len();
        // `unwrap`s are safe, since `file_len` fits into u32.
        write_u32(&mut buffer, decompressed_len.try_into().unwrap());
        write_u32(&mut buffer, compressed_data.len().try_into().unwrap());
        write_u32(&mut buffer, 0); // WOFF version
        write_u32(&mut buffer, 0); // metadata offset
        write_u32(&mut buffer, 0); // metadata length
        write_u32(&mut buffer, 0); // original metadata length
        write_u32(&mut buffer, 0); // private block offset
        write_u32(&mut buffer, 0); // private block length
        debug_assert_eq!(buffer.len(), Self::WOFF2_HEADER_LEN);

        for record in &self.tables {
            record.write_woff2(&mut buffer);
        }
        debug_assert_eq!(buffer.len(), Self::WOFF2_HEADER_LEN + tables_len);
        buffer.extend(compressed_data);

        // Pad `buffer` to be 4-byte aligned even though there are no metadata or private blocks.
        if buffer.len() % 4 != 0 {
            let padding = 4 - buffer.len() % 4;
            buffer.extend(iter::repeat_n(0, padding));
        }
        debug_assert_eq!(file_len, buffer.len());
        buffer
    }
}

impl Glyph<'_> {
    fn write(&self, writer: &mut Vec<u8>, hinting: bool) {
        match self {
            Self::Empty => { /* do nothing */ }
            Self::Simple {
                header,
                instructions,
                outline,
            } => {
                writer.extend_from_slice(header);
                let instructions: &[u8] = if hinting { instructions } else { &[] };
                // `unwrap()` is safe: the instructions length was read as `u16`
                write_u16(writer, instructions.len().try_into().unwrap());
                writer.extend_from_slice(instructions);
                writer.extend_from_slice(outline);
            }
            Self::Composite {
                header,
                components,
                instructions,
            } => {
                write_u16(writer, u16::MAX); // numberOfContours = -1
                writer.extend_from_slice(header);
                for component in components {
                    component.write(writer, hinting);
                }
                if hinting {
                    writer.extend_from_slice(instructions);
                }
            }
        }
    }
}

impl GlyphComponent {
    fn write(&self, writer: &mut Vec<u8>, hinting: bool) {
        let flags = if hinting {
            self.flags
        } else {
            self.flags & !Self::WE_HAVE_INSTRUCTIONS
        };
        write_u16(writer, flags);
        write_u16(writer, self.glyph_idx);
        match self.args {
            GlyphComponentArgs::U16(args) => write_u16(writer, args),
            GlyphComponentArgs::U32(args) => write_u32(writer, args),
        }
        match self.transform {
            TransformData::None => { /* do nothing */ }
            TransformData::Scale(val) => write_u16(writer, val),
            TransformData::TwoScales([x, y]) => {
                write_u16(writer, x);
                write_u16(writer, y);
            }
            TransformData::Affine([xx, xy, yx, yy]) => {
                write_u16(writer, xx);
                write_u16(writer, xy);
                write_u16(writer, yx);
                write_u16(writer, yy);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{borrow::Cow, collections::BTreeSet};

    use allsorts::{binary::read::ReadScope, font_data::FontData, tables::FontTableProvider};
    use test_casing::{test_casing, Product};

    use super::*;
    use crate::{
        tests::{TestCharSubset, TestFont, FONTS, LIGHT_FONT, MONO_FONT, SUBSET_CHARS},
        Selection,
    };

    fn tags(writer: &FontWriter) -> BTreeSet<TableTag> {
        writer.tables.iter().map(|record| record.tag).collect()
    }

    fn table_data<'a>(writer: &'a FontWriter, tag: TableTag) -> &'a [u8] {
        let record = writer
            .tables
            .iter()
            .find(|record| record.tag == tag)
            .unwrap();
        let start = record.offset as usize;
        &writer.table_data[start..start + record.length as usize]
    }

    #[test]
    fn leb128_encoding() {
        let samples = &[
            (0_u32, &[0_u8] as &[u8]),
            (1, &[1]),
            (127, &[127]),
            (128, &[0x81, 0]),
            (129, &[0x81, 1]),
            (16_383, &[0xff, 0x7f]),
            (16_384, &[0x81, 0x80, 0]),
        ];
        for &(val, expected) in samples {
            assert_eq!(uint_base128_len(val), expected.len());
            let mut buffer = vec![];
            write_uint_base128(&mut buffer, val);
            assert_eq!(buffer, expected);
        }
    }

    #[test]
    fn woff2_flags_for_known_and_arbitrary_tags() {
        let record = |tag| TableRecord {
            tag,
            checksum: 0,
            offset: 0,
            length: 200,
        };

        let mut buffer = vec![];
        record(TableTag::GSUB).write_woff2(&mut buffer);
        assert_eq!(buffer, [28, 0x81, 0x48]);
        assert_eq!(record(TableTag::GSUB).woff2_len(), buffer.len());

        buffer.clear();
        record(TableTag::LOCA).write_woff2(&mut buffer);
        assert_eq!(buffer, [11 | 0xc0, 0x81, 0x48]);

        buffer.clear();
        let custom = record(TableTag::new(*b"FFTM"));
        custom.write_woff2(&mut buffer);
        assert_eq!(buffer, [63, b'F', b'F', b'T', b'M', 0x81, 0x48]);
        assert_eq!(custom.woff2_len(), buffer.len());
    }

    #[test]
    fn cmap_has_unicode_and_windows_records() {
        let cmap = CmapTable::from_map(&[('A', 1), ('B', 2), ('Z', 3)]);
        let mut buffer = vec![];
        cmap.write(&mut buffer);
        assert_eq!(buffer[..4], [0, 0, 0, 2]);
        assert_eq!(buffer[4..12], [0, 0, 0, 3, 0, 0, 0, 20]);
        assert_eq!(buffer[12..20], [0, 3, 0, 1, 0, 0, 0, 20]);
        assert_eq!(buffer[20..22], [0, 4]); // subtable format

        let CmapTable::Deltas(deltas) = &cmap else {
            panic!("unexpected cmap: {cmap:?}");
        };
        assert_eq!(deltas.segments.len(), 3); // A..=B, Z, and the terminating segment
    }

    #[test_casing(10, Product((FONTS, SUBSET_CHARS)))]
    fn woff2_tables_are_written_correctly(font: TestFont, chars: TestCharSubset) {
        let font = Font::new(font.bytes).unwrap();
        let writer = font
            .subset(&chars.into_set(), &SubsetOptions::default())
            .unwrap()
            .to_writer();
        let FontWriter {
            tables, table_data, ..
        } = writer.clone();
        let woff2 = writer.into_woff2();

        let font_file = ReadScope::new(&woff2).read::<FontData>().unwrap();
        let font_provider = font_file.table_provider(0).unwrap();
        for record in &tables {
            println!("Testing table: {:?}", record.tag);
            let mut table_contents = font_provider
                .read_table_data(u32::from_be_bytes(record.tag.0))
                .unwrap();
            let start = record.offset as usize;
            let end = start + record.length as usize;

            if record.tag == TableTag::HEAD {
                let mut patched = table_contents.into_owned();
                patched[Font::HEAD_CHECKSUM_OFFSET..Font::HEAD_CHECKSUM_OFFSET + 4]
                    .copy_from_slice(&[0; 4]);
                table_contents = Cow::Owned(patched);
            }
            assert_eq!(table_contents.as_ref(), &table_data[start..end]);
        }

        allsorts::Font::new(font_provider).unwrap();
    }

    #[test]
    fn layout_and_hinting_tables_are_retained_by_default() {
        let font = Font::new(MONO_FONT.bytes).unwrap();
        let chars = ('a'..='z').collect();
        let writer = font
            .subset(&chars, &SubsetOptions::default())
            .unwrap()
            .to_writer();
        let tags = tags(&writer);
        for tag in [
            TableTag::GSUB,
            TableTag::GPOS,
            TableTag::GDEF,
            TableTag::CVT,
            TableTag::FPGM,
            TableTag::PREP,
            TableTag::GASP,
        ] {
            assert!(tags.contains(&tag), "{tag} is missing: {tags:?}");
        }
        assert!(!tags.contains(&TableTag::new(*b"FFTM")), "{tags:?}");
    }

    #[test]
    fn stripping_hinting_and_layout() {
        let options = SubsetOptions {
            layout_features: Selection::none(),
            hinting: false,
            ..SubsetOptions::default()
        };
        let font = Font::new(MONO_FONT.bytes).unwrap();
        let chars = ('a'..='z').collect();
        let subset = font.subset(&chars, &options).unwrap();
        let writer = subset.to_writer();

        let tags = tags(&writer);
        let expected_tags = [
            TableTag::CMAP,
            TableTag::HMTX,
            TableTag::HHEA,
            TableTag::MAXP,
            TableTag::NAME,
            TableTag::OS2,
            TableTag::POST,
            TableTag::GLYF,
            TableTag::LOCA,
            TableTag::HEAD,
            TableTag::GASP,
        ];
        assert_eq!(tags, BTreeSet::from(expected_tags));

        let maxp = table_data(&writer, TableTag::MAXP);
        let glyph_count = u16::try_from(subset.glyph_count()).unwrap();
        assert_eq!(maxp[4..6], glyph_count.to_be_bytes());
        assert_eq!(maxp[14..16], [0, 1]); // maxZones
        assert!(maxp[16..28].iter().all(|&byte| byte == 0), "{maxp:?}");

        // All simple glyphs must have zero-length instructions.
        let ttf = subset.to_truetype();
        let stripped = Font::new(&ttf).unwrap();
        for idx in 0..stripped.glyph_count() {
            let glyph = stripped.glyph(idx).unwrap();
            match glyph.inner {
                Glyph::Simple { instructions, .. } => assert!(instructions.is_empty()),
                Glyph::Composite { instructions, .. } => assert!(instructions.is_empty()),
                Glyph::Empty => {}
            }
        }
    }

    #[test]
    fn os2_char_range_is_patched() {
        let font = Font::new(LIGHT_FONT.bytes).unwrap();
        let chars = BTreeSet::from(['A', 'é', '…']);
        let writer = font
            .subset(&chars, &SubsetOptions::default())
            .unwrap()
            .to_writer();
        let os2 = table_data(&writer, TableTag::OS2);
        assert_eq!(os2[64..66], 0x41_u16.to_be_bytes());
        assert_eq!(os2[66..68], 0x2026_u16.to_be_bytes());
    }

    #[test]
    fn filtering_name_records() {
        #[rustfmt::skip]
        let raw = [
            0, 0, // format
            0, 3, // count
            0, 42, // storage offset
            0, 1, 0, 0, 0, 0, 0, 1, 0, 4, 0, 0, // Mac Roman family name
            0, 3, 0, 1, 0x04, 0x09, 0, 1, 0, 4, 0, 4, // Windows family name
            0, 3, 0, 1, 0x04, 0x09, 0, 2, 0, 4, 0, 8, // Windows subfamily name
            b'A', b'b', b'c', b'd', 0, b'A', 0, b'b', 0, b'A', 0, b'b',
        ];
        let table = NameTable::parse(&raw).unwrap();

        let options = SubsetOptions::default();
        let mut buffer = vec![];
        table.write_subset(&options, &mut buffer);
        assert_eq!(buffer, raw);

        let options = SubsetOptions {
            name_legacy: false,
            ..SubsetOptions::default()
        };
        let mut buffer = vec![];
        table.write_subset(&options, &mut buffer);
        let filtered = NameTable::parse(&buffer).unwrap();
        assert_eq!(filtered.records.len(), 2);
        assert!(filtered.records.iter().all(|record| record.is_unicode()));
        // The equal strings must be deduplicated.
        assert_eq!(buffer.len(), 6 + 2 * NameTable::RECORD_LEN + 4);

        let options = SubsetOptions {
            name_ids: [2].into_iter().collect(),
            ..SubsetOptions::default()
        };
        let mut buffer = vec![];
        table.write_subset(&options, &mut buffer);
        let filtered = NameTable::parse(&buffer).unwrap();
        assert_eq!(filtered.records.len(), 1);
        assert_eq!(filtered.records[0].name_id, 2);
        assert_eq!(filtered.records[0].string, [0, b'A', 0, b'b']);
    }

    #[test]
    fn filtering_name_records_in_real_font() {
        let options = SubsetOptions {
            name_ids: [1, 2].into_iter().collect(),
            name_languages: [0x0409].into_iter().collect(),
            name_legacy: false,
            ..SubsetOptions::default()
        };
        let font = Font::new(LIGHT_FONT.bytes).unwrap();
        let original_len = font.name.raw.len();
        let writer = font
            .subset(&BTreeSet::from(['A']), &options)
            .unwrap()
            .to_writer();
        let name = table_data(&writer, TableTag::NAME);
        assert!(name.len() < original_len);

        let name = NameTable::parse(name).unwrap();
        assert!(!name.records.is_empty());
        for record in &name.records {
            assert!(matches!(record.name_id, 1 | 2), "{record:?}");
            assert_eq!(record.language_id, 0x0409);
            assert!(record.is_unicode());
        }
    }
}
