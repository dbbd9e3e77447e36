//! OpenType parsing logic.

use core::{fmt, ops};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) use self::{
    cmap::{CmapTable, SegmentDeltas, SegmentWithDelta, SegmentedCoverage, SequentialMapGroup},
    glyph::{Glyph, GlyphComponent, GlyphComponentArgs, GlyphWithMetrics, TransformData},
    gsub::{lookup_type as gsub_lookup_type, GsubTable},
    layout::{
        covered_glyphs, ClassDef, ContextSubtable, LayoutTable, Lookup, LookupRecord, RuleSets,
        SequenceRule,
    },
    name::{NameRecord, NameTable},
};
use crate::{
    errors::{MapError, ParseErrorKind},
    FontSubset, ParseError, SubsetOptions,
};

mod cmap;
mod glyph;
mod gsub;
mod layout;
mod name;

/// Cursor over font data that keeps track of the offset and the containing table
/// for error reporting.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'a> {
    pub(crate) bytes: &'a [u8],
    /// Offset of `bytes` relative to the start of the table (or the font data
    /// if `table` is not set).
    offset: usize,
    table: Option<TableTag>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            table: None,
        }
    }

    pub(crate) fn for_table(table: TableTag, bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            table: Some(table),
        }
    }

    pub(crate) fn err(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            offset: self.offset,
            table: self.table,
        }
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), ParseError> {
        if self.bytes.len() < len {
            return Err(self.err(ParseErrorKind::UnexpectedEof));
        }
        self.bytes = &self.bytes[len..];
        self.offset += len;
        Ok(())
    }

    /// Returns a cursor positioned at the specified offset from the current position.
    pub(crate) fn at(&self, offset: usize) -> Result<Self, ParseError> {
        let mut cursor = *self;
        cursor.skip(offset)?;
        Ok(cursor)
    }

    /// Returns a sub-cursor for the `range` relative to the current position.
    pub(crate) fn range(&self, range: ops::Range<usize>) -> Result<Self, ParseError> {
        let Some(bytes) = self.bytes.get(range.clone()) else {
            return Err(self.err(ParseErrorKind::RangeOutOfBounds {
                range,
                len: self.bytes.len(),
            }));
        };
        Ok(Self {
            bytes,
            offset: self.offset + range.start,
            table: self.table,
        })
    }

    /// Splits off the first `len` bytes and returns them as a separate cursor.
    pub(crate) fn split_at(&mut self, len: usize) -> Result<Self, ParseError> {
        let head = self.range(0..len)?;
        self.skip(len)?;
        Ok(head)
    }

    pub(crate) fn read_byte_array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let Some((head, _)) = self.bytes.split_first_chunk::<N>() else {
            return Err(self.err(ParseErrorKind::UnexpectedEof));
        };
        let head = *head;
        self.skip(N)?;
        Ok(head)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, ParseError> {
        self.read_byte_array().map(u16::from_be_bytes)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, ParseError> {
        self.read_byte_array().map(u32::from_be_bytes)
    }

    pub(crate) fn read_u16_checked<T>(
        &mut self,
        check: impl FnOnce(u16) -> Result<T, ParseErrorKind>,
    ) -> Result<T, ParseError> {
        let start = *self;
        let value = self.read_u16()?;
        check(value).map_err(|kind| start.err(kind))
    }

    pub(crate) fn read_u32_checked<T>(
        &mut self,
        check: impl FnOnce(u32) -> Result<T, ParseErrorKind>,
    ) -> Result<T, ParseError> {
        let start = *self;
        let value = self.read_u32()?;
        check(value).map_err(|kind| start.err(kind))
    }

    /// Reads a 16-bit offset and returns the cursor at this offset relative to `base`.
    pub(crate) fn read_offset16(&mut self, base: &Self) -> Result<Self, ParseError> {
        let offset = self.read_u16()?;
        base.at(offset.into())
    }

    /// Same as [`Self::read_offset16()`], but returns `None` for the zero (null) offset.
    pub(crate) fn read_nullable_offset16(
        &mut self,
        base: &Self,
    ) -> Result<Option<Self>, ParseError> {
        let offset = self.read_u16()?;
        if offset == 0 {
            return Ok(None);
        }
        base.at(offset.into()).map(Some)
    }

    /// Reads a 32-bit offset and returns the cursor at this offset relative to `base`.
    pub(crate) fn read_offset32(&mut self, base: &Self) -> Result<Self, ParseError> {
        let offset = self.read_u32()?;
        base.at(offset as usize)
    }

    pub(crate) fn read_nullable_offset32(
        &mut self,
        base: &Self,
    ) -> Result<Option<Self>, ParseError> {
        let offset = self.read_u32()?;
        if offset == 0 {
            return Ok(None);
        }
        base.at(offset as usize).map(Some)
    }

    /// Returns the first `len` bytes at the cursor position.
    pub(crate) fn bytes_prefix(&self, len: usize) -> Result<&'a [u8], ParseError> {
        self.range(0..len).map(|cursor| cursor.bytes)
    }

    pub(crate) fn read_u16_array(&mut self, len: usize) -> Result<Vec<u16>, ParseError> {
        (0..len).map(|_| self.read_u16()).collect()
    }
}

/// Four-byte tag of an OpenType table, e.g. `glyf`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableTag(pub(crate) [u8; 4]);

impl fmt::Debug for TableTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "TableTag({self})")
    }
}

impl fmt::Display for TableTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            let ch = if byte.is_ascii_graphic() || byte == b' ' {
                char::from(byte)
            } else {
                char::REPLACEMENT_CHARACTER
            };
            write!(formatter, "{ch}")?;
        }
        Ok(())
    }
}

impl TableTag {
    pub(crate) const CMAP: Self = Self(*b"cmap");
    pub(crate) const HEAD: Self = Self(*b"head");
    pub(crate) const HHEA: Self = Self(*b"hhea");
    pub(crate) const HMTX: Self = Self(*b"hmtx");
    pub(crate) const MAXP: Self = Self(*b"maxp");
    pub(crate) const NAME: Self = Self(*b"name");
    pub(crate) const OS2: Self = Self(*b"OS/2");
    pub(crate) const POST: Self = Self(*b"post");
    pub(crate) const LOCA: Self = Self(*b"loca");
    pub(crate) const GLYF: Self = Self(*b"glyf");
    pub(crate) const CVT: Self = Self(*b"cvt ");
    pub(crate) const FPGM: Self = Self(*b"fpgm");
    pub(crate) const PREP: Self = Self(*b"prep");
    pub(crate) const GASP: Self = Self(*b"gasp");
    pub(crate) const HDMX: Self = Self(*b"hdmx");
    pub(crate) const LTSH: Self = Self(*b"LTSH");
    pub(crate) const VDMX: Self = Self(*b"VDMX");
    pub(crate) const KERN: Self = Self(*b"kern");
    pub(crate) const VHEA: Self = Self(*b"vhea");
    pub(crate) const VMTX: Self = Self(*b"vmtx");
    pub(crate) const BASE: Self = Self(*b"BASE");
    pub(crate) const GDEF: Self = Self(*b"GDEF");
    pub(crate) const GPOS: Self = Self(*b"GPOS");
    pub(crate) const GSUB: Self = Self(*b"GSUB");
    pub(crate) const JSTF: Self = Self(*b"JSTF");
    pub(crate) const MATH: Self = Self(*b"MATH");

    /// Creates a tag from its byte representation.
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Returns the byte representation of this tag.
    pub const fn to_bytes(self) -> [u8; 4] {
        self.0
    }
}

/// Header of horizontal (`hhea`) or vertical (`vhea`) metrics. Both tables have the same layout
/// with the number of long metrics recorded in the last field.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HheaTable<'a> {
    pub(crate) raw: &'a [u8],
    pub(crate) number_of_h_metrics: u16,
}

impl<'a> HheaTable<'a> {
    pub(crate) const EXPECTED_LEN: usize = 36; // 18 words

    pub(crate) fn parse(tag: TableTag, raw: &'a [u8]) -> Result<Self, ParseError> {
        let mut cursor = Cursor::for_table(tag, raw);
        if raw.len() != Self::EXPECTED_LEN {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableLen {
                expected: Self::EXPECTED_LEN,
                actual: raw.len(),
            }));
        }
        cursor.skip(Self::EXPECTED_LEN - 2)?;
        Ok(Self {
            raw,
            number_of_h_metrics: cursor.read_u16()?,
        })
    }
}

/// Horizontal (`hmtx`) or vertical (`vmtx`) glyph metrics.
#[derive(Debug)]
pub(crate) struct HmtxTable<'a> {
    tag: TableTag,
    raw: &'a [u8],
    number_of_h_metrics: u16,
}

impl<'a> HmtxTable<'a> {
    pub(crate) fn new(
        tag: TableTag,
        raw: &'a [u8],
        number_of_h_metrics: u16,
        glyph_count: u16,
    ) -> Result<Self, ParseError> {
        let metrics_len = 4 * usize::from(number_of_h_metrics);
        let lsbs_len = 2 * usize::from(glyph_count.saturating_sub(number_of_h_metrics));
        let expected = metrics_len + lsbs_len;
        if number_of_h_metrics == 0 || raw.len() < expected {
            let cursor = Cursor::for_table(tag, raw);
            return Err(cursor.err(ParseErrorKind::UnexpectedTableLen {
                expected,
                actual: raw.len(),
            }));
        }
        Ok(Self {
            tag,
            raw,
            number_of_h_metrics,
        })
    }

    /// Returns the advance and the side bearing of the specified glyph.
    pub(crate) fn advance_and_lsb(&self, glyph_idx: u16) -> Result<(u16, u16), ParseError> {
        let table = Cursor::for_table(self.tag, self.raw);
        if glyph_idx < self.number_of_h_metrics {
            let mut cursor = table.at(usize::from(glyph_idx) * 4)?;
            Ok((cursor.read_u16()?, cursor.read_u16()?))
        } else {
            let advance_offset = usize::from(self.number_of_h_metrics - 1) * 4;
            let advance = table.at(advance_offset)?.read_u16()?;
            let lsb_offset = usize::from(self.number_of_h_metrics) * 4
                + usize::from(glyph_idx - self.number_of_h_metrics) * 2;
            let lsb = table.at(lsb_offset)?.read_u16()?;
            Ok((advance, lsb))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocaFormat {
    Short,
    Long,
}

impl LocaFormat {
    const fn bytes_per_offset(self) -> usize {
        match self {
            Self::Short => 2,
            Self::Long => 4,
        }
    }
}

#[derive(Debug)]
pub(crate) struct LocaTable<'a> {
    format: LocaFormat,
    cursor: Cursor<'a>,
}

impl<'a> LocaTable<'a> {
    fn new(format: LocaFormat, glyph_count: u16, raw: &'a [u8]) -> Result<Self, ParseError> {
        let cursor = Cursor::for_table(TableTag::LOCA, raw);
        let expected = format.bytes_per_offset() * (usize::from(glyph_count) + 1);
        if raw.len() < expected {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableLen {
                expected,
                actual: raw.len(),
            }));
        }
        Ok(Self { format, cursor })
    }

    fn glyph_range(&self, glyph_idx: u16) -> Result<ops::Range<usize>, ParseError> {
        let glyph_idx = usize::from(glyph_idx);
        let mut cursor = self.cursor.at(glyph_idx * self.format.bytes_per_offset())?;
        Ok(match self.format {
            LocaFormat::Short => {
                let start_offset = usize::from(cursor.read_u16()?) * 2;
                let end_offset = usize::from(cursor.read_u16()?) * 2;
                start_offset..end_offset
            }
            LocaFormat::Long => {
                let start_offset = cursor.read_u32()? as usize;
                let end_offset = cursor.read_u32()? as usize;
                start_offset..end_offset
            }
        })
    }
}

/// Parsed TrueType font (i.e., an OpenType font with `glyf` outlines).
///
/// Only the tables necessary for subsetting are parsed; other tables are kept as raw bytes.
#[derive(Debug)]
pub struct Font<'a> {
    tables: BTreeMap<TableTag, &'a [u8]>,
    pub(crate) cmap: CmapTable<'a>,
    pub(crate) head: &'a [u8],
    pub(crate) hhea: HheaTable<'a>,
    pub(crate) hmtx: HmtxTable<'a>,
    pub(crate) maxp: &'a [u8],
    pub(crate) glyph_count: u16,
    pub(crate) name: NameTable<'a>,
    pub(crate) os2: Option<&'a [u8]>,
    pub(crate) post: &'a [u8],
    pub(crate) loca: LocaTable<'a>,
    pub(crate) glyf: &'a [u8],
}

impl<'a> Font<'a> {
    pub(crate) const SFNT_VERSION: u32 = 0x_0001_0000;
    const APPLE_SFNT_VERSION: u32 = u32::from_be_bytes(*b"true");
    const CFF_SFNT_VERSION: u32 = u32::from_be_bytes(*b"OTTO");
    /// Magic number used to compute `checksumAdjustment` in the `head` table.
    pub(crate) const SFNT_CHECKSUM: u32 = 0x_b1b0_afba;
    pub(crate) const HEAD_CHECKSUM_OFFSET: usize = 8;
    const HEAD_LEN: usize = 54;
    pub(crate) const POST_HEADER_LEN: usize = 32;
    pub(crate) const MAXP_V1_LEN: usize = 32;

    /// Parses a font from its binary representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the font data is malformed, does not contain one of required tables,
    /// or has CFF outlines.
    pub fn new(bytes: &'a [u8]) -> Result<Self, ParseError> {
        let font_cursor = Cursor::new(bytes);
        let mut cursor = font_cursor;
        cursor.read_u32_checked(|version| match version {
            Self::SFNT_VERSION | Self::APPLE_SFNT_VERSION => Ok(()),
            Self::CFF_SFNT_VERSION => Err(ParseErrorKind::CffOutlines),
            _ => Err(ParseErrorKind::UnexpectedFontVersion(version)),
        })?;
        let table_count = cursor.read_u16()?;
        cursor.skip(6)?; // searchRange, entrySelector, rangeShift

        let mut tables = BTreeMap::new();
        for _ in 0..table_count {
            let tag = TableTag(cursor.read_byte_array()?);
            cursor.skip(4)?; // checksum
            let offset = cursor.read_u32()? as usize;
            let len = cursor.read_u32()? as usize;
            let table = font_cursor.range(offset..offset.saturating_add(len))?;
            tables.insert(tag, table.bytes);
        }

        let required = |tag: TableTag| {
            tables
                .get(&tag)
                .copied()
                .ok_or_else(|| ParseError::missing_table(tag))
        };

        let head = required(TableTag::HEAD)?;
        let loca_format = Self::parse_loca_format(head)?;
        let maxp = required(TableTag::MAXP)?;
        let glyph_count = Self::parse_glyph_count(maxp)?;
        let loca = LocaTable::new(loca_format, glyph_count, required(TableTag::LOCA)?)?;
        let hhea = HheaTable::parse(TableTag::HHEA, required(TableTag::HHEA)?)?;
        let hmtx = HmtxTable::new(
            TableTag::HMTX,
            required(TableTag::HMTX)?,
            hhea.number_of_h_metrics,
            glyph_count,
        )?;
        let post = required(TableTag::POST)?;
        if post.len() < Self::POST_HEADER_LEN {
            return Err(
                Cursor::for_table(TableTag::POST, post).err(ParseErrorKind::UnexpectedTableLen {
                    expected: Self::POST_HEADER_LEN,
                    actual: post.len(),
                }),
            );
        }

        Ok(Self {
            cmap: CmapTable::parse(Cursor::for_table(TableTag::CMAP, required(TableTag::CMAP)?))?,
            head,
            hhea,
            hmtx,
            maxp,
            glyph_count,
            name: NameTable::parse(required(TableTag::NAME)?)?,
            os2: tables.get(&TableTag::OS2).copied(),
            post,
            loca,
            glyf: required(TableTag::GLYF)?,
            tables,
        })
    }

    fn parse_loca_format(head: &[u8]) -> Result<LocaFormat, ParseError> {
        const LOCA_FORMAT_OFFSET: usize = 50;

        let mut cursor = Cursor::for_table(TableTag::HEAD, head);
        if head.len() != Self::HEAD_LEN {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableLen {
                expected: Self::HEAD_LEN,
                actual: head.len(),
            }));
        }
        cursor.read_u32_checked(|version| {
            if version == 0x_0001_0000 {
                Ok(())
            } else {
                Err(ParseErrorKind::UnexpectedTableVersion(version))
            }
        })?;
        cursor.skip(LOCA_FORMAT_OFFSET - 4)?;
        // ^ fontRevision, checksumAdjustment, magicNumber, flags, unitsPerEm, created, modified,
        // bounding box, macStyle, lowestRecPPEM, fontDirectionHint

        cursor.read_u16_checked(|format| match format {
            0 => Ok(LocaFormat::Short),
            1 => Ok(LocaFormat::Long),
            _ => Err(ParseErrorKind::UnexpectedTableFormat(format)),
        })
    }

    fn parse_glyph_count(maxp: &[u8]) -> Result<u16, ParseError> {
        let mut cursor = Cursor::for_table(TableTag::MAXP, maxp);
        let version = cursor.read_u32_checked(|version| match version {
            0x_0000_5000 | 0x_0001_0000 => Ok(version),
            _ => Err(ParseErrorKind::UnexpectedTableVersion(version)),
        })?;
        if version == 0x_0001_0000 && maxp.len() < Self::MAXP_V1_LEN {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableLen {
                expected: Self::MAXP_V1_LEN,
                actual: maxp.len(),
            }));
        }
        cursor.read_u16()
    }

    /// Computes the OpenType checksum of the provided data, treating it as a sequence
    /// of big-endian `u32`s padded with zeros.
    pub(crate) fn checksum(data: &[u8]) -> u32 {
        let mut chunks = data.chunks_exact(4);
        let mut sum = chunks
            .by_ref()
            .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .fold(0_u32, u32::wrapping_add);
        let remainder = chunks.remainder();
        if !remainder.is_empty() {
            let mut last = [0_u8; 4];
            last[..remainder.len()].copy_from_slice(remainder);
            sum = sum.wrapping_add(u32::from_be_bytes(last));
        }
        sum
    }

    /// Returns raw data for the specified table, if it is present in the font.
    pub fn table(&self, tag: TableTag) -> Option<&'a [u8]> {
        self.tables.get(&tag).copied()
    }

    /// Returns the number of glyphs in this font as recorded in the `maxp` table.
    pub fn glyph_count(&self) -> u16 {
        self.glyph_count
    }

    /// Maps a char to a glyph index using the `cmap` table. Returns 0 (the missing glyph index)
    /// if the char is not mapped by the font.
    ///
    /// # Errors
    ///
    /// Returns an error if the `cmap` subtable data is malformed.
    pub fn map_char(&self, ch: char) -> Result<u16, MapError> {
        self.cmap.map_char(ch)
    }

    pub(crate) fn glyph(&self, glyph_idx: u16) -> Result<GlyphWithMetrics<'a>, ParseError> {
        if glyph_idx >= self.glyph_count {
            return Err(ParseError::glyph_out_of_range(glyph_idx));
        }
        let range = self.loca.glyph_range(glyph_idx)?;
        let raw = Cursor::for_table(TableTag::GLYF, self.glyf).range(range)?;
        let inner = Glyph::new(raw)?;
        let (advance, lsb) = self.hmtx.advance_and_lsb(glyph_idx)?;
        Ok(GlyphWithMetrics {
            inner,
            advance,
            lsb,
        })
    }

    /// Creates a subset of this font containing glyphs for the specified chars.
    ///
    /// # Errors
    ///
    /// Returns an error if the font data necessary for subsetting (e.g., glyph data) is malformed.
    pub fn subset(
        self,
        chars: &BTreeSet<char>,
        options: &SubsetOptions,
    ) -> Result<FontSubset<'a>, ParseError> {
        FontSubset::new(self, chars, options)
    }
}
