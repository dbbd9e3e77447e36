use core::{fmt, ops};

use crate::TableTag;

/// Errors that can occur when mapping a char to a glyph using the `cmap` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MapError {
    /// Offset into the glyph ID array of a `cmap` subtable is out of bounds.
    InvalidOffset,
    /// Mapped glyph ID does not fit into `u16`.
    GlyphIdOverflow(u32),
}

impl fmt::Display for MapError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOffset => formatter.write_str("invalid offset into the glyph ID array"),
            Self::GlyphIdOverflow(id) => write!(formatter, "glyph ID {id} does not fit into u16"),
        }
    }
}

impl std::error::Error for MapError {}

/// Kind of a font [`ParseError`].
#[derive(Debug)]
#[non_exhaustive]
pub enum ParseErrorKind {
    /// Unexpected end of the font data.
    UnexpectedEof,
    /// Unexpected font version.
    UnexpectedFontVersion(u32),
    /// The font has CFF outlines, which are not supported.
    CffOutlines,
    /// Missing required font table (e.g., `head`).
    MissingTable,
    /// No supported subtable in the `cmap` table.
    NoSupportedCmap,
    /// Range inferred from the table data is out of bounds.
    RangeOutOfBounds {
        /// Inferred range.
        range: ops::Range<usize>,
        /// Length of the indexed data.
        len: usize,
    },
    /// Unexpected table version.
    UnexpectedTableVersion(u32),
    /// Unexpected table length.
    UnexpectedTableLen {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
    /// Unexpected table format (e.g., for a `cmap` subtable).
    UnexpectedTableFormat(u16),
    /// Glyph index is not less than the number of glyphs in the font.
    GlyphOutOfRange(u16),
    /// Composite glyph references itself, directly or via other composite glyphs.
    CyclicComposite(u16),
    /// Offset in a rewritten layout table does not fit into its field.
    OffsetOverflow,
    /// Error mapping a char to a glyph.
    Map(MapError),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => formatter.write_str("unexpected end of the font data"),
            Self::UnexpectedFontVersion(version) => {
                write!(formatter, "unexpected font version ({version:#010x})")
            }
            Self::CffOutlines => formatter.write_str("fonts with CFF outlines are not supported"),
            Self::MissingTable => formatter.write_str("missing required font table"),
            Self::NoSupportedCmap => {
                formatter.write_str("no supported subtable in the `cmap` table")
            }
            Self::RangeOutOfBounds { range, len } => {
                write!(
                    formatter,
                    "range ({range:?}) inferred from the table data is out of bounds (..{len})"
                )
            }
            Self::UnexpectedTableVersion(val) => {
                write!(formatter, "unexpected table version ({val})")
            }
            Self::UnexpectedTableLen { expected, actual } => {
                write!(
                    formatter,
                    "unexpected table length: expected {expected}, got {actual}"
                )
            }
            Self::UnexpectedTableFormat(val) => {
                write!(formatter, "unexpected table format ({val})")
            }
            Self::GlyphOutOfRange(idx) => write!(formatter, "glyph #{idx} is out of range"),
            Self::CyclicComposite(idx) => {
                write!(formatter, "composite glyph #{idx} references itself")
            }
            Self::OffsetOverflow => {
                formatter.write_str("offset in the subset table does not fit into its field")
            }
            Self::Map(err) => write!(formatter, "failed mapping char to glyph: {err}"),
        }
    }
}

impl std::error::Error for ParseErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Map(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors that can occur when parsing an OpenType [`Font`](crate::Font).
#[derive(Debug)]
pub struct ParseError {
    pub(crate) kind: ParseErrorKind,
    pub(crate) offset: usize,
    pub(crate) table: Option<TableTag>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(table) = self.table {
            write!(formatter, "[{table}] ")?;
        }
        if self.offset > 0 {
            write!(formatter, "{}: ", self.offset)?;
        }
        fmt::Display::fmt(&self.kind, formatter)
    }
}

impl std::error::Error for ParseError {}

impl From<MapError> for ParseError {
    fn from(err: MapError) -> Self {
        Self {
            kind: ParseErrorKind::Map(err),
            offset: 0,
            table: Some(TableTag::CMAP),
        }
    }
}

impl ParseError {
    pub(crate) fn missing_table(tag: TableTag) -> Self {
        Self {
            kind: ParseErrorKind::MissingTable,
            offset: 0,
            table: Some(tag),
        }
    }

    pub(crate) fn glyph_out_of_range(glyph_idx: u16) -> Self {
        Self {
            kind: ParseErrorKind::GlyphOutOfRange(glyph_idx),
            offset: 0,
            table: Some(TableTag::LOCA),
        }
    }

    pub(crate) fn cyclic_composite(glyph_idx: u16) -> Self {
        Self {
            kind: ParseErrorKind::CyclicComposite(glyph_idx),
            offset: 0,
            table: Some(TableTag::GLYF),
        }
    }

    pub(crate) fn offset_overflow(table: TableTag) -> Self {
        Self {
            kind: ParseErrorKind::OffsetOverflow,
            offset: 0,
            table: Some(table),
        }
    }

    /// Gets the error kind.
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    /// Gets the table this error relates to.
    pub fn table(&self) -> Option<TableTag> {
        self.table
    }

    /// Gets the offset in the table data (or in the font data if the error is not related
    /// to a particular table).
    pub fn offset(&self) -> usize {
        self.offset
    }
}
