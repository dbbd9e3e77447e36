//! `Glyph` and related types.

use super::Cursor;
use crate::ParseError;

#[derive(Debug)]
pub(crate) enum Glyph<'a> {
    Empty,
    Simple {
        /// numberOfContours, bounding box, endPtsOfContours
        header: &'a [u8],
        /// Hinting instructions (without the length prefix)
        instructions: &'a [u8],
        /// Flags and coordinates (possibly with padding)
        outline: &'a [u8],
    },
    Composite {
        /// xMin, yMin, xMax, yMax
        header: [u8; 8],
        components: Vec<GlyphComponent>,
        /// Optional instructions after the last component descriptor, together with their length
        instructions: &'a [u8],
    },
}

impl<'a> Glyph<'a> {
    pub(super) fn new(raw: Cursor<'a>) -> Result<Self, ParseError> {
        if raw.bytes.is_empty() {
            return Ok(Self::Empty);
        }

        let mut cursor = raw;
        let number_of_contours = cursor.read_u16()?;
        if number_of_contours > i16::MAX as u16 {
            // Composite glyph
            let header = cursor.read_byte_array::<8>()?;
            let mut has_more_components = true;
            let mut components = Vec::with_capacity(1);
            while has_more_components {
                let (component, new_has_more_components) = GlyphComponent::new(&mut cursor)?;
                components.push(component);
                has_more_components = new_has_more_components;
            }
            Ok(Self::Composite {
                header,
                components,
                instructions: cursor.bytes,
            })
        } else {
            // Simple glyph
            let header_len = 10 + 2 * usize::from(number_of_contours);
            let mut cursor = raw;
            let header = cursor.split_at(header_len)?.bytes;
            let instructions_len = cursor.read_u16()?;
            let instructions = cursor.split_at(instructions_len.into())?.bytes;
            Ok(Self::Simple {
                header,
                instructions,
                outline: cursor.bytes,
            })
        }
    }

    pub(crate) fn component_indices(&self) -> impl Iterator<Item = u16> + '_ {
        let components = match self {
            Self::Composite { components, .. } => components.as_slice(),
            Self::Empty | Self::Simple { .. } => &[],
        };
        components.iter().map(|component| component.glyph_idx)
    }
}

#[derive(Debug)]
pub(crate) struct GlyphComponent {
    pub(crate) flags: u16,
    pub(crate) glyph_idx: u16,
    pub(crate) args: GlyphComponentArgs,
    pub(crate) transform: TransformData,
}

impl GlyphComponent {
    pub(crate) const WE_HAVE_INSTRUCTIONS: u16 = 0x0100;

    fn new(cursor: &mut Cursor<'_>) -> Result<(Self, bool), ParseError> {
        const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
        const WE_HAVE_A_SCALE: u16 = 0x0008;
        const MORE_COMPONENTS: u16 = 0x0020;
        const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
        const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

        let flags = cursor.read_u16()?;
        let glyph_idx = cursor.read_u16()?;
        let args = if flags & ARG_1_AND_2_ARE_WORDS != 0 {
            GlyphComponentArgs::U32(cursor.read_u32()?)
        } else {
            GlyphComponentArgs::U16(cursor.read_u16()?)
        };
        let transform = if flags & WE_HAVE_A_SCALE != 0 {
            TransformData::Scale(cursor.read_u16()?)
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            TransformData::TwoScales([cursor.read_u16()?, cursor.read_u16()?])
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            TransformData::Affine([
                cursor.read_u16()?,
                cursor.read_u16()?,
                cursor.read_u16()?,
                cursor.read_u16()?,
            ])
        } else {
            TransformData::None
        };
        let this = Self {
            flags,
            glyph_idx,
            args,
            transform,
        };

        let has_more_components = flags & MORE_COMPONENTS != 0;
        Ok((this, has_more_components))
    }
}

#[derive(Debug)]
pub(crate) enum GlyphComponentArgs {
    U16(u16),
    U32(u32),
}

#[derive(Debug)]
pub(crate) enum TransformData {
    None,
    Scale(u16),
    TwoScales([u16; 2]),
    Affine([u16; 4]),
}

/// [`Glyph`] together with metrics read from the `hmtx` table.
#[derive(Debug)]
pub(crate) struct GlyphWithMetrics<'a> {
    pub(crate) inner: Glyph<'a>,
    pub(crate) advance: u16,
    pub(crate) lsb: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_simple_glyph() {
        #[rustfmt::skip]
        let raw = [
            0, 1, // numberOfContours
            0, 0, 0, 0, 0, 10, 0, 10, // bbox
            0, 2, // endPtsOfContours
            0, 3, 0xb0, 0x01, 0x2f, // instructions
            0x01, 0x01, 0x01, 10, 0, 0, // flags + coordinates
        ];
        let glyph = Glyph::new(Cursor::new(&raw)).unwrap();
        let Glyph::Simple {
            header,
            instructions,
            outline,
        } = glyph
        else {
            panic!("unexpected glyph: {glyph:?}");
        };
        assert_eq!(header, &raw[..12]);
        assert_eq!(instructions, [0xb0, 0x01, 0x2f]);
        assert_eq!(outline, &raw[17..]);
    }

    #[test]
    fn parsing_composite_glyph() {
        #[rustfmt::skip]
        let raw = [
            0xff, 0xff, // numberOfContours
            0, 0, 0, 0, 0, 10, 0, 10, // bbox
            0x01, 0x23, 0, 5, 0, 0, 0, 0, // ARG_1_AND_2_ARE_WORDS | MORE_COMPONENTS | WE_HAVE_INSTRUCTIONS | ..
            0x00, 0x02, 0, 7, 1, 2, // ARGS_ARE_XY_VALUES
            0, 1, 0x2f, // instructions
        ];
        let glyph = Glyph::new(Cursor::new(&raw)).unwrap();
        assert_eq!(glyph.component_indices().collect::<Vec<_>>(), [5, 7]);
        let Glyph::Composite { instructions, .. } = glyph else {
            panic!("unexpected glyph: {glyph:?}");
        };
        assert_eq!(instructions, [0, 1, 0x2f]);
    }

    #[test]
    fn truncated_glyph_is_an_error() {
        let raw = [0, 1, 0, 0, 0, 0, 0, 10, 0, 10, 0];
        let err = Glyph::new(Cursor::new(&raw)).unwrap_err();
        assert!(err.to_string().contains("out of bounds"), "{err}");
    }
}
