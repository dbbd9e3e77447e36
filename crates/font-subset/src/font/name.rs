//! `name` table processing.

use super::{Cursor, TableTag};
use crate::{errors::ParseErrorKind, ParseError};

#[derive(Debug, Clone, Copy)]
pub(crate) struct NameRecord<'a> {
    pub(crate) platform_id: u16,
    pub(crate) encoding_id: u16,
    pub(crate) language_id: u16,
    pub(crate) name_id: u16,
    pub(crate) string: &'a [u8],
}

impl NameRecord<'_> {
    const UNICODE_PLATFORM: u16 = 0;
    const WINDOWS_PLATFORM: u16 = 3;

    /// Checks whether the record uses a Unicode encoding (as opposed to legacy encodings,
    /// such as Mac Roman).
    pub(crate) fn is_unicode(&self) -> bool {
        match self.platform_id {
            Self::UNICODE_PLATFORM => true,
            Self::WINDOWS_PLATFORM => matches!(self.encoding_id, 0 | 1 | 10),
            _ => false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct NameTable<'a> {
    pub(crate) raw: &'a [u8],
    pub(crate) format: u16,
    pub(crate) records: Vec<NameRecord<'a>>,
    /// Language tags (only present in format 1).
    pub(crate) lang_tags: Vec<&'a [u8]>,
}

impl<'a> NameTable<'a> {
    pub(crate) const RECORD_LEN: usize = 12;

    pub(crate) fn parse(raw: &'a [u8]) -> Result<Self, ParseError> {
        let table = Cursor::for_table(TableTag::NAME, raw);
        let mut cursor = table;
        let format = cursor.read_u16_checked(|format| match format {
            0 | 1 => Ok(format),
            _ => Err(ParseErrorKind::UnexpectedTableFormat(format)),
        })?;
        let count = cursor.read_u16()?;
        let storage = cursor.read_offset16(&table)?;

        let records = (0..count).map(|_| {
            let platform_id = cursor.read_u16()?;
            let encoding_id = cursor.read_u16()?;
            let language_id = cursor.read_u16()?;
            let name_id = cursor.read_u16()?;
            let string = Self::read_string(&mut cursor, &storage)?;
            Ok(NameRecord {
                platform_id,
                encoding_id,
                language_id,
                name_id,
                string,
            })
        });
        let records = records.collect::<Result<Vec<_>, ParseError>>()?;

        let lang_tags = if format == 1 {
            let lang_tag_count = cursor.read_u16()?;
            (0..lang_tag_count)
                .map(|_| Self::read_string(&mut cursor, &storage))
                .collect::<Result<_, _>>()?
        } else {
            vec![]
        };

        Ok(Self {
            raw,
            format,
            records,
            lang_tags,
        })
    }

    fn read_string(cursor: &mut Cursor<'a>, storage: &Cursor<'a>) -> Result<&'a [u8], ParseError> {
        let len = usize::from(cursor.read_u16()?);
        let offset = usize::from(cursor.read_u16()?);
        Ok(storage.range(offset..offset + len)?.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_name_table() {
        #[rustfmt::skip]
        let raw = [
            0, 0, // format
            0, 2, // count
            0, 30, // storage offset
            0, 1, 0, 0, 0, 0, 0, 1, 0, 4, 0, 0, // Mac Roman family name
            0, 3, 0, 1, 0x04, 0x09, 0, 1, 0, 4, 0, 4, // Windows family name
            b'A', b'b', b'c', b'd', 0, b'A', 0, b'b',
        ];
        let table = NameTable::parse(&raw).unwrap();
        assert_eq!(table.format, 0);
        assert!(table.lang_tags.is_empty());
        assert_eq!(table.records.len(), 2);

        assert!(!table.records[0].is_unicode());
        assert_eq!(table.records[0].string, b"Abcd");
        assert!(table.records[1].is_unicode());
        assert_eq!(table.records[1].language_id, 0x0409);
        assert_eq!(table.records[1].string, [0, b'A', 0, b'b']);
    }

    #[test]
    fn name_table_with_out_of_bounds_string() {
        #[rustfmt::skip]
        let raw = [
            0, 0, 0, 1, 0, 18,
            0, 3, 0, 1, 0x04, 0x09, 0, 1, 0, 8, 0, 0,
            0, b'A',
        ];
        let err = NameTable::parse(&raw).unwrap_err();
        assert_eq!(err.table(), Some(TableTag::NAME));
        assert!(matches!(
            err.kind(),
            ParseErrorKind::RangeOutOfBounds { len: 2, .. }
        ));
    }
}
