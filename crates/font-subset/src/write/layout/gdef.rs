//! `GDEF` table subsetting.

use super::{coverage_object, device_object, GlyphMap, Object, ObjectId, TableGraph};
use crate::{
    errors::ParseErrorKind,
    font::{ClassDef, Cursor},
    ParseError, TableTag,
};

const MAX_MINOR_VERSION: u16 = 3;

/// Rewrites the `GDEF` table for the retained glyphs.
pub(crate) fn subset_gdef(raw: &[u8], glyphs: &GlyphMap<'_>) -> Result<Vec<u8>, ParseError> {
    let table = Cursor::for_table(TableTag::GDEF, raw);
    let mut cursor = table;
    let major_version = cursor.read_u16_checked(|version| match version {
        1 => Ok(version),
        _ => Err(ParseErrorKind::UnexpectedTableVersion(version.into())),
    })?;
    let minor_version = cursor.read_u16()?.min(MAX_MINOR_VERSION);

    let mut graph = TableGraph::default();
    let glyph_classes = cursor.read_nullable_offset16(&table)?;
    let glyph_classes = class_def(&mut graph, glyphs, glyph_classes)?;
    let attach_list = cursor.read_nullable_offset16(&table)?;
    let attach_list = attach_list
        .map(|list| attach_list_object(&mut graph, glyphs, list))
        .transpose()?
        .flatten();
    let lig_caret_list = cursor.read_nullable_offset16(&table)?;
    let lig_caret_list = lig_caret_list
        .map(|list| lig_caret_list_object(&mut graph, glyphs, list))
        .transpose()?
        .flatten();
    let mark_attach_classes = cursor.read_nullable_offset16(&table)?;
    let mark_attach_classes = class_def(&mut graph, glyphs, mark_attach_classes)?;

    let mut header = Object::default();
    header.push_u16(major_version);
    header.push_u16(minor_version);
    header.push_offset16(glyph_classes);
    header.push_offset16(attach_list);
    header.push_offset16(lig_caret_list);
    header.push_offset16(mark_attach_classes);

    if minor_version >= 2 {
        let mark_glyph_sets = cursor
            .read_nullable_offset16(&table)?
            .map(|sets| mark_glyph_sets_object(&mut graph, glyphs, sets))
            .transpose()?;
        header.push_offset16(mark_glyph_sets);
    }
    if minor_version >= 3 {
        let var_store = cursor
            .read_nullable_offset32(&table)?
            .map(|store| var_store_object(&mut graph, store))
            .transpose()?;
        header.push_offset32(var_store);
    }

    let root = graph.add(header);
    graph
        .pack(root)
        .map_err(|_| ParseError::offset_overflow(TableTag::GDEF))
}

fn class_def(
    graph: &mut TableGraph,
    glyphs: &GlyphMap<'_>,
    table: Option<Cursor<'_>>,
) -> Result<Option<ObjectId>, ParseError> {
    let Some(table) = table else {
        return Ok(None);
    };
    let classes = glyphs.classes(&ClassDef::parse(Some(table))?);
    Ok(Some(graph.add(super::class_def_object(&classes))))
}

/// Reads an array of offsets to per-glyph tables indexed by the coverage, and writes tables
/// for the retained glyphs using `write_item`.
fn covered_items(
    graph: &mut TableGraph,
    glyphs: &GlyphMap<'_>,
    list: Cursor<'_>,
    mut write_item: impl FnMut(&mut TableGraph, Cursor<'_>) -> Result<Object, ParseError>,
) -> Result<Option<ObjectId>, ParseError> {
    let mut cursor = list;
    let coverage = cursor.read_offset16(&list)?;
    let count = cursor.read_u16()?;
    let offsets = cursor;

    let mut covered = vec![];
    let mut items = vec![];
    for glyph in glyphs.covered(coverage)? {
        if glyph.coverage_idx >= usize::from(count) {
            continue;
        }
        let item = offsets.at(2 * glyph.coverage_idx)?.read_offset16(&list)?;
        let item = write_item(graph, item)?;
        covered.push(glyph.new);
        items.push(graph.add(item));
    }
    if covered.is_empty() {
        return Ok(None);
    }

    let mut object = Object::default();
    object.push_offset16(Some(graph.add(coverage_object(&covered))));
    object.push_len(items.len());
    for item in items {
        object.push_offset16(Some(item));
    }
    Ok(Some(graph.add(object)))
}

fn attach_list_object(
    graph: &mut TableGraph,
    glyphs: &GlyphMap<'_>,
    list: Cursor<'_>,
) -> Result<Option<ObjectId>, ParseError> {
    covered_items(graph, glyphs, list, |_, attach_point| {
        let point_count = attach_point.at(0)?.read_u16()?;
        let len = 2 + 2 * usize::from(point_count);
        Ok(Object::from_bytes(attach_point.bytes_prefix(len)?))
    })
}

fn lig_caret_list_object(
    graph: &mut TableGraph,
    glyphs: &GlyphMap<'_>,
    list: Cursor<'_>,
) -> Result<Option<ObjectId>, ParseError> {
    covered_items(graph, glyphs, list, |graph, lig_glyph| {
        let mut cursor = lig_glyph;
        let caret_count = cursor.read_u16()?;
        let mut object = Object::default();
        object.push_u16(caret_count);
        for _ in 0..caret_count {
            let caret = cursor.read_offset16(&lig_glyph)?;
            let caret = caret_value_object(graph, caret)?;
            object.push_offset16(Some(graph.add(caret)));
        }
        Ok(object)
    })
}

fn caret_value_object(graph: &mut TableGraph, caret: Cursor<'_>) -> Result<Object, ParseError> {
    let mut cursor = caret;
    let format = cursor.read_u16()?;
    match format {
        1 | 2 => Ok(Object::from_bytes(caret.bytes_prefix(4)?)),
        3 => {
            let mut object = Object::from_bytes(caret.bytes_prefix(4)?);
            cursor.skip(2)?; // coordinate
            let device = cursor
                .read_nullable_offset16(&caret)?
                .map(device_object)
                .transpose()?;
            object.push_offset16(device.map(|device| graph.add(device)));
            Ok(object)
        }
        _ => Err(caret.err(ParseErrorKind::UnexpectedTableFormat(format))),
    }
}

/// Mark glyph sets are referenced by their indices from lookups, so all sets are retained
/// even if they become empty.
fn mark_glyph_sets_object(
    graph: &mut TableGraph,
    glyphs: &GlyphMap<'_>,
    sets: Cursor<'_>,
) -> Result<ObjectId, ParseError> {
    let mut cursor = sets;
    let format = cursor.read_u16_checked(|format| match format {
        1 => Ok(format),
        _ => Err(ParseErrorKind::UnexpectedTableFormat(format)),
    })?;
    let set_count = cursor.read_u16()?;

    let mut object = Object::default();
    object.push_u16(format);
    object.push_u16(set_count);
    for _ in 0..set_count {
        let coverage = cursor.read_offset32(&sets)?;
        let covered: Vec<_> = glyphs
            .covered(coverage)?
            .into_iter()
            .map(|glyph| glyph.new)
            .collect();
        object.push_offset32(Some(graph.add(coverage_object(&covered))));
    }
    Ok(graph.add(object))
}

/// Copies the item variation store. It doesn't reference glyphs, so it is copied as is.
fn var_store_object(graph: &mut TableGraph, store: Cursor<'_>) -> Result<ObjectId, ParseError> {
    const LONG_WORDS: u16 = 0x_8000;

    let mut cursor = store;
    let format = cursor.read_u16()?;
    let region_list = cursor.read_offset32(&store)?;
    let data_count = cursor.read_u16()?;

    let mut region_cursor = region_list;
    let axis_count = region_cursor.read_u16()?;
    let region_count = region_cursor.read_u16()?;
    let region_list_len = 4 + 6 * usize::from(axis_count) * usize::from(region_count);
    let region_list = graph.add(Object::from_bytes(region_list.bytes_prefix(region_list_len)?));

    let mut object = Object::default();
    object.push_u16(format);
    object.push_offset32(Some(region_list));
    object.push_u16(data_count);
    for _ in 0..data_count {
        let data = cursor.read_offset32(&store)?;
        let mut data_cursor = data;
        let item_count = usize::from(data_cursor.read_u16()?);
        let word_delta_count = data_cursor.read_u16()?;
        let region_index_count = usize::from(data_cursor.read_u16()?);
        let word_count = usize::from(word_delta_count & !LONG_WORDS);
        let short_count = region_index_count.saturating_sub(word_count);
        let row_len = if word_delta_count & LONG_WORDS == 0 {
            2 * word_count + short_count
        } else {
            4 * word_count + 2 * short_count
        };
        let data_len = 6 + 2 * region_index_count + item_count * row_len;
        let data = Object::from_bytes(data.bytes_prefix(data_len)?);
        object.push_offset32(Some(graph.add(data)));
    }
    Ok(graph.add(object))
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;

    #[test]
    fn subsetting_gdef_with_classes_and_carets() {
        #[rustfmt::skip]
        let gdef = [
            0, 1, 0, 0, // version 1.0
            0, 12, // glyphClassDef
            0, 0, // attachList
            0, 22, // ligCaretList
            0, 0, // markAttachClassDef
            // glyphClassDef @ 12: format 2, ranges
            0, 2, 0, 1, 0, 3, 0, 5, 0, 1,
            // ligCaretList @ 22
            0, 8, 0, 1, 0, 14, 0, 0,
            // coverage @ 30 (relative 8)
            0, 1, 0, 1, 0, 5,
            // ligGlyph @ 36 (relative 14)
            0, 1, 0, 4,
            // caretValue @ 40 (relative 4 from ligGlyph)
            0, 1, 1, 0,
        ];
        let old_to_new = BTreeMap::from([(0, 0), (3, 1), (5, 2)]);
        let glyphs = GlyphMap::new(&old_to_new);
        let subset = subset_gdef(&gdef, &glyphs).unwrap();

        let table = Cursor::new(&subset);
        let mut cursor = table;
        assert_eq!(cursor.read_u16().unwrap(), 1);
        assert_eq!(cursor.read_u16().unwrap(), 0);
        let class_def = ClassDef::parse(cursor.read_nullable_offset16(&table).unwrap()).unwrap();
        assert_eq!(class_def.class(0), 0);
        assert_eq!(class_def.class(1), 1);
        assert_eq!(class_def.class(2), 1);
        assert!(cursor.read_nullable_offset16(&table).unwrap().is_none());

        let carets = cursor.read_nullable_offset16(&table).unwrap().unwrap();
        let mut carets_cursor = carets;
        let coverage = carets_cursor.read_offset16(&carets).unwrap();
        let covered = crate::font::covered_glyphs(coverage, &BTreeSet::from([2])).unwrap();
        assert_eq!(covered, [(2, 0)]);
        assert_eq!(carets_cursor.read_u16().unwrap(), 1);
        let lig_glyph = carets_cursor.read_offset16(&carets).unwrap();
        let caret = lig_glyph.at(2).unwrap().read_offset16(&lig_glyph).unwrap();
        assert_eq!(caret.bytes_prefix(4).unwrap(), [0, 1, 1, 0]);
    }

    #[test]
    fn caret_list_is_dropped_if_ligatures_are_not_retained() {
        #[rustfmt::skip]
        let gdef = [
            0, 1, 0, 0,
            0, 0, 0, 0, 0, 12, 0, 0,
            // ligCaretList @ 12
            0, 6, 0, 1, 0, 12,
            // coverage
            0, 1, 0, 1, 0, 5,
            // ligGlyph
            0, 1, 0, 4, 0, 1, 1, 0,
        ];
        let old_to_new = BTreeMap::from([(0, 0), (3, 1)]);
        let glyphs = GlyphMap::new(&old_to_new);
        let subset = subset_gdef(&gdef, &glyphs).unwrap();
        assert_eq!(subset, [0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn unsupported_gdef_version() {
        let gdef = [0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let old_to_new = BTreeMap::from([(0, 0)]);
        let err = subset_gdef(&gdef, &GlyphMap::new(&old_to_new)).unwrap_err();
        assert!(
            matches!(err.kind(), ParseErrorKind::UnexpectedTableVersion(2)),
            "{err:?}"
        );
    }
}
