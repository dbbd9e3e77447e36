//! `GPOS` lookup subtables.

use std::collections::BTreeSet;

use super::{
    class_def_object, coverage_object, device_object, GlyphMap, Object, ObjectId, TableGraph,
};
use crate::{
    errors::ParseErrorKind,
    font::{ClassDef, Cursor},
    ParseError,
};

mod lookup_type {
    pub(super) const SINGLE: u16 = 1;
    pub(super) const PAIR: u16 = 2;
    pub(super) const CURSIVE: u16 = 3;
    pub(super) const MARK_TO_BASE: u16 = 4;
    pub(super) const MARK_TO_LIGATURE: u16 = 5;
    pub(super) const MARK_TO_MARK: u16 = 6;
}

/// Format of value records: bits 0..=3 denote placement and advance values, and bits 4..=7
/// offsets to the corresponding device tables.
#[derive(Debug, Clone, Copy)]
struct ValueFormat(u16);

impl ValueFormat {
    const DEVICE_FLAGS: u16 = 0x_00f0;
    const KNOWN_FLAGS: u16 = 0x_00ff;

    fn record_len(self) -> usize {
        2 * self.0.count_ones() as usize
    }

    fn read(cursor: &mut Cursor<'_>) -> Result<Self, ParseError> {
        cursor.read_u16().map(Self)
    }

    fn write(self, object: &mut Object) {
        object.push_u16(self.0 & Self::KNOWN_FLAGS);
    }

    /// Copies a value record. Device offsets in the record are relative to `base`.
    fn copy_record<'a>(
        self,
        graph: &mut TableGraph,
        object: &mut Object,
        cursor: &mut Cursor<'a>,
        base: &Cursor<'a>,
    ) -> Result<(), ParseError> {
        let mut record = cursor.split_at(self.record_len())?;
        for bit in 0..8 {
            let flag = 1_u16 << bit;
            if self.0 & flag == 0 {
                continue;
            }
            if flag & Self::DEVICE_FLAGS == 0 {
                object.push_u16(record.read_u16()?);
            } else {
                let device = record
                    .read_nullable_offset16(base)?
                    .map(device_object)
                    .transpose()?;
                object.push_offset16(device.map(|device| graph.add(device)));
            }
        }
        Ok(())
    }
}

fn read_nullable_anchor<'a>(
    graph: &mut TableGraph,
    cursor: &mut Cursor<'a>,
    base: &Cursor<'a>,
) -> Result<Option<ObjectId>, ParseError> {
    cursor
        .read_nullable_offset16(base)?
        .map(|anchor| anchor_object(graph, anchor))
        .transpose()
}

fn anchor_object(graph: &mut TableGraph, anchor: Cursor<'_>) -> Result<ObjectId, ParseError> {
    let mut cursor = anchor;
    let format = cursor.read_u16()?;
    let object = match format {
        1 => Object::from_bytes(anchor.bytes_prefix(6)?),
        // Format 2 additionally specifies a contour point
        2 => Object::from_bytes(anchor.bytes_prefix(8)?),
        3 => {
            let mut object = Object::from_bytes(anchor.bytes_prefix(6)?);
            cursor.skip(4)?; // xCoordinate, yCoordinate
            for _ in 0..2 {
                let device = cursor
                    .read_nullable_offset16(&anchor)?
                    .map(device_object)
                    .transpose()?;
                object.push_offset16(device.map(|device| graph.add(device)));
            }
            object
        }
        _ => return Err(anchor.err(ParseErrorKind::UnexpectedTableFormat(format))),
    };
    Ok(graph.add(object))
}

pub(super) fn write_subtable(
    glyphs: &GlyphMap<'_>,
    graph: &mut TableGraph,
    lookup_type: u16,
    subtable: Cursor<'_>,
) -> Result<Option<ObjectId>, ParseError> {
    let mut cursor = subtable;
    let format = cursor.read_u16()?;
    let object = match (lookup_type, format) {
        (lookup_type::SINGLE, 1) => {
            let coverage = cursor.read_offset16(&subtable)?;
            let value_format = ValueFormat::read(&mut cursor)?;
            let covered: Vec<_> = glyphs
                .covered(coverage)?
                .into_iter()
                .map(|glyph| glyph.new)
                .collect();
            if covered.is_empty() {
                return Ok(None);
            }

            let mut object = Object::default();
            object.push_u16(1);
            object.push_offset16(Some(graph.add(coverage_object(&covered))));
            value_format.write(&mut object);
            value_format.copy_record(graph, &mut object, &mut cursor, &subtable)?;
            Some(object)
        }
        (lookup_type::SINGLE, 2) => {
            let coverage = cursor.read_offset16(&subtable)?;
            let value_format = ValueFormat::read(&mut cursor)?;
            let value_count = cursor.read_u16()?;
            let records = cursor;
            let covered: Vec<_> = glyphs
                .covered(coverage)?
                .into_iter()
                .filter(|glyph| glyph.coverage_idx < usize::from(value_count))
                .collect();
            if covered.is_empty() {
                return Ok(None);
            }

            let mut object = Object::default();
            object.push_u16(2);
            let coverage_glyphs: Vec<_> = covered.iter().map(|glyph| glyph.new).collect();
            object.push_offset16(Some(graph.add(coverage_object(&coverage_glyphs))));
            value_format.write(&mut object);
            object.push_len(covered.len());
            for glyph in &covered {
                let mut record = records.at(glyph.coverage_idx * value_format.record_len())?;
                value_format.copy_record(graph, &mut object, &mut record, &subtable)?;
            }
            Some(object)
        }

        (lookup_type::PAIR, 1) => pair_glyphs(glyphs, graph, subtable, cursor)?,
        (lookup_type::PAIR, 2) => pair_classes(glyphs, graph, subtable, cursor)?,

        (lookup_type::CURSIVE, 1) => {
            let coverage = cursor.read_offset16(&subtable)?;
            let count = cursor.read_u16()?;
            let records = cursor;
            let covered: Vec<_> = glyphs
                .covered(coverage)?
                .into_iter()
                .filter(|glyph| glyph.coverage_idx < usize::from(count))
                .collect();
            if covered.is_empty() {
                return Ok(None);
            }

            let mut object = Object::default();
            object.push_u16(1);
            let coverage_glyphs: Vec<_> = covered.iter().map(|glyph| glyph.new).collect();
            object.push_offset16(Some(graph.add(coverage_object(&coverage_glyphs))));
            object.push_len(covered.len());
            for glyph in &covered {
                let mut record = records.at(glyph.coverage_idx * 4)?;
                let entry = read_nullable_anchor(graph, &mut record, &subtable)?;
                let exit = read_nullable_anchor(graph, &mut record, &subtable)?;
                object.push_offset16(entry);
                object.push_offset16(exit);
            }
            Some(object)
        }

        (lookup_type::MARK_TO_BASE | lookup_type::MARK_TO_MARK, 1) => {
            mark_attachment(glyphs, graph, subtable, cursor, false)?
        }
        (lookup_type::MARK_TO_LIGATURE, 1) => {
            mark_attachment(glyphs, graph, subtable, cursor, true)?
        }

        (
            lookup_type::SINGLE
            | lookup_type::PAIR
            | lookup_type::CURSIVE
            | lookup_type::MARK_TO_BASE
            | lookup_type::MARK_TO_LIGATURE
            | lookup_type::MARK_TO_MARK,
            _,
        ) => return Err(subtable.err(ParseErrorKind::UnexpectedTableFormat(format))),
        _ => None,
    };
    Ok(object.map(|object| graph.add(object)))
}

/// Pair adjustment with pairs specified for individual glyphs.
fn pair_glyphs<'a>(
    glyphs: &GlyphMap<'_>,
    graph: &mut TableGraph,
    subtable: Cursor<'a>,
    mut cursor: Cursor<'a>,
) -> Result<Option<Object>, ParseError> {
    let coverage = cursor.read_offset16(&subtable)?;
    let value_formats = [ValueFormat::read(&mut cursor)?, ValueFormat::read(&mut cursor)?];
    let record_len = 2 + value_formats[0].record_len() + value_formats[1].record_len();
    let pair_set_count = cursor.read_u16()?;
    let pair_set_offsets = cursor;

    let mut first_glyphs = vec![];
    let mut pair_sets = vec![];
    for glyph in glyphs.covered(coverage)? {
        if glyph.coverage_idx >= usize::from(pair_set_count) {
            continue;
        }
        let pair_set = pair_set_offsets
            .at(2 * glyph.coverage_idx)?
            .read_offset16(&subtable)?;
        let mut pair_cursor = pair_set;
        let pair_count = pair_cursor.read_u16()?;

        let mut pairs = Object::default();
        let mut retained_count = 0;
        for _ in 0..pair_count {
            let mut record = pair_cursor.split_at(record_len)?;
            let Some(second_glyph) = glyphs.get(record.read_u16()?) else {
                continue;
            };
            pairs.push_u16(second_glyph);
            for value_format in value_formats {
                value_format.copy_record(graph, &mut pairs, &mut record, &pair_set)?;
            }
            retained_count += 1;
        }
        if retained_count == 0 {
            continue;
        }

        let mut object = Object::default();
        object.push_len(retained_count);
        object.append(pairs);
        first_glyphs.push(glyph.new);
        pair_sets.push(graph.add(object));
    }
    if first_glyphs.is_empty() {
        return Ok(None);
    }

    let mut object = Object::default();
    object.push_u16(1);
    object.push_offset16(Some(graph.add(coverage_object(&first_glyphs))));
    for value_format in value_formats {
        value_format.write(&mut object);
    }
    object.push_len(pair_sets.len());
    for pair_set in pair_sets {
        object.push_offset16(Some(pair_set));
    }
    Ok(Some(object))
}

/// Pair adjustment with pairs specified for glyph classes. Classes not used by the retained glyphs
/// are removed, and the remaining ones are renumbered preserving their order.
fn pair_classes<'a>(
    glyphs: &GlyphMap<'_>,
    graph: &mut TableGraph,
    subtable: Cursor<'a>,
    mut cursor: Cursor<'a>,
) -> Result<Option<Object>, ParseError> {
    let coverage = cursor.read_offset16(&subtable)?;
    let value_formats = [ValueFormat::read(&mut cursor)?, ValueFormat::read(&mut cursor)?];
    let record_len = value_formats[0].record_len() + value_formats[1].record_len();
    let first_classes = ClassDef::parse(Some(cursor.read_offset16(&subtable)?))?;
    let second_classes = ClassDef::parse(Some(cursor.read_offset16(&subtable)?))?;
    let first_class_count = cursor.read_u16()?;
    let second_class_count = cursor.read_u16()?;
    let matrix = cursor;

    let covered = glyphs.covered(coverage)?;
    if covered.is_empty() {
        return Ok(None);
    }

    let mut first_glyph_classes = vec![];
    let mut used_first_classes = BTreeSet::from([0]);
    for glyph in &covered {
        let class = first_classes.class(glyph.old);
        if class != 0 && class < first_class_count {
            first_glyph_classes.push((glyph.new, class));
            used_first_classes.insert(class);
        }
    }
    let mut second_glyph_classes = vec![];
    let mut used_second_classes = BTreeSet::from([0]);
    for (old, new) in glyphs.iter() {
        let class = second_classes.class(old);
        if class != 0 && class < second_class_count {
            second_glyph_classes.push((new, class));
            used_second_classes.insert(class);
        }
    }

    let renumber = |classes: &BTreeSet<u16>, glyph_classes: &mut [(u16, u16)]| {
        for (_, class) in glyph_classes {
            let new_class = classes.range(..*class).count();
            *class = u16::try_from(new_class).expect("class count overflow");
        }
    };
    renumber(&used_first_classes, &mut first_glyph_classes);
    renumber(&used_second_classes, &mut second_glyph_classes);

    let coverage_glyphs: Vec<_> = covered.iter().map(|glyph| glyph.new).collect();
    let mut object = Object::default();
    object.push_u16(2);
    object.push_offset16(Some(graph.add(coverage_object(&coverage_glyphs))));
    for value_format in value_formats {
        value_format.write(&mut object);
    }
    object.push_offset16(Some(graph.add(class_def_object(&first_glyph_classes))));
    object.push_offset16(Some(graph.add(class_def_object(&second_glyph_classes))));
    object.push_len(used_first_classes.len());
    object.push_len(used_second_classes.len());

    for &first_class in &used_first_classes {
        for &second_class in &used_second_classes {
            let record_idx = usize::from(first_class) * usize::from(second_class_count)
                + usize::from(second_class);
            let mut record = matrix.at(record_idx * record_len)?;
            for value_format in value_formats {
                value_format.copy_record(graph, &mut object, &mut record, &subtable)?;
            }
        }
    }
    Ok(Some(object))
}

/// Mark-to-base, mark-to-mark and mark-to-ligature attachments. These subtables have the same
/// structure, except that ligatures have an extra level of indirection (anchors are specified
/// for each ligature component).
fn mark_attachment<'a>(
    glyphs: &GlyphMap<'_>,
    graph: &mut TableGraph,
    subtable: Cursor<'a>,
    mut cursor: Cursor<'a>,
    is_ligature: bool,
) -> Result<Option<Object>, ParseError> {
    let mark_coverage = cursor.read_offset16(&subtable)?;
    let base_coverage = cursor.read_offset16(&subtable)?;
    let class_count = cursor.read_u16()?;
    let mark_array = cursor.read_offset16(&subtable)?;
    let base_array = cursor.read_offset16(&subtable)?;

    let mut mark_array_cursor = mark_array;
    let mark_count = mark_array_cursor.read_u16()?;
    let marks: Vec<_> = glyphs
        .covered(mark_coverage)?
        .into_iter()
        .filter(|glyph| glyph.coverage_idx < usize::from(mark_count))
        .collect();
    let mut base_array_cursor = base_array;
    let base_count = base_array_cursor.read_u16()?;
    let bases: Vec<_> = glyphs
        .covered(base_coverage)?
        .into_iter()
        .filter(|glyph| glyph.coverage_idx < usize::from(base_count))
        .collect();
    if marks.is_empty() || bases.is_empty() {
        return Ok(None);
    }

    let mut new_mark_array = Object::default();
    new_mark_array.push_len(marks.len());
    for mark in &marks {
        let mut record = mark_array_cursor.at(4 * mark.coverage_idx)?;
        new_mark_array.push_u16(record.read_u16()?); // markClass
        let anchor = read_nullable_anchor(graph, &mut record, &mark_array)?;
        new_mark_array.push_offset16(anchor);
    }

    let anchors_len = 2 * usize::from(class_count);
    let mut new_base_array = Object::default();
    new_base_array.push_len(bases.len());
    for base in &bases {
        if is_ligature {
            let ligature_attach = base_array_cursor
                .at(2 * base.coverage_idx)?
                .read_offset16(&base_array)?;
            let mut attach_cursor = ligature_attach;
            let component_count = attach_cursor.read_u16()?;
            let mut new_attach = Object::default();
            new_attach.push_u16(component_count);
            for _ in 0..component_count {
                let mut anchors = attach_cursor.split_at(anchors_len)?;
                for _ in 0..class_count {
                    let anchor = read_nullable_anchor(graph, &mut anchors, &ligature_attach)?;
                    new_attach.push_offset16(anchor);
                }
            }
            new_base_array.push_offset16(Some(graph.add(new_attach)));
        } else {
            let mut anchors = base_array_cursor.at(anchors_len * base.coverage_idx)?;
            for _ in 0..class_count {
                let anchor = read_nullable_anchor(graph, &mut anchors, &base_array)?;
                new_base_array.push_offset16(anchor);
            }
        }
    }

    let mark_glyphs: Vec<_> = marks.iter().map(|glyph| glyph.new).collect();
    let base_glyphs: Vec<_> = bases.iter().map(|glyph| glyph.new).collect();
    let mut object = Object::default();
    object.push_u16(1);
    object.push_offset16(Some(graph.add(coverage_object(&mark_glyphs))));
    object.push_offset16(Some(graph.add(coverage_object(&base_glyphs))));
    object.push_u16(class_count);
    object.push_offset16(Some(graph.add(new_mark_array)));
    object.push_offset16(Some(graph.add(new_base_array)));
    Ok(Some(object))
}
