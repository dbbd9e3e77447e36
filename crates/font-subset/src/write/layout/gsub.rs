//! `GSUB` lookup subtables.

use super::{coverage_object, push_u16_array, GlyphMap, Object, ObjectId, TableGraph};
use crate::{
    errors::ParseErrorKind,
    font::{gsub_lookup_type as lookup_type, Cursor},
    ParseError,
};

fn read_offsets<'a>(
    cursor: &mut Cursor<'a>,
    base: &Cursor<'a>,
) -> Result<Vec<Cursor<'a>>, ParseError> {
    let count = cursor.read_u16()?;
    (0..count).map(|_| cursor.read_offset16(base)).collect()
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
            let delta = cursor.read_u16()?;
            let substitutions = glyphs.covered(coverage)?.into_iter().filter_map(|glyph| {
                let substitute = glyphs.get(glyph.old.wrapping_add(delta))?;
                Some((glyph.new, substitute))
            });
            single_substitution(graph, &substitutions.collect::<Vec<_>>())
        }
        (lookup_type::SINGLE, 2) => {
            let coverage = cursor.read_offset16(&subtable)?;
            let count = cursor.read_u16()?;
            let substitutes = cursor.read_u16_array(count.into())?;
            let substitutions = glyphs.covered(coverage)?.into_iter().filter_map(|glyph| {
                let substitute = glyphs.get(*substitutes.get(glyph.coverage_idx)?)?;
                Some((glyph.new, substitute))
            });
            single_substitution(graph, &substitutions.collect::<Vec<_>>())
        }

        (lookup_type::MULTIPLE | lookup_type::ALTERNATE, 1) => {
            let is_alternate = lookup_type == lookup_type::ALTERNATE;
            let coverage = cursor.read_offset16(&subtable)?;
            let sequences = read_offsets(&mut cursor, &subtable)?;
            let mut covered = vec![];
            let mut new_sequences = vec![];
            for glyph in glyphs.covered(coverage)? {
                let Some(&sequence) = sequences.get(glyph.coverage_idx) else {
                    continue;
                };
                let mut sequence_cursor = sequence;
                let len = sequence_cursor.read_u16()?;
                let sequence = sequence_cursor.read_u16_array(len.into())?;
                // A multiple substitution applies only if all glyphs in the sequence are retained;
                // alternates can be filtered individually.
                let sequence: Vec<_> = if is_alternate {
                    sequence.iter().filter_map(|&idx| glyphs.get(idx)).collect()
                } else {
                    let Some(sequence) = glyphs.map_all(&sequence) else {
                        continue;
                    };
                    sequence
                };
                if sequence.is_empty() {
                    continue;
                }
                let mut object = Object::default();
                object.push_len(sequence.len());
                push_u16_array(&mut object, &sequence);
                covered.push(glyph.new);
                new_sequences.push(graph.add(object));
            }
            if covered.is_empty() {
                return Ok(None);
            }

            let mut object = Object::default();
            object.push_u16(1);
            object.push_offset16(Some(graph.add(coverage_object(&covered))));
            object.push_len(new_sequences.len());
            for sequence in new_sequences {
                object.push_offset16(Some(sequence));
            }
            Some(object)
        }

        (lookup_type::LIGATURE, 1) => {
            let coverage = cursor.read_offset16(&subtable)?;
            let ligature_sets = read_offsets(&mut cursor, &subtable)?;
            let mut covered = vec![];
            let mut new_sets = vec![];
            for glyph in glyphs.covered(coverage)? {
                let Some(&ligature_set) = ligature_sets.get(glyph.coverage_idx) else {
                    continue;
                };
                if let Some(set) = ligature_set_object(glyphs, graph, ligature_set)? {
                    covered.push(glyph.new);
                    new_sets.push(graph.add(set));
                }
            }
            if covered.is_empty() {
                return Ok(None);
            }

            let mut object = Object::default();
            object.push_u16(1);
            object.push_offset16(Some(graph.add(coverage_object(&covered))));
            object.push_len(new_sets.len());
            for set in new_sets {
                object.push_offset16(Some(set));
            }
            Some(object)
        }

        (lookup_type::REVERSE_CHAINED, 1) => {
            let coverage = cursor.read_offset16(&subtable)?;
            let backtrack = read_offsets(&mut cursor, &subtable)?;
            let lookahead = read_offsets(&mut cursor, &subtable)?;
            let count = cursor.read_u16()?;
            let substitutes = cursor.read_u16_array(count.into())?;
            let context = [backtrack.as_slice(), lookahead.as_slice()];
            reverse_chained_substitution(glyphs, graph, coverage, context, &substitutes)?
        }

        (
            lookup_type::SINGLE
            | lookup_type::MULTIPLE
            | lookup_type::ALTERNATE
            | lookup_type::LIGATURE
            | lookup_type::REVERSE_CHAINED,
            _,
        ) => return Err(subtable.err(ParseErrorKind::UnexpectedTableFormat(format))),
        _ => None,
    };
    Ok(object.map(|object| graph.add(object)))
}

/// Writes a single substitution subtable for sorted `(glyph, substitute)` pairs.
fn single_substitution(graph: &mut TableGraph, substitutions: &[(u16, u16)]) -> Option<Object> {
    let (&(first_glyph, first_substitute), rest) = substitutions.split_first()?;
    let delta = first_substitute.wrapping_sub(first_glyph);
    let coverage: Vec<_> = substitutions.iter().map(|&(glyph, _)| glyph).collect();
    let coverage = graph.add(coverage_object(&coverage));

    let mut object = Object::default();
    if rest
        .iter()
        .all(|&(glyph, substitute)| substitute.wrapping_sub(glyph) == delta)
    {
        object.push_u16(1);
        object.push_offset16(Some(coverage));
        object.push_u16(delta);
    } else {
        object.push_u16(2);
        object.push_offset16(Some(coverage));
        object.push_len(substitutions.len());
        for &(_, substitute) in substitutions {
            object.push_u16(substitute);
        }
    }
    Some(object)
}

fn ligature_set_object(
    glyphs: &GlyphMap<'_>,
    graph: &mut TableGraph,
    ligature_set: Cursor<'_>,
) -> Result<Option<Object>, ParseError> {
    let mut cursor = ligature_set;
    let mut ligatures = vec![];
    for ligature in read_offsets(&mut cursor, &ligature_set)? {
        let mut ligature_cursor = ligature;
        let ligature_glyph = ligature_cursor.read_u16()?;
        let component_count = ligature_cursor.read_u16()?;
        let components =
            ligature_cursor.read_u16_array(component_count.saturating_sub(1).into())?;
        let Some(ligature_glyph) = glyphs.get(ligature_glyph) else {
            continue;
        };
        let Some(components) = glyphs.map_all(&components) else {
            continue;
        };

        let mut object = Object::default();
        object.push_u16(ligature_glyph);
        object.push_len(components.len() + 1);
        push_u16_array(&mut object, &components);
        ligatures.push(graph.add(object));
    }
    if ligatures.is_empty() {
        return Ok(None);
    }

    let mut object = Object::default();
    object.push_len(ligatures.len());
    for ligature in ligatures {
        object.push_offset16(Some(ligature));
    }
    Ok(Some(object))
}

fn reverse_chained_substitution(
    glyphs: &GlyphMap<'_>,
    graph: &mut TableGraph,
    coverage: Cursor<'_>,
    [backtrack, lookahead]: [&[Cursor<'_>]; 2],
    substitutes: &[u16],
) -> Result<Option<Object>, ParseError> {
    let mut covered = vec![];
    let mut new_substitutes = vec![];
    for glyph in glyphs.covered(coverage)? {
        let substitute = substitutes
            .get(glyph.coverage_idx)
            .and_then(|&idx| glyphs.get(idx));
        if let Some(substitute) = substitute {
            covered.push(glyph.new);
            new_substitutes.push(substitute);
        }
    }
    if covered.is_empty() {
        return Ok(None);
    }

    let mut context_coverages = vec![];
    for coverages in [backtrack, lookahead] {
        let mut objects = vec![];
        for &coverage in coverages {
            let coverage_glyphs: Vec<_> = glyphs
                .covered(coverage)?
                .into_iter()
                .map(|glyph| glyph.new)
                .collect();
            if coverage_glyphs.is_empty() {
                return Ok(None);
            }
            objects.push(coverage_object(&coverage_glyphs));
        }
        context_coverages.push(objects);
    }

    let mut object = Object::default();
    object.push_u16(1);
    object.push_offset16(Some(graph.add(coverage_object(&covered))));
    for coverages in context_coverages {
        object.push_len(coverages.len());
        for coverage in coverages {
            object.push_offset16(Some(graph.add(coverage)));
        }
    }
    object.push_len(new_substitutes.len());
    push_u16_array(&mut object, &new_substitutes);
    Ok(Some(object))
}
