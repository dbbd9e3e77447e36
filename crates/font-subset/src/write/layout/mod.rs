//! Subsetting of the OpenType layout tables (`GSUB`, `GPOS` and `GDEF`).
//!
//! Tables are rewritten for the renumbered glyphs: coverage and class definition tables
//! are restricted to the retained glyphs, subtables and rules that cannot apply to the retained
//! glyphs are removed, and only the lookups of the retained features are kept.

use std::collections::BTreeMap;

pub(crate) use self::gdef::subset_gdef;
use self::graph::{Object, ObjectId, OffsetOverflow, TableGraph};
use super::GlyphMap;
use crate::{
    font::{ClassDef, ContextSubtable, Cursor, LayoutTable, LookupRecord, RuleSets, SequenceRule},
    ParseError, Selection, TableTag,
};

mod gdef;
mod gpos;
mod graph;
mod gsub;

/// Rewrites a `GSUB` or `GPOS` table retaining the selected features.
pub(crate) fn subset_layout_table(
    tag: TableTag,
    raw: &[u8],
    glyphs: &GlyphMap<'_>,
    features: &Selection<[u8; 4]>,
) -> Result<Vec<u8>, ParseError> {
    let table = LayoutTable::parse(tag, raw)?;
    let lookups = table.retained_lookups(features)?;
    let subsetter = LayoutSubsetter {
        tag,
        lookups: (0..).zip(lookups).map(|(new, old)| (old, new)).collect(),
        table,
        glyphs,
    };

    let (graph, root) = subsetter.build(features, false)?;
    match graph.pack(root) {
        Ok(bytes) => Ok(bytes),
        Err(OffsetOverflow) => {
            // Extension lookups use 32-bit offsets to subtables
            let (graph, root) = subsetter.build(features, true)?;
            graph
                .pack(root)
                .map_err(|OffsetOverflow| ParseError::offset_overflow(tag))
        }
    }
}

struct LayoutSubsetter<'a, 'g> {
    tag: TableTag,
    table: LayoutTable<'a>,
    glyphs: &'g GlyphMap<'g>,
    /// Mapping from the original to the new indices of the retained lookups.
    lookups: BTreeMap<u16, u16>,
}

impl<'a> LayoutSubsetter<'a, '_> {
    const NO_REQUIRED_FEATURE: u16 = 0x_ffff;

    fn build(
        &self,
        features: &Selection<[u8; 4]>,
        use_extensions: bool,
    ) -> Result<(TableGraph, ObjectId), ParseError> {
        let mut graph = TableGraph::default();
        let (feature_list, feature_map) = self.write_feature_list(&mut graph, features)?;
        let script_list = self.write_script_list(&mut graph, &feature_map)?;
        let lookup_list = self.write_lookup_list(&mut graph, use_extensions)?;

        // Feature variations are not retained, so the minor version is always 0.
        let mut header = Object::default();
        header.push_u16(1);
        header.push_u16(0);
        header.push_offset16(Some(script_list));
        header.push_offset16(Some(feature_list));
        header.push_offset16(Some(lookup_list));
        let root = graph.add(header);
        Ok((graph, root))
    }

    fn write_feature_list(
        &self,
        graph: &mut TableGraph,
        features: &Selection<[u8; 4]>,
    ) -> Result<(ObjectId, BTreeMap<u16, u16>), ParseError> {
        let mut records = vec![];
        let mut feature_map = BTreeMap::new();
        for (old_idx, feature) in (0_u16..).zip(self.table.features()?) {
            if !features.contains(&feature.tag) {
                continue;
            }
            let (params, lookups) = feature.params_and_lookups()?;
            let params = match params {
                Some(params) => feature_params(feature.tag, params)?.map(|obj| graph.add(obj)),
                None => None,
            };

            let mut object = Object::default();
            object.push_offset16(params);
            let lookups: Vec<_> = lookups
                .iter()
                .filter_map(|idx| self.lookups.get(idx))
                .collect();
            object.push_len(lookups.len());
            for &idx in lookups {
                object.push_u16(idx);
            }

            let new_idx = u16::try_from(records.len()).expect("feature count overflow");
            feature_map.insert(old_idx, new_idx);
            records.push((feature.tag, graph.add(object)));
        }

        let mut list = Object::default();
        list.push_len(records.len());
        for (tag, feature) in records {
            list.push_bytes(&tag);
            list.push_offset16(Some(feature));
        }
        Ok((graph.add(list), feature_map))
    }

    fn write_script_list(
        &self,
        graph: &mut TableGraph,
        features: &BTreeMap<u16, u16>,
    ) -> Result<ObjectId, ParseError> {
        let script_list = self.table.script_list;
        let mut cursor = script_list;
        let script_count = cursor.read_u16()?;
        let mut list = Object::default();
        list.push_u16(script_count);
        for _ in 0..script_count {
            let tag = cursor.read_byte_array::<4>()?;
            let script = cursor.read_offset16(&script_list)?;
            list.push_bytes(&tag);
            list.push_offset16(Some(Self::write_script(graph, script, features)?));
        }
        Ok(graph.add(list))
    }

    fn write_script(
        graph: &mut TableGraph,
        script: Cursor<'_>,
        features: &BTreeMap<u16, u16>,
    ) -> Result<ObjectId, ParseError> {
        let mut cursor = script;
        let default_lang_sys = cursor
            .read_nullable_offset16(&script)?
            .map(|lang_sys| Self::write_lang_sys(graph, lang_sys, features))
            .transpose()?;
        let lang_sys_count = cursor.read_u16()?;

        let mut object = Object::default();
        object.push_offset16(default_lang_sys);
        object.push_u16(lang_sys_count);
        for _ in 0..lang_sys_count {
            let tag = cursor.read_byte_array::<4>()?;
            let lang_sys = cursor.read_offset16(&script)?;
            object.push_bytes(&tag);
            object.push_offset16(Some(Self::write_lang_sys(graph, lang_sys, features)?));
        }
        Ok(graph.add(object))
    }

    fn write_lang_sys(
        graph: &mut TableGraph,
        lang_sys: Cursor<'_>,
        features: &BTreeMap<u16, u16>,
    ) -> Result<ObjectId, ParseError> {
        let mut cursor = lang_sys;
        cursor.skip(2)?; // lookupOrderOffset
        let required_feature = cursor.read_u16()?;
        let feature_count = cursor.read_u16()?;
        let feature_indices = cursor.read_u16_array(feature_count.into())?;

        let mut object = Object::default();
        object.push_u16(0);
        object.push_u16(
            features
                .get(&required_feature)
                .copied()
                .unwrap_or(Self::NO_REQUIRED_FEATURE),
        );
        let feature_indices: Vec<_> = feature_indices
            .iter()
            .filter_map(|idx| features.get(idx))
            .collect();
        object.push_len(feature_indices.len());
        for &idx in feature_indices {
            object.push_u16(idx);
        }
        Ok(graph.add(object))
    }

    fn write_lookup_list(
        &self,
        graph: &mut TableGraph,
        use_extensions: bool,
    ) -> Result<ObjectId, ParseError> {
        let mut list = Object::default();
        list.push_len(self.lookups.len());
        for &old_idx in self.lookups.keys() {
            let lookup = self.table.lookup(old_idx)?;
            let mut subtables = vec![];
            for &subtable in &lookup.subtables {
                if let Some(id) = self.write_subtable(graph, lookup.lookup_type, subtable)? {
                    subtables.push(id);
                }
            }

            let mut object = Object::default();
            object.push_u16(if use_extensions {
                self.table.types.extension
            } else {
                lookup.lookup_type
            });
            object.push_u16(lookup.flag);
            object.push_len(subtables.len());
            for id in subtables {
                let id = if use_extensions {
                    let mut extension = Object::default();
                    extension.push_u16(1); // format
                    extension.push_u16(lookup.lookup_type);
                    extension.push_offset32(Some(id));
                    graph.add(extension)
                } else {
                    id
                };
                object.push_offset16(Some(id));
            }
            if let Some(set_idx) = lookup.mark_filtering_set {
                object.push_u16(set_idx);
            }
            list.push_offset16(Some(graph.add(object)));
        }
        Ok(graph.add(list))
    }

    /// Returns `None` if the subtable does not apply to the retained glyphs.
    fn write_subtable(
        &self,
        graph: &mut TableGraph,
        lookup_type: u16,
        subtable: Cursor<'a>,
    ) -> Result<Option<ObjectId>, ParseError> {
        if let Some(context) = self.table.context_subtable(lookup_type, subtable)? {
            let chained = lookup_type == self.table.types.chained_context;
            return self.write_context(graph, context, chained);
        }
        if self.tag == TableTag::GPOS {
            gpos::write_subtable(self.glyphs, graph, lookup_type, subtable)
        } else {
            gsub::write_subtable(self.glyphs, graph, lookup_type, subtable)
        }
    }

    fn map_lookup_records(&self, records: &[LookupRecord]) -> Vec<LookupRecord> {
        records
            .iter()
            .filter_map(|record| {
                Some(LookupRecord {
                    sequence_idx: record.sequence_idx,
                    lookup_idx: *self.lookups.get(&record.lookup_idx)?,
                })
            })
            .collect()
    }

    fn write_context(
        &self,
        graph: &mut TableGraph,
        context: ContextSubtable<'_>,
        chained: bool,
    ) -> Result<Option<ObjectId>, ParseError> {
        let mut object = Object::default();
        match context {
            ContextSubtable::Glyphs {
                coverage,
                rule_sets,
            } => {
                let mut first_glyphs = vec![];
                let mut new_rule_sets = vec![];
                for glyph in self.glyphs.covered(coverage)? {
                    let Some(Some(rules)) = rule_sets.get(glyph.coverage_idx) else {
                        continue;
                    };
                    let rules: Vec<_> = rules
                        .iter()
                        .filter_map(|rule| {
                            Some(SequenceRule {
                                backtrack: self.glyphs.map_all(&rule.backtrack)?,
                                input: self.glyphs.map_all(&rule.input)?,
                                lookahead: self.glyphs.map_all(&rule.lookahead)?,
                                lookups: self.map_lookup_records(&rule.lookups),
                            })
                        })
                        .collect();
                    if !rules.is_empty() {
                        first_glyphs.push(glyph.new);
                        new_rule_sets.push(Some(write_rule_set(graph, &rules, chained)));
                    }
                }
                if first_glyphs.is_empty() {
                    return Ok(None);
                }

                object.push_u16(1);
                object.push_offset16(Some(graph.add(coverage_object(&first_glyphs))));
                push_offsets(&mut object, &new_rule_sets);
            }

            ContextSubtable::Classes {
                coverage,
                backtrack_classes,
                input_classes,
                lookahead_classes,
                rule_sets,
            } => {
                let covered: Vec<_> = self
                    .glyphs
                    .covered(coverage)?
                    .into_iter()
                    .map(|glyph| glyph.new)
                    .collect();
                if covered.is_empty() {
                    return Ok(None);
                }

                object.push_u16(2);
                object.push_offset16(Some(graph.add(coverage_object(&covered))));
                let class_defs = if chained {
                    vec![backtrack_classes, input_classes, lookahead_classes]
                } else {
                    vec![input_classes]
                };
                for class_def in class_defs {
                    let class_def = class_def
                        .map(|table| self.class_def_object(table))
                        .transpose()?;
                    object.push_offset16(class_def.map(|obj| graph.add(obj)));
                }
                let new_rule_sets = self.map_class_rule_sets(graph, &rule_sets, chained);
                push_offsets(&mut object, &new_rule_sets);
            }

            ContextSubtable::Coverages {
                backtrack,
                input,
                lookahead,
                lookups,
            } => {
                let Some(backtrack) = self.map_coverages(&backtrack)? else {
                    return Ok(None);
                };
                let Some(input) = self.map_coverages(&input)? else {
                    return Ok(None);
                };
                let Some(lookahead) = self.map_coverages(&lookahead)? else {
                    return Ok(None);
                };
                let lookups = self.map_lookup_records(&lookups);

                object.push_u16(3);
                if chained {
                    for coverages in [backtrack, input, lookahead] {
                        object.push_len(coverages.len());
                        for coverage in coverages {
                            object.push_offset16(Some(graph.add(coverage)));
                        }
                    }
                    object.push_len(lookups.len());
                } else {
                    object.push_len(input.len());
                    object.push_len(lookups.len());
                    for coverage in input {
                        object.push_offset16(Some(graph.add(coverage)));
                    }
                }
                push_lookup_records(&mut object, &lookups);
            }
        }
        Ok(Some(graph.add(object)))
    }

    fn map_class_rule_sets(
        &self,
        graph: &mut TableGraph,
        rule_sets: &RuleSets,
        chained: bool,
    ) -> Vec<Option<ObjectId>> {
        rule_sets
            .iter()
            .map(|rules| {
                let rules: Vec<_> = rules
                    .iter()
                    .flatten()
                    .map(|rule| SequenceRule {
                        lookups: self.map_lookup_records(&rule.lookups),
                        ..rule.clone()
                    })
                    .collect();
                if rules.is_empty() {
                    None
                } else {
                    Some(write_rule_set(graph, &rules, chained))
                }
            })
            .collect()
    }

    /// Returns `None` if any of the coverage tables becomes empty.
    fn map_coverages(&self, coverages: &[Cursor<'_>]) -> Result<Option<Vec<Object>>, ParseError> {
        let mut objects = Vec::with_capacity(coverages.len());
        for &coverage in coverages {
            let glyphs: Vec<_> = self
                .glyphs
                .covered(coverage)?
                .into_iter()
                .map(|glyph| glyph.new)
                .collect();
            if glyphs.is_empty() {
                return Ok(None);
            }
            objects.push(coverage_object(&glyphs));
        }
        Ok(Some(objects))
    }

    fn class_def_object(&self, table: Cursor<'_>) -> Result<Object, ParseError> {
        let class_def = ClassDef::parse(Some(table))?;
        Ok(class_def_object(&self.glyphs.classes(&class_def)))
    }
}

fn push_offsets(object: &mut Object, targets: &[Option<ObjectId>]) {
    object.push_len(targets.len());
    for &target in targets {
        object.push_offset16(target);
    }
}

fn push_lookup_records(object: &mut Object, records: &[LookupRecord]) {
    for record in records {
        object.push_u16(record.sequence_idx);
        object.push_u16(record.lookup_idx);
    }
}

fn write_rule_set(graph: &mut TableGraph, rules: &[SequenceRule], chained: bool) -> ObjectId {
    let mut rule_set = Object::default();
    rule_set.push_len(rules.len());
    for rule in rules {
        let mut object = Object::default();
        if chained {
            object.push_len(rule.backtrack.len());
            push_u16_array(&mut object, &rule.backtrack);
            object.push_len(rule.input.len() + 1);
            push_u16_array(&mut object, &rule.input);
            object.push_len(rule.lookahead.len());
            push_u16_array(&mut object, &rule.lookahead);
            object.push_len(rule.lookups.len());
        } else {
            object.push_len(rule.input.len() + 1);
            object.push_len(rule.lookups.len());
            push_u16_array(&mut object, &rule.input);
        }
        push_lookup_records(&mut object, &rule.lookups);
        rule_set.push_offset16(Some(graph.add(object)));
    }
    graph.add(rule_set)
}

fn push_u16_array(object: &mut Object, values: &[u16]) {
    for &value in values {
        object.push_u16(value);
    }
}

/// Creates a coverage table for sorted glyphs, choosing the more compact format.
fn coverage_object(glyphs: &[u16]) -> Object {
    let mut ranges: Vec<(u16, u16, usize)> = vec![];
    for (idx, &glyph) in glyphs.iter().enumerate() {
        match ranges.last_mut() {
            Some((_, end, _)) if end.checked_add(1) == Some(glyph) => *end = glyph,
            _ => ranges.push((glyph, glyph, idx)),
        }
    }

    let mut object = Object::default();
    // A range record takes 6 bytes, and a glyph record takes 2 bytes.
    if ranges.len() * 3 < glyphs.len() {
        object.push_u16(2);
        object.push_len(ranges.len());
        for (start, end, start_idx) in ranges {
            object.push_u16(start);
            object.push_u16(end);
            object.push_len(start_idx);
        }
    } else {
        object.push_u16(1);
        object.push_len(glyphs.len());
        push_u16_array(&mut object, glyphs);
    }
    object
}

/// Creates a class definition table for `(glyph, class)` pairs sorted by the glyph,
/// choosing the more compact format.
fn class_def_object(classes: &[(u16, u16)]) -> Object {
    let mut ranges: Vec<(u16, u16, u16)> = vec![];
    for &(glyph, class) in classes {
        match ranges.last_mut() {
            Some((_, end, range_class))
                if *range_class == class && end.checked_add(1) == Some(glyph) =>
            {
                *end = glyph;
            }
            _ => ranges.push((glyph, glyph, class)),
        }
    }

    let mut object = Object::default();
    let (Some(&(first_glyph, _)), Some(&(last_glyph, _))) = (classes.first(), classes.last())
    else {
        object.push_u16(2);
        object.push_u16(0);
        return object;
    };
    let format1_len = usize::from(last_glyph - first_glyph) + 1;
    if format1_len <= ranges.len() * 3 {
        object.push_u16(1);
        object.push_u16(first_glyph);
        object.push_len(format1_len);
        let mut classes = classes.iter().peekable();
        for glyph in first_glyph..=last_glyph {
            let class = classes.next_if(|&&(g, _)| g == glyph).map_or(0, |&(_, c)| c);
            object.push_u16(class);
        }
    } else {
        object.push_u16(2);
        object.push_len(ranges.len());
        for (start, end, class) in ranges {
            object.push_u16(start);
            object.push_u16(end);
            object.push_u16(class);
        }
    }
    object
}

/// Copies a device or a variation index table.
fn device_object(device: Cursor<'_>) -> Result<Object, ParseError> {
    let mut cursor = device;
    let start_size = cursor.read_u16()?;
    let end_size = cursor.read_u16()?;
    let format = cursor.read_u16()?;
    let len = match format {
        1..=3 => {
            let bits_per_value = 1_usize << format;
            let value_count = if end_size >= start_size {
                usize::from(end_size - start_size) + 1
            } else {
                0
            };
            6 + 2 * (value_count * bits_per_value).div_ceil(16)
        }
        _ => 6, // variation index tables
    };
    Ok(Object::from_bytes(device.bytes_prefix(len)?))
}

/// Copies feature params for the features that have them.
fn feature_params(tag: [u8; 4], params: Cursor<'_>) -> Result<Option<Object>, ParseError> {
    let len = match tag {
        [b's', b'i', b'z', b'e'] => 10,
        [b's', b's', ..] => 4,
        [b'c', b'v', ..] => {
            const CHAR_COUNT_OFFSET: usize = 12;
            let char_count = params.at(CHAR_COUNT_OFFSET)?.read_u16()?;
            CHAR_COUNT_OFFSET + 2 + 3 * usize::from(char_count)
        }
        _ => return Ok(None),
    };
    Ok(Some(Object::from_bytes(params.bytes_prefix(len)?)))
}
