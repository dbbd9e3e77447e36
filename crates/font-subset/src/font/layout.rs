//! Structures shared by the `GSUB` and `GPOS` tables: feature and lookup lists, coverage
//! and class definition tables, and contextual lookups.

use std::collections::BTreeSet;

use super::{Cursor, TableTag};
use crate::{errors::ParseErrorKind, ParseError, Selection};

/// Lookup types that are present in both `GSUB` and `GPOS`, but have different values.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LookupTypes {
    pub(crate) context: u16,
    pub(crate) chained_context: u16,
    pub(crate) extension: u16,
}

impl LookupTypes {
    pub(crate) const GSUB: Self = Self {
        context: 5,
        chained_context: 6,
        extension: 7,
    };
    pub(crate) const GPOS: Self = Self {
        context: 7,
        chained_context: 8,
        extension: 9,
    };
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FeatureRecord<'a> {
    pub(crate) tag: [u8; 4],
    table: Cursor<'a>,
}

impl<'a> FeatureRecord<'a> {
    /// Returns feature params (if any) and indices of the referenced lookups.
    pub(crate) fn params_and_lookups(&self) -> Result<(Option<Cursor<'a>>, Vec<u16>), ParseError> {
        let mut cursor = self.table;
        let params = cursor.read_nullable_offset16(&self.table)?;
        let lookup_count = cursor.read_u16()?;
        Ok((params, cursor.read_u16_array(lookup_count.into())?))
    }
}

#[derive(Debug)]
pub(crate) struct Lookup<'a> {
    /// Lookup type. For extension lookups, this is the type of the wrapped subtables.
    pub(crate) lookup_type: u16,
    pub(crate) flag: u16,
    pub(crate) subtables: Vec<Cursor<'a>>,
    pub(crate) mark_filtering_set: Option<u16>,
}

impl Lookup<'_> {
    pub(crate) const USE_MARK_FILTERING_SET: u16 = 0x_0010;
}

/// `GSUB` or `GPOS` table.
#[derive(Debug)]
pub(crate) struct LayoutTable<'a> {
    pub(crate) types: LookupTypes,
    pub(crate) script_list: Cursor<'a>,
    feature_list: Cursor<'a>,
    lookup_list: Cursor<'a>,
    pub(crate) lookup_count: u16,
}

impl<'a> LayoutTable<'a> {
    pub(crate) fn parse(tag: TableTag, raw: &'a [u8]) -> Result<Self, ParseError> {
        let types = if tag == TableTag::GPOS {
            LookupTypes::GPOS
        } else {
            LookupTypes::GSUB
        };
        let table = Cursor::for_table(tag, raw);
        let mut cursor = table;
        cursor.read_u16_checked(|major_version| {
            if major_version != 1 {
                return Err(ParseErrorKind::UnexpectedTableVersion(major_version.into()));
            }
            Ok(())
        })?;
        cursor.skip(2)?; // minorVersion
        let script_list = cursor.read_offset16(&table)?;
        let feature_list = cursor.read_offset16(&table)?;
        let lookup_list = cursor.read_offset16(&table)?;
        let lookup_count = lookup_list.at(0)?.read_u16()?;
        Ok(Self {
            types,
            script_list,
            feature_list,
            lookup_list,
            lookup_count,
        })
    }

    pub(crate) fn features(&self) -> Result<Vec<FeatureRecord<'a>>, ParseError> {
        let mut cursor = self.feature_list;
        let feature_count = cursor.read_u16()?;
        (0..feature_count)
            .map(|_| {
                Ok(FeatureRecord {
                    tag: cursor.read_byte_array()?,
                    table: cursor.read_offset16(&self.feature_list)?,
                })
            })
            .collect()
    }

    pub(crate) fn lookup(&self, idx: u16) -> Result<Lookup<'a>, ParseError> {
        let lookup = self
            .lookup_list
            .at(2 + 2 * usize::from(idx))?
            .read_offset16(&self.lookup_list)?;
        let mut cursor = lookup;
        let mut lookup_type = cursor.read_u16()?;
        let flag = cursor.read_u16()?;
        let subtable_count = cursor.read_u16()?;
        let is_extension = lookup_type == self.types.extension;

        let mut subtables = Vec::with_capacity(subtable_count.into());
        for _ in 0..subtable_count {
            let subtable = cursor.read_offset16(&lookup)?;
            if is_extension {
                let mut extension = subtable;
                extension.skip(2)?; // format
                lookup_type = extension.read_u16()?;
                let offset = extension.read_u32()? as usize;
                subtables.push(subtable.at(offset)?);
            } else {
                subtables.push(subtable);
            }
        }

        let mark_filtering_set = if flag & Lookup::USE_MARK_FILTERING_SET != 0 {
            Some(cursor.read_u16()?)
        } else {
            None
        };
        Ok(Lookup {
            lookup_type,
            flag,
            subtables,
            mark_filtering_set,
        })
    }

    /// Returns indices of the lookups referenced by the selected features, and of the lookups
    /// invoked by them via contextual lookups.
    pub(crate) fn retained_lookups(
        &self,
        features: &Selection<[u8; 4]>,
    ) -> Result<BTreeSet<u16>, ParseError> {
        let mut lookups = BTreeSet::new();
        for feature in self.features()? {
            if features.contains(&feature.tag) {
                let (_, indices) = feature.params_and_lookups()?;
                lookups.extend(indices.into_iter().filter(|&idx| idx < self.lookup_count));
            }
        }

        let mut pending: Vec<_> = lookups.iter().copied().collect();
        while let Some(idx) = pending.pop() {
            let lookup = self.lookup(idx)?;
            for subtable in &lookup.subtables {
                let Some(context) = self.context_subtable(lookup.lookup_type, *subtable)? else {
                    break;
                };
                for nested in context.nested_lookups() {
                    if nested < self.lookup_count && lookups.insert(nested) {
                        pending.push(nested);
                    }
                }
            }
        }
        Ok(lookups)
    }

    /// Parses a subtable if it has a (chained) contextual type.
    pub(crate) fn context_subtable(
        &self,
        lookup_type: u16,
        subtable: Cursor<'a>,
    ) -> Result<Option<ContextSubtable<'a>>, ParseError> {
        let chained = if lookup_type == self.types.context {
            false
        } else if lookup_type == self.types.chained_context {
            true
        } else {
            return Ok(None);
        };
        ContextSubtable::parse(subtable, chained).map(Some)
    }
}

/// Reference to a lookup applied at a certain position of the matched sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LookupRecord {
    pub(crate) sequence_idx: u16,
    pub(crate) lookup_idx: u16,
}

impl LookupRecord {
    fn read_array(cursor: &mut Cursor<'_>, count: u16) -> Result<Vec<Self>, ParseError> {
        (0..count)
            .map(|_| {
                Ok(Self {
                    sequence_idx: cursor.read_u16()?,
                    lookup_idx: cursor.read_u16()?,
                })
            })
            .collect()
    }
}

/// Rule of a contextual lookup. Depending on the subtable format, sequences consist
/// of glyphs or glyph classes. Backtrack and lookahead sequences are empty for non-chained rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SequenceRule {
    pub(crate) backtrack: Vec<u16>,
    /// Input sequence without its first item, which is specified by the parent table.
    pub(crate) input: Vec<u16>,
    pub(crate) lookahead: Vec<u16>,
    pub(crate) lookups: Vec<LookupRecord>,
}

impl SequenceRule {
    fn parse(rule: Cursor<'_>, chained: bool) -> Result<Self, ParseError> {
        let mut cursor = rule;
        if chained {
            let backtrack_count = cursor.read_u16()?;
            let backtrack = cursor.read_u16_array(backtrack_count.into())?;
            let input_count = cursor.read_u16()?;
            let input = cursor.read_u16_array(input_count.saturating_sub(1).into())?;
            let lookahead_count = cursor.read_u16()?;
            let lookahead = cursor.read_u16_array(lookahead_count.into())?;
            let lookup_count = cursor.read_u16()?;
            Ok(Self {
                backtrack,
                input,
                lookahead,
                lookups: LookupRecord::read_array(&mut cursor, lookup_count)?,
            })
        } else {
            let input_count = cursor.read_u16()?;
            let lookup_count = cursor.read_u16()?;
            let input = cursor.read_u16_array(input_count.saturating_sub(1).into())?;
            Ok(Self {
                input,
                lookups: LookupRecord::read_array(&mut cursor, lookup_count)?,
                ..Self::default()
            })
        }
    }
}

/// Rule sets indexed by the coverage index or the class of the first input glyph.
pub(crate) type RuleSets = Vec<Option<Vec<SequenceRule>>>;

/// Subtable of a contextual or a chained contextual lookup.
#[derive(Debug)]
pub(crate) enum ContextSubtable<'a> {
    Glyphs {
        coverage: Cursor<'a>,
        rule_sets: RuleSets,
    },
    Classes {
        coverage: Cursor<'a>,
        backtrack_classes: Option<Cursor<'a>>,
        input_classes: Option<Cursor<'a>>,
        lookahead_classes: Option<Cursor<'a>>,
        rule_sets: RuleSets,
    },
    Coverages {
        backtrack: Vec<Cursor<'a>>,
        input: Vec<Cursor<'a>>,
        lookahead: Vec<Cursor<'a>>,
        lookups: Vec<LookupRecord>,
    },
}

impl<'a> ContextSubtable<'a> {
    fn parse(subtable: Cursor<'a>, chained: bool) -> Result<Self, ParseError> {
        let mut cursor = subtable;
        let format = cursor.read_u16()?;
        Ok(match format {
            1 => {
                let coverage = cursor.read_offset16(&subtable)?;
                Self::Glyphs {
                    coverage,
                    rule_sets: Self::read_rule_sets(&mut cursor, subtable, chained)?,
                }
            }
            2 => {
                let coverage = cursor.read_offset16(&subtable)?;
                let (backtrack_classes, input_classes, lookahead_classes) = if chained {
                    (
                        cursor.read_nullable_offset16(&subtable)?,
                        cursor.read_nullable_offset16(&subtable)?,
                        cursor.read_nullable_offset16(&subtable)?,
                    )
                } else {
                    (None, cursor.read_nullable_offset16(&subtable)?, None)
                };
                Self::Classes {
                    coverage,
                    backtrack_classes,
                    input_classes,
                    lookahead_classes,
                    rule_sets: Self::read_rule_sets(&mut cursor, subtable, chained)?,
                }
            }
            3 if chained => {
                let backtrack = Self::read_coverages(&mut cursor, subtable)?;
                let input = Self::read_coverages(&mut cursor, subtable)?;
                let lookahead = Self::read_coverages(&mut cursor, subtable)?;
                let lookup_count = cursor.read_u16()?;
                Self::Coverages {
                    backtrack,
                    input,
                    lookahead,
                    lookups: LookupRecord::read_array(&mut cursor, lookup_count)?,
                }
            }
            3 => {
                let glyph_count = cursor.read_u16()?;
                let lookup_count = cursor.read_u16()?;
                let input = (0..glyph_count)
                    .map(|_| cursor.read_offset16(&subtable))
                    .collect::<Result<_, _>>()?;
                Self::Coverages {
                    backtrack: vec![],
                    input,
                    lookahead: vec![],
                    lookups: LookupRecord::read_array(&mut cursor, lookup_count)?,
                }
            }
            _ => return Err(subtable.err(ParseErrorKind::UnexpectedTableFormat(format))),
        })
    }

    fn read_coverages(
        cursor: &mut Cursor<'a>,
        subtable: Cursor<'a>,
    ) -> Result<Vec<Cursor<'a>>, ParseError> {
        let count = cursor.read_u16()?;
        (0..count).map(|_| cursor.read_offset16(&subtable)).collect()
    }

    fn read_rule_sets(
        cursor: &mut Cursor<'a>,
        subtable: Cursor<'a>,
        chained: bool,
    ) -> Result<RuleSets, ParseError> {
        let set_count = cursor.read_u16()?;
        (0..set_count)
            .map(|_| {
                let Some(rule_set) = cursor.read_nullable_offset16(&subtable)? else {
                    return Ok(None);
                };
                let mut set_cursor = rule_set;
                let rule_count = set_cursor.read_u16()?;
                let rules = (0..rule_count)
                    .map(|_| SequenceRule::parse(set_cursor.read_offset16(&rule_set)?, chained))
                    .collect::<Result<_, _>>()?;
                Ok(Some(rules))
            })
            .collect()
    }

    pub(crate) fn nested_lookups(&self) -> Vec<u16> {
        let records: Vec<_> = match self {
            Self::Glyphs { rule_sets, .. } | Self::Classes { rule_sets, .. } => rule_sets
                .iter()
                .flatten()
                .flatten()
                .flat_map(|rule| &rule.lookups)
                .collect(),
            Self::Coverages { lookups, .. } => lookups.iter().collect(),
        };
        records.into_iter().map(|record| record.lookup_idx).collect()
    }
}

/// Returns glyphs from `glyphs` covered by the coverage table, together with their coverage indices.
pub(crate) fn covered_glyphs(
    coverage: Cursor<'_>,
    glyphs: &BTreeSet<u16>,
) -> Result<Vec<(u16, usize)>, ParseError> {
    let mut cursor = coverage;
    let format = cursor.read_u16()?;
    let count = cursor.read_u16()?;
    let mut covered = vec![];
    match format {
        1 => {
            for idx in 0..usize::from(count) {
                let glyph = cursor.read_u16()?;
                if glyphs.contains(&glyph) {
                    covered.push((glyph, idx));
                }
            }
        }
        2 => {
            for _ in 0..count {
                let start = cursor.read_u16()?;
                let end = cursor.read_u16()?;
                let start_idx = usize::from(cursor.read_u16()?);
                for &glyph in glyphs.range(start..=end.max(start)) {
                    covered.push((glyph, start_idx + usize::from(glyph - start)));
                }
            }
        }
        _ => return Err(coverage.err(ParseErrorKind::UnexpectedTableFormat(format))),
    }
    Ok(covered)
}

/// Parsed class definition table. Glyphs not mentioned in the table have class 0.
#[derive(Debug, Default)]
pub(crate) struct ClassDef {
    /// Sorted `(start_glyph, end_glyph, class)` ranges.
    ranges: Vec<(u16, u16, u16)>,
}

impl ClassDef {
    pub(crate) fn parse(table: Option<Cursor<'_>>) -> Result<Self, ParseError> {
        let Some(table) = table else {
            return Ok(Self::default());
        };
        let mut cursor = table;
        let format = cursor.read_u16()?;
        let mut ranges = vec![];
        match format {
            1 => {
                let start_glyph = cursor.read_u16()?;
                let glyph_count = cursor.read_u16()?;
                for i in 0..glyph_count {
                    let class = cursor.read_u16()?;
                    if let Some(glyph) = start_glyph.checked_add(i) {
                        ranges.push((glyph, glyph, class));
                    }
                }
            }
            2 => {
                let range_count = cursor.read_u16()?;
                for _ in 0..range_count {
                    let start = cursor.read_u16()?;
                    let end = cursor.read_u16()?;
                    let class = cursor.read_u16()?;
                    ranges.push((start, end, class));
                }
                ranges.sort_unstable_by_key(|&(start, ..)| start);
            }
            _ => return Err(table.err(ParseErrorKind::UnexpectedTableFormat(format))),
        }
        ranges.retain(|&(.., class)| class != 0);
        Ok(Self { ranges })
    }

    pub(crate) fn class(&self, glyph: u16) -> u16 {
        let idx = self.ranges.partition_point(|&(start, ..)| start <= glyph);
        idx.checked_sub(1)
            .map(|idx| self.ranges[idx])
            .filter(|&(_, end, _)| glyph <= end)
            .map_or(0, |(.., class)| class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coverage_formats() {
        let glyphs = BTreeSet::from([3, 5, 10, 11]);

        let format1 = [0, 1, 0, 3, 0, 2, 0, 5, 0, 11];
        let covered = covered_glyphs(Cursor::new(&format1), &glyphs).unwrap();
        assert_eq!(covered, [(5, 1), (11, 2)]);

        let format2 = [0, 2, 0, 2, 0, 1, 0, 3, 0, 0, 0, 9, 0, 20, 0, 3];
        let covered = covered_glyphs(Cursor::new(&format2), &glyphs).unwrap();
        assert_eq!(covered, [(3, 2), (10, 4), (11, 5)]);

        let err = covered_glyphs(Cursor::new(&[0, 3, 0, 0]), &glyphs).unwrap_err();
        assert!(matches!(
            err.kind(),
            ParseErrorKind::UnexpectedTableFormat(3)
        ));
    }

    #[test]
    fn class_def_formats() {
        #[rustfmt::skip]
        let format1 = [
            0, 1, 0, 10, 0, 3, // format, startGlyph, glyphCount
            0, 1, 0, 0, 0, 2,
        ];
        let class_def = ClassDef::parse(Some(Cursor::new(&format1))).unwrap();
        assert_eq!(class_def.ranges, [(10, 10, 1), (12, 12, 2)]);
        assert_eq!(class_def.class(9), 0);
        assert_eq!(class_def.class(10), 1);
        assert_eq!(class_def.class(11), 0);
        assert_eq!(class_def.class(12), 2);

        #[rustfmt::skip]
        let format2 = [
            0, 2, 0, 2, // format, classRangeCount
            0, 20, 0, 25, 0, 3,
            0, 5, 0, 7, 0, 1,
        ];
        let class_def = ClassDef::parse(Some(Cursor::new(&format2))).unwrap();
        assert_eq!(class_def.class(4), 0);
        assert_eq!(class_def.class(6), 1);
        assert_eq!(class_def.class(19), 0);
        assert_eq!(class_def.class(25), 3);
        assert_eq!(class_def.class(26), 0);

        assert_eq!(ClassDef::parse(None).unwrap().class(1), 0);
    }

    #[test]
    fn parsing_chained_context_rule() {
        #[rustfmt::skip]
        let rule = [
            0, 1, 0, 7, // backtrack: [7]
            0, 3, 0, 8, 0, 9, // input: <first> 8 9
            0, 0, // lookahead: []
            0, 1, 0, 1, 0, 4, // lookups: (1, 4)
        ];
        let rule = SequenceRule::parse(Cursor::new(&rule), true).unwrap();
        assert_eq!(
            rule,
            SequenceRule {
                backtrack: vec![7],
                input: vec![8, 9],
                lookahead: vec![],
                lookups: vec![LookupRecord {
                    sequence_idx: 1,
                    lookup_idx: 4
                }],
            }
        );
    }
}
