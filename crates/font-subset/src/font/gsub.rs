//! Glyph closure over `GSUB` substitutions.

use std::collections::BTreeSet;

use super::{
    layout::{covered_glyphs, LayoutTable},
    Cursor, TableTag,
};
use crate::{ParseError, Selection};

/// `GSUB` lookup types.
pub(crate) mod lookup_type {
    pub(crate) const SINGLE: u16 = 1;
    pub(crate) const MULTIPLE: u16 = 2;
    pub(crate) const ALTERNATE: u16 = 3;
    pub(crate) const LIGATURE: u16 = 4;
    pub(crate) const REVERSE_CHAINED: u16 = 8;
}

#[derive(Debug, Clone, Copy)]
struct LookupSubtable<'a> {
    lookup_type: u16,
    cursor: Cursor<'a>,
}

#[derive(Debug)]
pub(crate) struct GsubTable<'a> {
    layout: LayoutTable<'a>,
}

impl<'a> GsubTable<'a> {
    pub(crate) fn parse(raw: &'a [u8]) -> Result<Self, ParseError> {
        Ok(Self {
            layout: LayoutTable::parse(TableTag::GSUB, raw)?,
        })
    }

    /// Returns indices of the lookups retained for the selected features.
    pub(crate) fn lookup_indices(
        &self,
        features: &Selection<[u8; 4]>,
    ) -> Result<BTreeSet<u16>, ParseError> {
        self.layout.retained_lookups(features)
    }

    /// Extends `glyphs` with all glyphs reachable from them via the specified lookups.
    ///
    /// Lookups invoked by contextual lookups are applied to all glyphs regardless of the context,
    /// so the closure may contain extra glyphs.
    pub(crate) fn close_over(
        &self,
        lookups: &BTreeSet<u16>,
        glyphs: &mut BTreeSet<u16>,
    ) -> Result<(), ParseError> {
        let mut subtables = vec![];
        for &idx in lookups {
            let lookup = self.layout.lookup(idx)?;
            subtables.extend(lookup.subtables.into_iter().map(|cursor| LookupSubtable {
                lookup_type: lookup.lookup_type,
                cursor,
            }));
        }

        loop {
            let prev_len = glyphs.len();
            let mut substitutes = vec![];
            for subtable in &subtables {
                subtable.collect_substitutes(glyphs, &mut substitutes)?;
            }
            glyphs.extend(substitutes);
            if glyphs.len() == prev_len {
                return Ok(());
            }
        }
    }
}

impl LookupSubtable<'_> {
    fn collect_substitutes(
        &self,
        glyphs: &BTreeSet<u16>,
        output: &mut Vec<u16>,
    ) -> Result<(), ParseError> {
        let subtable = self.cursor;
        let mut cursor = subtable;
        let format = cursor.read_u16()?;

        match (self.lookup_type, format) {
            (lookup_type::SINGLE, 1) => {
                let coverage = cursor.read_offset16(&subtable)?;
                let delta = cursor.read_u16()?;
                for (glyph, _) in covered_glyphs(coverage, glyphs)? {
                    output.push(glyph.wrapping_add(delta));
                }
            }
            (lookup_type::SINGLE, 2) => {
                let coverage = cursor.read_offset16(&subtable)?;
                let count = cursor.read_u16()?;
                let substitutes = cursor.read_u16_array(count.into())?;
                for (_, idx) in covered_glyphs(coverage, glyphs)? {
                    output.extend(substitutes.get(idx).copied());
                }
            }
            (lookup_type::MULTIPLE | lookup_type::ALTERNATE, 1) => {
                // Both subtables are arrays of offsets to glyph sequences indexed by coverage.
                let coverage = cursor.read_offset16(&subtable)?;
                let count = cursor.read_u16()?;
                let offsets = cursor.read_u16_array(count.into())?;
                for (_, idx) in covered_glyphs(coverage, glyphs)? {
                    let Some(&offset) = offsets.get(idx) else {
                        continue;
                    };
                    let mut sequence = subtable.at(offset.into())?;
                    let len = sequence.read_u16()?;
                    output.extend(sequence.read_u16_array(len.into())?);
                }
            }
            (lookup_type::LIGATURE, 1) => {
                let coverage = cursor.read_offset16(&subtable)?;
                let count = cursor.read_u16()?;
                let offsets = cursor.read_u16_array(count.into())?;
                for (_, idx) in covered_glyphs(coverage, glyphs)? {
                    let Some(&offset) = offsets.get(idx) else {
                        continue;
                    };
                    let ligature_set = subtable.at(offset.into())?;
                    Self::collect_ligatures(ligature_set, glyphs, output)?;
                }
            }
            (lookup_type::REVERSE_CHAINED, 1) => {
                let coverage = cursor.read_offset16(&subtable)?;
                let backtrack_count = cursor.read_u16()?;
                cursor.skip(2 * usize::from(backtrack_count))?;
                let lookahead_count = cursor.read_u16()?;
                cursor.skip(2 * usize::from(lookahead_count))?;
                let count = cursor.read_u16()?;
                let substitutes = cursor.read_u16_array(count.into())?;
                for (_, idx) in covered_glyphs(coverage, glyphs)? {
                    output.extend(substitutes.get(idx).copied());
                }
            }
            _ => { /* contextual lookups don't substitute glyphs by themselves */ }
        }
        Ok(())
    }

    fn collect_ligatures(
        ligature_set: Cursor<'_>,
        glyphs: &BTreeSet<u16>,
        output: &mut Vec<u16>,
    ) -> Result<(), ParseError> {
        let mut cursor = ligature_set;
        let ligature_count = cursor.read_u16()?;
        for _ in 0..ligature_count {
            let mut ligature = cursor.read_offset16(&ligature_set)?;
            let ligature_glyph = ligature.read_u16()?;
            let component_count = ligature.read_u16()?;
            // The first component is specified by the coverage table
            let components = ligature.read_u16_array(component_count.saturating_sub(1).into())?;
            if components.iter().all(|glyph| glyphs.contains(glyph)) {
                output.push(ligature_glyph);
            }
        }
        Ok(())
    }
}
