use std::collections::{BTreeMap, BTreeSet};

use crate::{
    font::{Font, Glyph, GlyphWithMetrics, GsubTable},
    write::subset_glyph_tables,
    ParseError, SubsetOptions, TableTag,
};

/// Subset of a [`Font`] produced by removing some of its glyphs and related data.
///
/// A subset is created with [`Font::subset()`] and can be serialized with [`Self::to_truetype()`]
/// or [`Self::to_woff2()`].
#[derive(Debug)]
pub struct FontSubset<'a> {
    pub(crate) font: Font<'a>,
    pub(crate) options: SubsetOptions,
    pub(crate) char_map: Vec<(char, u16)>,
    /// Monotonic mapping from the original glyph indices to the new ones.
    pub(crate) old_to_new_glyph_idx: BTreeMap<u16, u16>,
    /// Glyphs in the order of their new indices.
    pub(crate) glyphs: Vec<GlyphWithMetrics<'a>>,
    /// Subset tables referencing glyphs (e.g., `GSUB` or `vmtx`).
    pub(crate) glyph_tables: Vec<(TableTag, Vec<u8>)>,
}

impl<'a> FontSubset<'a> {
    pub(crate) fn new(
        font: Font<'a>,
        distinct_chars: &BTreeSet<char>,
        options: &SubsetOptions,
    ) -> Result<Self, ParseError> {
        // The 0th glyph is always retained
        let mut retained = BTreeSet::from([0]);
        let mut mapped_chars = vec![];
        for &ch in distinct_chars {
            let glyph_idx = font.map_char(ch)?;
            if glyph_idx != 0 {
                // Otherwise, the char is not mapped by the font
                retained.insert(glyph_idx);
                mapped_chars.push((ch, glyph_idx));
            }
        }

        if options.retains_layout() {
            if let Some(gsub) = font.table(TableTag::GSUB) {
                let gsub = GsubTable::parse(gsub)?;
                let lookups = gsub.lookup_indices(&options.layout_features)?;
                gsub.close_over(&lookups, &mut retained)?;
                let glyph_count = font.glyph_count();
                retained.retain(|&idx| idx < glyph_count);
            }
        }

        let mut outlines = BTreeMap::new();
        for &glyph_idx in &retained {
            Self::close_over_components(&font, glyph_idx, &mut outlines)?;
        }
        let old_to_new_glyph_idx: BTreeMap<_, _> = outlines
            .keys()
            .enumerate()
            .map(|(new_idx, &old_idx)| {
                let new_idx = u16::try_from(new_idx).expect("too many glyphs");
                (old_idx, new_idx)
            })
            .collect();

        let glyphs = outlines
            .into_values()
            .map(|mut glyph| {
                if let Glyph::Composite { components, .. } = &mut glyph.inner {
                    for component in components {
                        component.glyph_idx = old_to_new_glyph_idx[&component.glyph_idx];
                    }
                }
                glyph
            })
            .collect();
        let char_map = mapped_chars
            .into_iter()
            .map(|(ch, old_idx)| (ch, old_to_new_glyph_idx[&old_idx]))
            .collect();
        let glyph_tables = subset_glyph_tables(&font, &old_to_new_glyph_idx, options)?;

        Ok(Self {
            font,
            options: options.clone(),
            char_map,
            old_to_new_glyph_idx,
            glyphs,
            glyph_tables,
        })
    }

    /// Adds the glyph and glyphs it references as components to `outlines`.
    ///
    /// # Errors
    ///
    /// Returns an error if composite glyphs reference each other in a cycle.
    fn close_over_components(
        font: &Font<'a>,
        root_idx: u16,
        outlines: &mut BTreeMap<u16, GlyphWithMetrics<'a>>,
    ) -> Result<(), ParseError> {
        if outlines.contains_key(&root_idx) {
            return Ok(());
        }

        // Depth-first traversal; `path` contains the glyph being visited and its ancestors
        // together with the index of the next component to visit.
        let mut path = vec![(root_idx, font.glyph(root_idx)?, 0_usize)];
        let mut on_path = BTreeSet::from([root_idx]);
        while let Some((glyph_idx, glyph, next_component)) = path.last_mut() {
            let component_idx = glyph.inner.component_indices().nth(*next_component);
            if let Some(component_idx) = component_idx {
                *next_component += 1;
                if on_path.contains(&component_idx) {
                    return Err(ParseError::cyclic_composite(*glyph_idx));
                }
                if !outlines.contains_key(&component_idx) {
                    path.push((component_idx, font.glyph(component_idx)?, 0));
                    on_path.insert(component_idx);
                }
            } else {
                let glyph_idx = *glyph_idx;
                let (_, glyph, _) = path.pop().expect("path is not empty");
                on_path.remove(&glyph_idx);
                outlines.insert(glyph_idx, glyph);
            }
        }
        Ok(())
    }

    /// Returns the number of glyphs in this subset.
    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// Iterates over indices of the original font glyphs retained in this subset in the increasing order.
    pub fn retained_glyphs(&self) -> impl Iterator<Item = u16> + '_ {
        self.old_to_new_glyph_idx.keys().copied()
    }

    /// Iterates over chars mapped by this subset in the increasing order.
    pub fn mapped_chars(&self) -> impl Iterator<Item = char> + '_ {
        self.char_map.iter().map(|&(ch, _)| ch)
    }
}
