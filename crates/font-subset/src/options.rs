//! Subsetting options.

use std::collections::BTreeSet;

/// Selection of items (e.g., layout features or name IDs) retained in a font subset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection<T> {
    /// Retain all items.
    #[default]
    All,
    /// Retain only the specified items.
    Only(BTreeSet<T>),
}

impl<T: Ord> Selection<T> {
    /// Creates a selection that does not retain any items.
    pub fn none() -> Self {
        Self::Only(BTreeSet::new())
    }

    /// Checks whether this selection contains the specified item.
    pub fn contains(&self, item: &T) -> bool {
        match self {
            Self::All => true,
            Self::Only(items) => items.contains(item),
        }
    }

    /// Checks whether this selection is empty (i.e., retains no items).
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Only(items) if items.is_empty())
    }
}

impl<T: Ord> FromIterator<T> for Selection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::Only(iter.into_iter().collect())
    }
}

/// Options controlling [`FontSubset`](crate::FontSubset) creation.
///
/// The default options retain as much of the original font as possible: all layout features,
/// hinting, and all `name` table entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetOptions {
    /// Layout features (e.g., `liga`) retained in the subset.
    ///
    /// Glyphs reachable via `GSUB` substitutions of the selected features are retained,
    /// and layout tables (`GSUB`, `GPOS`, `GDEF`) are rewritten to contain only the selected
    /// features and data for the retained glyphs. The legacy `kern` table is only retained
    /// for fonts without `GPOS`. If the selection is empty, layout tables are dropped.
    pub layout_features: Selection<[u8; 4]>,
    /// Retain hinting instructions and hinting-related tables (`cvt `, `fpgm`, `prep`, etc.).
    pub hinting: bool,
    /// Desubroutinize CFF charstrings. Only CFF outlines have subroutines, and such fonts
    /// are not supported, so this option doesn't influence the output.
    pub desubroutinize: bool,
    /// IDs of `name` table entries to retain.
    pub name_ids: Selection<u16>,
    /// Language IDs of `name` table entries to retain.
    pub name_languages: Selection<u16>,
    /// Retain `name` table entries in legacy (non-Unicode) encodings.
    pub name_legacy: bool,
}

impl Default for SubsetOptions {
    fn default() -> Self {
        Self {
            layout_features: Selection::All,
            hinting: true,
            desubroutinize: false,
            name_ids: Selection::All,
            name_languages: Selection::All,
            name_legacy: true,
        }
    }
}

impl SubsetOptions {
    pub(crate) fn retains_layout(&self) -> bool {
        !self.layout_features.is_empty()
    }

    pub(crate) fn retains_all_names(&self) -> bool {
        self.name_legacy
            && matches!(self.name_ids, Selection::All)
            && matches!(self.name_languages, Selection::All)
    }
}
