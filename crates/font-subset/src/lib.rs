//! TrueType font subsetting.
//!
//! The crate parses fonts with TrueType (`glyf`) outlines, retains glyphs necessary to render
//! a set of chars together with hinting and layout data, and serializes the resulting
//! [`FontSubset`] in the OpenType or WOFF2 format.
//!
//! # Examples
//!
//! ```
//! use font_subset::{Font, SubsetOptions};
//! # use std::collections::BTreeSet;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let font_bytes = std::fs::read("examples/DejaVuSansMono.ttf")?;
//! let font = Font::new(&font_bytes)?;
//! let chars: BTreeSet<char> = "Hello, world!".chars().collect();
//! let subset = font.subset(&chars, &SubsetOptions::default())?;
//! let ttf = subset.to_truetype();
//! assert!(ttf.len() < font_bytes.len());
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/font-subset/0.1.0")]

mod errors;
mod font;
mod options;
mod subset;
#[cfg(test)]
pub(crate) mod tests;
mod write;

#[cfg(doctest)]
doc_comment::doctest!("../README.md");

pub use crate::{
    errors::{MapError, ParseError, ParseErrorKind},
    font::{Font, TableTag},
    options::{Selection, SubsetOptions},
    subset::FontSubset,
};
