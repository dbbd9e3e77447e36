use std::{collections::BTreeSet, env, fmt, io::Write, ops, process::Command, sync::OnceLock};

use allsorts::{
    binary::read::ReadScope,
    font::MatchingPresentation,
    font_data::FontData,
    gpos::Info,
    gsub::{FeatureMask, Features},
    tag,
};
use test_casing::{test_casing, Product};

use crate::{Font, ParseErrorKind, Selection, SubsetOptions, TableTag};

#[derive(Clone, Copy)]
pub(crate) struct TestFont {
    pub(crate) name: &'static str,
    pub(crate) bytes: &'static [u8],
}

impl fmt::Debug for TestFont {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.name, formatter)
    }
}

/// Font with a long `loca` table and format-12 `cmap` subtables.
pub(crate) const MONO_FONT: TestFont = TestFont {
    name: "DejaVu Sans Mono",
    bytes: include_bytes!("../../examples/DejaVuSansMono.ttf"),
};
/// Font with a short `loca` table, and a `kern` table.
pub(crate) const LIGHT_FONT: TestFont = TestFont {
    name: "DejaVu Sans ExtraLight",
    bytes: include_bytes!("../../examples/DejaVuSans-ExtraLight.ttf"),
};

pub(crate) const FONTS: [TestFont; 2] = [MONO_FONT, LIGHT_FONT];

#[derive(Debug, Clone)]
pub(crate) enum TestCharSubset {
    Range(ops::RangeInclusive<char>),
    Str(&'static str),
}

impl TestCharSubset {
    pub(crate) fn into_set(self) -> BTreeSet<char> {
        match self {
            Self::Range(range) => range.collect(),
            Self::Str(s) => s.chars().collect(),
        }
    }
}

pub(crate) const SUBSET_CHARS: [TestCharSubset; 5] = [
    TestCharSubset::Range(' '..='~'),
    TestCharSubset::Range('a'..='z'),
    TestCharSubset::Range('0'..='9'),
    TestCharSubset::Str("“Hello”, world… — ‘fine’ · café"),
    TestCharSubset::Str("A"),
];

#[derive(Debug, Clone, Copy)]
enum OptionsKind {
    Default,
    Stripped,
    Ligatures,
}

impl OptionsKind {
    const ALL: [Self; 3] = [Self::Default, Self::Stripped, Self::Ligatures];

    fn options(&self) -> SubsetOptions {
        match self {
            Self::Default => SubsetOptions::default(),
            Self::Stripped => SubsetOptions {
                layout_features: Selection::none(),
                hinting: false,
                name_ids: [1, 2, 3, 4, 5, 6].into_iter().collect(),
                name_legacy: false,
                ..SubsetOptions::default()
            },
            Self::Ligatures => SubsetOptions {
                layout_features: [*b"liga", *b"kern"].into_iter().collect(),
                ..SubsetOptions::default()
            },
        }
    }
}

#[derive(Debug)]
struct OpenTypeSanitizer {
    path: Option<String>,
}

impl Default for OpenTypeSanitizer {
    fn default() -> Self {
        let Ok(path) = env::var("OTS_SANITIZER") else {
            return Self { path: None };
        };
        let output = Command::new(&path)
            .arg("--version")
            .output()
            .unwrap_or_else(|err| {
                panic!("failed getting version for ots-sanitize at {path}: {err}");
            });
        assert!(
            output.status.success(),
            "failed getting version for ots-sanitize at {path}: non-zero exit code"
        );
        let version = String::from_utf8(output.stdout).unwrap_or_else(|err| {
            panic!("failed getting version for ots-sanitize at {path}: {err}");
        });
        println!("ots-sanitize version: {version}");
        Self { path: Some(path) }
    }
}

impl OpenTypeSanitizer {
    fn get() -> &'static Self {
        static SANITIZER: OnceLock<OpenTypeSanitizer> = OnceLock::new();
        SANITIZER.get_or_init(Self::default)
    }

    fn validate(&self, content: &[u8]) {
        let Some(path) = &self.path else {
            println!("OTS_SANITIZER env var is missing; skipping checks");
            return;
        };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.as_file_mut().write_all(content).unwrap();
        file.as_file_mut().flush().unwrap();
        let file_path = file.into_temp_path();

        let output = Command::new(path)
            .arg(&file_path)
            .output()
            .expect("failed running ots-sanitize");
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            panic!("ots-sanitize failed:\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}");
        }
    }
}

#[test_casing(2, FONTS)]
fn reading_font(test_font: TestFont) {
    let font = Font::new(test_font.bytes).unwrap();

    let font_file = ReadScope::new(test_font.bytes).read::<FontData>().unwrap();
    let font_provider = font_file.table_provider(0).unwrap();
    let mut reference_font = allsorts::Font::new(font_provider).unwrap();

    let test_str = "Hello, world! “Quotes” — ‘more’… ├└█▒ 婚礼";
    for ch in test_str.chars() {
        let id = font.map_char(ch).unwrap();
        let (expected_idx, _) =
            reference_font.lookup_glyph_index(ch, MatchingPresentation::NotRequired, None);
        assert_eq!(id, expected_idx, "{ch:?}");
    }
}

#[test_casing(10, Product((FONTS, SUBSET_CHARS)))]
fn subsetting_font(font: TestFont, chars: TestCharSubset) {
    let chars = chars.into_set();
    test_subsetting_font(font, &chars, &SubsetOptions::default());
}

#[test_casing(6, Product((FONTS, OptionsKind::ALL)))]
fn subsetting_font_with_options(font: TestFont, options: OptionsKind) {
    let chars = TestCharSubset::Range(' '..='~').into_set();
    test_subsetting_font(font, &chars, &options.options());
}

fn test_subsetting_font(
    test_font: TestFont,
    chars: &BTreeSet<char>,
    options: &SubsetOptions,
) -> (Vec<u8>, Vec<u8>) {
    let font = Font::new(test_font.bytes).unwrap();
    let mapped_chars: Vec<_> = chars
        .iter()
        .copied()
        .filter(|&ch| font.map_char(ch).unwrap() != 0)
        .collect();
    let subset = font.subset(chars, options).unwrap();
    assert_eq!(subset.mapped_chars().collect::<Vec<_>>(), mapped_chars);

    let ttf = subset.to_truetype();
    assert_eq!(Font::checksum(&ttf), Font::SFNT_CHECKSUM);
    assert!(ttf.len() < test_font.bytes.len());
    assert_valid_font(&ttf, true, mapped_chars.iter().copied());
    let woff2 = subset.to_woff2();
    assert!(woff2.len() < ttf.len());
    assert_valid_font(&woff2, false, mapped_chars.iter().copied());
    (ttf, woff2)
}

#[test]
fn subsetting_is_deterministic() {
    let chars = TestCharSubset::Str("Wedding invitation “RSVP” … 2025").into_set();
    let (ttf, woff2) = test_subsetting_font(LIGHT_FONT, &chars, &SubsetOptions::default());
    let (other_ttf, other_woff2) =
        test_subsetting_font(LIGHT_FONT, &chars, &SubsetOptions::default());
    assert_eq!(ttf, other_ttf);
    assert_eq!(woff2, other_woff2);
}

#[test]
fn subsetting_with_unsupported_chars_only() {
    let chars = TestCharSubset::Str("婚礼请柬").into_set();
    let (ttf, _) = test_subsetting_font(MONO_FONT, &chars, &SubsetOptions::default());
    let subset = Font::new(&ttf).unwrap();
    assert_eq!(subset.map_char('婚').unwrap(), 0);
    assert_eq!(subset.map_char('A').unwrap(), 0);
}

#[test]
fn stripped_subset_is_smaller() {
    let chars = TestCharSubset::Range(' '..='~').into_set();
    let (default_ttf, _) = test_subsetting_font(MONO_FONT, &chars, &SubsetOptions::default());
    let (stripped_ttf, _) =
        test_subsetting_font(MONO_FONT, &chars, &OptionsKind::Stripped.options());
    assert!(stripped_ttf.len() < default_ttf.len());

    let stripped = Font::new(&stripped_ttf).unwrap();
    // 95 ASCII chars + the missing glyph + possible composite glyph components
    assert!(stripped.glyph_count() >= 96);
    assert!(stripped.glyph_count() < 200);
    assert!(stripped.table(TableTag::GSUB).is_none());
    assert!(stripped.table(TableTag::FPGM).is_none());
}

#[test]
fn parsing_errors() {
    let err = Font::new(b"OTTO\0\0\0\0\0\0\0\0").unwrap_err();
    assert!(matches!(err.kind(), ParseErrorKind::CffOutlines));

    let err = Font::new(b"wOF2").unwrap_err();
    assert!(matches!(
        err.kind(),
        ParseErrorKind::UnexpectedFontVersion(_)
    ));

    let truncated = &MONO_FONT.bytes[..100];
    let err = Font::new(truncated).unwrap_err();
    assert!(
        matches!(err.kind(), ParseErrorKind::RangeOutOfBounds { .. }),
        "{err:?}"
    );
}

const INVITATION_TEXT: &str = "Together with their families, Muyao & Alex request the pleasure \
    of your company at their wedding. Saturday, 14 June 2025 at 4 o'clock; Café “Toscana”, \
    17 Avenue Road. RSVP by 1 May — dinner & dancing to follow…";

#[test]
fn layout_tables_are_subset() {
    let chars = TestCharSubset::Str(INVITATION_TEXT).into_set();
    let (default_ttf, _) = test_subsetting_font(LIGHT_FONT, &chars, &SubsetOptions::default());
    let compact_options = SubsetOptions {
        layout_features: Selection::none(),
        ..SubsetOptions::default()
    };
    let (compact_ttf, _) = test_subsetting_font(LIGHT_FONT, &chars, &compact_options);
    assert!(
        default_ttf.len() <= 2 * compact_ttf.len(),
        "default: {}, without layout: {}",
        default_ttf.len(),
        compact_ttf.len()
    );

    let original = Font::new(LIGHT_FONT.bytes).unwrap();
    assert!(original.table(TableTag::KERN).is_some());
    let subset = Font::new(&default_ttf).unwrap();
    for tag in [TableTag::GSUB, TableTag::GPOS, TableTag::GDEF] {
        let table = subset.table(tag).unwrap();
        assert!(table.len() < original.table(tag).unwrap().len(), "{tag}");
    }
    // Kerning is provided by `GPOS`
    assert!(subset.table(TableTag::KERN).is_none());
}

fn shape(font_bytes: &[u8], text: &str) -> Vec<Info> {
    let font_file = ReadScope::new(font_bytes).read::<FontData>().unwrap();
    let font_provider = font_file.table_provider(0).unwrap();
    let mut font = allsorts::Font::new(font_provider).unwrap();
    let glyphs = font.map_glyphs(text, tag::LATN, MatchingPresentation::NotRequired);
    let features = Features::Mask(FeatureMask::default());
    font.shape(glyphs, tag::LATN, None, &features, None, true)
        .unwrap_or_else(|(err, _)| panic!("failed shaping text: {err}"))
}

#[test_casing(3, ["office fifty AVAToday", "Wedding: “Café” & dinner", INVITATION_TEXT])]
fn subset_is_shaped_like_original_font(text: &'static str) {
    let chars = TestCharSubset::Str(text).into_set();
    let subset = Font::new(LIGHT_FONT.bytes)
        .unwrap()
        .subset(&chars, &SubsetOptions::default())
        .unwrap();
    let ttf = subset.to_truetype();

    let expected = shape(LIGHT_FONT.bytes, text);
    let actual = shape(&ttf, text);
    assert_eq!(actual.len(), expected.len());
    for (actual, expected) in actual.iter().zip(&expected) {
        let expected_glyph = subset.old_to_new_glyph_idx[&expected.glyph.glyph_index];
        assert_eq!(actual.glyph.glyph_index, expected_glyph, "{expected:?}");
        assert_eq!(actual.kerning, expected.kerning, "{expected:?}");
        assert_eq!(actual.placement, expected.placement, "{expected:?}");
    }
    // Sanity check: the text must be kerned and contain ligatures.
    if text.starts_with("office") {
        assert!(expected.iter().any(|info| info.kerning != 0));
        assert!(expected.len() < text.chars().count());
    }
}

/// Returns the offset of the specified table in the font data.
fn table_offset(font: &[u8], tag: TableTag) -> usize {
    let table_count = usize::from(u16::from_be_bytes([font[4], font[5]]));
    let record = font[12..12 + 16 * table_count]
        .chunks_exact(16)
        .find(|record| record[..4] == tag.to_bytes())
        .unwrap();
    u32::from_be_bytes(record[8..12].try_into().unwrap()) as usize
}

#[test]
fn cyclic_composite_glyph_is_an_error() {
    let font = Font::new(LIGHT_FONT.bytes).unwrap();
    let glyph_idx = font.map_char('é').unwrap();
    let component_idx = font.glyph(glyph_idx).unwrap().inner.component_indices().next();
    assert!(component_idx.is_some());

    // Make the first component of the glyph refer to the glyph itself. The font has a short `loca`.
    let mut bytes = LIGHT_FONT.bytes.to_vec();
    let loca_entry = table_offset(&bytes, TableTag::LOCA) + 2 * usize::from(glyph_idx);
    let glyph_offset = u16::from_be_bytes([bytes[loca_entry], bytes[loca_entry + 1]]);
    let glyph_offset = table_offset(&bytes, TableTag::GLYF) + 2 * usize::from(glyph_offset);
    // Skip the glyph header and the component flags
    let component_offset = glyph_offset + 12;
    bytes[component_offset..component_offset + 2].copy_from_slice(&glyph_idx.to_be_bytes());

    let font = Font::new(&bytes).unwrap();
    let chars = BTreeSet::from(['A', 'é']);
    let err = font.subset(&chars, &SubsetOptions::default()).unwrap_err();
    assert!(
        matches!(err.kind(), ParseErrorKind::CyclicComposite(idx) if *idx == glyph_idx),
        "{err:?}"
    );
    assert_eq!(err.table(), Some(TableTag::GLYF));
}

fn assert_valid_font(raw: &[u8], is_ttf: bool, expected_chars: impl Iterator<Item = char>) {
    if is_ttf {
        Font::new(raw).unwrap();
    }

    let font_file = ReadScope::new(raw).read::<FontData>().unwrap();
    let font_provider = font_file.table_provider(0).unwrap();
    let mut font = allsorts::Font::new(font_provider).unwrap();
    for ch in expected_chars {
        let (glyph_id, _) = font.lookup_glyph_index(ch, MatchingPresentation::NotRequired, None);
        assert_ne!(glyph_id, 0, "{ch:?}");
    }

    OpenTypeSanitizer::get().validate(raw);
}
