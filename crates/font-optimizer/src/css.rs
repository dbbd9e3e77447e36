//! Stylesheet snippet with `@font-face` rules and preload hints.

use std::fmt::{self, Write as _};

use crate::config::{FontEntry, PipelineConfig};

/// Format of a font source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFormat {
    /// TrueType.
    TrueType,
    /// WOFF2.
    Woff2,
}

impl FontFormat {
    fn css_format(self) -> &'static str {
        match self {
            Self::TrueType => "truetype",
            Self::Woff2 => "woff2",
        }
    }

    fn mime_type(self) -> &'static str {
        match self {
            Self::TrueType => "font/ttf",
            Self::Woff2 => "font/woff2",
        }
    }
}

/// Single `@font-face` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontFace {
    /// Font family.
    pub family: String,
    /// Sources in the preference order. The first source is preloaded.
    pub sources: Vec<(String, FontFormat)>,
}

impl FontFace {
    /// Creates a rule for a font processed according to `config`.
    pub fn new(config: &PipelineConfig, font: &FontEntry) -> Self {
        let mut sources = Vec::with_capacity(2);
        if config.woff2 {
            sources.push((
                config.public_url(&font.woff2_file_name()),
                FontFormat::Woff2,
            ));
        }
        sources.push((
            config.public_url(&font.subset_file_name()),
            FontFormat::TrueType,
        ));
        Self {
            family: font.family.clone(),
            sources,
        }
    }

    fn write_rule(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "@font-face {{")?;
        writeln!(out, "  font-family: '{}';", self.family)?;
        write!(out, "  src: ")?;
        for (i, (url, format)) in self.sources.iter().enumerate() {
            if i > 0 {
                write!(out, ",\n       ")?;
            }
            write!(out, "url('{url}') format('{}')", format.css_format())?;
        }
        writeln!(out, ";")?;
        writeln!(out, "  font-weight: normal;")?;
        writeln!(out, "  font-style: normal;")?;
        writeln!(out, "  font-display: swap;")?;
        writeln!(out, "}}")
    }

    fn write_preload(&self, out: &mut String) -> fmt::Result {
        let Some((url, format)) = self.sources.first() else {
            return Ok(());
        };
        writeln!(
            out,
            r#"<link rel="preload" href="{url}" as="font" type="{}" crossorigin>"#,
            format.mime_type()
        )
    }
}

/// Generates a stylesheet snippet for the specified rules.
pub fn generate_css(faces: &[FontFace]) -> String {
    let mut css = String::from("/* Optimized font faces */\n");
    for (i, face) in faces.iter().enumerate() {
        if i > 0 {
            css.push('\n');
        }
        face.write_rule(&mut css).expect("writing to string never fails");
    }

    css.push_str("\n/* Font preloading */\n");
    for face in faces {
        face.write_preload(&mut css)
            .expect("writing to string never fails");
    }
    css
}
