//! # Font Management
//!
//! Registration and lookup of the fonts text slots refer to by id.
//!
//! Every registry starts with the deterministic builtin font registered
//! under [`BUILTIN_FONT`]; it is also the fallback for unknown ids. Custom
//! TrueType/OpenType fonts are parsed with ttf-parser once at
//! registration so a broken file is rejected at startup, not mid-render.

pub mod builtin;

use std::collections::HashMap;

use crate::error::{PlacardError, Result};

/// Id of the font that is always available.
pub const BUILTIN_FONT: &str = "builtin";

/// A registered font.
#[derive(Debug, Clone)]
pub struct Font {
    pub id: String,
    pub data: FontData,
}

#[derive(Debug, Clone)]
pub enum FontData {
    /// The builtin font. No font file behind it.
    Builtin,
    /// A TrueType/OpenType font file.
    Custom {
        data: Vec<u8>,
        metrics: FontMetrics,
    },
}

/// Vertical metrics in font units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    pub units_per_em: u16,
    pub ascender: i16,
    pub descender: i16,
    pub line_gap: i16,
}

impl FontMetrics {
    /// Parse vertical metrics from font data using ttf-parser.
    pub fn from_font_data(data: &[u8]) -> Option<Self> {
        let face = ttf_parser::Face::parse(data, 0).ok()?;
        Some(FontMetrics {
            units_per_em: face.units_per_em(),
            ascender: face.ascender(),
            descender: face.descender(),
            line_gap: face.line_gap(),
        })
    }

    /// Pixels per font unit at `font_size`.
    pub fn scale(&self, font_size: f64) -> f64 {
        font_size / self.units_per_em.max(1) as f64
    }

    /// Distance from the top of a line to its baseline, in pixels.
    pub fn ascent(&self, font_size: f64) -> f64 {
        self.ascender as f64 * self.scale(font_size)
    }

    /// Baseline-to-baseline distance in pixels, times `factor`.
    pub fn line_height(&self, font_size: f64, factor: f64) -> f64 {
        let units = self.ascender as f64 - self.descender as f64 + self.line_gap as f64;
        units * self.scale(font_size) * factor
    }
}

impl Font {
    pub fn builtin() -> Self {
        Font {
            id: BUILTIN_FONT.to_string(),
            data: FontData::Builtin,
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.data, FontData::Builtin)
    }

    pub fn metrics(&self) -> FontMetrics {
        match &self.data {
            FontData::Builtin => builtin::METRICS,
            FontData::Custom { metrics, .. } => *metrics,
        }
    }

    /// Glyph id for a code point, if the font covers it.
    pub fn glyph_id(&self, ch: char) -> Option<u16> {
        match &self.data {
            FontData::Builtin => builtin::glyph_id(ch),
            FontData::Custom { data, .. } => {
                let face = ttf_parser::Face::parse(data, 0).ok()?;
                face.glyph_index(ch).map(|g| g.0)
            }
        }
    }

    pub fn has_glyph(&self, ch: char) -> bool {
        self.glyph_id(ch).is_some()
    }

    /// Horizontal advance of a glyph in pixels at `font_size`.
    pub fn glyph_advance(&self, glyph_id: u16, font_size: f64) -> f64 {
        let units = match &self.data {
            FontData::Builtin => builtin::glyph_advance(glyph_id),
            FontData::Custom { data, .. } => ttf_parser::Face::parse(data, 0)
                .ok()
                .and_then(|f| f.glyph_hor_advance(ttf_parser::GlyphId(glyph_id)))
                .unwrap_or(0),
        };
        units as f64 * self.metrics().scale(font_size)
    }

    /// A handle that can emit glyph outlines in font units, y up.
    pub fn outliner(&self) -> Result<GlyphOutliner<'_>> {
        match &self.data {
            FontData::Builtin => Ok(GlyphOutliner::Builtin),
            FontData::Custom { data, .. } => ttf_parser::Face::parse(data, 0)
                .map(GlyphOutliner::Face)
                .map_err(|e| PlacardError::FontError(format!("{}: {}", self.id, e))),
        }
    }
}

/// Outline source for one font, borrowed for the duration of a draw.
pub enum GlyphOutliner<'a> {
    Builtin,
    Face(ttf_parser::Face<'a>),
}

impl GlyphOutliner<'_> {
    /// Emit the outline of `glyph_id`. Returns false for empty glyphs.
    pub fn outline(&self, glyph_id: u16, builder: &mut dyn ttf_parser::OutlineBuilder) -> bool {
        match self {
            GlyphOutliner::Builtin => builtin::outline(glyph_id, builder),
            GlyphOutliner::Face(face) => face
                .outline_glyph(ttf_parser::GlyphId(glyph_id), builder)
                .is_some(),
        }
    }
}

/// Maps font ids to fonts.
pub struct FontRegistry {
    builtin: Font,
    fonts: HashMap<String, Font>,
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            builtin: Font::builtin(),
            fonts: HashMap::new(),
        }
    }

    /// Register a TrueType/OpenType font under `id`.
    pub fn register(&mut self, id: &str, data: Vec<u8>) -> Result<()> {
        if id == BUILTIN_FONT {
            return Err(PlacardError::InvalidConfig(format!(
                "font id '{}' is reserved",
                BUILTIN_FONT
            )));
        }
        let metrics = FontMetrics::from_font_data(&data)
            .ok_or_else(|| PlacardError::FontError(format!("'{}' is not a valid font file", id)))?;
        self.fonts.insert(
            id.to_string(),
            Font {
                id: id.to_string(),
                data: FontData::Custom { data, metrics },
            },
        );
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        id == BUILTIN_FONT || self.fonts.contains_key(id)
    }

    /// Look up a font, falling back to the builtin font if not found.
    pub fn resolve(&self, id: &str) -> &Font {
        self.fonts.get(id).unwrap_or(&self.builtin)
    }

    /// Registered font ids, sorted, builtin included.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.fonts.keys().cloned().collect();
        ids.push(BUILTIN_FONT.to_string());
        ids.sort();
        ids
    }
}

/// Shared font context used by shaping, layout and compositing.
pub struct FontContext {
    registry: FontRegistry,
    fallback_char: char,
}

impl Default for FontContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FontContext {
    pub fn new() -> Self {
        Self {
            registry: FontRegistry::new(),
            fallback_char: '?',
        }
    }

    /// Character drawn in place of code points a font cannot render.
    pub fn fallback_char(&self) -> char {
        self.fallback_char
    }

    pub fn set_fallback_char(&mut self, ch: char) {
        self.fallback_char = ch;
    }

    pub fn resolve(&self, id: &str) -> &Font {
        self.registry.resolve(id)
    }

    pub fn registry(&self) -> &FontRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FontRegistry {
        &mut self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_always_registered() {
        let ctx = FontContext::new();
        assert!(ctx.registry().contains(BUILTIN_FONT));
        assert!(ctx.resolve(BUILTIN_FONT).is_builtin());
    }

    #[test]
    fn test_unknown_font_falls_back() {
        let ctx = FontContext::new();
        assert!(ctx.resolve("NoSuchFont").is_builtin());
    }

    #[test]
    fn test_register_rejects_garbage() {
        let mut registry = FontRegistry::new();
        let err = registry.register("broken", vec![0, 1, 2, 3]).unwrap_err();
        assert_eq!(err.code(), "FontError");
        assert!(!registry.contains("broken"));
    }

    #[test]
    fn test_register_rejects_reserved_id() {
        let mut registry = FontRegistry::new();
        assert!(registry.register(BUILTIN_FONT, vec![]).is_err());
    }

    const DEJAVU: &[u8] = include_bytes!("../../tests/fixtures/DejaVuSans.ttf");

    #[derive(Default)]
    struct Counter {
        commands: usize,
    }

    impl ttf_parser::OutlineBuilder for Counter {
        fn move_to(&mut self, _: f32, _: f32) {
            self.commands += 1;
        }
        fn line_to(&mut self, _: f32, _: f32) {
            self.commands += 1;
        }
        fn quad_to(&mut self, _: f32, _: f32, _: f32, _: f32) {
            self.commands += 1;
        }
        fn curve_to(&mut self, _: f32, _: f32, _: f32, _: f32, _: f32, _: f32) {
            self.commands += 1;
        }
        fn close(&mut self) {}
    }

    #[test]
    fn test_custom_font_metrics_and_outlines() {
        let metrics = FontMetrics::from_font_data(DEJAVU).unwrap();
        assert_eq!(metrics.units_per_em, 2048);
        assert!(metrics.ascender > 0 && metrics.descender < 0);

        let mut registry = FontRegistry::new();
        registry.register("dejavu", DEJAVU.to_vec()).unwrap();
        let font = registry.resolve("dejavu");
        assert!(!font.is_builtin());
        assert_eq!(font.metrics(), metrics);

        let outliner = font.outliner().unwrap();
        assert!(matches!(outliner, GlyphOutliner::Face(_)));
        let mut counter = Counter::default();
        assert!(outliner.outline(font.glyph_id('A').unwrap(), &mut counter));
        assert!(counter.commands > 0);
        // Space has an advance but no contours.
        let space = font.glyph_id(' ').unwrap();
        assert!(!outliner.outline(space, &mut Counter::default()));
        assert!(font.glyph_advance(space, 20.0) > 0.0);
    }

    #[test]
    fn test_builtin_metrics() {
        let m = Font::builtin().metrics();
        assert!((m.ascent(20.0) - 16.0).abs() < 1e-9);
        assert!((m.line_height(20.0, 1.0) - 20.0).abs() < 1e-9);
        assert!((m.line_height(20.0, 1.5) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_builtin_advance_in_pixels() {
        let font = Font::builtin();
        let gid = font.glyph_id('a').unwrap();
        assert!((font.glyph_advance(gid, 20.0) - 10.0).abs() < 1e-9);
    }
}
