//! # Glyph Shaping
//!
//! Turns one [`TextRun`] into positioned glyphs for a font.
//!
//! Custom OpenType fonts are shaped with rustybuzz, which applies GSUB/GPOS
//! (joining forms, ligatures, kerning, mark positioning, mirroring). The
//! builtin font has no layout tables, so its path does the same work by
//! hand: contextual joining through Presentation Forms-B, lam-alef
//! ligatures, zero-advance marks centered over their base, and bracket
//! mirroring at odd levels.
//!
//! Glyphs come out in visual order: for an RTL run the first glyph is the
//! leftmost one, which belongs to the logically last cluster.

use unicode_bidi::Level;

use super::bidi;
use super::joining::{self, JoinedChar};
use super::TextRun;
use crate::error::{PlacardError, Result};
use crate::font::{builtin, Font, FontData};

/// A single positioned glyph, in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedGlyph {
    pub glyph_id: u16,
    /// Byte offset, in the slot text, of the first character this glyph
    /// came from.
    pub cluster: usize,
    pub x_advance: f64,
    pub x_offset: f64,
    pub y_offset: f64,
}

/// The shaped form of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedGlyphRun {
    /// Byte range of the source run in the slot text.
    pub start: usize,
    pub end: usize,
    pub level: Level,
    pub font_size: f64,
    /// Visual order.
    pub glyphs: Vec<ShapedGlyph>,
}

impl ShapedGlyphRun {
    pub fn width(&self) -> f64 {
        self.glyphs.iter().map(|g| g.x_advance).sum()
    }

    pub fn is_rtl(&self) -> bool {
        self.level.is_rtl()
    }
}

/// Result of lenient shaping: the run plus every code point that had to
/// be replaced by the fallback glyph, first occurrence order.
#[derive(Debug, Clone)]
pub struct ShapeOutcome {
    pub run: ShapedGlyphRun,
    pub missing: Vec<char>,
}

/// Shape a run, failing on the first code point the font cannot render.
pub fn shape(text: &str, run: &TextRun, font: &Font, font_size: f64) -> Result<ShapedGlyphRun> {
    let (shaped, missing) = shape_inner(text, run, font, font_size, None);
    match missing.first() {
        Some(&ch) => Err(PlacardError::UnsupportedGlyph {
            font: font.id.clone(),
            ch,
        }),
        None => Ok(shaped),
    }
}

/// Shape a run, drawing `fallback` wherever the font has no glyph.
pub fn shape_with_fallback(
    text: &str,
    run: &TextRun,
    font: &Font,
    font_size: f64,
    fallback: char,
) -> ShapeOutcome {
    let (run, missing) = shape_inner(text, run, font, font_size, Some(fallback));
    ShapeOutcome { run, missing }
}

/// Glyphs for the truncation ellipsis: U+2026 when the font has it,
/// otherwise three full stops, otherwise the fallback glyph.
pub fn shape_ellipsis(font: &Font, font_size: f64, fallback: char, cluster: usize) -> Vec<ShapedGlyph> {
    let glyph = |gid: u16| ShapedGlyph {
        glyph_id: gid,
        cluster,
        x_advance: font.glyph_advance(gid, font_size),
        x_offset: 0.0,
        y_offset: 0.0,
    };
    if let Some(gid) = font.glyph_id('…') {
        vec![glyph(gid)]
    } else if let Some(gid) = font.glyph_id('.') {
        vec![glyph(gid); 3]
    } else {
        font.glyph_id(fallback).map(glyph).into_iter().collect()
    }
}

fn shape_inner(
    text: &str,
    run: &TextRun,
    font: &Font,
    font_size: f64,
    fallback: Option<char>,
) -> (ShapedGlyphRun, Vec<char>) {
    let mut missing = Vec::new();
    let glyphs = match &font.data {
        FontData::Builtin => shape_builtin(text, run, font_size, fallback, &mut missing),
        FontData::Custom { data, .. } => {
            shape_custom(text, run, font, data, font_size, fallback, &mut missing)
        }
    };
    (
        ShapedGlyphRun {
            start: run.start,
            end: run.end,
            level: run.level,
            font_size,
            glyphs,
        },
        missing,
    )
}

fn note_missing(missing: &mut Vec<char>, ch: char) {
    if !missing.contains(&ch) {
        missing.push(ch);
    }
}

// ── Builtin font ───────────────────────────────────────────────

fn shape_builtin(
    text: &str,
    run: &TextRun,
    font_size: f64,
    fallback: Option<char>,
    missing: &mut Vec<char>,
) -> Vec<ShapedGlyph> {
    let slice = run.text(text);
    let indexed: Vec<(usize, char)> = slice.char_indices().collect();
    let chars: Vec<char> = indexed.iter().map(|&(_, c)| c).collect();

    let joined: Vec<JoinedChar> = if joining::is_joining_script(run.script) {
        joining::apply_joining(&chars)
    } else {
        chars
            .iter()
            .enumerate()
            .map(|(i, &ch)| JoinedChar {
                ch,
                source: i,
                len: 1,
            })
            .collect()
    };

    let scale = builtin::METRICS.scale(font_size);
    let rtl = run.is_rtl();

    // Each group is a base glyph followed by the marks stacked on it.
    let mut groups: Vec<Vec<ShapedGlyph>> = Vec::new();
    for j in joined {
        let source_char = chars[j.source];
        if builtin::is_default_ignorable(source_char) {
            continue;
        }
        let cluster = run.start + indexed[j.source].0;
        let mut ch = j.ch;
        if rtl {
            ch = bidi::mirror(ch).unwrap_or(ch);
        }

        let ch = match builtin::glyph_id(ch) {
            Some(_) => ch,
            None => {
                note_missing(missing, source_char);
                match fallback.filter(|&f| builtin::has_glyph(f)) {
                    Some(f) => f,
                    None => continue,
                }
            }
        };
        let gid = ch as u16;

        if builtin::is_mark(ch) {
            let base_advance = groups
                .last()
                .and_then(|g| g.first())
                .map(|g| g.x_advance)
                .unwrap_or(0.0);
            let mark = ShapedGlyph {
                glyph_id: gid,
                cluster,
                x_advance: 0.0,
                x_offset: -base_advance / 2.0,
                y_offset: 0.0,
            };
            match groups.last_mut() {
                Some(group) => group.push(mark),
                None => groups.push(vec![mark]),
            }
        } else {
            groups.push(vec![ShapedGlyph {
                glyph_id: gid,
                cluster,
                x_advance: builtin::advance(ch) as f64 * scale,
                x_offset: 0.0,
                y_offset: 0.0,
            }]);
        }
    }

    if rtl {
        groups.reverse();
    }
    groups.into_iter().flatten().collect()
}

// ── OpenType fonts ─────────────────────────────────────────────

fn shape_custom(
    text: &str,
    run: &TextRun,
    font: &Font,
    data: &[u8],
    font_size: f64,
    fallback: Option<char>,
    missing: &mut Vec<char>,
) -> Vec<ShapedGlyph> {
    let slice = run.text(text);
    let Some(face) = rustybuzz::Face::from_slice(data, 0) else {
        for ch in slice.chars().filter(|&c| !builtin::is_default_ignorable(c)) {
            note_missing(missing, ch);
        }
        return Vec::new();
    };

    let mut buffer = rustybuzz::UnicodeBuffer::new();
    buffer.push_str(slice);
    buffer.set_direction(if run.is_rtl() {
        rustybuzz::Direction::RightToLeft
    } else {
        rustybuzz::Direction::LeftToRight
    });
    buffer.guess_segment_properties();

    let output = rustybuzz::shape(&face, &[], buffer);
    let scale = font.metrics().scale(font_size);
    let fallback_gid = fallback.and_then(|f| font.glyph_id(f));

    let mut glyphs = Vec::with_capacity(output.len());
    for (info, pos) in output.glyph_infos().iter().zip(output.glyph_positions()) {
        let local = info.cluster as usize;
        let cluster = run.start + local;
        let ch = slice[local..].chars().next().unwrap_or('\u{FFFD}');
        // Controls and line terminators draw nothing even if the font maps them.
        if builtin::is_default_ignorable(ch) {
            continue;
        }
        if info.glyph_id == 0 {
            note_missing(missing, ch);
            if let Some(gid) = fallback_gid {
                glyphs.push(ShapedGlyph {
                    glyph_id: gid,
                    cluster,
                    x_advance: font.glyph_advance(gid, font_size),
                    x_offset: 0.0,
                    y_offset: 0.0,
                });
            }
            continue;
        }
        glyphs.push(ShapedGlyph {
            glyph_id: info.glyph_id as u16,
            cluster,
            x_advance: pos.x_advance as f64 * scale,
            x_offset: pos.x_offset as f64 * scale,
            y_offset: pos.y_offset as f64 * scale,
        });
    }
    glyphs
}
