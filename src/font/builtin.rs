//! The builtin font.
//!
//! A synthetic, file-less font with fixed metrics so that widths and line
//! breaks are reproducible on every machine. It covers Basic Latin,
//! Latin-1, combining diacritics, Hebrew, Arabic (including Presentation
//! Forms-B) and general punctuation. Glyph ids are the code points.
//!
//! Letters are drawn as hollow boxes. Joined Arabic forms get a baseline
//! connector on each joined side so cursive joining is visible.

use ttf_parser::OutlineBuilder;

use super::FontMetrics;
use crate::text::joining::{presentation_form, JoiningForm};

pub const METRICS: FontMetrics = FontMetrics {
    units_per_em: 1000,
    ascender: 800,
    descender: -200,
    line_gap: 0,
};

const SPACE_ADVANCE: u16 = 250;
const PUNCT_ADVANCE: u16 = 300;
const UPPER_ADVANCE: u16 = 600;
const LETTER_ADVANCE: u16 = 500;
const ELLIPSIS_ADVANCE: u16 = 800;

const LETTER_HEIGHT: f32 = 700.0;
const UPPER_HEIGHT: f32 = 750.0;
const STROKE: f32 = 80.0;

/// Code points that produce no glyph at all.
pub fn is_default_ignorable(ch: char) -> bool {
    matches!(ch,
        '\u{0}'..='\u{1F}'
        | '\u{7F}'..='\u{9F}'
        | '\u{AD}'
        | '\u{200B}'..='\u{200F}'
        | '\u{202A}'..='\u{202E}'
        | '\u{2060}'..='\u{2064}'
        | '\u{2066}'..='\u{2069}'
        | '\u{FEFF}')
}

/// Zero-width combining marks.
pub fn is_mark(ch: char) -> bool {
    matches!(ch,
        '\u{0300}'..='\u{036F}'
        | '\u{0591}'..='\u{05BD}'
        | '\u{05BF}'
        | '\u{05C1}'..='\u{05C2}'
        | '\u{05C4}'..='\u{05C5}'
        | '\u{05C7}'
        | '\u{0610}'..='\u{061A}'
        | '\u{064B}'..='\u{065F}'
        | '\u{0670}'
        | '\u{06D6}'..='\u{06DC}'
        | '\u{06DF}'..='\u{06E4}'
        | '\u{06E7}'..='\u{06E8}'
        | '\u{06EA}'..='\u{06ED}')
}

fn is_space(ch: char) -> bool {
    matches!(ch, ' ' | '\u{A0}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}')
}

fn is_upper(ch: char) -> bool {
    ch.is_ascii_uppercase() || matches!(ch, '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{DE}')
}

fn is_covered(ch: char) -> bool {
    matches!(ch,
        '\u{20}'..='\u{7E}'
        | '\u{A0}'..='\u{FF}'
        | '\u{0300}'..='\u{036F}'
        | '\u{0590}'..='\u{05FF}'
        | '\u{0600}'..='\u{06FF}'
        | '\u{FE70}'..='\u{FEFC}'
        | '\u{2000}'..='\u{200A}'
        | '\u{2010}'..='\u{2027}'
        | '\u{202F}'
        | '\u{2030}'..='\u{203A}'
        | '\u{205F}'
        | '\u{20AC}')
}

pub fn has_glyph(ch: char) -> bool {
    !is_default_ignorable(ch) && is_covered(ch)
}

pub fn glyph_id(ch: char) -> Option<u16> {
    if has_glyph(ch) {
        u16::try_from(ch as u32).ok()
    } else {
        None
    }
}

/// Advance width in font units.
pub fn advance(ch: char) -> u16 {
    if !has_glyph(ch) || is_mark(ch) {
        0
    } else if is_space(ch) {
        SPACE_ADVANCE
    } else if ch == '…' {
        ELLIPSIS_ADVANCE
    } else if ch.is_ascii_punctuation() {
        PUNCT_ADVANCE
    } else if is_upper(ch) {
        UPPER_ADVANCE
    } else {
        LETTER_ADVANCE
    }
}

pub fn glyph_advance(glyph_id: u16) -> u16 {
    char::from_u32(glyph_id as u32).map(advance).unwrap_or(0)
}

fn rect(b: &mut dyn OutlineBuilder, x0: f32, y0: f32, x1: f32, y1: f32) {
    b.move_to(x0, y0);
    b.line_to(x1, y0);
    b.line_to(x1, y1);
    b.line_to(x0, y1);
    b.close();
}

// Wound the other way so it cuts a hole under the non-zero rule.
fn hole(b: &mut dyn OutlineBuilder, x0: f32, y0: f32, x1: f32, y1: f32) {
    b.move_to(x0, y0);
    b.line_to(x0, y1);
    b.line_to(x1, y1);
    b.line_to(x1, y0);
    b.close();
}

/// Emit the outline of a glyph in font units, y up. Returns false for
/// glyphs with no ink.
pub fn outline(glyph_id: u16, b: &mut dyn OutlineBuilder) -> bool {
    let Some(ch) = char::from_u32(glyph_id as u32) else {
        return false;
    };
    if !has_glyph(ch) || is_space(ch) {
        return false;
    }

    if is_mark(ch) {
        rect(b, -60.0, 760.0, 60.0, 880.0);
        return true;
    }

    let adv = advance(ch) as f32;
    if ch == '…' {
        for i in 0..3 {
            let x = adv * (0.15 + 0.3 * i as f32);
            rect(b, x, 0.0, x + 100.0, 100.0);
        }
        return true;
    }

    if ch.is_ascii_punctuation() || matches!(ch, '\u{2010}'..='\u{203A}') {
        rect(b, adv * 0.3, 0.0, adv * 0.7, 250.0);
        return true;
    }

    let top = if is_upper(ch) { UPPER_HEIGHT } else { LETTER_HEIGHT };
    let (x0, x1) = (adv * 0.1, adv * 0.9);
    rect(b, x0, 0.0, x1, top);
    hole(b, x0 + STROKE, STROKE, x1 - STROKE, top - STROKE);

    // Right-to-left forms: the previous letter sits to the right.
    if let Some(form) = presentation_form(ch) {
        let joins_prev = matches!(form, JoiningForm::Final | JoiningForm::Medial);
        let joins_next = matches!(form, JoiningForm::Initial | JoiningForm::Medial);
        if joins_prev {
            rect(b, x1, 0.0, adv, STROKE);
        }
        if joins_next {
            rect(b, 0.0, 0.0, x0, STROKE);
        }
    }
    true
}
