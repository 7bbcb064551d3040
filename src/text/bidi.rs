//! # BiDi Text Support
//!
//! Implements the parts of UAX#9 (Unicode Bidirectional Algorithm) the
//! engine needs. Uses `unicode-bidi` for level resolution.
//!
//! The pipeline:
//! 1. Resolve the paragraph level (explicit, or from the first strong char)
//! 2. Resolve an embedding level for every byte of the text
//! 3. After line breaking, the runs on each line are put in visual order
//!    with rule L2; glyphs inside RTL runs are already reversed by shaping
//! 4. Mirrored characters are swapped when shaped at an odd level

use unicode_bidi::{BidiInfo, Level};

use crate::style::Direction;

/// Resolved levels for one text.
#[derive(Debug, Clone)]
pub struct BidiAnalysis {
    pub base_level: Level,
    /// Embedding level of every byte of the input.
    pub levels: Vec<Level>,
}

/// The paragraph embedding level of `text` under `direction`.
///
/// `Auto` uses the first strong character of the first paragraph and
/// falls back to LTR when there is none.
pub fn paragraph_level(text: &str, direction: Direction) -> Level {
    match direction {
        Direction::Ltr => Level::ltr(),
        Direction::Rtl => Level::rtl(),
        Direction::Auto => {
            let info = BidiInfo::new(text, None);
            info.paragraphs
                .first()
                .map(|p| p.level)
                .unwrap_or_else(Level::ltr)
        }
    }
}

/// Resolve embedding levels for every byte of `text`.
///
/// All paragraphs (text split on newlines) share the base level of the
/// first one so a slot reads in one direction throughout.
pub fn analyze(text: &str, direction: Direction) -> BidiAnalysis {
    let base_level = paragraph_level(text, direction);
    if text.is_empty() {
        return BidiAnalysis {
            base_level,
            levels: Vec::new(),
        };
    }
    let info = BidiInfo::new(text, Some(base_level));
    BidiAnalysis {
        base_level,
        levels: info.levels,
    }
}

/// Visual order of items with the given levels (rule L2).
///
/// Returns logical indices in left-to-right display order. From the
/// highest level down to the lowest odd level, every maximal sequence at
/// that level or above is reversed. Levels travel with their items so
/// nested runs are reversed consistently.
pub fn visual_order(levels: &[Level]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..levels.len()).collect();
    if levels.is_empty() {
        return order;
    }
    let mut levels = levels.to_vec();

    let max_level = levels.iter().map(|l| l.number()).max().unwrap_or(0);
    let min_level = levels.iter().map(|l| l.number()).min().unwrap_or(0);
    if max_level == 0 {
        return order;
    }
    let lowest_odd = if min_level % 2 == 1 {
        min_level
    } else {
        min_level + 1
    };

    let mut current = max_level;
    while current >= lowest_odd {
        let mut i = 0;
        while i < levels.len() {
            if levels[i].number() >= current {
                let start = i;
                while i < levels.len() && levels[i].number() >= current {
                    i += 1;
                }
                order[start..i].reverse();
                levels[start..i].reverse();
            } else {
                i += 1;
            }
        }
        current -= 1;
    }
    order
}

/// The mirrored counterpart of a paired punctuation character, for
/// display at an odd embedding level.
pub fn mirror(ch: char) -> Option<char> {
    let pair = match ch {
        '(' => ')',
        ')' => '(',
        '[' => ']',
        ']' => '[',
        '{' => '}',
        '}' => '{',
        '<' => '>',
        '>' => '<',
        '«' => '»',
        '»' => '«',
        '‹' => '›',
        '›' => '‹',
        '⁅' => '⁆',
        '⁆' => '⁅',
        '⁽' => '⁾',
        '⁾' => '⁽',
        '₍' => '₎',
        '₎' => '₍',
        '≤' => '≥',
        '≥' => '≤',
        _ => return None,
    };
    Some(pair)
}
