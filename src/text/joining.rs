//! # Cursive Joining
//!
//! Contextual form selection for joining scripts, used when a font has no
//! OpenType tables to do it (the builtin font). Each Arabic letter is
//! mapped to its isolated, final, initial or medial presentation form
//! depending on whether its neighbours join to it, and lam + alef pairs
//! become the mandatory lam-alef ligature.
//!
//! Fonts with GSUB tables are shaped by rustybuzz instead and never pass
//! through here.

use unicode_script::Script;

/// Joining behaviour of a character (ArabicShaping.txt).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoiningType {
    NonJoining,
    /// Joins only to the preceding letter.
    RightJoining,
    DualJoining,
    /// Tatweel and ZWJ.
    JoinCausing,
    /// Marks; skipped when looking for neighbours.
    Transparent,
}

/// Contextual form of a joining letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoiningForm {
    Isolated,
    Final,
    Initial,
    Medial,
}

pub fn joining_type(ch: char) -> JoiningType {
    use JoiningType::*;
    match ch {
        '\u{0621}' => NonJoining,
        '\u{0622}'..='\u{0625}' => RightJoining,
        '\u{0626}' => DualJoining,
        '\u{0627}' => RightJoining,
        '\u{0628}' => DualJoining,
        '\u{0629}' => RightJoining,
        '\u{062A}'..='\u{062E}' => DualJoining,
        '\u{062F}'..='\u{0632}' => RightJoining,
        '\u{0633}'..='\u{063F}' => DualJoining,
        '\u{0640}' => JoinCausing,
        '\u{0641}'..='\u{0647}' => DualJoining,
        '\u{0648}' => RightJoining,
        '\u{0649}'..='\u{064A}' => DualJoining,
        '\u{064B}'..='\u{065F}' | '\u{0670}' | '\u{0610}'..='\u{061A}' => Transparent,
        '\u{06D6}'..='\u{06DC}' | '\u{06DF}'..='\u{06E4}' | '\u{06E7}'..='\u{06E8}' => Transparent,
        '\u{06EA}'..='\u{06ED}' => Transparent,
        '\u{0300}'..='\u{036F}' | '\u{0591}'..='\u{05BD}' | '\u{05BF}'..='\u{05C7}' => Transparent,
        '\u{200D}' => JoinCausing,
        _ => NonJoining,
    }
}

/// True when `ch` attaches to the character before it and must stay in the
/// same run: combining marks and ZWJ.
pub fn binds_to_previous(ch: char) -> bool {
    matches!(joining_type(ch), JoiningType::Transparent) || ch == '\u{200D}'
}

/// Scripts whose letters change shape with their neighbours.
pub fn is_joining_script(script: Script) -> bool {
    matches!(
        script,
        Script::Arabic | Script::Syriac | Script::Nko | Script::Mongolian | Script::Mandaic
    )
}

fn joins_forward(t: JoiningType) -> bool {
    matches!(t, JoiningType::DualJoining | JoiningType::JoinCausing)
}

fn joins_backward(t: JoiningType) -> bool {
    matches!(
        t,
        JoiningType::DualJoining | JoiningType::RightJoining | JoiningType::JoinCausing
    )
}

/// Contextual form of every character in logical order. Non-joining and
/// transparent characters report `Isolated`.
pub fn joining_forms(chars: &[char]) -> Vec<JoiningForm> {
    let types: Vec<JoiningType> = chars.iter().map(|&c| joining_type(c)).collect();
    let neighbour = |from: usize, step: isize| -> Option<JoiningType> {
        let mut i = from as isize + step;
        while i >= 0 && (i as usize) < types.len() {
            let t = types[i as usize];
            if t != JoiningType::Transparent {
                return Some(t);
            }
            i += step;
        }
        None
    };

    types
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            if matches!(t, JoiningType::NonJoining | JoiningType::Transparent) {
                return JoiningForm::Isolated;
            }
            let prev = neighbour(i, -1).is_some_and(joins_forward) && joins_backward(t);
            let next = neighbour(i, 1).is_some_and(joins_backward) && joins_forward(t);
            match (prev, next) {
                (true, true) => JoiningForm::Medial,
                (true, false) => JoiningForm::Final,
                (false, true) => JoiningForm::Initial,
                (false, false) => JoiningForm::Isolated,
            }
        })
        .collect()
}

// ── Presentation Forms-B ───────────────────────────────────────

/// (base letter, first presentation form, number of forms). Forms are laid
/// out isolated, final, initial, medial.
const FORMS: &[(char, u32, u32)] = &[
    ('\u{0621}', 0xFE80, 1),
    ('\u{0622}', 0xFE81, 2),
    ('\u{0623}', 0xFE83, 2),
    ('\u{0624}', 0xFE85, 2),
    ('\u{0625}', 0xFE87, 2),
    ('\u{0626}', 0xFE89, 4),
    ('\u{0627}', 0xFE8D, 2),
    ('\u{0628}', 0xFE8F, 4),
    ('\u{0629}', 0xFE93, 2),
    ('\u{062A}', 0xFE95, 4),
    ('\u{062B}', 0xFE99, 4),
    ('\u{062C}', 0xFE9D, 4),
    ('\u{062D}', 0xFEA1, 4),
    ('\u{062E}', 0xFEA5, 4),
    ('\u{062F}', 0xFEA9, 2),
    ('\u{0630}', 0xFEAB, 2),
    ('\u{0631}', 0xFEAD, 2),
    ('\u{0632}', 0xFEAF, 2),
    ('\u{0633}', 0xFEB1, 4),
    ('\u{0634}', 0xFEB5, 4),
    ('\u{0635}', 0xFEB9, 4),
    ('\u{0636}', 0xFEBD, 4),
    ('\u{0637}', 0xFEC1, 4),
    ('\u{0638}', 0xFEC5, 4),
    ('\u{0639}', 0xFEC9, 4),
    ('\u{063A}', 0xFECD, 4),
    ('\u{0641}', 0xFED1, 4),
    ('\u{0642}', 0xFED5, 4),
    ('\u{0643}', 0xFED9, 4),
    ('\u{0644}', 0xFEDD, 4),
    ('\u{0645}', 0xFEE1, 4),
    ('\u{0646}', 0xFEE5, 4),
    ('\u{0647}', 0xFEE9, 4),
    ('\u{0648}', 0xFEED, 2),
    ('\u{0649}', 0xFEEF, 2),
    ('\u{064A}', 0xFEF1, 4),
];

/// Lam-alef ligatures: (alef variant, isolated, final).
const LAM_ALEF: &[(char, char, char)] = &[
    ('\u{0622}', '\u{FEF5}', '\u{FEF6}'),
    ('\u{0623}', '\u{FEF7}', '\u{FEF8}'),
    ('\u{0625}', '\u{FEF9}', '\u{FEFA}'),
    ('\u{0627}', '\u{FEFB}', '\u{FEFC}'),
];

const LAM: char = '\u{0644}';

fn form_index(form: JoiningForm) -> u32 {
    match form {
        JoiningForm::Isolated => 0,
        JoiningForm::Final => 1,
        JoiningForm::Initial => 2,
        JoiningForm::Medial => 3,
    }
}

/// The presentation form for `ch` in `form`. Letters with fewer forms fall
/// back: initial to isolated, medial to final.
pub fn presentation_char(ch: char, form: JoiningForm) -> char {
    let Some(&(_, start, count)) = FORMS.iter().find(|(base, _, _)| *base == ch) else {
        return ch;
    };
    let mut idx = form_index(form);
    if idx >= count {
        idx = if count >= 2 { idx - 2 } else { 0 };
    }
    char::from_u32(start + idx).unwrap_or(ch)
}

/// Which contextual form a presentation-form code point encodes.
pub fn presentation_form(ch: char) -> Option<JoiningForm> {
    let cp = ch as u32;
    if let Some(&(_, iso, _)) = LAM_ALEF
        .iter()
        .find(|(_, iso, fin)| *iso == ch || *fin == ch)
    {
        return Some(if iso == ch {
            JoiningForm::Isolated
        } else {
            JoiningForm::Final
        });
    }
    FORMS
        .iter()
        .find(|(_, start, count)| cp >= *start && cp < start + count)
        .map(|(_, start, _)| match cp - start {
            0 => JoiningForm::Isolated,
            1 => JoiningForm::Final,
            2 => JoiningForm::Initial,
            _ => JoiningForm::Medial,
        })
}

/// A shaped character and the logical source it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinedChar {
    pub ch: char,
    /// Index of the first source character.
    pub source: usize,
    /// Number of source characters consumed (2 for lam-alef).
    pub len: usize,
}

/// Replace joining letters with their contextual presentation forms.
/// Lam followed by an alef variant is fused into one ligature.
pub fn apply_joining(chars: &[char]) -> Vec<JoinedChar> {
    let forms = joining_forms(chars);
    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch == LAM {
            if let Some(&(_, iso, fin)) = chars
                .get(i + 1)
                .and_then(|next| LAM_ALEF.iter().find(|(alef, _, _)| alef == next))
            {
                let joined_before = matches!(forms[i], JoiningForm::Final | JoiningForm::Medial);
                out.push(JoinedChar {
                    ch: if joined_before { fin } else { iso },
                    source: i,
                    len: 2,
                });
                i += 2;
                continue;
            }
        }
        out.push(JoinedChar {
            ch: presentation_char(ch, forms[i]),
            source: i,
            len: 1,
        });
        i += 1;
    }
    out
}
