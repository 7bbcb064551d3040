//! # Text Pipeline
//!
//! Segmentation, bidi resolution, shaping and line breaking for one slot's
//! text. Everything here is a pure function of its inputs.
//!
//! `segment` splits the text into [`TextRun`]s of uniform script and
//! embedding level, which is the granularity the shaper and the line
//! breaker work at.

pub mod bidi;
pub mod joining;
pub mod linebreak;
pub mod shaping;

use unicode_bidi::Level;
use unicode_script::{Script, UnicodeScript};

use crate::style::Direction;

/// A maximal substring of uniform script and embedding level.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// Start byte offset into the slot text.
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
    pub script: Script,
    pub level: Level,
}

impl TextRun {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    pub fn is_rtl(&self) -> bool {
        self.level.is_rtl()
    }
}

/// The runs of one text plus the paragraph level they were resolved under.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedText {
    pub base_level: Level,
    /// Logical order; they partition the text exactly.
    pub runs: Vec<TextRun>,
}

fn is_strong_script(script: Script) -> bool {
    !matches!(script, Script::Common | Script::Inherited | Script::Unknown)
}

/// Split `text` into runs at every level change and every change between
/// two strong scripts.
///
/// Common and inherited characters (spaces, digits, punctuation, marks)
/// take the script of the run they are in; a run's script is set by its
/// first strong character. Marks and joiners never open a run of their own
/// while the level is unchanged, so joining sequences stay together.
pub fn segment(text: &str, direction: Direction) -> SegmentedText {
    let analysis = bidi::analyze(text, direction);
    let mut runs: Vec<TextRun> = Vec::new();

    let mut start = 0;
    let mut level = analysis.base_level;
    let mut script: Option<Script> = None;

    for (idx, ch) in text.char_indices() {
        let ch_level = analysis.levels.get(idx).copied().unwrap_or(level);
        let ch_script = ch.script();

        if idx == 0 {
            level = ch_level;
        } else {
            let level_break = ch_level != level;
            let script_break = !joining::binds_to_previous(ch)
                && is_strong_script(ch_script)
                && script.is_some_and(|s| s != ch_script);
            if level_break || script_break {
                runs.push(TextRun {
                    start,
                    end: idx,
                    script: script.unwrap_or(Script::Common),
                    level,
                });
                start = idx;
                level = ch_level;
                script = None;
            }
        }

        if script.is_none() && is_strong_script(ch_script) {
            script = Some(ch_script);
        }
    }

    if start < text.len() {
        runs.push(TextRun {
            start,
            end: text.len(),
            script: script.unwrap_or(Script::Common),
            level,
        });
    }

    SegmentedText {
        base_level: analysis.base_level,
        runs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(text: &str, runs: &[TextRun]) {
        let mut pos = 0;
        for run in runs {
            assert_eq!(run.start, pos, "gap or overlap at byte {}", pos);
            assert!(run.end > run.start);
            pos = run.end;
        }
        assert_eq!(pos, text.len());
    }

    #[test]
    fn test_segment_pure_ltr() {
        let seg = segment("Hello World", Direction::Auto);
        assert_eq!(seg.runs.len(), 1);
        assert_eq!(seg.runs[0].script, Script::Latin);
        assert!(!seg.runs[0].is_rtl());
    }

    #[test]
    fn test_segment_mixed() {
        let text = "مرحبا World";
        let seg = segment(text, Direction::Auto);
        assert!(seg.base_level.is_rtl());
        assert_eq!(seg.runs.len(), 2);
        assert_eq!(seg.runs[0].text(text), "مرحبا ");
        assert_eq!(seg.runs[0].script, Script::Arabic);
        assert_eq!(seg.runs[0].level.number(), 1);
        assert_eq!(seg.runs[1].text(text), "World");
        assert_eq!(seg.runs[1].script, Script::Latin);
        assert_eq!(seg.runs[1].level.number(), 2);
        assert_partition(text, &seg.runs);
    }

    #[test]
    fn test_digits_in_rtl_split_by_level() {
        let text = "שלום 123 עולם";
        let seg = segment(text, Direction::Auto);
        assert_partition(text, &seg.runs);
        let digits = seg
            .runs
            .iter()
            .find(|r| r.text(text).contains("123"))
            .unwrap();
        assert_eq!(digits.text(text), "123");
        assert_eq!(digits.level.number(), 2);
        assert_eq!(seg.runs.len(), 3);
    }

    #[test]
    fn test_script_change_same_level() {
        let text = "abc αβγ";
        let seg = segment(text, Direction::Ltr);
        assert_partition(text, &seg.runs);
        assert_eq!(seg.runs.len(), 2);
        assert_eq!(seg.runs[0].text(text), "abc ");
        assert_eq!(seg.runs[1].script, Script::Greek);
    }

    #[test]
    fn test_marks_stay_with_base() {
        let text = "بَت";
        let seg = segment(text, Direction::Auto);
        assert_eq!(seg.runs.len(), 1);
        assert_eq!(seg.runs[0].script, Script::Arabic);
    }

    #[test]
    fn test_leading_neutral_takes_following_script() {
        let seg = segment("123 abc", Direction::Ltr);
        assert_eq!(seg.runs.len(), 1);
        assert_eq!(seg.runs[0].script, Script::Latin);
    }

    #[test]
    fn test_segment_empty() {
        let seg = segment("", Direction::Auto);
        assert!(seg.runs.is_empty());
        assert!(!seg.base_level.is_rtl());
    }

    #[test]
    fn test_partition_property() {
        for text in [
            "Hello (مرحبا) 42 World",
            "a\nب\nc",
            "«שלום» hello, مرحبا!",
            "   ",
            "x",
        ] {
            for dir in [Direction::Auto, Direction::Ltr, Direction::Rtl] {
                let seg = segment(text, dir);
                assert_partition(text, &seg.runs);
            }
        }
    }
}
