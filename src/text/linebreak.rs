//! # Line Breaking and Truncation
//!
//! Greedy line filling over shaped runs. Break opportunities come from
//! UAX#14 via `unicode-linebreak`; the unit of measurement and of forced
//! splitting is the glyph cluster, so ligatures and mark stacks are never
//! torn apart.
//!
//! Lines are produced lazily by [`LineBreaker`], an iterator that stops
//! after `max_lines` lines. When content is left over at that point the
//! last line is refilled with the rest of its paragraph, trimmed cluster
//! by cluster until it fits together with the ellipsis, and closed with
//! the ellipsis. Runs on every emitted line are in visual order.

use std::collections::BTreeSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use unicode_bidi::Level;
use unicode_linebreak::{linebreaks, BreakOpportunity};

use super::bidi;
use super::shaping::{ShapedGlyph, ShapedGlyphRun};

const EPSILON: f64 = 1e-6;

/// Which embedding level the ellipsis takes on a mixed-direction line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EllipsisPlacement {
    /// The paragraph level: the ellipsis sits at the trailing edge of the
    /// line's dominant direction.
    #[default]
    ParagraphDirection,
    /// The level of the last kept run: the ellipsis follows the text it
    /// replaces.
    LastRun,
}

/// One laid-out line.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// Visual left-to-right order.
    pub runs: Vec<ShapedGlyphRun>,
    pub width: f64,
    /// Content was dropped after this line.
    pub truncated: bool,
    /// The ellipsis alone is wider than the box; nothing else was kept.
    pub ellipsis_overflow: bool,
    /// Paragraph level the line was ordered under.
    pub level: Level,
}

impl Line {
    pub fn glyph_count(&self) -> usize {
        self.runs.iter().map(|r| r.glyphs.len()).sum()
    }
}

#[derive(Debug, Clone)]
struct Cluster {
    run: usize,
    start: usize,
    end: usize,
    width: f64,
    glyphs: usize,
    whitespace: bool,
    newline: bool,
    break_before: bool,
}

impl Cluster {
    fn visible(&self) -> bool {
        self.glyphs > 0 && !self.whitespace && !self.newline
    }
}

/// Characters UAX#14 treats as hard line breaks (classes BK, CR, LF, NL).
fn is_line_terminator(ch: char) -> bool {
    matches!(
        ch,
        '\n' | '\u{0B}' | '\u{0C}' | '\r' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

/// Allowed and mandatory break offsets.
struct Breaks {
    any: BTreeSet<usize>,
    mandatory: BTreeSet<usize>,
}

impl Breaks {
    fn of(text: &str) -> Self {
        let mut any = BTreeSet::new();
        let mut mandatory = BTreeSet::new();
        for (idx, op) in linebreaks(text) {
            any.insert(idx);
            if op == BreakOpportunity::Mandatory {
                mandatory.insert(idx);
            }
        }
        Self { any, mandatory }
    }
}

/// Break shaped runs into lines. `max_lines == 0` means unlimited.
pub struct LineBreaker<'a> {
    text: &'a str,
    runs: &'a [ShapedGlyphRun],
    clusters: Vec<Cluster>,
    box_width: f64,
    max_lines: u32,
    ellipsis: Option<Vec<ShapedGlyph>>,
    placement: EllipsisPlacement,
    base_level: Level,
    pos: usize,
    emitted: u32,
    done: bool,
}

impl<'a> LineBreaker<'a> {
    /// `runs` must be in logical order and partition `text`.
    pub fn new(text: &'a str, runs: &'a [ShapedGlyphRun], box_width: f64, max_lines: u32) -> Self {
        Self {
            text,
            runs,
            clusters: build_clusters(text, runs, &Breaks::of(text)),
            box_width,
            max_lines,
            ellipsis: None,
            placement: EllipsisPlacement::default(),
            base_level: Level::ltr(),
            pos: 0,
            emitted: 0,
            done: false,
        }
    }

    /// Glyphs appended to a truncated last line. Without them a truncated
    /// line is simply cut.
    pub fn with_ellipsis(mut self, glyphs: Vec<ShapedGlyph>) -> Self {
        self.ellipsis = Some(glyphs);
        self
    }

    pub fn with_placement(mut self, placement: EllipsisPlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_base_level(mut self, level: Level) -> Self {
        self.base_level = level;
        self
    }

    /// Greedy fit from `self.pos`. Returns the cluster range of the line
    /// (trailing whitespace included) and where the next line starts.
    fn fit_line(&self) -> (Range<usize>, usize) {
        let start = self.pos;
        let mut width = 0.0;
        let mut has_content = false;
        let mut last_break: Option<usize> = None;

        let mut i = start;
        while i < self.clusters.len() {
            let c = &self.clusters[i];
            if c.newline {
                return (start..i, i + 1);
            }
            if i > start && c.break_before {
                last_break = Some(i);
            }
            // Whitespace hangs past the edge.
            if c.whitespace {
                width += c.width;
                i += 1;
                continue;
            }
            let candidate = width + c.width;
            if candidate <= self.box_width + EPSILON || !has_content {
                width = candidate;
                has_content = true;
                i += 1;
                continue;
            }
            return match last_break {
                Some(b) => (start..b, b),
                None => (start..i, i),
            };
        }
        (start..i, i)
    }

    fn trim_trailing_blank(&self, mut range: Range<usize>) -> Range<usize> {
        while range.end > range.start {
            let c = &self.clusters[range.end - 1];
            if c.whitespace || c.newline {
                range.end -= 1;
            } else {
                break;
            }
        }
        range
    }

    fn width_of(&self, range: &Range<usize>) -> f64 {
        self.clusters[range.clone()].iter().map(|c| c.width).sum()
    }

    fn paragraph_end(&self, from: usize) -> usize {
        self.clusters[from..]
            .iter()
            .position(|c| c.newline)
            .map(|p| from + p)
            .unwrap_or(self.clusters.len())
    }

    /// Runs for a cluster range, in logical order.
    fn logical_runs(&self, range: Range<usize>) -> Vec<ShapedGlyphRun> {
        let mut out: Vec<ShapedGlyphRun> = Vec::new();
        let mut i = range.start;
        while i < range.end {
            let run_idx = self.clusters[i].run;
            let first = i;
            while i < range.end && self.clusters[i].run == run_idx {
                i += 1;
            }
            let lo = self.clusters[first].start;
            let hi = self.clusters[i - 1].end;
            let source = &self.runs[run_idx];
            out.push(ShapedGlyphRun {
                start: lo,
                end: hi,
                level: source.level,
                font_size: source.font_size,
                glyphs: source
                    .glyphs
                    .iter()
                    .filter(|g| g.cluster >= lo && g.cluster < hi)
                    .cloned()
                    .collect(),
            });
        }
        out
    }

    fn assemble(&self, mut logical: Vec<ShapedGlyphRun>, truncated: bool, ellipsis_overflow: bool) -> Line {
        let width = logical.iter().map(|r| r.width()).sum();
        let levels: Vec<Level> = logical.iter().map(|r| r.level).collect();
        let order = bidi::visual_order(&levels);
        let mut slots: Vec<Option<ShapedGlyphRun>> = logical.drain(..).map(Some).collect();
        let runs = order
            .into_iter()
            .filter_map(|idx| slots.get_mut(idx).and_then(Option::take))
            .collect();
        Line {
            runs,
            width,
            truncated,
            ellipsis_overflow,
            level: self.base_level,
        }
    }

    fn truncate(&self, line: Range<usize>) -> Line {
        let Some(ellipsis) = &self.ellipsis else {
            let kept = self.trim_trailing_blank(line);
            return self.assemble(self.logical_runs(kept), true, false);
        };

        let ellipsis_width: f64 = ellipsis.iter().map(|g| g.x_advance).sum();
        let ellipsis_overflow = ellipsis_width > self.box_width + EPSILON;

        let mut kept = line.start..self.paragraph_end(line.start);
        loop {
            kept = self.trim_trailing_blank(kept);
            if kept.is_empty() || self.width_of(&kept) + ellipsis_width <= self.box_width + EPSILON {
                break;
            }
            kept.end -= 1;
        }

        let mut logical = self.logical_runs(kept.clone());
        let level = match self.placement {
            EllipsisPlacement::ParagraphDirection => self.base_level,
            EllipsisPlacement::LastRun => logical.last().map(|r| r.level).unwrap_or(self.base_level),
        };
        let at = if kept.is_empty() {
            self.clusters.get(line.start).map(|c| c.start).unwrap_or(self.text.len())
        } else {
            self.clusters[kept.end - 1].end
        };
        logical.push(ShapedGlyphRun {
            start: at,
            end: at,
            level,
            font_size: self.runs.last().map(|r| r.font_size).unwrap_or(0.0),
            glyphs: ellipsis
                .iter()
                .cloned()
                .map(|mut g| {
                    g.cluster = at;
                    g
                })
                .collect(),
        });
        self.assemble(logical, true, ellipsis_overflow)
    }
}

impl Iterator for LineBreaker<'_> {
    type Item = Line;

    fn next(&mut self) -> Option<Line> {
        if self.done || self.pos >= self.clusters.len() {
            return None;
        }
        if self.max_lines > 0 && self.emitted >= self.max_lines {
            self.done = true;
            return None;
        }

        let (line, next) = self.fit_line();
        self.emitted += 1;

        let last_allowed = self.max_lines > 0 && self.emitted == self.max_lines;
        let remaining = self.clusters[next.min(self.clusters.len())..]
            .iter()
            .any(Cluster::visible);

        if last_allowed && remaining {
            self.done = true;
            return Some(self.truncate(line));
        }

        self.pos = next;
        let kept = self.trim_trailing_blank(line);
        Some(self.assemble(self.logical_runs(kept), false, false))
    }
}

/// Collect every line of `runs` without an ellipsis.
pub fn break_lines(
    text: &str,
    runs: &[ShapedGlyphRun],
    box_width: f64,
    max_lines: u32,
) -> Vec<Line> {
    LineBreaker::new(text, runs, box_width, max_lines).collect()
}

fn splits_crlf(text: &str, at: usize) -> bool {
    text[..at].ends_with('\r') && text[at..].starts_with('\n')
}

fn build_clusters(text: &str, runs: &[ShapedGlyphRun], breaks: &Breaks) -> Vec<Cluster> {
    let mut clusters = Vec::new();
    for (ri, run) in runs.iter().enumerate() {
        if run.start >= run.end {
            continue;
        }
        let slice = &text[run.start..run.end];

        let mut bounds: Vec<usize> = run
            .glyphs
            .iter()
            .map(|g| g.cluster)
            .filter(|&c| c >= run.start && c < run.end)
            .collect();
        bounds.push(run.start);
        for (i, ch) in slice.char_indices() {
            if is_line_terminator(ch) {
                bounds.push(run.start + i);
                bounds.push(run.start + i + ch.len_utf8());
            }
        }
        // CR LF is a single break.
        bounds.retain(|&b| b == run.start || !splits_crlf(text, b));
        bounds.retain(|&b| b < run.end);
        bounds.sort_unstable();
        bounds.dedup();

        let mut widths = vec![0.0; bounds.len()];
        let mut counts = vec![0usize; bounds.len()];
        for g in &run.glyphs {
            let idx = bounds.partition_point(|&b| b <= g.cluster);
            if idx > 0 {
                widths[idx - 1] += g.x_advance;
                counts[idx - 1] += 1;
            }
        }

        for (k, &start) in bounds.iter().enumerate() {
            let end = bounds.get(k + 1).copied().unwrap_or(run.end);
            let piece = &text[start..end];
            let newline =
                piece.chars().all(is_line_terminator) && breaks.mandatory.contains(&end);
            clusters.push(Cluster {
                run: ri,
                start,
                end,
                width: widths[k],
                glyphs: counts[k],
                whitespace: !newline && piece.chars().all(char::is_whitespace),
                newline,
                break_before: breaks.any.contains(&start),
            });
        }
    }
    clusters
}
