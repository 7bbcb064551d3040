//! # Layout Geometry
//!
//! Places everything a request draws onto the canvas, in absolute pixels.
//!
//! Text slots run the whole text pipeline (segment, shape, break) and come
//! out as lines of positioned glyphs: each line is aligned horizontally in
//! its box (direction-aware for `Start`/`End`) and lines stack at the
//! font's line height from the top of the box, or lower when the slot is
//! vertically aligned to the middle or bottom. Slots that belong to a text
//! stack are then moved as a column inside the stack's region. Image slots
//! resolve straight to their box. The overlay, when enabled, becomes one
//! more layer.
//!
//! Layers are sorted by z, then by declaration order, with the overlay
//! after every slot at the same z. Nothing here fails: overflow and
//! missing glyphs are recorded as diagnostics and the compositor clips.

use crate::error::Diagnostic;
use crate::font::FontContext;
use crate::model::{ImageFit, Rect, RenderRequest, SlotContent};
use crate::style::{
    Color, ResolvedLayout, ResolvedSlot, ResolvedSlotKind, ResolvedStack, ResolvedTextStyle, TextAlign,
};
use crate::text::linebreak::{EllipsisPlacement, Line, LineBreaker};
use crate::text::shaping::{shape_ellipsis, shape_with_fallback};
use crate::text::segment;

const EPSILON: f64 = 1e-6;

/// Everything the compositor needs, in drawing order.
#[derive(Debug, Clone)]
pub struct CanvasLayout {
    pub width: u32,
    pub height: u32,
    pub background_color: Color,
    pub background_fit: ImageFit,
    /// Bottom to top.
    pub layers: Vec<Layer>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
pub enum Layer {
    Text(TextBlock),
    Image {
        slot_id: String,
        bounds: Rect,
        fit: ImageFit,
    },
    /// The size's overlay asset, drawn over the whole canvas.
    Overlay,
}

/// A text slot's laid-out lines.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub slot_id: String,
    /// Clip box.
    pub bounds: Rect,
    pub font: String,
    pub font_size: f64,
    pub color: Color,
    pub lines: Vec<TextLine>,
}

impl TextBlock {
    /// Height of all lines together.
    pub fn content_height(&self) -> f64 {
        self.lines.iter().map(|l| l.height).sum()
    }

    /// Move the block so its first line starts at `top`. The clip box
    /// moves with it.
    fn move_to(&mut self, top: f64) {
        let current = self.lines.first().map_or(self.bounds.y, |l| l.y);
        let dy = top - current;
        for line in &mut self.lines {
            line.y += dy;
            line.baseline += dy;
            for g in &mut line.glyphs {
                g.y += dy;
            }
        }
        self.bounds.y = top;
    }
}

#[derive(Debug, Clone)]
pub struct TextLine {
    /// Left edge of the line's ink box.
    pub x: f64,
    /// Top of the line box.
    pub y: f64,
    pub baseline: f64,
    pub width: f64,
    pub height: f64,
    pub truncated: bool,
    /// Left to right.
    pub glyphs: Vec<PositionedGlyph>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionedGlyph {
    pub glyph_id: u16,
    /// Pen position plus the glyph's own offset, canvas pixels.
    pub x: f64,
    /// Baseline, canvas pixels, y down.
    pub y: f64,
    pub cluster: usize,
}

/// The layout stage. Holds policy only, no per-request state.
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    placement: EllipsisPlacement,
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_placement(mut self, placement: EllipsisPlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn placement(&self) -> EllipsisPlacement {
        self.placement
    }

    /// Lay out every slot that has content, plus the overlay if `overlay`.
    pub fn layout(
        &self,
        resolved: &ResolvedLayout,
        request: &RenderRequest,
        fonts: &FontContext,
        overlay: bool,
    ) -> CanvasLayout {
        let mut diagnostics = Vec::new();
        let mut keyed: Vec<((i32, usize), Layer)> = Vec::new();

        for slot in &resolved.slots {
            let layer = match (&slot.kind, request.content.get(&slot.id)) {
                (ResolvedSlotKind::Text(style), Some(SlotContent::Text(text))) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    Layer::Text(self.place_text(slot, style, text, fonts, &mut diagnostics))
                }
                (ResolvedSlotKind::Image { fit }, Some(SlotContent::Image { .. })) => Layer::Image {
                    slot_id: slot.id.clone(),
                    bounds: slot.bounds,
                    fit: *fit,
                },
                _ => continue,
            };
            keyed.push(((slot.z, slot.order), layer));
        }

        for stack in &resolved.stacks {
            flow_stack(stack, &mut keyed, &mut diagnostics);
        }

        if overlay {
            keyed.push(((resolved.overlay_z, resolved.slots.len()), Layer::Overlay));
        }

        keyed.sort_by_key(|(key, _)| *key);

        CanvasLayout {
            width: resolved.canvas_width,
            height: resolved.canvas_height,
            background_color: resolved.background_color,
            background_fit: resolved.background_fit,
            layers: keyed.into_iter().map(|(_, layer)| layer).collect(),
            diagnostics,
        }
    }

    fn place_text(
        &self,
        slot: &ResolvedSlot,
        style: &ResolvedTextStyle,
        text: &str,
        fonts: &FontContext,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> TextBlock {
        let font = fonts.resolve(&style.font);
        let size = style.font_size;
        let bounds = slot.bounds;

        let segmented = segment(text, style.direction);
        let mut missing: Vec<char> = Vec::new();
        let runs: Vec<_> = segmented
            .runs
            .iter()
            .map(|run| {
                let outcome = shape_with_fallback(text, run, font, size, fonts.fallback_char());
                for ch in outcome.missing {
                    if !missing.contains(&ch) {
                        missing.push(ch);
                    }
                }
                outcome.run
            })
            .collect();
        diagnostics.extend(missing.into_iter().map(|ch| Diagnostic::UnsupportedGlyph {
            slot: slot.id.clone(),
            ch,
        }));

        let mut breaker = LineBreaker::new(text, &runs, bounds.width, style.max_lines)
            .with_base_level(segmented.base_level)
            .with_placement(self.placement);
        if style.ellipsis {
            breaker =
                breaker.with_ellipsis(shape_ellipsis(font, size, fonts.fallback_char(), text.len()));
        }
        let lines: Vec<Line> = breaker.collect();

        if lines.iter().any(|l| l.ellipsis_overflow) {
            diagnostics.push(Diagnostic::EmptyInputAfterTruncation {
                slot: slot.id.clone(),
            });
        }

        let metrics = font.metrics();
        let line_height = metrics.line_height(size, style.line_height);
        let ascent = metrics.ascent(size);
        let rtl = segmented.base_level.is_rtl();

        let content_height = line_height * lines.len() as f64;
        if content_height > bounds.height + EPSILON {
            diagnostics.push(Diagnostic::SlotOverflow {
                slot: slot.id.clone(),
                content_height,
                box_height: bounds.height,
            });
        }

        let first_top = bounds.y + style.vertical_align.offset(bounds.height, content_height);
        let placed = lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let top = first_top + line_height * i as f64;
                let baseline = top + ascent;
                let x = align_x(style.align, rtl, &bounds, line.width);
                let mut pen = x;
                let mut glyphs = Vec::with_capacity(line.glyph_count());
                for run in &line.runs {
                    for g in &run.glyphs {
                        glyphs.push(PositionedGlyph {
                            glyph_id: g.glyph_id,
                            x: pen + g.x_offset,
                            y: baseline - g.y_offset,
                            cluster: g.cluster,
                        });
                        pen += g.x_advance;
                    }
                }
                TextLine {
                    x,
                    y: top,
                    baseline,
                    width: line.width,
                    height: line_height,
                    truncated: line.truncated,
                    glyphs,
                }
            })
            .collect();

        TextBlock {
            slot_id: slot.id.clone(),
            bounds,
            font: font.id.clone(),
            font_size: size,
            color: style.color,
            lines: placed,
        }
    }
}

/// Place the stack's members that have text as one column in the stack
/// region. Each takes the height of its lines, capped at its own box.
fn flow_stack(
    stack: &ResolvedStack,
    layers: &mut [((i32, usize), Layer)],
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut members: Vec<(usize, f64, f64)> = Vec::new();
    let mut prev: Option<&str> = None;
    for id in &stack.slots {
        let found = layers.iter().position(|(_, layer)| {
            matches!(layer, Layer::Text(block) if block.slot_id == *id)
        });
        let Some(idx) = found else { continue };
        let Layer::Text(block) = &layers[idx].1 else {
            continue;
        };
        let gap = prev.map_or(0.0, |p| stack.gap_between(p, id));
        let height = block.content_height().min(block.bounds.height);
        members.push((idx, gap, height));
        prev = Some(id.as_str());
    }
    if members.is_empty() {
        return;
    }

    let total: f64 = members.iter().map(|(_, gap, height)| gap + height).sum();
    if total > stack.bounds.height + EPSILON {
        diagnostics.push(Diagnostic::SlotOverflow {
            slot: stack.id.clone(),
            content_height: total,
            box_height: stack.bounds.height,
        });
    }

    let mut y = stack.bounds.y + stack.anchor.offset(stack.bounds.height, total);
    for (idx, gap, height) in members {
        y += gap;
        if let Layer::Text(block) = &mut layers[idx].1 {
            block.move_to(y);
        }
        y += height;
    }
}

/// Left edge of a line of `width` in `bounds`. `Start` is the left edge
/// for LTR paragraphs and the right edge for RTL ones.
pub fn align_x(align: TextAlign, rtl: bool, bounds: &Rect, width: f64) -> f64 {
    let left = bounds.x;
    let right = bounds.right() - width;
    match (align, rtl) {
        (TextAlign::Left, _) | (TextAlign::Start, false) | (TextAlign::End, true) => left,
        (TextAlign::Right, _) | (TextAlign::Start, true) | (TextAlign::End, false) => right,
        (TextAlign::Center, _) => bounds.x + (bounds.width - width) / 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GapRule, LayoutDefinition, SizeVariant, Slot, SlotKind, TextSlotStyle, TextStack};
    use crate::style::{resolve, Direction, VerticalAlign};
    use std::collections::BTreeMap;

    fn text_slot(id: &str, bounds: Rect, z: i32, align: TextAlign, max_lines: u32) -> Slot {
        Slot {
            id: id.to_string(),
            bounds,
            z,
            kind: SlotKind::Text(TextSlotStyle {
                font: "builtin".to_string(),
                font_size: 20.0,
                font_size_by_size: BTreeMap::new(),
                color: Color::BLACK,
                align,
                vertical_align: VerticalAlign::Top,
                max_lines,
                line_height: 1.0,
                direction: Direction::Auto,
                ellipsis: true,
            }),
        }
    }

    fn resolved(slots: Vec<Slot>) -> ResolvedLayout {
        resolved_with_stacks(slots, vec![])
    }

    fn resolved_with_stacks(slots: Vec<Slot>, stacks: Vec<TextStack>) -> ResolvedLayout {
        let layout = LayoutDefinition {
            id: "card".to_string(),
            slots,
            sizes: vec![],
            background_color: Color::WHITE,
            background_fit: ImageFit::Cover,
            overlay_z: 1,
            stacks,
        };
        let size = SizeVariant {
            id: "square".to_string(),
            width: 400,
            height: 400,
            scale: 1.0,
        };
        resolve(&layout, &size, None).unwrap()
    }

    fn aligned(mut slot: Slot, vertical: VerticalAlign) -> Slot {
        if let SlotKind::Text(style) = &mut slot.kind {
            style.vertical_align = vertical;
        }
        slot
    }

    fn block<'a>(canvas: &'a CanvasLayout, id: &str) -> &'a TextBlock {
        canvas
            .layers
            .iter()
            .find_map(|l| match l {
                Layer::Text(b) if b.slot_id == id => Some(b),
                _ => None,
            })
            .unwrap()
    }

    fn only_text(canvas: &CanvasLayout) -> &TextBlock {
        match &canvas.layers[0] {
            Layer::Text(block) => block,
            other => panic!("expected text layer, got {:?}", other),
        }
    }

    #[test]
    fn test_align_x() {
        let b = Rect::new(10.0, 0.0, 100.0, 50.0);
        assert_eq!(align_x(TextAlign::Start, false, &b, 40.0), 10.0);
        assert_eq!(align_x(TextAlign::Start, true, &b, 40.0), 70.0);
        assert_eq!(align_x(TextAlign::End, false, &b, 40.0), 70.0);
        assert_eq!(align_x(TextAlign::End, true, &b, 40.0), 10.0);
        assert_eq!(align_x(TextAlign::Center, true, &b, 40.0), 40.0);
        assert_eq!(align_x(TextAlign::Left, true, &b, 40.0), 10.0);
    }

    #[test]
    fn test_rtl_start_is_right_aligned() {
        let r = resolved(vec![text_slot(
            "title",
            Rect::new(0.0, 0.0, 200.0, 40.0),
            0,
            TextAlign::Start,
            0,
        )]);
        let req = RenderRequest::new("card", "square").text("title", "שלום");
        let canvas = LayoutEngine::new().layout(&r, &req, &FontContext::new(), false);
        let block = only_text(&canvas);
        assert_eq!(block.lines.len(), 1);
        let line = &block.lines[0];
        assert!(!line.truncated);
        assert!((line.x + line.width - 200.0).abs() < 1e-9);
        // First logical character is rightmost.
        let clusters: Vec<usize> = line.glyphs.iter().map(|g| g.cluster).collect();
        assert_eq!(clusters, vec![6, 4, 2, 0]);
        assert!(canvas.diagnostics.is_empty());
    }

    #[test]
    fn test_lines_stack_from_top() {
        let r = resolved(vec![text_slot(
            "body",
            Rect::new(0.0, 100.0, 60.0, 100.0),
            0,
            TextAlign::Start,
            0,
        )]);
        let req = RenderRequest::new("card", "square").text("body", "Hello World");
        let canvas = LayoutEngine::new().layout(&r, &req, &FontContext::new(), false);
        let block = only_text(&canvas);
        assert_eq!(block.lines.len(), 2);
        assert_eq!(block.lines[0].y, 100.0);
        assert_eq!(block.lines[1].y, 120.0);
        assert_eq!(block.lines[0].baseline, 116.0);
    }

    #[test]
    fn test_vertical_alignment_in_box() {
        let slot = |id: &str, v| {
            aligned(
                text_slot(id, Rect::new(0.0, 100.0, 100.0, 100.0), 0, TextAlign::Start, 0),
                v,
            )
        };
        let r = resolved(vec![
            slot("bottom", VerticalAlign::Bottom),
            slot("middle", VerticalAlign::Middle),
        ]);
        let req = RenderRequest::new("card", "square")
            .text("bottom", "Hello")
            .text("middle", "Hello");
        let canvas = LayoutEngine::new().layout(&r, &req, &FontContext::new(), false);

        let bottom = block(&canvas, "bottom");
        assert_eq!(bottom.lines[0].y, 180.0);
        assert_eq!(bottom.lines[0].baseline, 196.0);
        assert_eq!(bottom.lines[0].glyphs[0].y, 196.0);
        assert_eq!(block(&canvas, "middle").lines[0].y, 140.0);
    }

    #[test]
    fn test_stack_is_bottom_anchored_and_skips_empty_members() {
        let member = |id: &str| text_slot(id, Rect::new(20.0, 0.0, 200.0, 100.0), 0, TextAlign::Start, 0);
        let stack = TextStack {
            id: "copy".to_string(),
            bounds: Rect::new(0.0, 0.0, 400.0, 400.0),
            anchor: VerticalAlign::Bottom,
            slots: vec!["headline".to_string(), "subline".to_string(), "disclaimer".to_string()],
            gap: 10.0,
            gaps: vec![GapRule {
                after: "headline".to_string(),
                before: "disclaimer".to_string(),
                size: None,
                gap: 30.0,
            }],
        };
        let r = resolved_with_stacks(
            vec![member("headline"), member("subline"), member("disclaimer")],
            vec![stack],
        );
        // No subline: the headline sits directly above the disclaimer.
        let req = RenderRequest::new("card", "square")
            .text("headline", "Hello")
            .text("subline", "  ")
            .text("disclaimer", "ab");
        let canvas = LayoutEngine::new().layout(&r, &req, &FontContext::new(), false);

        // 20 + 30 + 20 = 70 tall, ending at the region's bottom edge.
        let headline = block(&canvas, "headline");
        assert_eq!(headline.lines[0].y, 330.0);
        assert_eq!(headline.lines[0].baseline, 346.0);
        assert_eq!(headline.bounds.y, 330.0);
        assert_eq!(headline.lines[0].x, 20.0);
        let disclaimer = block(&canvas, "disclaimer");
        assert_eq!(disclaimer.lines[0].y, 380.0);
        assert_eq!(disclaimer.lines[0].glyphs[0].y, 396.0);
        assert!(canvas.diagnostics.is_empty());
    }

    #[test]
    fn test_stack_taller_than_region_starts_at_top() {
        let member = |id: &str| text_slot(id, Rect::new(0.0, 0.0, 200.0, 100.0), 0, TextAlign::Start, 0);
        let stack = TextStack {
            id: "copy".to_string(),
            bounds: Rect::new(0.0, 50.0, 400.0, 30.0),
            anchor: VerticalAlign::Bottom,
            slots: vec!["a".to_string(), "b".to_string()],
            gap: 5.0,
            gaps: vec![],
        };
        let r = resolved_with_stacks(vec![member("a"), member("b")], vec![stack]);
        let req = RenderRequest::new("card", "square").text("a", "x").text("b", "y");
        let canvas = LayoutEngine::new().layout(&r, &req, &FontContext::new(), false);
        assert_eq!(block(&canvas, "a").lines[0].y, 50.0);
        assert_eq!(block(&canvas, "b").lines[0].y, 75.0);
        assert_eq!(
            canvas.diagnostics,
            vec![Diagnostic::SlotOverflow {
                slot: "copy".to_string(),
                content_height: 45.0,
                box_height: 30.0,
            }]
        );
    }

    #[test]
    fn test_overflow_is_a_diagnostic() {
        let r = resolved(vec![text_slot(
            "body",
            Rect::new(0.0, 0.0, 60.0, 30.0),
            0,
            TextAlign::Start,
            0,
        )]);
        let req = RenderRequest::new("card", "square").text("body", "aa bb cc dd");
        let canvas = LayoutEngine::new().layout(&r, &req, &FontContext::new(), false);
        assert!(canvas
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::SlotOverflow { slot, .. } if slot == "body")));
    }

    #[test]
    fn test_unsupported_glyph_diagnostic() {
        let r = resolved(vec![text_slot(
            "title",
            Rect::new(0.0, 0.0, 300.0, 40.0),
            0,
            TextAlign::Start,
            1,
        )]);
        let req = RenderRequest::new("card", "square").text("title", "a→b");
        let canvas = LayoutEngine::new().layout(&r, &req, &FontContext::new(), false);
        assert_eq!(
            canvas.diagnostics,
            vec![Diagnostic::UnsupportedGlyph {
                slot: "title".to_string(),
                ch: '→'
            }]
        );
        assert_eq!(only_text(&canvas).lines[0].glyphs.len(), 3);
    }

    #[test]
    fn test_layer_order() {
        let r = resolved(vec![
            text_slot("top", Rect::new(0.0, 0.0, 100.0, 30.0), 2, TextAlign::Start, 1),
            text_slot("a", Rect::new(0.0, 40.0, 100.0, 30.0), 1, TextAlign::Start, 1),
            text_slot("b", Rect::new(0.0, 80.0, 100.0, 30.0), 1, TextAlign::Start, 1),
        ]);
        let req = RenderRequest::new("card", "square")
            .text("top", "x")
            .text("a", "y")
            .text("b", "z");
        let canvas = LayoutEngine::new().layout(&r, &req, &FontContext::new(), true);
        let names: Vec<&str> = canvas
            .layers
            .iter()
            .map(|l| match l {
                Layer::Text(b) => b.slot_id.as_str(),
                Layer::Image { slot_id, .. } => slot_id.as_str(),
                Layer::Overlay => "overlay",
            })
            .collect();
        // overlayZ is 1: above both z=1 slots, below the z=2 slot.
        assert_eq!(names, vec!["a", "b", "overlay", "top"]);
    }

    #[test]
    fn test_empty_text_is_skipped() {
        let r = resolved(vec![text_slot(
            "title",
            Rect::new(0.0, 0.0, 100.0, 30.0),
            0,
            TextAlign::Start,
            1,
        )]);
        let req = RenderRequest::new("card", "square").text("title", "   ");
        let canvas = LayoutEngine::new().layout(&r, &req, &FontContext::new(), false);
        assert!(canvas.layers.is_empty());
    }
}
