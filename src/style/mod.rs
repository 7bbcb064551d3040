//! # Config Resolution
//!
//! Turns a layout template, a size variant and the request's sparse
//! overrides into one fully-specified, immutable [`ResolvedLayout`].
//!
//! Everything downstream reads resolved values only. No stage after this
//! one looks at the layout definition or the overrides again, so the
//! precedence rules live here and nowhere else:
//!
//! 1. a field present in the request's override for that slot,
//! 2. the layout's per-size value (only `fontSizeBySize` has one),
//! 3. the slot default, scaled by the size variant's `scale`.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PlacardError, Result};
use crate::model::{ImageFit, LayoutDefinition, Rect, SizeVariant, SlotKind, StyleOverride, TextStack};

// ── Primitive style values ─────────────────────────────────────

/// Horizontal alignment inside a slot box.
///
/// `Start` and `End` follow the paragraph direction; `Left` and `Right`
/// are physical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextAlign {
    #[default]
    Start,
    Center,
    End,
    Left,
    Right,
}

/// Vertical placement of lines in a box, or of a stack in its region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerticalAlign {
    #[default]
    Top,
    Middle,
    Bottom,
}

impl VerticalAlign {
    /// Offset of content `height` tall from the top of a box `room` tall.
    /// Content taller than the box starts at the top.
    pub fn offset(&self, room: f64, height: f64) -> f64 {
        let free = (room - height).max(0.0);
        match self {
            VerticalAlign::Top => 0.0,
            VerticalAlign::Middle => free / 2.0,
            VerticalAlign::Bottom => free,
        }
    }
}

/// Paragraph base direction. `Auto` takes it from the first strong
/// character of the text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Auto,
    Ltr,
    Rtl,
}

/// An RGBA color.
///
/// Accepts either `{"r":..,"g":..,"b":..,"a":..}` with channels in
/// 0.0..=1.0, or a `"#rgb"` / `"#rrggbb"` / `"#rrggbbaa"` string.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Color {
    pub r: f64, // 0.0 - 1.0
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
    pub const TRANSPARENT: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Parse a hex color. Malformed input yields black.
    pub fn hex(hex: &str) -> Self {
        Self::parse_hex(hex).unwrap_or(Color::BLACK)
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        let (r, g, b, a) = match hex.len() {
            3 => (
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
                255,
            ),
            6 => (
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            ),
            8 => (
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            ),
            _ => return None,
        };
        Some(Self {
            r: r as f64 / 255.0,
            g: g as f64 / 255.0,
            b: b as f64 / 255.0,
            a: a as f64 / 255.0,
        })
    }

    /// Quantize to 8-bit straight-alpha channels.
    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Hex(String),
            Channels {
                r: f64,
                g: f64,
                b: f64,
                #[serde(default = "opaque")]
                a: f64,
            },
        }

        fn opaque() -> f64 {
            1.0
        }

        match Repr::deserialize(deserializer)? {
            Repr::Hex(s) => Color::parse_hex(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid hex color '{}'", s))),
            Repr::Channels { r, g, b, a } => Ok(Color { r, g, b, a }),
        }
    }
}

// ── Resolved output ────────────────────────────────────────────

/// A layout with every slot's geometry and style fixed for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLayout {
    pub layout_id: String,
    pub size_id: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub scale: f64,
    pub background_color: Color,
    pub background_fit: ImageFit,
    pub overlay_z: i32,
    /// In declaration order.
    pub slots: Vec<ResolvedSlot>,
    pub stacks: Vec<ResolvedStack>,
}

impl ResolvedLayout {
    pub fn slot(&self, id: &str) -> Option<&ResolvedSlot> {
        self.slots.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSlot {
    pub id: String,
    /// Box in canvas pixels, already scaled.
    pub bounds: Rect,
    pub z: i32,
    /// Declaration index, used to break z ties.
    pub order: usize,
    pub kind: ResolvedSlotKind,
}

/// A text stack with its region scaled and gaps fixed for one size.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStack {
    pub id: String,
    pub bounds: Rect,
    pub anchor: VerticalAlign,
    pub slots: Vec<String>,
    pub gap: f64,
    /// (after, before, gap) for this size; first match wins.
    pub gaps: Vec<(String, String, f64)>,
}

impl ResolvedStack {
    /// Space between two members that end up adjacent.
    pub fn gap_between(&self, after: &str, before: &str) -> f64 {
        self.gaps
            .iter()
            .find(|(a, b, _)| a == after && b == before)
            .map(|(_, _, gap)| *gap)
            .unwrap_or(self.gap)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedSlotKind {
    Text(ResolvedTextStyle),
    Image { fit: ImageFit },
}

/// A text slot's style after precedence has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTextStyle {
    pub font: String,
    /// Font size in canvas pixels.
    pub font_size: f64,
    pub color: Color,
    pub align: TextAlign,
    pub vertical_align: VerticalAlign,
    /// 0 means unlimited.
    pub max_lines: u32,
    pub line_height: f64,
    pub direction: Direction,
    pub ellipsis: bool,
}

// ── Resolution ─────────────────────────────────────────────────

/// Merge a layout, a size and optional overrides into a resolved layout.
///
/// Fails with `UnknownSize` when the layout does not list the size or the
/// size's scale is unusable, and with `UnknownSlot` when an override names
/// a slot the layout does not declare. Overrides addressed to image slots
/// carry no applicable fields and are ignored.
pub fn resolve(
    layout: &LayoutDefinition,
    size: &SizeVariant,
    overrides: Option<&StyleOverride>,
) -> Result<ResolvedLayout> {
    if !layout.supports_size(&size.id) || !size.scale.is_finite() || size.scale <= 0.0 {
        return Err(PlacardError::UnknownSize {
            size: size.id.clone(),
        });
    }

    // BTreeMap iteration is sorted, so the first unknown slot reported is
    // the same on every call.
    if let Some(overrides) = overrides {
        if let Some(unknown) = overrides.slots.keys().find(|id| layout.slot(id).is_none()) {
            return Err(PlacardError::UnknownSlot {
                slot: unknown.clone(),
                field: "overrides",
            });
        }
    }

    let scale = size.scale;
    let slots = layout
        .slots
        .iter()
        .enumerate()
        .map(|(order, slot)| {
            let kind = match &slot.kind {
                SlotKind::Image { fit } => ResolvedSlotKind::Image { fit: *fit },
                SlotKind::Text(style) => {
                    let ov = overrides.and_then(|o| o.slots.get(&slot.id));
                    let font_size = ov
                        .and_then(|o| o.size)
                        .or_else(|| style.font_size_by_size.get(&size.id).copied())
                        .unwrap_or(style.font_size * scale);
                    ResolvedSlotKind::Text(ResolvedTextStyle {
                        font: ov
                            .and_then(|o| o.font.clone())
                            .unwrap_or_else(|| style.font.clone()),
                        font_size,
                        color: ov.and_then(|o| o.color).unwrap_or(style.color),
                        align: ov.and_then(|o| o.align).unwrap_or(style.align),
                        vertical_align: style.vertical_align,
                        max_lines: ov.and_then(|o| o.max_lines).unwrap_or(style.max_lines),
                        line_height: style.line_height,
                        direction: style.direction,
                        ellipsis: style.ellipsis,
                    })
                }
            };
            ResolvedSlot {
                id: slot.id.clone(),
                bounds: slot.bounds.scaled(scale),
                z: slot.z,
                order,
                kind,
            }
        })
        .collect();

    Ok(ResolvedLayout {
        layout_id: layout.id.clone(),
        size_id: size.id.clone(),
        canvas_width: size.width,
        canvas_height: size.height,
        scale,
        background_color: layout.background_color,
        background_fit: layout.background_fit,
        overlay_z: layout.overlay_z,
        slots,
        stacks: layout
            .stacks
            .iter()
            .map(|stack| resolve_stack(stack, size))
            .collect(),
    })
}

/// Size-specific gap rules come before general ones so they win.
fn resolve_stack(stack: &TextStack, size: &SizeVariant) -> ResolvedStack {
    let specific = stack
        .gaps
        .iter()
        .filter(|r| r.size.as_deref() == Some(size.id.as_str()));
    let general = stack.gaps.iter().filter(|r| r.size.is_none());
    ResolvedStack {
        id: stack.id.clone(),
        bounds: stack.bounds.scaled(size.scale),
        anchor: stack.anchor,
        slots: stack.slots.clone(),
        gap: stack.gap * size.scale,
        gaps: specific
            .chain(general)
            .map(|r| (r.after.clone(), r.before.clone(), r.gap * size.scale))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Slot, SlotStyleOverride, TextSlotStyle};
    use std::collections::BTreeMap;

    fn text_style(size: f64) -> TextSlotStyle {
        TextSlotStyle {
            font: "builtin".to_string(),
            font_size: size,
            font_size_by_size: BTreeMap::new(),
            color: Color::BLACK,
            align: TextAlign::Start,
            vertical_align: VerticalAlign::Top,
            max_lines: 2,
            line_height: 1.2,
            direction: Direction::Auto,
            ellipsis: true,
        }
    }

    fn card() -> LayoutDefinition {
        let mut title = text_style(40.0);
        title
            .font_size_by_size
            .insert("story".to_string(), 64.0);
        LayoutDefinition {
            id: "card".to_string(),
            slots: vec![
                Slot {
                    id: "title".to_string(),
                    bounds: Rect::new(10.0, 20.0, 200.0, 100.0),
                    z: 1,
                    kind: SlotKind::Text(title),
                },
                Slot {
                    id: "subtitle".to_string(),
                    bounds: Rect::new(10.0, 140.0, 200.0, 40.0),
                    z: 1,
                    kind: SlotKind::Text(text_style(20.0)),
                },
                Slot {
                    id: "logo".to_string(),
                    bounds: Rect::new(0.0, 0.0, 50.0, 50.0),
                    z: 0,
                    kind: SlotKind::Image {
                        fit: ImageFit::Contain,
                    },
                },
            ],
            sizes: vec![],
            background_color: Color::WHITE,
            background_fit: ImageFit::Cover,
            overlay_z: 5,
            stacks: vec![],
        }
    }

    fn size(id: &str, scale: f64) -> SizeVariant {
        SizeVariant {
            id: id.to_string(),
            width: 1080,
            height: 1080,
            scale,
        }
    }

    fn text(resolved: &ResolvedLayout, id: &str) -> ResolvedTextStyle {
        match &resolved.slot(id).unwrap().kind {
            ResolvedSlotKind::Text(style) => style.clone(),
            ResolvedSlotKind::Image { .. } => panic!("{} is an image slot", id),
        }
    }

    #[test]
    fn test_defaults_are_scaled() {
        let resolved = resolve(&card(), &size("square", 2.0), None).unwrap();
        let title = resolved.slot("title").unwrap();
        assert_eq!(title.bounds, Rect::new(20.0, 40.0, 400.0, 200.0));
        assert_eq!(text(&resolved, "title").font_size, 80.0);
        assert_eq!(text(&resolved, "subtitle").font_size, 40.0);
        assert_eq!(resolved.overlay_z, 5);
    }

    #[test]
    fn test_per_size_font_size_beats_scaled_default() {
        let resolved = resolve(&card(), &size("story", 2.0), None).unwrap();
        assert_eq!(text(&resolved, "title").font_size, 64.0);
    }

    #[test]
    fn test_override_beats_everything() {
        let overrides = StyleOverride::new().slot(
            "title",
            SlotStyleOverride {
                size: Some(12.0),
                max_lines: Some(1),
                color: Some(Color::hex("#ff0000")),
                ..Default::default()
            },
        );
        let resolved = resolve(&card(), &size("story", 2.0), Some(&overrides)).unwrap();
        let title = text(&resolved, "title");
        assert_eq!(title.font_size, 12.0);
        assert_eq!(title.max_lines, 1);
        assert_eq!(title.color, Color::rgb(1.0, 0.0, 0.0));
        // Untouched fields keep their defaults.
        assert_eq!(title.align, TextAlign::Start);
        assert_eq!(text(&resolved, "subtitle").max_lines, 2);
    }

    #[test]
    fn test_unknown_override_slot_fails() {
        let overrides = StyleOverride::new().slot("title2", SlotStyleOverride::default());
        let err = resolve(&card(), &size("square", 1.0), Some(&overrides)).unwrap_err();
        match err {
            PlacardError::UnknownSlot { slot, field } => {
                assert_eq!(slot, "title2");
                assert_eq!(field, "overrides");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_image_slot_override_ignored() {
        let overrides = StyleOverride::new().slot(
            "logo",
            SlotStyleOverride {
                size: Some(99.0),
                ..Default::default()
            },
        );
        let resolved = resolve(&card(), &size("square", 1.0), Some(&overrides)).unwrap();
        assert_eq!(
            resolved.slot("logo").unwrap().kind,
            ResolvedSlotKind::Image {
                fit: ImageFit::Contain
            }
        );
    }

    #[test]
    fn test_unsupported_size_fails() {
        let mut layout = card();
        layout.sizes = vec!["square".to_string()];
        assert!(matches!(
            resolve(&layout, &size("story", 1.0), None),
            Err(PlacardError::UnknownSize { .. })
        ));
        assert!(matches!(
            resolve(&card(), &size("square", 0.0), None),
            Err(PlacardError::UnknownSize { .. })
        ));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let a = resolve(&card(), &size("square", 1.5), None).unwrap();
        let b = resolve(&card(), &size("square", 1.5), None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stack_gaps_prefer_size_specific_rules() {
        use crate::model::GapRule;

        let rule = |size: Option<&str>, gap: f64| GapRule {
            after: "title".to_string(),
            before: "subtitle".to_string(),
            size: size.map(str::to_string),
            gap,
        };
        let mut layout = card();
        layout.stacks.push(TextStack {
            id: "copy".to_string(),
            bounds: Rect::new(0.0, 0.0, 500.0, 500.0),
            anchor: VerticalAlign::Bottom,
            slots: vec!["title".to_string(), "subtitle".to_string()],
            gap: 10.0,
            gaps: vec![rule(None, 30.0), rule(Some("story"), 4.0)],
        });

        let square = resolve(&layout, &size("square", 2.0), None).unwrap();
        let stack = &square.stacks[0];
        assert_eq!(stack.bounds, Rect::new(0.0, 0.0, 1000.0, 1000.0));
        assert_eq!(stack.gap_between("title", "subtitle"), 60.0);
        assert_eq!(stack.gap_between("subtitle", "title"), 20.0);

        let story = resolve(&layout, &size("story", 1.0), None).unwrap();
        assert_eq!(story.stacks[0].gap_between("title", "subtitle"), 4.0);
    }

    #[test]
    fn test_vertical_offset() {
        assert_eq!(VerticalAlign::Top.offset(100.0, 40.0), 0.0);
        assert_eq!(VerticalAlign::Middle.offset(100.0, 40.0), 30.0);
        assert_eq!(VerticalAlign::Bottom.offset(100.0, 40.0), 60.0);
        assert_eq!(VerticalAlign::Bottom.offset(30.0, 40.0), 0.0);
    }

    #[test]
    fn test_color_json_forms() {
        let c: Color = serde_json::from_str("\"#336699\"").unwrap();
        assert_eq!(c.to_rgba8(), [0x33, 0x66, 0x99, 0xff]);
        let c: Color = serde_json::from_str(r#"{"r":1.0,"g":0.5,"b":0.0}"#).unwrap();
        assert_eq!(c.a, 1.0);
        assert!(serde_json::from_str::<Color>("\"#zz\"").is_err());
        assert_eq!(Color::hex("#fff"), Color::WHITE);
    }
}
