//! # Layout Model
//!
//! The input representation for the rendering engine: layout templates,
//! size variants, per-call style overrides, and render requests.
//!
//! Layouts and sizes are loaded once at startup and never mutated. A
//! request names one of each, carries the caller's text and images keyed
//! by slot id, and may replace a few style fields per slot.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::image_loader;
use crate::style::{Color, Direction, TextAlign, VerticalAlign};
use crate::text::linebreak::EllipsisPlacement;

/// Everything loaded at process start: sizes and layout templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub sizes: Vec<SizeVariant>,
    #[serde(default)]
    pub layouts: Vec<LayoutDefinition>,
    /// Where the ellipsis goes on a truncated mixed-direction line.
    #[serde(default)]
    pub ellipsis_placement: EllipsisPlacement,
    /// Drawn in place of code points the slot font cannot render.
    #[serde(default)]
    pub fallback_char: Option<char>,
}

/// A target canvas size. `scale` multiplies every slot box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeVariant {
    pub id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

/// An axis-aligned box in canvas pixels, origin at the top-left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Multiply position and extent by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// How an image is mapped onto its target box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFit {
    /// Scale each axis independently to the box.
    Stretch,
    /// Scale uniformly to fill the box, center-cropping the excess.
    #[default]
    Cover,
    /// Scale uniformly to fit inside the box, centered.
    Contain,
}

/// A declarative card template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDefinition {
    pub id: String,
    /// Slots in declaration order. Declaration order breaks z ties.
    pub slots: Vec<Slot>,
    /// Size ids this layout may be rendered at. Empty means all of them.
    #[serde(default)]
    pub sizes: Vec<String>,
    /// Canvas fill used when the request has no background image.
    #[serde(default = "default_background")]
    pub background_color: Color,
    #[serde(default)]
    pub background_fit: ImageFit,
    /// Z-order of the overlay layer relative to the slots.
    #[serde(default)]
    pub overlay_z: i32,
    /// Text slots that flow one after another instead of sitting at
    /// their own `y`.
    #[serde(default)]
    pub stacks: Vec<TextStack>,
}

fn default_background() -> Color {
    Color::WHITE
}

impl LayoutDefinition {
    /// Look up a slot by id.
    pub fn slot(&self, id: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub fn supports_size(&self, size_id: &str) -> bool {
        self.sizes.is_empty() || self.sizes.iter().any(|s| s == size_id)
    }
}

/// A column of text slots anchored inside a region.
///
/// Members are placed in the listed order, each as tall as its laid-out
/// lines, separated by gaps. Members without text take no space. Each
/// member keeps the `x` and `width` of its own box; its box height still
/// bounds how many lines it may hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStack {
    pub id: String,
    /// Region at scale 1.0, padding already taken off.
    #[serde(rename = "box")]
    pub bounds: Rect,
    #[serde(default)]
    pub anchor: VerticalAlign,
    pub slots: Vec<String>,
    /// Space between two members at scale 1.0.
    #[serde(default)]
    pub gap: f64,
    /// Gaps for specific neighbor pairs, optionally only at one size.
    #[serde(default)]
    pub gaps: Vec<GapRule>,
}

/// Gap between `after` and the member that follows it, `before`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapRule {
    pub after: String,
    pub before: String,
    /// Size id the rule is limited to.
    #[serde(default)]
    pub size: Option<String>,
    pub gap: f64,
}

/// A named region of a layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: String,
    /// Default box at scale 1.0.
    #[serde(rename = "box")]
    pub bounds: Rect,
    #[serde(default)]
    pub z: i32,
    pub kind: SlotKind,
}

/// What a slot holds. Each case carries only its own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SlotKind {
    Text(TextSlotStyle),
    Image {
        #[serde(default)]
        fit: ImageFit,
    },
}

/// Default text style of a text slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSlotStyle {
    /// Font id registered with the font context.
    #[serde(default = "default_font")]
    pub font: String,
    /// Font size in pixels at scale 1.0.
    pub font_size: f64,
    /// Absolute font sizes for specific size ids; these are not scaled.
    #[serde(default)]
    pub font_size_by_size: BTreeMap<String, f64>,
    #[serde(default)]
    pub color: Color,
    #[serde(default)]
    pub align: TextAlign,
    /// Where the lines sit when they are shorter than the box.
    #[serde(default)]
    pub vertical_align: VerticalAlign,
    /// Maximum number of lines. 0 means unlimited.
    #[serde(default)]
    pub max_lines: u32,
    /// Line height as a multiplier of the font's natural line height.
    #[serde(default = "default_line_height")]
    pub line_height: f64,
    #[serde(default)]
    pub direction: Direction,
    /// Whether truncated text ends with an ellipsis.
    #[serde(default = "default_true")]
    pub ellipsis: bool,
}

fn default_font() -> String {
    crate::font::BUILTIN_FONT.to_string()
}

fn default_line_height() -> f64 {
    1.2
}

fn default_true() -> bool {
    true
}

/// Sparse per-slot style replacement, keyed by slot id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleOverride {
    pub slots: BTreeMap<String, SlotStyleOverride>,
}

impl StyleOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(mut self, id: &str, style: SlotStyleOverride) -> Self {
        self.slots.insert(id.to_string(), style);
        self
    }
}

/// The style fields a request may replace on one slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotStyleOverride {
    pub font: Option<String>,
    pub size: Option<f64>,
    pub color: Option<Color>,
    pub align: Option<TextAlign>,
    pub max_lines: Option<u32>,
}

/// Raw image bytes. In JSON these are a base64 string or a
/// `data:image/...;base64,` URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageBytes(pub Vec<u8>);

impl ImageBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ImageBytes {
    fn from(bytes: Vec<u8>) -> Self {
        ImageBytes(bytes)
    }
}

impl Serialize for ImageBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use base64::Engine;
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for ImageBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let src = String::deserialize(deserializer)?;
        image_loader::decode_inline_source(&src)
            .map(ImageBytes)
            .map_err(serde::de::Error::custom)
    }
}

/// What the caller puts into a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotContent {
    Text(String),
    Image { image: ImageBytes },
}

/// One render call. Owned by the caller, read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub layout: String,
    pub size: String,
    /// Slot id → text or image.
    #[serde(default)]
    pub content: BTreeMap<String, SlotContent>,
    #[serde(default)]
    pub overrides: Option<StyleOverride>,
    /// Overlay set id; `None` selects the default set.
    #[serde(default)]
    pub overlay: Option<String>,
    #[serde(default)]
    pub apply_overlay: bool,
    #[serde(default)]
    pub background: Option<ImageBytes>,
}

impl RenderRequest {
    pub fn new(layout: &str, size: &str) -> Self {
        Self {
            layout: layout.to_string(),
            size: size.to_string(),
            content: BTreeMap::new(),
            overrides: None,
            overlay: None,
            apply_overlay: false,
            background: None,
        }
    }

    pub fn text(mut self, slot: &str, text: &str) -> Self {
        self.content
            .insert(slot.to_string(), SlotContent::Text(text.to_string()));
        self
    }

    pub fn image(mut self, slot: &str, bytes: Vec<u8>) -> Self {
        self.content.insert(
            slot.to_string(),
            SlotContent::Image {
                image: ImageBytes(bytes),
            },
        );
        self
    }

    pub fn overrides(mut self, overrides: StyleOverride) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn with_overlay(mut self, enabled: bool) -> Self {
        self.apply_overlay = enabled;
        self
    }

    pub fn background(mut self, bytes: Vec<u8>) -> Self {
        self.background = Some(ImageBytes(bytes));
        self
    }
}
