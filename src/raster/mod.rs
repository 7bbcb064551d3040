//! # Compositor
//!
//! Rasterizes a [`CanvasLayout`] onto a tiny-skia pixmap, bottom to top:
//! background color, background image, then every layer in order (text
//! slots, image slots and the overlay). Each slot is clipped to its box.
//!
//! Glyph outlines come from the font as `ttf_parser::OutlineBuilder`
//! callbacks in font units with y up; [`GlyphPathBuilder`] scales them to
//! pixels and flips them onto the canvas's y-down space.

use std::collections::HashMap;
use std::io::Cursor;
use std::str::FromStr;

use tiny_skia::{FillRule, FilterQuality, Mask, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Transform};
use ttf_parser::OutlineBuilder;

use crate::error::{Diagnostic, PlacardError, Result};
use crate::font::FontContext;
use crate::layout::{CanvasLayout, Layer, TextBlock};
use crate::model::{ImageFit, Rect};

/// Encoded output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            other => Err(format!("unsupported output format '{}'", other)),
        }
    }
}

/// A rendered card. Owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    pub width: u32,
    pub height: u32,
    /// Straight (non-premultiplied) RGBA8, row-major.
    pub pixels: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RenderResult {
    pub fn from_pixmap(pixmap: &Pixmap, diagnostics: Vec<Diagnostic>) -> Self {
        let mut pixels = Vec::with_capacity(pixmap.data().len());
        for px in pixmap.pixels() {
            let c = px.demultiply();
            pixels.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        Self {
            width: pixmap.width(),
            height: pixmap.height(),
            pixels,
            diagnostics,
        }
    }

    /// RGBA of one pixel, if in bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        let p = self.pixels.get(i..i + 4)?;
        Some([p[0], p[1], p[2], p[3]])
    }

    pub fn encode(&self, format: OutputFormat) -> Result<Vec<u8>> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| PlacardError::Encode("pixel buffer does not match dimensions".to_string()))?;
        let rgba = image::DynamicImage::ImageRgba8(img);
        // JPEG has no alpha channel.
        let (out, target) = match format {
            OutputFormat::Png => (rgba, image::ImageOutputFormat::Png),
            OutputFormat::Jpeg => (
                image::DynamicImage::ImageRgb8(rgba.to_rgb8()),
                image::ImageOutputFormat::Jpeg(90),
            ),
        };
        let mut buf = Vec::new();
        out.write_to(&mut Cursor::new(&mut buf), target)
            .map_err(|e| PlacardError::Encode(e.to_string()))?;
        Ok(buf)
    }
}

/// Draws layouts. Borrows the font context; holds no other state.
pub struct Compositor<'a> {
    fonts: &'a FontContext,
}

impl<'a> Compositor<'a> {
    pub fn new(fonts: &'a FontContext) -> Self {
        Self { fonts }
    }

    /// Rasterize `layout`. `images` maps image slot ids to decoded pixmaps;
    /// a slot without an entry is left empty.
    pub fn composite(
        &self,
        layout: &CanvasLayout,
        background: Option<&Pixmap>,
        overlay: Option<&Pixmap>,
        images: &HashMap<String, Pixmap>,
    ) -> Result<Pixmap> {
        let mut canvas = Pixmap::new(layout.width, layout.height).ok_or_else(|| {
            PlacardError::InvalidConfig(format!(
                "invalid canvas size {}x{}",
                layout.width, layout.height
            ))
        })?;
        let [r, g, b, a] = layout.background_color.to_rgba8();
        canvas.fill(tiny_skia::Color::from_rgba8(r, g, b, a));

        let full = Rect::new(0.0, 0.0, layout.width as f64, layout.height as f64);
        if let Some(bg) = background {
            draw_image(&mut canvas, bg, &full, layout.background_fit, None);
        }

        for layer in &layout.layers {
            match layer {
                Layer::Text(block) => self.draw_text(&mut canvas, block)?,
                Layer::Image {
                    slot_id,
                    bounds,
                    fit,
                } => {
                    let (Some(img), Some(mask)) = (images.get(slot_id), clip_mask(&canvas, bounds))
                    else {
                        continue;
                    };
                    draw_image(&mut canvas, img, bounds, *fit, Some(&mask));
                }
                Layer::Overlay => {
                    if let Some(ov) = overlay {
                        draw_image(&mut canvas, ov, &full, ImageFit::Stretch, None);
                    }
                }
            }
        }

        Ok(canvas)
    }

    fn draw_text(&self, canvas: &mut Pixmap, block: &TextBlock) -> Result<()> {
        let Some(mask) = clip_mask(canvas, &block.bounds) else {
            return Ok(());
        };
        let font = self.fonts.resolve(&block.font);
        let outliner = font.outliner()?;
        let scale = font.metrics().scale(block.font_size) as f32;

        let mut paint = Paint::default();
        let [r, g, b, a] = block.color.to_rgba8();
        paint.set_color_rgba8(r, g, b, a);
        paint.anti_alias = true;

        for line in &block.lines {
            for glyph in &line.glyphs {
                let mut builder = GlyphPathBuilder::new(glyph.x as f32, glyph.y as f32, scale);
                if !outliner.outline(glyph.glyph_id, &mut builder) {
                    continue;
                }
                if let Some(path) = builder.finish() {
                    canvas.fill_path(
                        &path,
                        &paint,
                        FillRule::Winding,
                        Transform::identity(),
                        Some(&mask),
                    );
                }
            }
        }
        Ok(())
    }
}

fn clip_mask(canvas: &Pixmap, bounds: &Rect) -> Option<Mask> {
    let rect = tiny_skia::Rect::from_xywh(
        bounds.x as f32,
        bounds.y as f32,
        bounds.width as f32,
        bounds.height as f32,
    )?;
    let path = PathBuilder::from_rect(rect);
    let mut mask = Mask::new(canvas.width(), canvas.height())?;
    mask.fill_path(&path, FillRule::Winding, true, Transform::identity());
    Some(mask)
}

/// Scale and offset that map an image of `src_w`×`src_h` into `dest`.
pub fn fit_transform(src_w: f64, src_h: f64, dest: &Rect, fit: ImageFit) -> (f64, f64, f64, f64) {
    let sx = dest.width / src_w;
    let sy = dest.height / src_h;
    let (sx, sy) = match fit {
        ImageFit::Stretch => (sx, sy),
        ImageFit::Cover => (sx.max(sy), sx.max(sy)),
        ImageFit::Contain => (sx.min(sy), sx.min(sy)),
    };
    let tx = dest.x + (dest.width - src_w * sx) / 2.0;
    let ty = dest.y + (dest.height - src_h * sy) / 2.0;
    (sx, sy, tx, ty)
}

fn draw_image(canvas: &mut Pixmap, img: &Pixmap, dest: &Rect, fit: ImageFit, mask: Option<&Mask>) {
    let (w, h) = (img.width() as f64, img.height() as f64);
    if w <= 0.0 || h <= 0.0 || dest.width <= 0.0 || dest.height <= 0.0 {
        return;
    }
    let (sx, sy, tx, ty) = fit_transform(w, h, dest, fit);
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    canvas.draw_pixmap(
        0,
        0,
        img.as_ref(),
        &paint,
        Transform::from_row(sx as f32, 0.0, 0.0, sy as f32, tx as f32, ty as f32),
        mask,
    );
}

/// Converts font-unit outlines (y up) to a canvas path (y down) with the
/// glyph origin at (`origin_x`, `origin_y`).
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}
