//! # Image Decoding
//!
//! Turns background, overlay and slot image bytes into premultiplied RGBA
//! pixmaps for the compositor. Requests carry images inline, either as a
//! `data:image/...;base64,...` URI or as a bare base64 string; file paths
//! are read by the CLI only, never from a request body.

use std::io::Cursor;

use tiny_skia::Pixmap;

/// Container formats accepted for any image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
}

impl ImageKind {
    /// Identify the container from its leading bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match data {
            [0xFF, 0xD8, ..] => Some(ImageKind::Jpeg),
            [0x89, b'P', b'N', b'G', ..] => Some(ImageKind::Png),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(ImageKind::Webp),
            _ => None,
        }
    }
}

/// A decoded image, premultiplied.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub kind: ImageKind,
    pub pixmap: Pixmap,
    pub width_px: u32,
    pub height_px: u32,
}

/// Raw bytes behind an inline image string.
pub fn decode_inline_source(src: &str) -> Result<Vec<u8>, String> {
    use base64::Engine;

    let payload = match src.strip_prefix("data:") {
        Some(uri) => {
            let (header, body) = uri
                .split_once(',')
                .ok_or_else(|| "data URI has no payload".to_string())?;
            if !header.ends_with(";base64") {
                return Err(format!("data URI '{}' is not base64-encoded", header));
            }
            body
        }
        None => src,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64: {}", e))
}

/// Decode JPEG, PNG or WebP bytes into a pixmap.
pub fn decode_image_bytes(data: &[u8]) -> Result<LoadedImage, String> {
    let kind = ImageKind::sniff(data)
        .ok_or_else(|| "unrecognized image data (expected JPEG, PNG or WebP)".to_string())?;

    let decoded = image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| format!("cannot read image: {}", e))?
        .decode()
        .map_err(|e| format!("cannot decode {:?} image: {}", kind, e))?
        .into_rgba8();

    let (width, height) = decoded.dimensions();
    let mut pixmap =
        Pixmap::new(width, height).ok_or_else(|| format!("image has no pixels ({}x{})", width, height))?;
    for (dst, src) in pixmap.data_mut().chunks_exact_mut(4).zip(decoded.pixels()) {
        let [r, g, b, a] = src.0;
        dst.copy_from_slice(&[premultiply(r, a), premultiply(g, a), premultiply(b, a), a]);
    }

    Ok(LoadedImage {
        kind,
        pixmap,
        width_px: width,
        height_px: height,
    })
}

fn premultiply(c: u8, a: u8) -> u8 {
    ((c as u16 * a as u16 + 127) / 255) as u8
}
