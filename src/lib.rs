//! # Placard
//!
//! A layout-driven card renderer.
//!
//! A card is a fixed-size canvas described by a layout template: named
//! slots, each a box that holds either text or an image. A render request
//! picks a layout and a size, fills the slots, and may restyle a few of
//! them. Text can mix left-to-right and right-to-left scripts; it is
//! shaped, reordered and broken into lines that fit the slot box, and the
//! last allowed line is truncated with an ellipsis when the text does not
//! fit.
//!
//! ## Architecture
//!
//! ```text
//! RenderRequest + AssetStore
//!       ↓
//!   [style]    resolve layout + size + overrides into concrete geometry
//!       ↓
//!   [text]     segment by script and bidi level, shape, break lines
//!       ↓
//!   [layout]   position lines and glyphs, order layers by z
//!       ↓
//!   [raster]   composite background, slots and overlay into pixels
//! ```
//!
//! Every stage is a pure function of its inputs. The [`AssetStore`] is
//! built once and shared read-only, so renders may run concurrently.

pub mod assets;
pub mod error;
pub mod font;
pub mod image_loader;
pub mod layout;
pub mod model;
pub mod raster;
pub mod style;
pub mod text;

use std::collections::HashMap;

pub use assets::{AssetStore, AssetStoreBuilder, AUTO_SIZE, DEFAULT_OVERLAY_SET};
pub use error::{Diagnostic, ErrorBody, PlacardError, Result};
pub use model::RenderRequest;
pub use raster::{OutputFormat, RenderResult};

use model::SlotContent;
use raster::Compositor;
use style::{ResolvedLayout, ResolvedSlotKind};

/// Render a request against loaded assets.
///
/// Request-fatal errors (`UnknownLayout`, `UnknownSize`, `UnknownSlot`,
/// `ContentMismatch`, `MissingOverlay`, undecodable images) are returned
/// before anything is drawn. Recoverable problems come back as
/// diagnostics on the result.
///
/// A size of [`AUTO_SIZE`] takes the layout's size closest in aspect ratio
/// to the background image, which is then required.
pub fn render(assets: &AssetStore, request: &RenderRequest) -> Result<RenderResult> {
    let layout = assets.layout(&request.layout)?;
    let mut background = None;
    let size = if request.size == AUTO_SIZE {
        let bytes = request
            .background
            .as_ref()
            .ok_or_else(|| PlacardError::UnknownSize {
                size: AUTO_SIZE.to_string(),
            })?;
        let pixmap = decode(bytes.as_slice(), "background".to_string())?;
        let size = assets
            .size_for_aspect(layout, pixmap.width(), pixmap.height())
            .ok_or_else(|| PlacardError::UnknownSize {
                size: AUTO_SIZE.to_string(),
            })?;
        background = Some(pixmap);
        size
    } else {
        assets.size(&request.size)?
    };
    let resolved = style::resolve(layout, size, request.overrides.as_ref())?;
    check_content(&resolved, request)?;

    let overlay = if request.apply_overlay {
        let set = request.overlay.as_deref().unwrap_or(DEFAULT_OVERLAY_SET);
        let overlay = assets
            .overlay(set, &size.id)
            .ok_or_else(|| PlacardError::MissingOverlay {
                size: size.id.clone(),
            })?;
        Some(overlay)
    } else {
        None
    };

    if background.is_none() {
        if let Some(bytes) = &request.background {
            background = Some(decode(bytes.as_slice(), "background".to_string())?);
        }
    }

    let mut images = HashMap::new();
    for (slot_id, content) in &request.content {
        if let SlotContent::Image { image } = content {
            let pixmap = decode(image.as_slice(), format!("content.{}", slot_id))?;
            images.insert(slot_id.clone(), pixmap);
        }
    }

    let canvas = assets
        .layout_engine()
        .layout(&resolved, request, assets.fonts(), overlay.is_some());
    let pixmap = Compositor::new(assets.fonts()).composite(
        &canvas,
        background.as_ref(),
        overlay,
        &images,
    )?;
    Ok(RenderResult::from_pixmap(&pixmap, canvas.diagnostics))
}

/// Render a request given as JSON.
pub fn render_json(assets: &AssetStore, json: &str) -> Result<RenderResult> {
    let request: RenderRequest = serde_json::from_str(json)?;
    render(assets, &request)
}

/// Every content entry must name a slot of the layout and match its kind.
fn check_content(resolved: &ResolvedLayout, request: &RenderRequest) -> Result<()> {
    for (slot_id, content) in &request.content {
        let slot = resolved.slot(slot_id).ok_or_else(|| PlacardError::UnknownSlot {
            slot: slot_id.clone(),
            field: "content",
        })?;
        match (&slot.kind, content) {
            (ResolvedSlotKind::Text(_), SlotContent::Text(_))
            | (ResolvedSlotKind::Image { .. }, SlotContent::Image { .. }) => {}
            (ResolvedSlotKind::Text(_), SlotContent::Image { .. }) => {
                return Err(PlacardError::ContentMismatch {
                    slot: slot_id.clone(),
                    expected: "text",
                })
            }
            (ResolvedSlotKind::Image { .. }, SlotContent::Text(_)) => {
                return Err(PlacardError::ContentMismatch {
                    slot: slot_id.clone(),
                    expected: "image",
                })
            }
        }
    }
    Ok(())
}

fn decode(bytes: &[u8], field: String) -> Result<tiny_skia::Pixmap> {
    image_loader::decode_image_bytes(bytes)
        .map(|loaded| loaded.pixmap)
        .map_err(|message| PlacardError::Image { field, message })
}
