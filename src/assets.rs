//! # Asset Store
//!
//! The write-once state every render reads: sizes, layouts, fonts and
//! decoded overlays. Built once at startup through [`AssetStoreBuilder`],
//! validated as a whole, then shared read-only (typically as an
//! `Arc<AssetStore>`) by any number of concurrent renders.
//!
//! The store never touches the filesystem. Callers hand it configuration
//! JSON and raw font/overlay bytes.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use tiny_skia::Pixmap;

use crate::error::{PlacardError, Result};
use crate::font::FontContext;
use crate::image_loader;
use crate::layout::LayoutEngine;
use crate::model::{EngineConfig, LayoutDefinition, RenderRequest, SizeVariant, SlotKind};
use crate::raster::RenderResult;

/// Overlay set used when a request does not name one.
pub const DEFAULT_OVERLAY_SET: &str = "default";

/// Request size id that picks the size from the background's shape.
pub const AUTO_SIZE: &str = "auto";

/// One entry of the layouts listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutEntry {
    pub id: String,
    pub sizes: Vec<String>,
}

pub struct AssetStore {
    sizes: BTreeMap<String, SizeVariant>,
    layouts: BTreeMap<String, LayoutDefinition>,
    overlays: HashMap<(String, String), Pixmap>,
    fonts: FontContext,
    engine: LayoutEngine,
}

impl AssetStore {
    pub fn builder(config: EngineConfig) -> AssetStoreBuilder {
        AssetStoreBuilder::new(config)
    }

    pub fn layout(&self, id: &str) -> Result<&LayoutDefinition> {
        self.layouts.get(id).ok_or_else(|| PlacardError::UnknownLayout {
            layout: id.to_string(),
        })
    }

    pub fn size(&self, id: &str) -> Result<&SizeVariant> {
        self.sizes.get(id).ok_or_else(|| PlacardError::UnknownSize {
            size: id.to_string(),
        })
    }

    /// The size `layout` supports whose aspect ratio is closest to
    /// `width`×`height`. Ties go to the first size id in sorted order.
    pub fn size_for_aspect(
        &self,
        layout: &LayoutDefinition,
        width: u32,
        height: u32,
    ) -> Option<&SizeVariant> {
        if width == 0 || height == 0 {
            return None;
        }
        let target = (width as f64 / height as f64).ln();
        self.sizes
            .values()
            .filter(|s| layout.supports_size(&s.id))
            .map(|s| {
                let ratio = (s.width as f64 / s.height as f64).ln();
                ((ratio - target).abs(), s)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, s)| s)
    }

    /// The overlay of `set` for `size`, if one was registered.
    pub fn overlay(&self, set: &str, size: &str) -> Option<&Pixmap> {
        self.overlays.get(&(set.to_string(), size.to_string()))
    }

    pub fn fonts(&self) -> &FontContext {
        &self.fonts
    }

    pub fn layout_engine(&self) -> &LayoutEngine {
        &self.engine
    }

    /// Layout ids with the size ids each can be rendered at.
    pub fn catalog(&self) -> Vec<LayoutEntry> {
        self.layouts
            .values()
            .map(|layout| LayoutEntry {
                id: layout.id.clone(),
                sizes: self
                    .sizes
                    .keys()
                    .filter(|s| layout.supports_size(s))
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    pub fn render(&self, request: &RenderRequest) -> Result<RenderResult> {
        crate::render(self, request)
    }
}

/// Collects configuration and raw assets, then validates them together.
pub struct AssetStoreBuilder {
    config: EngineConfig,
    fonts: Vec<(String, Vec<u8>)>,
    overlays: Vec<(String, String, Vec<u8>)>,
}

impl AssetStoreBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            fonts: Vec::new(),
            overlays: Vec::new(),
        }
    }

    /// Start from configuration JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        Ok(Self::new(config))
    }

    /// Register a TrueType/OpenType font under `id`.
    pub fn font(mut self, id: &str, data: Vec<u8>) -> Self {
        self.fonts.push((id.to_string(), data));
        self
    }

    /// Register overlay image bytes for `size` in the default set.
    pub fn overlay(self, size: &str, data: Vec<u8>) -> Self {
        self.overlay_in_set(DEFAULT_OVERLAY_SET, size, data)
    }

    pub fn overlay_in_set(mut self, set: &str, size: &str, data: Vec<u8>) -> Self {
        self.overlays
            .push((set.to_string(), size.to_string(), data));
        self
    }

    pub fn build(self) -> Result<AssetStore> {
        let mut fonts = FontContext::new();
        if let Some(ch) = self.config.fallback_char {
            fonts.set_fallback_char(ch);
        }
        for (id, data) in self.fonts {
            fonts.registry_mut().register(&id, data)?;
            log::debug!("registered font '{}'", id);
        }

        let mut sizes = BTreeMap::new();
        for size in self.config.sizes {
            if size.width == 0 || size.height == 0 {
                return Err(PlacardError::InvalidConfig(format!(
                    "size '{}' has an empty canvas",
                    size.id
                )));
            }
            if sizes.contains_key(&size.id) {
                return Err(PlacardError::InvalidConfig(format!(
                    "duplicate size id '{}'",
                    size.id
                )));
            }
            sizes.insert(size.id.clone(), size);
        }

        let mut layouts = BTreeMap::new();
        for layout in self.config.layouts {
            validate_layout(&layout, &sizes, &fonts)?;
            if layouts.contains_key(&layout.id) {
                return Err(PlacardError::InvalidConfig(format!(
                    "duplicate layout id '{}'",
                    layout.id
                )));
            }
            log::debug!(
                "loaded layout '{}' with {} slots",
                layout.id,
                layout.slots.len()
            );
            layouts.insert(layout.id.clone(), layout);
        }

        let mut overlays = HashMap::new();
        for (set, size, data) in self.overlays {
            if !sizes.contains_key(&size) {
                return Err(PlacardError::UnknownSize { size });
            }
            let loaded = image_loader::decode_image_bytes(&data).map_err(|message| {
                PlacardError::Image {
                    field: format!("overlays.{}.{}", set, size),
                    message,
                }
            })?;
            log::debug!(
                "loaded overlay '{}' for size '{}' ({}x{})",
                set,
                size,
                loaded.width_px,
                loaded.height_px
            );
            overlays.insert((set, size), loaded.pixmap);
        }

        log::info!(
            "asset store ready: {} layouts, {} sizes, {} fonts, {} overlays",
            layouts.len(),
            sizes.len(),
            fonts.registry().ids().len(),
            overlays.len()
        );

        Ok(AssetStore {
            sizes,
            layouts,
            overlays,
            fonts,
            engine: LayoutEngine::new().with_placement(self.config.ellipsis_placement),
        })
    }
}

fn validate_layout(
    layout: &LayoutDefinition,
    sizes: &BTreeMap<String, SizeVariant>,
    fonts: &FontContext,
) -> Result<()> {
    let mut seen = HashSet::new();
    for slot in &layout.slots {
        if !seen.insert(slot.id.as_str()) {
            return Err(PlacardError::InvalidConfig(format!(
                "layout '{}' declares slot '{}' twice",
                layout.id, slot.id
            )));
        }
        if let SlotKind::Text(style) = &slot.kind {
            if !fonts.registry().contains(&style.font) {
                return Err(PlacardError::UnknownFont {
                    font: style.font.clone(),
                });
            }
        }
    }
    if let Some(size) = layout.sizes.iter().find(|s| !sizes.contains_key(*s)) {
        return Err(PlacardError::UnknownSize { size: size.clone() });
    }

    let mut stacked = HashSet::new();
    for stack in &layout.stacks {
        for id in &stack.slots {
            match layout.slot(id).map(|s| &s.kind) {
                Some(SlotKind::Text(_)) => {}
                Some(SlotKind::Image { .. }) => {
                    return Err(PlacardError::InvalidConfig(format!(
                        "stack '{}' in layout '{}' lists image slot '{}'",
                        stack.id, layout.id, id
                    )))
                }
                None => {
                    return Err(PlacardError::InvalidConfig(format!(
                        "stack '{}' in layout '{}' lists unknown slot '{}'",
                        stack.id, layout.id, id
                    )))
                }
            }
            if !stacked.insert(id.as_str()) {
                return Err(PlacardError::InvalidConfig(format!(
                    "slot '{}' of layout '{}' is in more than one stack",
                    id, layout.id
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "sizes": [
            { "id": "1080x1080", "width": 1080, "height": 1080 },
            { "id": "1200x628", "width": 1200, "height": 628, "scale": 0.6 }
        ],
        "layouts": [
            { "id": "card", "sizes": ["1080x1080"],
              "slots": [{ "id": "title", "box": { "x": 0, "y": 0, "width": 100, "height": 40 },
                          "kind": { "type": "Text", "fontSize": 20 } }] },
            { "id": "banner", "slots": [] }
        ]
    }"#;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([0, 0, 0, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_lookup_errors() {
        let store = AssetStoreBuilder::from_json(CONFIG).unwrap().build().unwrap();
        assert!(store.layout("card").is_ok());
        assert_eq!(store.layout("nope").unwrap_err().code(), "UnknownLayout");
        assert_eq!(store.size("640x640").unwrap_err().code(), "UnknownSize");
    }

    #[test]
    fn test_catalog_lists_supported_sizes() {
        let store = AssetStoreBuilder::from_json(CONFIG).unwrap().build().unwrap();
        assert_eq!(
            store.catalog(),
            vec![
                LayoutEntry {
                    id: "banner".to_string(),
                    sizes: vec!["1080x1080".to_string(), "1200x628".to_string()],
                },
                LayoutEntry {
                    id: "card".to_string(),
                    sizes: vec!["1080x1080".to_string()],
                },
            ]
        );
    }

    #[test]
    fn test_duplicate_layout_rejected() {
        let mut config: EngineConfig = serde_json::from_str(CONFIG).unwrap();
        config.layouts.push(config.layouts[0].clone());
        let err = AssetStore::builder(config).build().err().unwrap();
        assert_eq!(err.code(), "InvalidConfig");
    }

    #[test]
    fn test_unregistered_font_rejected() {
        let json = CONFIG.replace("\"fontSize\": 20", "\"font\": \"Inter\", \"fontSize\": 20");
        let err = AssetStoreBuilder::from_json(&json)
            .unwrap()
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PlacardError::UnknownFont { font } if font == "Inter"));
    }

    #[test]
    fn test_overlays_by_set_and_size() {
        let store = AssetStoreBuilder::from_json(CONFIG)
            .unwrap()
            .overlay("1080x1080", png(2, 2))
            .overlay_in_set("holiday", "1200x628", png(3, 1))
            .build()
            .unwrap();
        assert!(store.overlay(DEFAULT_OVERLAY_SET, "1080x1080").is_some());
        assert!(store.overlay(DEFAULT_OVERLAY_SET, "1200x628").is_none());
        assert_eq!(store.overlay("holiday", "1200x628").unwrap().width(), 3);
    }

    #[test]
    fn test_overlay_for_unknown_size_rejected() {
        let err = AssetStoreBuilder::from_json(CONFIG)
            .unwrap()
            .overlay("640x640", png(1, 1))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.code(), "UnknownSize");
    }

    #[test]
    fn test_undecodable_overlay_names_field() {
        let err = AssetStoreBuilder::from_json(CONFIG)
            .unwrap()
            .overlay("1080x1080", vec![1, 2, 3, 4, 5])
            .build()
            .err()
            .unwrap();
        assert_eq!(err.field().as_deref(), Some("overlays.default.1080x1080"));
    }

    #[test]
    fn test_size_for_aspect() {
        let json = r#"{
            "sizes": [
                { "id": "1200x1200", "width": 1200, "height": 1200 },
                { "id": "1200x1500", "width": 1200, "height": 1500 },
                { "id": "1200x628", "width": 1200, "height": 628 }
            ],
            "layouts": [
                { "id": "any", "slots": [] },
                { "id": "tall", "sizes": ["1200x1500", "1200x628"], "slots": [] }
            ]
        }"#;
        let store = AssetStoreBuilder::from_json(json).unwrap().build().unwrap();
        let any = store.layout("any").unwrap();
        let pick = |w, h| store.size_for_aspect(any, w, h).map(|s| s.id.as_str());
        assert_eq!(pick(1000, 1100), Some("1200x1200"));
        assert_eq!(pick(1920, 1080), Some("1200x628"));
        assert_eq!(pick(800, 1000), Some("1200x1500"));
        assert_eq!(pick(0, 10), None);

        let tall = store.layout("tall").unwrap();
        assert_eq!(
            store.size_for_aspect(tall, 500, 500).map(|s| s.id.as_str()),
            Some("1200x1500")
        );
    }

    #[test]
    fn test_stack_members_are_validated() {
        let base = r#"{
            "sizes": [{ "id": "s", "width": 100, "height": 100 }],
            "layouts": [{ "id": "card",
                "slots": [
                    { "id": "a", "box": { "x": 0, "y": 0, "width": 10, "height": 10 },
                      "kind": { "type": "Text", "fontSize": 10 } },
                    { "id": "logo", "box": { "x": 0, "y": 0, "width": 10, "height": 10 },
                      "kind": { "type": "Image" } }
                ],
                "stacks": [STACKS] }]
        }"#;
        let build = |stacks: &str| {
            AssetStoreBuilder::from_json(&base.replace("STACKS", stacks))
                .unwrap()
                .build()
        };
        let stack = |slots: &str| {
            format!(r#"{{ "id": "copy", "box": {{ "x": 0, "y": 0, "width": 100, "height": 100 }}, "slots": {} }}"#, slots)
        };

        assert!(build(&stack(r#"["a"]"#)).is_ok());
        for bad in [stack(r#"["logo"]"#), stack(r#"["b"]"#), format!("{},{}", stack(r#"["a"]"#), stack(r#"["a"]"#))] {
            let err = build(&bad).err().unwrap();
            assert_eq!(err.code(), "InvalidConfig", "{}", bad);
        }
    }

    #[test]
    fn test_example_config_loads() {
        let store = AssetStoreBuilder::from_json(include_str!("../demos/layouts.json"))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(store.layout("card").unwrap().stacks[0].slots, vec!["title", "subtitle"]);
    }

    #[test]
    fn test_store_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AssetStore>();
    }
}
