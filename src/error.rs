//! Structured error types for the Placard rendering engine.
//!
//! Request-fatal failures (`UnknownLayout`, `UnknownSize`, `UnknownSlot`,
//! `MissingOverlay`) abort a render before any pixel is produced. Problems
//! the engine recovers from locally never surface as errors; they travel
//! back on the render result as [`Diagnostic`] values.

use serde::Serialize;
use thiserror::Error;

/// The unified error type returned by all public Placard API functions.
#[derive(Debug, Error)]
pub enum PlacardError {
    /// The request names a layout that was never loaded.
    #[error("unknown layout '{layout}'")]
    UnknownLayout { layout: String },

    /// The size is not registered, or the layout does not support it.
    #[error("unknown size '{size}'")]
    UnknownSize { size: String },

    /// An override or a content entry targets a slot the layout lacks.
    #[error("{field} references unknown slot '{slot}'")]
    UnknownSlot { slot: String, field: &'static str },

    /// Text was sent to an image slot, or image bytes to a text slot.
    #[error("content for slot '{slot}' does not match its kind (expected {expected})")]
    ContentMismatch {
        slot: String,
        expected: &'static str,
    },

    /// The overlay toggle is on but no asset exists for the size.
    #[error("overlay enabled but no overlay asset registered for size '{size}'")]
    MissingOverlay { size: String },

    /// The font has no glyph for a required code point. Only the strict
    /// shaping entry point returns this; rendering substitutes a fallback.
    #[error("font '{font}' has no glyph for {ch:?}")]
    UnsupportedGlyph { font: String, ch: char },

    /// A layout refers to a font id that was never registered.
    #[error("unknown font '{font}'")]
    UnknownFont { font: String },

    /// A font could not be parsed.
    #[error("font error: {0}")]
    FontError(String),

    /// An image (background, overlay or slot content) failed to decode.
    #[error("image error in {field}: {message}")]
    Image { field: String, message: String },

    /// Configuration or request JSON failed to parse.
    #[error("failed to parse input: {source}\n  Hint: {hint}")]
    Config {
        source: serde_json::Error,
        hint: String,
    },

    /// Configuration parsed but is inconsistent (duplicate ids and the like).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The output image could not be encoded.
    #[error("failed to encode output image: {0}")]
    Encode(String),
}

impl PlacardError {
    /// Stable machine-readable code for the error body.
    pub fn code(&self) -> &'static str {
        match self {
            PlacardError::UnknownLayout { .. } => "UnknownLayout",
            PlacardError::UnknownSize { .. } => "UnknownSize",
            PlacardError::UnknownSlot { .. } => "UnknownSlot",
            PlacardError::ContentMismatch { .. } => "ContentMismatch",
            PlacardError::MissingOverlay { .. } => "MissingOverlay",
            PlacardError::UnsupportedGlyph { .. } => "UnsupportedGlyph",
            PlacardError::UnknownFont { .. } => "UnknownFont",
            PlacardError::FontError(_) => "FontError",
            PlacardError::Image { .. } => "Image",
            PlacardError::Config { .. } => "Config",
            PlacardError::InvalidConfig(_) => "InvalidConfig",
            PlacardError::Encode(_) => "Encode",
        }
    }

    /// The request field the error points at, when there is one.
    pub fn field(&self) -> Option<String> {
        match self {
            PlacardError::UnknownLayout { .. } => Some("layout".to_string()),
            PlacardError::UnknownSize { .. } => Some("size".to_string()),
            PlacardError::UnknownSlot { slot, field } => Some(format!("{}.{}", field, slot)),
            PlacardError::ContentMismatch { slot, .. } => Some(format!("content.{}", slot)),
            PlacardError::MissingOverlay { .. } => Some("applyOverlay".to_string()),
            PlacardError::Image { field, .. } => Some(field.clone()),
            _ => None,
        }
    }

    /// True for errors caused by the request rather than the deployment.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            PlacardError::UnknownLayout { .. }
                | PlacardError::UnknownSize { .. }
                | PlacardError::UnknownSlot { .. }
                | PlacardError::ContentMismatch { .. }
                | PlacardError::MissingOverlay { .. }
                | PlacardError::Image { .. }
                | PlacardError::Config { .. }
        )
    }
}

impl From<serde_json::Error> for PlacardError {
    fn from(e: serde_json::Error) -> Self {
        let hint = match e.classify() {
            serde_json::error::Category::Syntax => {
                "Check for trailing commas, missing quotes, or unescaped characters.".to_string()
            }
            serde_json::error::Category::Data => {
                "The JSON is valid but doesn't match the expected schema. Check field names and types.".to_string()
            }
            serde_json::error::Category::Eof => {
                "Unexpected end of input. Is the JSON truncated?".to_string()
            }
            serde_json::error::Category::Io => String::new(),
        };
        PlacardError::Config { source: e, hint }
    }
}

/// Error body handed to the HTTP layer on a failed render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl From<&PlacardError> for ErrorBody {
    fn from(e: &PlacardError) -> Self {
        ErrorBody {
            code: e.code(),
            field: e.field(),
            message: e.to_string(),
        }
    }
}

/// A problem the engine recovered from while rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Diagnostic {
    /// A code point had no glyph and the fallback glyph was drawn instead.
    UnsupportedGlyph { slot: String, ch: char },
    /// The stacked lines are taller than the slot box; the excess is clipped.
    SlotOverflow {
        slot: String,
        content_height: f64,
        box_height: f64,
    },
    /// The box is narrower than the ellipsis, which is drawn anyway.
    EmptyInputAfterTruncation { slot: String },
}

pub type Result<T> = std::result::Result<T, PlacardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_names_field() {
        let err = PlacardError::UnknownSlot {
            slot: "title2".to_string(),
            field: "overrides",
        };
        let body = ErrorBody::from(&err);
        assert_eq!(body.code, "UnknownSlot");
        assert_eq!(body.field.as_deref(), Some("overrides.title2"));
        assert!(body.message.contains("title2"));
    }

    #[test]
    fn test_parse_error_carries_hint() {
        let err: PlacardError = serde_json::from_str::<serde_json::Value>("{\"a\": 1,}")
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "Config");
        assert!(err.to_string().contains("Hint"));
        assert!(err.is_request_error());
    }

    #[test]
    fn test_missing_overlay_points_at_toggle() {
        let err = PlacardError::MissingOverlay {
            size: "1080x1080".to_string(),
        };
        assert_eq!(err.field().as_deref(), Some("applyOverlay"));
    }

    #[test]
    fn test_diagnostic_serializes_with_kind_tag() {
        let d = Diagnostic::EmptyInputAfterTruncation {
            slot: "title".to_string(),
        };
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("\"kind\":\"emptyInputAfterTruncation\""));
    }
}
