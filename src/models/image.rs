//! Image-bearing records and the labels sniffed from their bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Container formats the sniffer can name.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    #[serde(rename = "WEBP")]
    WebP,
    Unknown,
}

impl ImageKind {
    pub fn label(self) -> &'static str {
        match self {
            ImageKind::Png => "PNG",
            ImageKind::Jpeg => "JPEG",
            ImageKind::Gif => "GIF",
            ImageKind::WebP => "WEBP",
            ImageKind::Unknown => "UNKNOWN",
        }
    }

    /// Inverse of [`ImageKind::label`], case-insensitive.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "PNG" => ImageKind::Png,
            "JPEG" | "JPG" => ImageKind::Jpeg,
            "GIF" => ImageKind::Gif,
            "WEBP" => ImageKind::WebP,
            _ => ImageKind::Unknown,
        }
    }

    pub fn mime_type(self) -> Option<&'static str> {
        match self {
            ImageKind::Png => Some("image/png"),
            ImageKind::Jpeg => Some("image/jpeg"),
            ImageKind::Gif => Some("image/gif"),
            ImageKind::WebP => Some("image/webp"),
            ImageKind::Unknown => None,
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Format and pixel size recovered from raw bytes.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ImageMetadata {
    pub format: ImageKind,
    pub width: u32,
    pub height: u32,
}

impl ImageMetadata {
    /// Human label such as `800 x 600 px`.
    pub fn dimensions_label(&self) -> String {
        format!("{} x {} px", self.width, self.height)
    }
}

/// A stored image owned by a record of some host type
/// (e.g. `product.template`).
#[derive(Serialize, Clone, FromRow, Debug)]
pub struct ImageRecord {
    pub id: Uuid,

    /// Host record type; drives the quality-preservation policy.
    pub record_type: String,

    pub name: String,

    /// Logical reference of the current payload. Replaced on every swap.
    pub reference: String,

    /// Declared MIME type of the current payload.
    pub mime_type: String,

    pub size_bytes: i64,

    /// Detected format label, unset when detection failed.
    pub original_format: Option<String>,

    /// `W x H px`, unset when detection failed.
    pub original_dimensions: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn detected_kind(&self) -> Option<ImageKind> {
        self.original_format.as_deref().map(ImageKind::from_label)
    }
}
