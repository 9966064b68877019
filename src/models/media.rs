//! A ledger entry describing one uploaded media file.

use crate::models::options::VideoOptions;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Catalog entry for a stored file.
///
/// The record owns at most one file, linked by `reference`. The link is set
/// once at creation and never rewritten; only `options` changes afterwards.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MediaRecord {
    pub id: Uuid,

    /// Logical reference of the backing file, if any.
    pub reference: Option<String>,

    /// Filename as supplied by the uploader.
    pub original_name: String,

    /// Declared MIME type.
    pub mime_type: String,

    pub size_bytes: i64,

    /// MD5 of the payload, hex encoded.
    pub checksum: Option<String>,

    pub options: VideoOptions,

    pub owner: Option<String>,

    pub is_public: bool,

    pub created_at: DateTime<Utc>,
}

/// Raw `media_records` row; `options` is still serialized text.
#[derive(FromRow, Debug)]
pub struct MediaRow {
    pub id: Uuid,
    pub reference: Option<String>,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub checksum: Option<String>,
    pub options: String,
    pub owner: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MediaRow> for MediaRecord {
    type Error = serde_json::Error;

    fn try_from(row: MediaRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            reference: row.reference,
            original_name: row.original_name,
            mime_type: row.mime_type,
            size_bytes: row.size_bytes,
            checksum: row.checksum,
            options: VideoOptions::from_json(&row.options)?,
            owner: row.owner,
            is_public: row.is_public,
            created_at: row.created_at,
        })
    }
}

/// Attributes for a new ledger entry.
#[derive(Clone, Debug, Default)]
pub struct NewMediaRecord {
    pub reference: Option<String>,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub checksum: Option<String>,
    pub options: VideoOptions,
    pub owner: Option<String>,
    pub is_public: bool,
}
