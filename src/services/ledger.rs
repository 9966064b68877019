//! src/services/ledger.rs
//!
//! Ledger - the SQLite catalog of media records. It never touches files;
//! pairing a record with its payload is the job of `MediaService`.

use crate::models::{
    media::{MediaRecord, MediaRow, NewMediaRecord},
    options::OptionsPatch,
};
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 200;

const MEDIA_COLUMNS: &str = "id, reference, original_name, mime_type, size_bytes, checksum, \
                             options, owner, is_public, created_at";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("media record `{0}` not found")]
    NotFound(Uuid),
    #[error("stored option bag is not valid JSON: {0}")]
    Options(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Listing predicates. Every `None` means "don't filter on this".
#[derive(Clone, Debug)]
pub struct ListFilter {
    /// `video` matches `video/*`; a full type such as `video/mp4` matches exactly.
    pub family: Option<String>,
    pub owner: Option<String>,
    pub is_public: Option<bool>,
    pub oldest_first: bool,
    pub offset: usize,
    pub limit: usize,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            family: None,
            owner: None,
            is_public: None,
            oldest_first: false,
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Clone)]
pub struct Ledger {
    db: Arc<SqlitePool>,
}

impl Ledger {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a new record. This is the only place a reference gets linked.
    pub async fn create(&self, attrs: NewMediaRecord) -> LedgerResult<MediaRecord> {
        let options = attrs.options.to_json()?;
        let row = sqlx::query_as::<_, MediaRow>(&format!(
            "INSERT INTO media_records ({MEDIA_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {MEDIA_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&attrs.reference)
        .bind(&attrs.original_name)
        .bind(&attrs.mime_type)
        .bind(attrs.size_bytes)
        .bind(&attrs.checksum)
        .bind(options)
        .bind(&attrs.owner)
        .bind(attrs.is_public)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;

        Ok(MediaRecord::try_from(row)?)
    }

    pub async fn get(&self, id: Uuid) -> LedgerResult<MediaRecord> {
        let row = sqlx::query_as::<_, MediaRow>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media_records WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(LedgerError::NotFound(id))?;

        Ok(MediaRecord::try_from(row)?)
    }

    /// Merge `patch` into the stored option bag.
    ///
    /// Read-modify-write with no lock: concurrent patches to the same record
    /// are last-write-wins.
    pub async fn update_options(&self, id: Uuid, patch: OptionsPatch) -> LedgerResult<MediaRecord> {
        let mut record = self.get(id).await?;
        record.options.apply(patch);

        let result = sqlx::query("UPDATE media_records SET options = ? WHERE id = ?")
            .bind(record.options.to_json()?)
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(id));
        }

        debug!(id = %id, "updated media options");
        Ok(record)
    }

    /// Page through records, newest first unless `oldest_first` is set.
    pub async fn list(&self, filter: &ListFilter) -> LedgerResult<Vec<MediaRecord>> {
        if filter.limit == 0 {
            return Ok(Vec::new());
        }
        let limit = filter.limit.min(MAX_PAGE_SIZE);

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {MEDIA_COLUMNS} FROM media_records WHERE 1 = 1"
        ));

        if let Some(family) = filter.family.as_deref().map(str::to_ascii_lowercase) {
            if family.contains('/') {
                builder.push(" AND lower(mime_type) = ");
                builder.push_bind(family);
            } else {
                builder.push(" AND lower(mime_type) LIKE ");
                builder.push_bind(format!("{}/%", family));
            }
        }
        if let Some(owner) = &filter.owner {
            builder.push(" AND owner = ");
            builder.push_bind(owner.clone());
        }
        if let Some(is_public) = filter.is_public {
            builder.push(" AND is_public = ");
            builder.push_bind(is_public);
        }

        if filter.oldest_first {
            builder.push(" ORDER BY created_at ASC, rowid ASC");
        } else {
            builder.push(" ORDER BY created_at DESC, rowid DESC");
        }
        builder.push(" LIMIT ");
        builder.push_bind(limit as i64);
        builder.push(" OFFSET ");
        builder.push_bind(filter.offset as i64);

        let rows: Vec<MediaRow> = builder.build_query_as().fetch_all(&*self.db).await?;
        rows.into_iter()
            .map(|row| MediaRecord::try_from(row).map_err(LedgerError::from))
            .collect()
    }

    /// Remove the record and hand it back so the caller can clean up its file.
    pub async fn delete(&self, id: Uuid) -> LedgerResult<MediaRecord> {
        let row = sqlx::query_as::<_, MediaRow>(&format!(
            "DELETE FROM media_records WHERE id = ? RETURNING {MEDIA_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(LedgerError::NotFound(id))?;

        Ok(MediaRecord::try_from(row)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::options::VideoOptions;
    use serde_json::json;

    async fn ledger() -> Ledger {
        Ledger::new(db::memory_pool().await.unwrap())
    }

    fn attrs(name: &str, mime: &str) -> NewMediaRecord {
        NewMediaRecord {
            reference: Some(format!("{}_1_abcdef01.bin", name)),
            original_name: name.to_string(),
            mime_type: mime.to_string(),
            size_bytes: 3,
            checksum: None,
            options: VideoOptions::default(),
            owner: None,
            is_public: true,
        }
    }

    #[tokio::test]
    async fn create_then_get() {
        let ledger = ledger().await;
        let created = ledger.create(attrs("a", "video/mp4")).await.unwrap();
        let fetched = ledger.get(created.id).await.unwrap();
        assert_eq!(created, fetched);
        assert_eq!(fetched.options, VideoOptions::default());
    }

    #[tokio::test]
    async fn update_merges_options() {
        let ledger = ledger().await;
        let mut options = VideoOptions {
            autoplay: true,
            ..Default::default()
        };
        options.extra.insert("poster".into(), json!("p.png"));
        let created = ledger
            .create(NewMediaRecord {
                options,
                ..attrs("a", "video/mp4")
            })
            .await
            .unwrap();

        let patch: OptionsPatch =
            serde_json::from_value(json!({ "hideControls": true })).unwrap();
        ledger.update_options(created.id, patch).await.unwrap();

        let stored = ledger.get(created.id).await.unwrap();
        assert!(stored.options.autoplay);
        assert!(stored.options.hide_controls);
        assert_eq!(stored.options.extra.get("poster"), Some(&json!("p.png")));
        assert_eq!(stored.reference, created.reference);
    }

    #[tokio::test]
    async fn update_missing_record_is_not_found() {
        let ledger = ledger().await;
        let id = Uuid::new_v4();
        assert!(matches!(
            ledger.update_options(id, OptionsPatch::default()).await,
            Err(LedgerError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn zero_limit_is_an_empty_page() {
        let ledger = ledger().await;
        ledger.create(attrs("one", "video/mp4")).await.unwrap();

        let filter = ListFilter {
            limit: 0,
            ..Default::default()
        };
        assert!(ledger.list(&filter).await.unwrap().is_empty());

        let filter = ListFilter {
            limit: MAX_PAGE_SIZE * 10,
            ..Default::default()
        };
        assert_eq!(ledger.list(&filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_filters_and_orders_newest_first() {
        let ledger = ledger().await;
        let first = ledger.create(attrs("one", "video/mp4")).await.unwrap();
        let second = ledger.create(attrs("two", "video/webm")).await.unwrap();
        let mut private = attrs("three", "image/png");
        private.is_public = false;
        private.owner = Some("alice".into());
        let third = ledger.create(private).await.unwrap();

        let all = ledger.list(&ListFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);

        let videos = ledger
            .list(&ListFilter {
                family: Some("video".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(videos.len(), 2);

        let exact = ledger
            .list(&ListFilter {
                family: Some("video/webm".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].id, second.id);

        let owned = ledger
            .list(&ListFilter {
                owner: Some("alice".into()),
                is_public: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, third.id);

        let page = ledger
            .list(&ListFilter {
                offset: 1,
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, second.id);

        let oldest = ledger
            .list(&ListFilter {
                oldest_first: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(oldest[0].id, first.id);
    }

    #[tokio::test]
    async fn delete_returns_record_once() {
        let ledger = ledger().await;
        let created = ledger.create(attrs("gone", "video/ogg")).await.unwrap();
        let deleted = ledger.delete(created.id).await.unwrap();
        assert_eq!(deleted.reference, created.reference);
        assert!(matches!(
            ledger.delete(created.id).await,
            Err(LedgerError::NotFound(_))
        ));
    }
}
