//! Shared handler state.

use crate::{
    config::MediaPolicy,
    services::{
        file_store::{FileStore, StoreResult},
        image_service::ImageService,
        media_service::MediaService,
    },
};
use sqlx::SqlitePool;
use std::{path::Path, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
    pub media: MediaService,
    pub images: ImageService,
    pub policy: Arc<MediaPolicy>,
}

impl AppState {
    /// Wire services over `storage_dir`: uploads under `videos/`, images under
    /// `images/`, each its own sandbox.
    pub async fn new(
        db: Arc<SqlitePool>,
        storage_dir: impl AsRef<Path>,
        policy: MediaPolicy,
    ) -> StoreResult<Self> {
        let storage_dir = storage_dir.as_ref();
        let policy = Arc::new(policy);
        let media_store = FileStore::open(storage_dir.join("videos")).await?;
        let image_store = FileStore::open(storage_dir.join("images")).await?;

        Ok(Self {
            media: MediaService::new(db.clone(), media_store, &policy),
            images: ImageService::new(db.clone(), image_store, policy.clone()),
            db,
            policy,
        })
    }
}
