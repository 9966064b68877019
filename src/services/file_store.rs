//! src/services/file_store.rs
//!
//! FileStore - payload storage in a single sandbox directory. Files are
//! addressed by a logical reference of the form
//! `{base}_{millis}_{md5[..8]}.{ext}`, and every path derived from a reference
//! is re-normalized and checked against the sandbox root before use.

use chrono::Utc;
use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info};
use uuid::Uuid;

const MAX_BASE_LEN: usize = 64;
const MAX_EXT_LEN: usize = 10;
const FINGERPRINT_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("stored file `{0}` not found")]
    NotFound(String),
    #[error("reference `{0}` resolves outside the storage root")]
    PathEscape(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a successful write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredFile {
    pub reference: String,
    pub size_bytes: u64,
    /// Full MD5 of the payload, hex encoded.
    pub checksum: String,
}

/// Whether a delete actually removed something.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    AlreadyAbsent,
}

#[derive(Clone, Debug)]
pub struct FileStore {
    /// Canonical sandbox root.
    root: PathBuf,

    /// Last issued timestamp, shared by clones so stamps stay strictly increasing.
    last_stamp: Arc<AtomicI64>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        let root = fs::canonicalize(&root).await?;
        Ok(Self {
            root,
            last_stamp: Arc::new(AtomicI64::new(0)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` under a fresh reference derived from `original_name`.
    ///
    /// The payload goes to a temp file first, is fsynced, then renamed into
    /// place, so a reader never observes a partial file.
    pub async fn put(&self, bytes: &[u8], original_name: &str) -> StoreResult<StoredFile> {
        let digest = format!("{:x}", md5::compute(bytes));
        let reference = self.reference_for(original_name, &digest);
        let file_path = self.resolve(&reference)?;

        let tmp_path = self.root.join(format!(".tmp-{}", Uuid::new_v4()));
        if let Err(err) = write_synced(&tmp_path, bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        info!(
            reference = %reference,
            size_bytes = bytes.len(),
            "stored file"
        );

        Ok(StoredFile {
            reference,
            size_bytes: bytes.len() as u64,
            checksum: digest,
        })
    }

    /// Read the whole payload behind `reference`.
    pub async fn get(&self, reference: &str) -> StoreResult<Vec<u8>> {
        let path = self.existing_path(reference).await?;
        fs::read(&path).await.map_err(|err| not_found_or_io(err, reference))
    }

    /// Open the payload for streaming. Returns the handle and its length.
    pub async fn open_file(&self, reference: &str) -> StoreResult<(File, u64)> {
        let path = self.existing_path(reference).await?;
        let file = File::open(&path)
            .await
            .map_err(|err| not_found_or_io(err, reference))?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Remove the payload. A missing file is not an error.
    pub async fn delete(&self, reference: &str) -> StoreResult<DeleteOutcome> {
        let path = self.resolve(reference)?;
        match fs::remove_file(&path).await {
            Ok(_) => {
                info!(reference = %reference, "removed stored file");
                Ok(DeleteOutcome::Removed)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(reference = %reference, "stored file already absent");
                Ok(DeleteOutcome::AlreadyAbsent)
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Join `reference` onto the root and check the normalized result stays
    /// strictly inside it.
    pub fn resolve(&self, reference: &str) -> StoreResult<PathBuf> {
        if reference.is_empty() {
            return Err(StoreError::NotFound(reference.to_string()));
        }
        if reference.bytes().any(|b| b == b'\0' || b == b'\\') {
            return Err(StoreError::PathEscape(reference.to_string()));
        }
        let candidate = normalize_lexically(&self.root.join(reference));
        if candidate == self.root || !candidate.starts_with(&self.root) {
            return Err(StoreError::PathEscape(reference.to_string()));
        }
        // temp and probe files are dot-prefixed; issued references never are
        if candidate
            .file_name()
            .is_some_and(|name| name.as_encoded_bytes().starts_with(b"."))
        {
            return Err(StoreError::NotFound(reference.to_string()));
        }
        Ok(candidate)
    }

    /// Like [`FileStore::resolve`], but also requires the file to exist and
    /// re-checks the canonical path so a symlink cannot point outside the root.
    async fn existing_path(&self, reference: &str) -> StoreResult<PathBuf> {
        let path = self.resolve(reference)?;
        let canonical = fs::canonicalize(&path)
            .await
            .map_err(|err| not_found_or_io(err, reference))?;
        if !canonical.starts_with(&self.root) {
            return Err(StoreError::PathEscape(reference.to_string()));
        }
        if !fs::metadata(&canonical).await?.is_file() {
            return Err(StoreError::NotFound(reference.to_string()));
        }
        Ok(canonical)
    }

    /// Build `{base}_{millis}_{fingerprint}[.ext]` from the uploader's filename.
    fn reference_for(&self, original_name: &str, digest_hex: &str) -> String {
        let (base, ext) = split_name(original_name);
        let stamp = self.next_stamp();
        let fingerprint = &digest_hex[..FINGERPRINT_LEN.min(digest_hex.len())];
        match ext {
            Some(ext) => format!("{}_{}_{}.{}", base, stamp, fingerprint, ext),
            None => format!("{}_{}_{}", base, stamp, fingerprint),
        }
    }

    /// Wall-clock millis, bumped past the previous stamp when two uploads land
    /// in the same millisecond.
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now - 1);
        now.max(previous + 1)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

fn not_found_or_io(err: io::Error, reference: &str) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::NotFound(reference.to_string())
    } else {
        StoreError::Io(err)
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Split an uploaded filename into a sanitized base and optional extension.
///
/// Directory parts are dropped; characters outside `[A-Za-z0-9_-]` in the base
/// become `_`. A leading dot does not start an extension.
fn split_name(original_name: &str) -> (String, Option<String>) {
    let file_name = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name)
        .trim();

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };

    let mut base: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_BASE_LEN)
        .collect();
    if base.trim_matches('_').is_empty() {
        base = "file".into();
    }

    let ext = ext
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| {
            !e.is_empty() && e.len() <= MAX_EXT_LEN && e.chars().all(|c| c.is_ascii_alphanumeric())
        });

    (base, ext)
}
