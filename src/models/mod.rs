//! Core data models for the media store.
//!
//! Records map to SQLite rows via `sqlx::FromRow` and serialize as JSON via
//! `serde`. The payload bytes themselves live on disk, addressed by reference.

pub mod image;
pub mod media;
pub mod options;
