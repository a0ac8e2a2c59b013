//! Object storage backend abstraction.
//!
//! The aggregator only needs five operations from its store: existence
//! checks, text reads/writes, prefix listing, and deletes. Production runs
//! use the GCS implementation; tests use the in-memory store.

pub mod gcs;
#[cfg(test)]
pub mod memory;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} for {key}: {body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        key: String,
        body: String,
    },

    #[error("failed to obtain access token: {0}")]
    Auth(String),
}

/// A listed object: its key and last-modified time.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub updated: Option<DateTime<Utc>>,
}

/// Minimal object-store contract used by the loader and publisher.
pub trait ObjectStore {
    /// Whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Read the object at `key` as UTF-8 text.
    async fn read_text(&self, key: &str) -> Result<String, StorageError>;

    /// Write `body` at `key` with the given content type, replacing any
    /// existing object.
    async fn write_text(
        &self,
        key: &str,
        body: &str,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// List all objects under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError>;

    /// Delete the object at `key`.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
