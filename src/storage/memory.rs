//! In-memory object store used by loader and publisher tests.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{ObjectInfo, ObjectStore, StorageError};

#[derive(Debug, Clone)]
struct StoredObject {
    body: String,
    content_type: String,
    updated: DateTime<Utc>,
}

/// Map-backed store with controllable last-modified times and injectable
/// delete failures.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object with an explicit last-modified time.
    pub fn put(&self, key: &str, body: &str, updated: DateTime<Utc>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body: body.to_string(),
                content_type: "application/json".to_string(),
                updated,
            },
        );
    }

    /// Make subsequent deletes of `key` fail.
    pub fn fail_delete_for(&self, key: &str) {
        self.failing_deletes.lock().unwrap().insert(key.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn body_of(&self, key: &str) -> Option<String> {
        self.objects.lock().unwrap().get(key).map(|o| o.body.clone())
    }

    pub fn content_type_of(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| o.content_type.clone())
    }
}

impl ObjectStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn read_text(&self, key: &str) -> Result<String, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| o.body.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn write_text(
        &self,
        key: &str,
        body: &str,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body: body.to_string(),
                content_type: content_type.to_string(),
                updated: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let objects = self.objects.lock().unwrap();
        let mut listed: Vec<ObjectInfo> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectInfo {
                key: key.clone(),
                updated: Some(obj.updated),
            })
            .collect();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listed)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.failing_deletes.lock().unwrap().contains(key) {
            return Err(StorageError::UnexpectedStatus {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                key: key.to_string(),
                body: "injected delete failure".to_string(),
            });
        }
        self.objects
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}
