//! Google Cloud Storage backend over the JSON API.
//!
//! Authentication uses a bearer token, taken from the
//! `GOOGLE_OAUTH_ACCESS_TOKEN` environment variable when set, otherwise
//! from the GCE metadata server (the normal case for a CI job runner).
//! Aggregation runs are short, so the token is fetched once at connect time.

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{ObjectInfo, ObjectStore, StorageError};

const API_BASE: &str = "https://storage.googleapis.com";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// GCS-backed object store scoped to a single bucket.
pub struct GcsStore {
    client: Client,
    base: Url,
    bucket: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListedObject>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    updated: Option<DateTime<Utc>>,
}

impl GcsStore {
    /// Connect to a bucket: build the HTTP client and resolve a token.
    pub async fn connect(bucket: &str) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        let token = fetch_token(&client).await?;

        Ok(Self {
            client,
            base: Url::parse(API_BASE).expect("valid API base URL"),
            bucket: bucket.to_string(),
            token,
        })
    }

    /// Metadata URL for one object. Segment pushing percent-encodes the
    /// key, including the slashes GCS expects encoded in object names.
    fn object_url(&self, key: &str) -> Url {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .expect("API base URL has a path")
            .extend(["storage", "v1", "b", &self.bucket, "o", key]);
        url
    }

    fn list_url(&self) -> Url {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .expect("API base URL has a path")
            .extend(["storage", "v1", "b", &self.bucket, "o"]);
        url
    }

    fn upload_url(&self, key: &str) -> Url {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .expect("API base URL has a path")
            .extend(["upload", "storage", "v1", "b", &self.bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        url
    }

    async fn unexpected(key: &str, response: reqwest::Response) -> StorageError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        StorageError::UnexpectedStatus {
            status,
            key: key.to_string(),
            body,
        }
    }
}

/// Resolve a bearer token from the environment or the metadata server.
async fn fetch_token(client: &Client) -> Result<String, StorageError> {
    if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
        if !token.is_empty() {
            debug!("Using access token from GOOGLE_OAUTH_ACCESS_TOKEN");
            return Ok(token);
        }
    }

    debug!("Fetching access token from metadata server");
    let response = client
        .get(METADATA_TOKEN_URL)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| StorageError::Auth(format!("metadata server unreachable: {}", e)))?;

    if !response.status().is_success() {
        return Err(StorageError::Auth(format!(
            "metadata server returned {}",
            response.status()
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| StorageError::Auth(format!("invalid token response: {}", e)))?;

    Ok(token.access_token)
}

impl ObjectStore for GcsStore {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let response = self
            .client
            .get(self.object_url(key))
            .bearer_auth(&self.token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::unexpected(key, response).await),
        }
    }

    async fn read_text(&self, key: &str) -> Result<String, StorageError> {
        let mut url = self.object_url(key);
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            status if status.is_success() => Ok(response.text().await?),
            _ => Err(Self::unexpected(key, response).await),
        }
    }

    async fn write_text(
        &self,
        key: &str,
        body: &str,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let response = self
            .client
            .post(self.upload_url(key))
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body.to_string())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::unexpected(key, response).await);
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.list_url();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                query.append_pair("fields", "items(name,updated),nextPageToken");
                if let Some(ref token) = page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self
                .client
                .get(url)
                .bearer_auth(&self.token)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(Self::unexpected(prefix, response).await);
            }

            let page: ListResponse = response.json().await?;
            objects.extend(page.items.into_iter().map(|item| ObjectInfo {
                key: item.name,
                updated: item.updated,
            }));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Listed {} objects under {}", objects.len(), prefix);
        Ok(objects)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .delete(self.object_url(key))
            .bearer_auth(&self.token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            status if status.is_success() => Ok(()),
            _ => Err(Self::unexpected(key, response).await),
        }
    }
}
