//! Publishing the metrics document and sweeping expired raw events.
//!
//! The document is written as a single object, so a run either publishes
//! completely or not at all. The sweep only runs after a successful publish,
//! and a failed delete never aborts it.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::loader::partition_prefixes;
use crate::models::MetricsDocument;
use crate::storage::ObjectStore;

/// Upload the document at the output key.
pub async fn publish<S: ObjectStore>(
    store: &S,
    output_key: &str,
    document: &MetricsDocument,
) -> Result<()> {
    let body = serde_json::to_string_pretty(document).context("Failed to serialize metrics")?;
    store
        .write_text(output_key, &body, "application/json")
        .await
        .with_context(|| format!("Failed to upload {}", output_key))?;
    info!("Published metrics to {}", output_key);
    Ok(())
}

/// Delete raw event objects older than the retention window.
///
/// Returns the number of objects deleted. Objects without a last-modified
/// time are kept.
pub async fn sweep_expired<S: ObjectStore>(
    store: &S,
    events_prefix: &str,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<u64> {
    let cutoff = now - Duration::days(i64::from(retention_days));
    let mut deleted: u64 = 0;

    for prefix in partition_prefixes(events_prefix) {
        let objects = store
            .list(&prefix)
            .await
            .with_context(|| format!("Failed to list events under {}", prefix))?;

        for object in objects {
            let Some(updated) = object.updated else {
                continue;
            };
            if updated >= cutoff {
                continue;
            }
            match store.delete(&object.key).await {
                Ok(()) => {
                    deleted += 1;
                    info!("Deleted old event: {}", object.key);
                }
                Err(e) => {
                    warn!("Failed to delete {}: {}", object.key, e);
                }
            }
        }
    }

    info!(
        "Cleaned up {} events older than {} days",
        deleted, retention_days
    );
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        now() - Duration::days(days)
    }

    #[tokio::test]
    async fn test_publish_writes_json() {
        let store = MemoryStore::new();
        let mut document = MetricsDocument::default();
        document.processed_ids.insert("run-1".to_string());

        publish(&store, "ai-fix-metrics.json", &document).await.unwrap();

        let body = store.body_of("ai-fix-metrics.json").unwrap();
        let reloaded: MetricsDocument = serde_json::from_str(&body).unwrap();
        assert!(reloaded.processed_ids.contains("run-1"));
        assert_eq!(
            store.content_type_of("ai-fix-metrics.json").as_deref(),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_expired() {
        let store = MemoryStore::new();
        store.put("ai-fix-events/post-merge/old.json", "{}", days_ago(10));
        store.put("ai-fix-events/post-merge/fresh.json", "{}", days_ago(2));
        store.put("ai-fix-events/user-applied/ancient.json", "{}", days_ago(30));
        // Not under an event partition: untouched either way.
        store.put("ai-fix-metrics.json", "{}", days_ago(100));

        let deleted = sweep_expired(&store, "ai-fix-events/", 7, now()).await.unwrap();

        assert_eq!(deleted, 2);
        assert!(!store.contains("ai-fix-events/post-merge/old.json"));
        assert!(store.contains("ai-fix-events/post-merge/fresh.json"));
        assert!(!store.contains("ai-fix-events/user-applied/ancient.json"));
        assert!(store.contains("ai-fix-metrics.json"));
    }

    #[tokio::test]
    async fn test_sweep_boundary_is_exclusive() {
        let store = MemoryStore::new();
        // Exactly at the cutoff: kept. Deletion requires strictly older.
        store.put("ai-fix-events/pre-merge/edge.json", "{}", days_ago(7));

        let deleted = sweep_expired(&store, "ai-fix-events/", 7, now()).await.unwrap();
        assert_eq!(deleted, 0);
        assert!(store.contains("ai-fix-events/pre-merge/edge.json"));
    }

    #[tokio::test]
    async fn test_sweep_survives_delete_failures() {
        let store = MemoryStore::new();
        store.put("ai-fix-events/post-merge/a.json", "{}", days_ago(10));
        store.put("ai-fix-events/post-merge/b.json", "{}", days_ago(10));
        store.fail_delete_for("ai-fix-events/post-merge/a.json");

        let deleted = sweep_expired(&store, "ai-fix-events/", 7, now()).await.unwrap();

        // The failing object is skipped, the rest of the sweep continues.
        assert_eq!(deleted, 1);
        assert!(store.contains("ai-fix-events/post-merge/a.json"));
        assert!(!store.contains("ai-fix-events/post-merge/b.json"));
    }
}
