//! Loading the previous metrics document and the raw event batch.
//!
//! Individual events that fail to download or parse are logged and skipped;
//! they must never abort a run. Backend failures on listing propagate.

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::models::{MetricsDocument, RawEvent};
use crate::storage::ObjectStore;

/// The three logical event partitions under the events prefix.
pub const EVENT_PARTITIONS: [&str; 3] = ["post-merge", "pre-merge", "user-applied"];

/// Full listing prefixes for the partitions, with slashes normalized.
pub fn partition_prefixes(events_prefix: &str) -> Vec<String> {
    let base = events_prefix.trim_end_matches('/');
    EVENT_PARTITIONS
        .iter()
        .map(|partition| format!("{}/{}/", base, partition))
        .collect()
}

/// Fetch the previously published document.
///
/// Absent or unparsable documents mean "first run" and yield `None`; only
/// backend failures propagate.
pub async fn load_previous<S: ObjectStore>(
    store: &S,
    output_key: &str,
) -> Result<Option<MetricsDocument>> {
    if !store
        .exists(output_key)
        .await
        .with_context(|| format!("Failed to check for {}", output_key))?
    {
        debug!("No previous metrics document at {}", output_key);
        return Ok(None);
    }

    let body = store
        .read_text(output_key)
        .await
        .with_context(|| format!("Failed to read {}", output_key))?;

    match serde_json::from_str::<MetricsDocument>(&body) {
        Ok(doc) => Ok(Some(doc)),
        Err(e) => {
            warn!("Previous metrics document is unparsable, starting fresh: {}", e);
            Ok(None)
        }
    }
}

/// Load every raw event across the partitions, tagging each with its source
/// key. No ordering guarantee.
pub async fn load_events<S: ObjectStore>(store: &S, events_prefix: &str) -> Result<Vec<RawEvent>> {
    let mut events = Vec::new();

    for prefix in partition_prefixes(events_prefix) {
        let objects = store
            .list(&prefix)
            .await
            .with_context(|| format!("Failed to list events under {}", prefix))?;
        debug!("Found {} objects under {}", objects.len(), prefix);

        for object in objects {
            let body = match store.read_text(&object.key).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Failed to read {}: {}", object.key, e);
                    continue;
                }
            };
            match serde_json::from_str::<RawEvent>(&body) {
                Ok(mut event) => {
                    event.source_key = object.key;
                    events.push(event);
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}", object.key, e);
                }
            }
        }
    }

    Ok(events)
}
