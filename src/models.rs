//! Data models for the metrics aggregator.
//!
//! This module contains all the core data structures: the raw fix/apply
//! events read from the object store, and the aggregate metrics document
//! that gets published for the dashboard.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Workflow that produced a fix event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workflow {
    /// Fix attempted after a merge broke a test.
    PostMerge,
    /// Fix attempted on a pre-merge (presubmit) failure.
    PreMerge,
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workflow::PostMerge => write!(f, "post-merge"),
            Workflow::PreMerge => write!(f, "pre-merge"),
        }
    }
}

impl Workflow {
    /// Parse a workflow from its wire value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post-merge" => Some(Workflow::PostMerge),
            "pre-merge" => Some(Workflow::PreMerge),
            _ => None,
        }
    }
}

/// A raw event object as written by the fix workflows.
///
/// Parsing is deliberately lenient: every field is optional or defaulted so
/// that partially filled events still deserialize. Validity decisions
/// (empty id, unknown workflow, bad timestamp) are made during aggregation,
/// not at parse time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawEvent {
    /// Globally unique id of the run; empty means unprocessable.
    pub id: String,
    /// ISO-8601 timestamp string; may be malformed.
    pub timestamp: String,
    /// `post-merge` or `pre-merge` for fix events, absent otherwise.
    pub workflow: Option<String>,
    /// `user_applied` marks an apply event.
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    /// `success`, `disabled`, or `failure`; missing counts as failure.
    pub status: Option<String>,
    /// `auto-label` marks an automatically applied fix.
    pub applied: Option<String>,
    /// `test_disabled` marks a run that disabled its targets.
    #[serde(rename = "fixType")]
    pub fix_type: Option<String>,
    /// Test targets touched by this run.
    pub targets: Vec<String>,
    /// Human-readable reason for a disablement.
    pub reason: Option<String>,
    /// Number of fix attempts made.
    pub attempts: u32,
    #[serde(rename = "prUrl")]
    pub pr_url: Option<String>,
    #[serde(rename = "prNumber")]
    pub pr_number: Option<u64>,
    /// Object key this event was loaded from. Attached by the loader,
    /// never part of the wire format.
    #[serde(skip)]
    pub source_key: String,
}

impl RawEvent {
    /// The workflow, if this is a fix event.
    pub fn workflow_kind(&self) -> Option<Workflow> {
        self.workflow.as_deref().and_then(Workflow::parse)
    }

    /// True for events produced by the post-merge or pre-merge fix workflows.
    pub fn is_fix_event(&self) -> bool {
        self.workflow_kind().is_some()
    }

    /// True for user-applied-fix notification events.
    pub fn is_apply_event(&self) -> bool {
        self.event_type.as_deref() == Some("user_applied")
    }

    /// Status with the `failure` default applied.
    pub fn status_or_default(&self) -> &str {
        self.status.as_deref().unwrap_or("failure")
    }

    /// True if the fix was applied automatically.
    pub fn is_auto_applied(&self) -> bool {
        self.applied.as_deref() == Some("auto-label")
    }

    /// True if this run disabled its targets.
    pub fn disables_tests(&self) -> bool {
        self.status_or_default() == "disabled" || self.fix_type.as_deref() == Some("test_disabled")
    }
}

/// Per-workflow all-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub total_invocations: u64,
    pub successful_fixes: u64,
    pub failed_fixes: u64,
    pub tests_disabled: u64,
}

/// All-time counters, global and split by workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Summary {
    pub total_invocations: u64,
    pub successful_fixes: u64,
    pub failed_fixes: u64,
    pub tests_disabled: u64,
    pub auto_applied_fixes: u64,
    pub user_applied_fixes: u64,
    pub post_merge: WorkflowSummary,
    pub pre_merge: WorkflowSummary,
}

impl Summary {
    /// Mutable access to one workflow's sub-summary.
    pub fn workflow_mut(&mut self, workflow: Workflow) -> &mut WorkflowSummary {
        match workflow {
            Workflow::PostMerge => &mut self.post_merge,
            Workflow::PreMerge => &mut self.pre_merge,
        }
    }
}

/// Counters for a single trend bucket (one day or one week).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendCounts {
    pub invocations: u64,
    pub successful: u64,
    pub failed: u64,
    pub disabled: u64,
    pub applied: u64,
}

/// One entry in the daily trend window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyTrendEntry {
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    #[serde(flatten)]
    pub counts: TrendCounts,
}

/// One entry in the weekly trend window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklyTrendEntry {
    /// Human-readable ISO week label, `YYYY-Www`.
    pub week: String,
    /// Monday of the ISO week, `YYYY-MM-DD`. The carry-over key.
    #[serde(rename = "weekStart")]
    pub week_start: String,
    #[serde(flatten)]
    pub counts: TrendCounts,
}

/// Latest disablement record for one test target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisabledTest {
    pub target: String,
    pub disabled_at: String,
    pub workflow: String,
    /// Normalized: always a string, never null.
    pub reason: String,
    pub run_id: String,
}

/// Compact projection of a fix event for the recent-runs feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecentRun {
    pub id: String,
    pub timestamp: String,
    pub workflow: String,
    pub status: String,
    pub targets: Vec<String>,
    pub attempts: u32,
    pub pr_url: Option<String>,
    pub pr_number: Option<u64>,
    pub applied: String,
}

impl RecentRun {
    /// Project a fix event into its feed record.
    pub fn from_event(event: &RawEvent) -> Self {
        Self {
            id: event.id.clone(),
            timestamp: event.timestamp.clone(),
            workflow: event.workflow.clone().unwrap_or_default(),
            status: event.status_or_default().to_string(),
            targets: event.targets.clone(),
            attempts: event.attempts,
            pr_url: event.pr_url.clone(),
            pr_number: event.pr_number,
            applied: event.applied.clone().unwrap_or_default(),
        }
    }
}

/// The published aggregate document.
///
/// Fields prefixed with `_` on the wire are internal bookkeeping: they are
/// kept when the document is reloaded as aggregation state, but stripped by
/// [`MetricsDocument::public_value`] when rendered for the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricsDocument {
    /// When this aggregation ran.
    pub timestamp: String,
    pub summary: Summary,
    pub daily_trend: Vec<DailyTrendEntry>,
    pub weekly_trend: Vec<WeeklyTrendEntry>,
    pub disabled_tests: Vec<DisabledTest>,
    pub recent_runs: Vec<RecentRun>,
    /// Ids already folded into `summary`/`disabledTests`. Sorted on the wire.
    #[serde(rename = "_processedIds")]
    pub processed_ids: BTreeSet<String>,
}

impl MetricsDocument {
    /// The document as a JSON value with all `_`-prefixed top-level fields
    /// removed, suitable for dashboard consumption and `--dry-run` output.
    pub fn public_value(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.retain(|key, _| !key.starts_with('_'));
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_parse() {
        assert_eq!(Workflow::parse("post-merge"), Some(Workflow::PostMerge));
        assert_eq!(Workflow::parse("pre-merge"), Some(Workflow::PreMerge));
        assert_eq!(Workflow::parse("nightly"), None);
        assert_eq!(Workflow::parse(""), None);
    }

    #[test]
    fn test_event_parses_with_missing_fields() {
        let event: RawEvent = serde_json::from_str("{}").unwrap();
        assert!(event.id.is_empty());
        assert!(event.workflow.is_none());
        assert_eq!(event.status_or_default(), "failure");
        assert_eq!(event.attempts, 0);
        assert!(event.targets.is_empty());
        assert!(!event.is_fix_event());
        assert!(!event.is_apply_event());
    }

    #[test]
    fn test_event_predicates() {
        let event: RawEvent = serde_json::from_str(
            r#"{
                "id": "run-1",
                "workflow": "post-merge",
                "status": "disabled",
                "applied": "auto-label",
                "fixType": "test_disabled",
                "targets": ["//foo:bar_test"]
            }"#,
        )
        .unwrap();

        assert!(event.is_fix_event());
        assert_eq!(event.workflow_kind(), Some(Workflow::PostMerge));
        assert!(!event.is_apply_event());
        assert!(event.is_auto_applied());
        assert!(event.disables_tests());
    }

    #[test]
    fn test_disables_tests_via_fix_type_only() {
        let event: RawEvent = serde_json::from_str(
            r#"{"id": "run-2", "workflow": "pre-merge", "status": "success", "fixType": "test_disabled"}"#,
        )
        .unwrap();
        assert!(event.disables_tests());
    }

    #[test]
    fn test_apply_event_is_not_fix_event() {
        let event: RawEvent =
            serde_json::from_str(r#"{"id": "apply-1", "type": "user_applied"}"#).unwrap();
        assert!(event.is_apply_event());
        assert!(!event.is_fix_event());
    }

    #[test]
    fn test_document_wire_keys() {
        let doc = MetricsDocument {
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            daily_trend: vec![DailyTrendEntry {
                date: "2026-01-01".to_string(),
                counts: TrendCounts {
                    invocations: 2,
                    successful: 1,
                    failed: 1,
                    ..Default::default()
                },
            }],
            weekly_trend: vec![WeeklyTrendEntry {
                week: "2025-W53".to_string(),
                week_start: "2025-12-29".to_string(),
                counts: TrendCounts::default(),
            }],
            processed_ids: ["b", "a"].iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };

        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("dailyTrend").is_some());
        assert!(value.get("weeklyTrend").is_some());
        assert!(value.get("disabledTests").is_some());
        assert!(value.get("recentRuns").is_some());
        assert_eq!(value["summary"]["totalInvocations"], 0);
        assert_eq!(value["summary"]["postMerge"]["successfulFixes"], 0);
        assert_eq!(value["dailyTrend"][0]["date"], "2026-01-01");
        assert_eq!(value["dailyTrend"][0]["invocations"], 2);
        assert_eq!(value["weeklyTrend"][0]["weekStart"], "2025-12-29");
        // BTreeSet serializes sorted.
        assert_eq!(value["_processedIds"][0], "a");
        assert_eq!(value["_processedIds"][1], "b");
    }

    #[test]
    fn test_public_value_strips_internal_fields() {
        let mut doc = MetricsDocument::default();
        doc.processed_ids.insert("run-1".to_string());

        let public = doc.public_value();
        assert!(public.get("_processedIds").is_none());
        assert!(public.get("summary").is_some());
        assert!(public.get("recentRuns").is_some());
    }

    #[test]
    fn test_document_reload_keeps_processed_ids() {
        let json = r#"{
            "timestamp": "2026-01-01T00:00:00+00:00",
            "summary": {"totalInvocations": 3, "postMerge": {"totalInvocations": 2}},
            "dailyTrend": [],
            "disabledTests": [],
            "recentRuns": [],
            "_processedIds": ["run-1", "run-2"]
        }"#;

        let doc: MetricsDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.summary.total_invocations, 3);
        assert_eq!(doc.summary.post_merge.total_invocations, 2);
        assert!(doc.processed_ids.contains("run-1"));
        assert!(doc.processed_ids.contains("run-2"));
        // Absent weeklyTrend tolerated on reload.
        assert!(doc.weekly_trend.is_empty());
    }

    #[test]
    fn test_recent_run_projection() {
        let event: RawEvent = serde_json::from_str(
            r#"{
                "id": "run-9",
                "timestamp": "2026-02-03T04:05:06Z",
                "workflow": "pre-merge",
                "status": "success",
                "targets": ["//a:t"],
                "attempts": 2,
                "prUrl": "https://example.com/pr/7",
                "prNumber": 7,
                "applied": "auto-label"
            }"#,
        )
        .unwrap();

        let run = RecentRun::from_event(&event);
        assert_eq!(run.id, "run-9");
        assert_eq!(run.workflow, "pre-merge");
        assert_eq!(run.status, "success");
        assert_eq!(run.attempts, 2);
        assert_eq!(run.pr_number, Some(7));
        assert_eq!(run.applied, "auto-label");

        // Absent pr fields serialize as null, not omitted.
        let bare = RecentRun::from_event(&serde_json::from_str::<RawEvent>("{}").unwrap());
        let value = serde_json::to_value(&bare).unwrap();
        assert!(value["prUrl"].is_null());
        assert!(value["prNumber"].is_null());
        assert_eq!(value["status"], "failure");
    }
}
