//! The aggregation core: fold raw events into the metrics document.
//!
//! [`aggregate`] is a pure function over the previous document, the
//! currently loaded events, and an explicit "now". It never fails for any
//! well-formed JSON input: malformed timestamps only exclude an event from
//! trend tallying, and missing ids only exclude it from summary folding.

pub mod trend;

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::models::{DisabledTest, MetricsDocument, RawEvent, RecentRun, Summary};
use trend::{build_daily_window, build_weekly_window, iso_week_start, TrendTally};

/// Maximum number of entries in the recent-runs feed.
pub const RECENT_RUNS_LIMIT: usize = 50;

/// Window lengths for one aggregation run.
#[derive(Debug, Clone, Copy)]
pub struct AggregateOptions {
    /// Length of the daily trend window, in days.
    pub trend_days: u32,
    /// Length of the weekly trend window, in ISO weeks.
    pub trend_weeks: u32,
    /// Raw events older than this are deleted after aggregation; trend
    /// buckets older than this are carried forward instead of recomputed.
    pub retention_days: u32,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            trend_days: 30,
            trend_weeks: 26,
            retention_days: 7,
        }
    }
}

/// Merge the previous document with the currently loaded raw events.
///
/// Idempotent: ids already recorded in the previous document's processed
/// set never affect the summary or disabled-tests again. Order-independent
/// for everything except the disabled-test upsert, where the last new event
/// in batch order wins for a given target.
pub fn aggregate(
    previous: Option<MetricsDocument>,
    events: &[RawEvent],
    now: DateTime<Utc>,
    opts: &AggregateOptions,
) -> MetricsDocument {
    let today = now.date_naive();
    let cutoff_day = (now - Duration::days(i64::from(opts.retention_days))).date_naive();
    let cutoff_week = iso_week_start(cutoff_day);

    // Seed from the previous document, re-keying disabled tests by target
    // and trend entries by their date / week-start keys.
    let (mut summary, mut disabled_tests, mut processed_ids, stored_daily, stored_weekly) =
        match previous {
            Some(doc) => {
                let disabled: BTreeMap<String, DisabledTest> = doc
                    .disabled_tests
                    .into_iter()
                    .map(|t| (t.target.clone(), t))
                    .collect();
                let daily: HashMap<_, _> = doc
                    .daily_trend
                    .into_iter()
                    .map(|e| (e.date.clone(), e))
                    .collect();
                let weekly: HashMap<_, _> = doc
                    .weekly_trend
                    .into_iter()
                    .map(|e| (e.week_start.clone(), e))
                    .collect();
                (doc.summary, disabled, doc.processed_ids, daily, weekly)
            }
            None => (
                Summary::default(),
                BTreeMap::new(),
                Default::default(),
                HashMap::new(),
                HashMap::new(),
            ),
        };

    let fix_events: Vec<&RawEvent> = events.iter().filter(|e| e.is_fix_event()).collect();
    let apply_events: Vec<&RawEvent> = events.iter().filter(|e| e.is_apply_event()).collect();
    debug!(
        "Aggregating {} fix events and {} apply events",
        fix_events.len(),
        apply_events.len()
    );

    // Fold new fix events into the all-time summary.
    for event in &fix_events {
        if event.id.is_empty() || processed_ids.contains(&event.id) {
            continue;
        }
        let Some(workflow) = event.workflow_kind() else {
            continue;
        };
        processed_ids.insert(event.id.clone());

        summary.total_invocations += 1;
        summary.workflow_mut(workflow).total_invocations += 1;

        match event.status_or_default() {
            "success" => {
                summary.successful_fixes += 1;
                summary.workflow_mut(workflow).successful_fixes += 1;
            }
            "disabled" => {
                summary.tests_disabled += 1;
                summary.workflow_mut(workflow).tests_disabled += 1;
            }
            _ => {
                summary.failed_fixes += 1;
                summary.workflow_mut(workflow).failed_fixes += 1;
            }
        }

        if event.is_auto_applied() {
            summary.auto_applied_fixes += 1;
        }

        if event.disables_tests() {
            for target in &event.targets {
                disabled_tests.insert(
                    target.clone(),
                    DisabledTest {
                        target: target.clone(),
                        disabled_at: event.timestamp.clone(),
                        workflow: workflow.to_string(),
                        reason: event.reason.clone().unwrap_or_default(),
                        run_id: event.id.clone(),
                    },
                );
            }
        }
    }

    // Fold new apply events. They only touch the user-applied counter.
    for event in &apply_events {
        if event.id.is_empty() || processed_ids.contains(&event.id) {
            continue;
        }
        processed_ids.insert(event.id.clone());
        summary.user_applied_fixes += 1;
    }

    // Rebuild trend buckets from the currently loaded events.
    let tally = TrendTally::from_events(
        fix_events.iter().chain(apply_events.iter()).copied(),
    );
    let daily_trend = build_daily_window(&tally, &stored_daily, today, cutoff_day, opts.trend_days);
    let weekly_trend =
        build_weekly_window(&tally, &stored_weekly, today, cutoff_week, opts.trend_weeks);

    // Recent runs reflect all currently retained fix events, not just this
    // run's deltas.
    let mut recent_runs: Vec<RecentRun> = fix_events.iter().map(|e| RecentRun::from_event(e)).collect();
    recent_runs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    recent_runs.truncate(RECENT_RUNS_LIMIT);

    // Prune processed ids to those still backed by a loaded raw event, so
    // the set cannot grow without bound once events age out.
    let current_ids: HashSet<&str> = events
        .iter()
        .filter(|e| !e.id.is_empty())
        .map(|e| e.id.as_str())
        .collect();
    processed_ids.retain(|id| current_ids.contains(id.as_str()));

    MetricsDocument {
        timestamp: now.to_rfc3339(),
        summary,
        daily_trend,
        weekly_trend,
        disabled_tests: disabled_tests.into_values().collect(),
        recent_runs,
        processed_ids,
    }
}
