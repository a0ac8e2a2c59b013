//! Trend bucket tallying and window assembly.
//!
//! Trend windows are rebuilt from scratch every run: buckets inside the
//! raw-event retention window come from a fresh tally of the currently
//! loaded events, while older buckets are carried forward from the stored
//! document (their backing events are already deleted).

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};

use crate::models::{DailyTrendEntry, RawEvent, TrendCounts, WeeklyTrendEntry};

/// Parse an ISO-8601 timestamp string, keeping its original offset.
///
/// Accepts RFC 3339 (`Z` or numeric offset) and naive datetimes, which are
/// interpreted as UTC. Returns `None` for anything else.
pub fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    s.parse::<NaiveDateTime>()
        .ok()
        .and_then(|naive| naive.and_local_timezone(FixedOffset::east_opt(0)?).single())
}

/// The Monday starting the ISO week that contains `date`.
pub fn iso_week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Increment a bucket's counters for a single event.
///
/// Apply events only bump `applied`. Fix events bump `invocations`, exactly
/// one of `successful`/`disabled`/`failed`, and `applied` when the fix was
/// auto-applied.
pub fn tally_event(counts: &mut TrendCounts, event: &RawEvent) {
    if event.is_apply_event() {
        counts.applied += 1;
        return;
    }
    counts.invocations += 1;
    match event.status_or_default() {
        "success" => counts.successful += 1,
        "disabled" => counts.disabled += 1,
        _ => counts.failed += 1,
    }
    if event.is_auto_applied() {
        counts.applied += 1;
    }
}

/// Freshly tallied buckets, keyed by calendar day and by ISO week start.
#[derive(Debug, Default)]
pub struct TrendTally {
    pub daily: BTreeMap<NaiveDate, TrendCounts>,
    pub weekly: BTreeMap<NaiveDate, TrendCounts>,
}

impl TrendTally {
    /// Tally every event with a parsable timestamp into its day and week
    /// buckets. Events with malformed timestamps are skipped here only.
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a RawEvent>,
    {
        let mut tally = Self::default();
        for event in events {
            let Some(ts) = parse_timestamp(&event.timestamp) else {
                continue;
            };
            let day = ts.date_naive();
            tally_event(tally.daily.entry(day).or_default(), event);
            tally_event(
                tally.weekly.entry(iso_week_start(day)).or_default(),
                event,
            );
        }
        tally
    }
}

/// Assemble the daily window: `trend_days` entries ending today.
///
/// Days on/after the retention cutoff always use the fresh tally (zero-filled
/// when no events landed there); older days prefer the stored entry for that
/// exact date, falling back to zeros.
pub fn build_daily_window(
    tally: &TrendTally,
    stored: &HashMap<String, DailyTrendEntry>,
    today: NaiveDate,
    cutoff_day: NaiveDate,
    trend_days: u32,
) -> Vec<DailyTrendEntry> {
    let mut window = Vec::with_capacity(trend_days as usize);
    for i in 0..trend_days {
        let day = today - Duration::days(i64::from(trend_days - 1 - i));
        let date = day.format("%Y-%m-%d").to_string();
        if day >= cutoff_day {
            window.push(DailyTrendEntry {
                date,
                counts: tally.daily.get(&day).copied().unwrap_or_default(),
            });
        } else if let Some(entry) = stored.get(&date) {
            window.push(entry.clone());
        } else {
            window.push(DailyTrendEntry {
                date,
                counts: TrendCounts::default(),
            });
        }
    }
    window
}

/// Assemble the weekly window: `trend_weeks` entries ending this ISO week.
///
/// Same two-tier policy as the daily window, keyed by week start. The label
/// uses the anchor date's calendar year (`%Y-W%V`), matching the published
/// format even across year boundaries.
pub fn build_weekly_window(
    tally: &TrendTally,
    stored: &HashMap<String, WeeklyTrendEntry>,
    today: NaiveDate,
    cutoff_week: NaiveDate,
    trend_weeks: u32,
) -> Vec<WeeklyTrendEntry> {
    let mut window = Vec::with_capacity(trend_weeks as usize);
    for i in 0..trend_weeks {
        let anchor = today - Duration::weeks(i64::from(trend_weeks - 1 - i));
        let week_start = iso_week_start(anchor);
        let key = week_start.format("%Y-%m-%d").to_string();
        if week_start >= cutoff_week {
            window.push(WeeklyTrendEntry {
                week: anchor.format("%Y-W%V").to_string(),
                week_start: key,
                counts: tally.weekly.get(&week_start).copied().unwrap_or_default(),
            });
        } else if let Some(entry) = stored.get(&key) {
            window.push(entry.clone());
        } else {
            window.push(WeeklyTrendEntry {
                week: anchor.format("%Y-W%V").to_string(),
                week_start: key,
                counts: TrendCounts::default(),
            });
        }
    }
    window
}
