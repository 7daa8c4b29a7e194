use crate::domain::models::{DateRange, TimeEvent};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub quota_minutes: u32,
    pub scheduled_minutes: u32,
    pub completed_minutes: u32,
    pub completed_count: usize,
    pub total_count: usize,
    pub progress_percent: f64,
    pub completion_percent: f64,
    pub over_quota: bool,
    pub all_done: bool,
}

impl DaySummary {
    pub fn remaining_minutes(&self) -> u32 {
        self.quota_minutes.saturating_sub(self.scheduled_minutes)
    }
}

/// Aggregates the occurrences of `date` against a daily quota.
///
/// Occurrences on other days are ignored, so a whole week window can be
/// passed in. The result only depends on the multiset of inputs.
pub fn summarize(date: NaiveDate, events: &[TimeEvent], quota_minutes: u32) -> DaySummary {
    let mut scheduled_minutes: u32 = 0;
    let mut completed_minutes: u32 = 0;
    let mut completed_count = 0;
    let mut total_count = 0;

    for event in events.iter().filter(|event| event.date() == date) {
        total_count += 1;
        scheduled_minutes = scheduled_minutes.saturating_add(event.duration_minutes);
        if event.is_completed() {
            completed_count += 1;
            completed_minutes = completed_minutes.saturating_add(event.duration_minutes);
        }
    }

    DaySummary {
        date,
        quota_minutes,
        scheduled_minutes,
        completed_minutes,
        completed_count,
        total_count,
        progress_percent: progress_percent(scheduled_minutes, quota_minutes),
        completion_percent: percent(completed_minutes, scheduled_minutes),
        over_quota: scheduled_minutes > quota_minutes,
        all_done: total_count > 0 && completed_count == total_count,
    }
}

/// One summary per day of `range`, each against its own quota.
pub fn summarize_range<F>(range: &DateRange, events: &[TimeEvent], quota_for: F) -> Vec<DaySummary>
where
    F: Fn(NaiveDate) -> u32,
{
    range
        .days()
        .into_iter()
        .map(|date| summarize(date, events, quota_for(date)))
        .collect()
}

fn progress_percent(scheduled_minutes: u32, quota_minutes: u32) -> f64 {
    percent(scheduled_minutes, quota_minutes).min(100.0)
}

fn percent(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    f64::from(part) / f64::from(whole) * 100.0
}
