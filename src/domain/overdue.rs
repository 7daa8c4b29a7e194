use crate::domain::models::TimeEvent;
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct OverdueSet {
    pub events: Vec<TimeEvent>,
    pub count: usize,
    pub total_minutes: u32,
}

impl OverdueSet {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.events.iter().map(|event| event.id.clone()).collect()
    }
}

/// Occurrences that started before `today` and were never completed.
///
/// Input order is kept so a bulk reschedule over the set is deterministic.
pub fn find_overdue(events: &[TimeEvent], today: NaiveDate) -> OverdueSet {
    let today_start = today.and_time(NaiveTime::MIN);
    let overdue = events
        .iter()
        .filter(|event| event.starts_at < today_start && !event.is_completed())
        .cloned()
        .collect::<Vec<_>>();

    OverdueSet {
        count: overdue.len(),
        total_minutes: overdue
            .iter()
            .fold(0u32, |total, event| total.saturating_add(event.duration_minutes)),
        events: overdue,
    }
}
