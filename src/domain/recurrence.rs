use crate::domain::models::{RecurrenceConfig, TimeEvent};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeSet;

/// Upper bound on cursor steps for one expansion, whatever the config says.
pub const RECURRENCE_SAFETY_CAP: u32 = 365;

/// Day-by-day walk over the future dates of one event.
///
/// The walk starts at `max(starts_at, today 00:00)`, is bounded by
/// [`RECURRENCE_SAFETY_CAP`] steps and never yields a date before `today`.
/// A non-recurring event yields at most its own date.
#[derive(Debug, Clone)]
pub struct RecurrenceWalk<'a> {
    start: NaiveDateTime,
    config: Option<&'a RecurrenceConfig>,
    today_start: NaiveDateTime,
    cursor: NaiveDateTime,
    steps: u32,
}

impl<'a> RecurrenceWalk<'a> {
    pub fn new(event: &'a TimeEvent, today: NaiveDate) -> Self {
        let today_start = today.and_time(NaiveTime::MIN);
        Self {
            start: event.starts_at,
            config: event.recurrence.as_ref(),
            today_start,
            cursor: event.starts_at.max(today_start),
            steps: 0,
        }
    }
}

impl Iterator for RecurrenceWalk<'_> {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<Self::Item> {
        let Some(config) = self.config else {
            if self.steps > 0 {
                return None;
            }
            self.steps = RECURRENCE_SAFETY_CAP;
            let date = self.start.date();
            return (self.start >= self.today_start).then_some(date);
        };

        while self.steps < RECURRENCE_SAFETY_CAP {
            self.steps += 1;
            let candidate = self.cursor;
            self.cursor = candidate + Duration::days(step_days(config));

            if candidate >= self.today_start && matches(config, self.start.date(), candidate.date())
            {
                return Some(candidate.date());
            }
        }
        None
    }
}

/// Next `count` calendar dates on which `event` occurs, starting from `today`.
pub fn next_occurrences(event: &TimeEvent, today: NaiveDate, count: usize) -> Vec<NaiveDate> {
    RecurrenceWalk::new(event, today).take(count).collect()
}

// Only daily rules stride by the interval; the others step one day and
// apply the interval through `matches`.
fn step_days(config: &RecurrenceConfig) -> i64 {
    match config {
        RecurrenceConfig::Daily { .. } => i64::from(config.interval()),
        _ => 1,
    }
}

fn matches(config: &RecurrenceConfig, start: NaiveDate, date: NaiveDate) -> bool {
    let interval = i64::from(config.interval());
    match config {
        RecurrenceConfig::Daily { .. } | RecurrenceConfig::Custom { .. } => true,
        RecurrenceConfig::Unknown => true,
        RecurrenceConfig::Weekly { days_of_week, .. } => {
            weekday_matches(days_of_week, start, date) && weeks_between(start, date) % interval == 0
        }
        RecurrenceConfig::BiWeekly { days_of_week, .. } => {
            weekday_matches(days_of_week, start, date)
                && weeks_between(start, date) % (2 * interval) == 0
        }
        RecurrenceConfig::Monthly { days_of_month, .. } => {
            let day_matches = if days_of_month.is_empty() {
                date.day() == start.day()
            } else {
                days_of_month.contains(&date.day())
            };
            day_matches && months_between(start, date) % interval == 0
        }
    }
}

fn weekday_matches(days_of_week: &BTreeSet<u8>, start: NaiveDate, date: NaiveDate) -> bool {
    let weekday = weekday_index(date);
    if days_of_week.is_empty() {
        weekday == weekday_index(start)
    } else {
        days_of_week.contains(&weekday)
    }
}

/// Weekday with 0 = Sunday.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

fn weeks_between(start: NaiveDate, date: NaiveDate) -> i64 {
    (date - start).num_days().div_euclid(7)
}

fn months_between(start: NaiveDate, date: NaiveDate) -> i64 {
    let start_months = i64::from(start.year()) * 12 + i64::from(start.month0());
    let date_months = i64::from(date.year()) * 12 + i64::from(date.month0());
    date_months - start_months
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::fixtures::{day, event};
    use proptest::prelude::*;

    fn recurring(starts_at: &str, config: RecurrenceConfig) -> TimeEvent {
        let mut sample = event("evt-r", "hab-1", starts_at, 30);
        sample.recurrence = Some(config);
        sample
    }

    #[test]
    fn daily_expansion_starts_from_today() {
        let sample = recurring("2024-01-01T07:30", RecurrenceConfig::daily());
        let dates = next_occurrences(&sample, day("2024-01-03"), 5);
        assert_eq!(
            dates,
            vec![
                day("2024-01-03"),
                day("2024-01-04"),
                day("2024-01-05"),
                day("2024-01-06"),
                day("2024-01-07"),
            ]
        );
    }

    #[test]
    fn daily_interval_strides_from_the_cursor() {
        let sample = recurring("2024-01-01T07:30", RecurrenceConfig::Daily { interval: 3 });
        let dates = next_occurrences(&sample, day("2024-01-02"), 3);
        assert_eq!(dates, vec![day("2024-01-02"), day("2024-01-05"), day("2024-01-08")]);
    }

    #[test]
    fn weekly_days_alternate_monday_and_wednesday() {
        let sample = recurring("2024-01-07T09:00", RecurrenceConfig::weekly_on([1, 3]));
        let dates = next_occurrences(&sample, day("2024-01-07"), 4);
        assert_eq!(
            dates,
            vec![
                day("2024-01-08"),
                day("2024-01-10"),
                day("2024-01-15"),
                day("2024-01-17"),
            ]
        );
        assert!(dates.iter().all(|date| weekday_index(*date) != 0));
    }

    #[test]
    fn weekly_without_days_uses_start_weekday() {
        let sample = recurring(
            "2024-01-03T09:00",
            RecurrenceConfig::Weekly {
                interval: 0,
                days_of_week: BTreeSet::new(),
            },
        );
        let dates = next_occurrences(&sample, day("2024-01-04"), 2);
        assert_eq!(dates, vec![day("2024-01-10"), day("2024-01-17")]);
    }

    #[test]
    fn weekly_interval_multiplies_the_week_step() {
        let sample = recurring(
            "2024-01-01T09:00",
            RecurrenceConfig::Weekly {
                interval: 3,
                days_of_week: BTreeSet::new(),
            },
        );
        let dates = next_occurrences(&sample, day("2024-01-01"), 3);
        assert_eq!(dates, vec![day("2024-01-01"), day("2024-01-22"), day("2024-02-12")]);
    }

    #[test]
    fn bi_weekly_skips_odd_weeks() {
        let sample = recurring(
            "2024-01-01T09:00",
            RecurrenceConfig::BiWeekly {
                interval: 1,
                days_of_week: BTreeSet::new(),
            },
        );
        let dates = next_occurrences(&sample, day("2024-01-02"), 3);
        assert_eq!(dates, vec![day("2024-01-15"), day("2024-01-29"), day("2024-02-12")]);
    }

    #[test]
    fn monthly_without_days_uses_start_day_of_month() {
        let sample = recurring(
            "2024-01-15T09:00",
            RecurrenceConfig::Monthly {
                interval: 1,
                days_of_month: BTreeSet::new(),
            },
        );
        let dates = next_occurrences(&sample, day("2024-01-20"), 2);
        assert_eq!(dates, vec![day("2024-02-15"), day("2024-03-15")]);
    }

    #[test]
    fn monthly_interval_multiplies_the_month_step() {
        let sample = recurring(
            "2024-01-10T09:00",
            RecurrenceConfig::Monthly {
                interval: 2,
                days_of_month: BTreeSet::from([10, 20]),
            },
        );
        let dates = next_occurrences(&sample, day("2024-01-11"), 3);
        assert_eq!(dates, vec![day("2024-01-20"), day("2024-03-10"), day("2024-03-20")]);
    }

    #[test]
    fn safety_cap_bounds_sparse_rules() {
        let sample = recurring("2024-01-31T09:00", RecurrenceConfig::monthly_on([31]));
        let dates = next_occurrences(&sample, day("2024-01-31"), 50);
        assert_eq!(dates.len(), 7);
        assert!(dates.iter().all(|date| date.day() == 31));
        assert!(*dates.last().expect("at least one date") < day("2025-01-31"));
    }

    #[test]
    fn unknown_and_custom_frequencies_match_every_day() {
        let custom = recurring("2024-01-01T09:00", RecurrenceConfig::Custom { interval: 4 });
        let unknown = recurring("2024-01-01T09:00", RecurrenceConfig::Unknown);
        let expected = vec![day("2024-01-05"), day("2024-01-06"), day("2024-01-07")];
        assert_eq!(next_occurrences(&custom, day("2024-01-05"), 3), expected);
        assert_eq!(next_occurrences(&unknown, day("2024-01-05"), 3), expected);
    }

    #[test]
    fn future_start_is_not_pulled_back_to_today() {
        let sample = recurring("2024-02-01T18:00", RecurrenceConfig::daily());
        let dates = next_occurrences(&sample, day("2024-01-10"), 2);
        assert_eq!(dates, vec![day("2024-02-01"), day("2024-02-02")]);
    }

    #[test]
    fn one_off_event_yields_only_its_own_future_date() {
        let upcoming = event("evt-1", "tsk-1", "2024-03-01T10:00", 30);
        assert_eq!(next_occurrences(&upcoming, day("2024-02-01"), 5), vec![day("2024-03-01")]);

        let elapsed = event("evt-2", "tsk-1", "2024-01-01T10:00", 30);
        assert!(next_occurrences(&elapsed, day("2024-02-01"), 5).is_empty());
    }

    fn config_strategy() -> impl Strategy<Value = RecurrenceConfig> {
        let weekdays = proptest::collection::btree_set(0u8..7, 0..4);
        let month_days = proptest::collection::btree_set(1u32..32, 0..4);
        prop_oneof![
            (0u32..5).prop_map(|interval| RecurrenceConfig::Daily { interval }),
            (0u32..4, weekdays.clone())
                .prop_map(|(interval, days_of_week)| RecurrenceConfig::Weekly { interval, days_of_week }),
            (0u32..3, weekdays)
                .prop_map(|(interval, days_of_week)| RecurrenceConfig::BiWeekly { interval, days_of_week }),
            (0u32..3, month_days)
                .prop_map(|(interval, days_of_month)| RecurrenceConfig::Monthly { interval, days_of_month }),
            (0u32..3).prop_map(|interval| RecurrenceConfig::Custom { interval }),
        ]
    }

    proptest! {
        #[test]
        fn expansion_never_yields_past_or_duplicate_dates(
            config in config_strategy(),
            start_offset in 0i64..400,
            today_offset in 0i64..400,
            hour in 0u32..24,
            count in 1usize..30,
        ) {
            let base = day("2024-01-01");
            let start_date = base + Duration::days(start_offset);
            let today = base + Duration::days(today_offset);
            let mut sample = event("evt-p", "hab-p", "2024-01-01T00:00", 30);
            sample.starts_at = start_date.and_hms_opt(hour, 0, 0).expect("valid hour");
            sample.recurrence = Some(config);

            let dates = next_occurrences(&sample, today, count);

            prop_assert!(dates.len() <= count);
            prop_assert!(dates.iter().all(|date| *date >= today));
            prop_assert!(dates.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }
}
