use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 4;
pub const PROJECT_TAG_PREFIX: &str = "project:";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Task,
    Habit,
    Project,
    Manual,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Habit => "habit",
            Self::Project => "project",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "task" => Some(Self::Task),
            "habit" => Some(Self::Habit),
            "project" => Some(Self::Project),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Weak back-reference to the task, habit or project that owns an occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
        }
    }

    pub fn task(entity_id: impl Into<String>) -> Self {
        Self::new(EntityType::Task, entity_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Scheduled,
    Completed,
}

impl EventStatus {
    pub fn toggled(self) -> Self {
        match self {
            Self::Scheduled => Self::Completed,
            Self::Completed => Self::Scheduled,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Some(Self::Scheduled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TimeBlock {
    Morning,
    Afternoon,
    Evening,
}

impl TimeBlock {
    pub const ALL: [TimeBlock; 3] = [Self::Morning, Self::Afternoon, Self::Evening];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "morning" => Some(Self::Morning),
            "afternoon" => Some(Self::Afternoon),
            "evening" => Some(Self::Evening),
            _ => None,
        }
    }
}

fn default_interval() -> u32 {
    1
}

/// How an occurrence repeats, keyed by `frequency`.
///
/// Each variant only carries the fields that mean something for it. An
/// unrecognized `frequency` deserializes to [`RecurrenceConfig::Unknown`],
/// which the expander treats like `custom` (every day matches).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "frequency", rename_all = "kebab-case")]
pub enum RecurrenceConfig {
    Daily {
        #[serde(default = "default_interval")]
        interval: u32,
    },
    Weekly {
        #[serde(default = "default_interval")]
        interval: u32,
        #[serde(default)]
        days_of_week: BTreeSet<u8>,
    },
    BiWeekly {
        #[serde(default = "default_interval")]
        interval: u32,
        #[serde(default)]
        days_of_week: BTreeSet<u8>,
    },
    Monthly {
        #[serde(default = "default_interval")]
        interval: u32,
        #[serde(default)]
        days_of_month: BTreeSet<u32>,
    },
    Custom {
        #[serde(default = "default_interval")]
        interval: u32,
    },
    #[serde(other)]
    Unknown,
}

impl RecurrenceConfig {
    pub fn daily() -> Self {
        Self::Daily { interval: 1 }
    }

    pub fn weekly_on(days_of_week: impl IntoIterator<Item = u8>) -> Self {
        Self::Weekly {
            interval: 1,
            days_of_week: days_of_week.into_iter().collect(),
        }
    }

    pub fn monthly_on(days_of_month: impl IntoIterator<Item = u32>) -> Self {
        Self::Monthly {
            interval: 1,
            days_of_month: days_of_month.into_iter().collect(),
        }
    }

    /// Repeat multiplier with `0` treated as `1`.
    pub fn interval(&self) -> u32 {
        let raw = match self {
            Self::Daily { interval }
            | Self::Weekly { interval, .. }
            | Self::BiWeekly { interval, .. }
            | Self::Monthly { interval, .. }
            | Self::Custom { interval } => *interval,
            Self::Unknown => 1,
        };
        raw.max(1)
    }

    pub fn frequency_name(&self) -> &'static str {
        match self {
            Self::Daily { .. } => "daily",
            Self::Weekly { .. } => "weekly",
            Self::BiWeekly { .. } => "bi-weekly",
            Self::Monthly { .. } => "monthly",
            Self::Custom { .. } => "custom",
            Self::Unknown => "unknown",
        }
    }
}

/// A single concrete scheduled instant derived from a task, habit or manual entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeEvent {
    pub id: String,
    #[serde(flatten)]
    pub entity: EntityRef,
    pub title: String,
    pub description: Option<String>,
    pub starts_at: NaiveDateTime,
    pub duration_minutes: u32,
    pub time_block: Option<TimeBlock>,
    pub status: EventStatus,
    pub priority: Option<u8>,
    pub is_all_day: bool,
    pub recurrence: Option<RecurrenceConfig>,
}

impl TimeEvent {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "event.id")?;
        validate_non_empty(&self.entity.entity_id, "event.entity_id")?;
        validate_non_empty(&self.title, "event.title")?;
        if self.duration_minutes == 0 {
            return Err("event.duration_minutes must be > 0".to_string());
        }
        if let Some(priority) = self.priority {
            if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
                return Err(format!(
                    "event.priority must be between {MIN_PRIORITY} and {MAX_PRIORITY}"
                ));
            }
        }
        Ok(())
    }

    pub fn date(&self) -> NaiveDate {
        self.starts_at.date()
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.starts_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn is_completed(&self) -> bool {
        self.status == EventStatus::Completed
    }

    /// Substring check only; the tag value is never interpreted here.
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim();
        !tag.is_empty()
            && self
                .description
                .as_deref()
                .map(|description| description.contains(tag))
                .unwrap_or(false)
    }

    pub fn has_project_tag(&self) -> bool {
        self.has_tag(PROJECT_TAG_PREFIX)
    }

    /// Projects this event onto another calendar day, keeping its time of day.
    pub fn occurrence_on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.starts_at.time())
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if end < start {
            return Err("range.end must be >= range.start".to_string());
        }
        Ok(Self { start, end })
    }

    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// The Sunday-to-Saturday week containing `date`.
    pub fn week_of(date: NaiveDate) -> Self {
        let offset = i64::from(date.weekday().num_days_from_sunday());
        let start = date - Duration::days(offset);
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        self.start
            .iter_days()
            .take_while(|date| *date <= self.end)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeBlockBoundaries {
    pub morning_start_hour: u32,
    pub afternoon_start_hour: u32,
    pub evening_start_hour: u32,
}

impl Default for TimeBlockBoundaries {
    fn default() -> Self {
        Self {
            morning_start_hour: 8,
            afternoon_start_hour: 12,
            evening_start_hour: 17,
        }
    }
}

impl TimeBlockBoundaries {
    pub fn validate(&self) -> Result<(), String> {
        if self.evening_start_hour > 23 {
            return Err("time_blocks.evening_start_hour must be <= 23".to_string());
        }
        if self.morning_start_hour >= self.afternoon_start_hour {
            return Err(
                "time_blocks.morning_start_hour must be before afternoon_start_hour".to_string(),
            );
        }
        if self.afternoon_start_hour >= self.evening_start_hour {
            return Err(
                "time_blocks.afternoon_start_hour must be before evening_start_hour".to_string(),
            );
        }
        Ok(())
    }

    pub fn nominal_start(&self, block: TimeBlock) -> NaiveTime {
        let hour = match block {
            TimeBlock::Morning => self.morning_start_hour,
            TimeBlock::Afternoon => self.afternoon_start_hour,
            TimeBlock::Evening => self.evening_start_hour,
        };
        NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN)
    }
}

/// Per-block occupancy limit. `None` leaves the block unconstrained.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockCapacity {
    pub morning: Option<u32>,
    pub afternoon: Option<u32>,
    pub evening: Option<u32>,
}

impl BlockCapacity {
    pub fn limit_for(&self, block: TimeBlock) -> Option<u32> {
        match block {
            TimeBlock::Morning => self.morning,
            TimeBlock::Afternoon => self.afternoon,
            TimeBlock::Evening => self.evening,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResizePolicy {
    pub step_minutes: u32,
    pub min_duration_minutes: u32,
}

impl Default for ResizePolicy {
    fn default() -> Self {
        Self {
            step_minutes: 15,
            min_duration_minutes: 15,
        }
    }
}

impl ResizePolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.step_minutes == 0 {
            return Err("resize.step_minutes must be > 0".to_string());
        }
        if self.min_duration_minutes == 0 {
            return Err("resize.min_duration_minutes must be > 0".to_string());
        }
        Ok(())
    }
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
