use crate::domain::models::{
    validate_non_empty, EntityRef, EventStatus, RecurrenceConfig, ResizePolicy, TimeBlock,
    TimeBlockBoundaries, TimeEvent,
};
use crate::domain::task_tree::MAX_TASK_LEVEL;
use crate::domain::time_block::block_for_time;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlannerState {
    Unscheduled,
    Scheduled,
    Completed,
    Deleted,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlannerAction {
    Assign,
    Move,
    Resize,
    ToggleComplete,
    Unschedule,
    Delete,
}

impl PlannerState {
    pub fn of(event: Option<&TimeEvent>) -> Self {
        match event.map(|event| event.status) {
            None => Self::Unscheduled,
            Some(EventStatus::Scheduled) => Self::Scheduled,
            Some(EventStatus::Completed) => Self::Completed,
        }
    }

    pub fn apply(self, action: PlannerAction) -> Result<Self, String> {
        use PlannerAction as A;
        use PlannerState as S;

        match (self, action) {
            (S::Unscheduled, A::Assign) => Ok(S::Scheduled),
            (S::Scheduled, A::Move | A::Resize) => Ok(S::Scheduled),
            (S::Scheduled, A::ToggleComplete) => Ok(S::Completed),
            (S::Completed, A::ToggleComplete) => Ok(S::Scheduled),
            (S::Scheduled | S::Completed, A::Unschedule) => Ok(S::Unscheduled),
            (S::Scheduled | S::Completed, A::Delete) => Ok(S::Deleted),
            (state, action) => Err(format!(
                "cannot {} an occurrence that is {}",
                action.as_str(),
                state.as_str()
            )),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Unscheduled => "unscheduled",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Deleted => "deleted",
        }
    }
}

impl PlannerAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Assign => "assign",
            Self::Move => "move",
            Self::Resize => "resize",
            Self::ToggleComplete => "toggle",
            Self::Unschedule => "unschedule",
            Self::Delete => "delete",
        }
    }
}

/// Where a dragged occurrence was dropped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropTarget {
    Block { date: NaiveDate, time_block: TimeBlock },
    Slot { starts_at: NaiveDateTime },
}

impl DropTarget {
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Block { date, .. } => *date,
            Self::Slot { starts_at } => starts_at.date(),
        }
    }
}

/// The occurrence as it would look after the drop. Nothing is persisted.
///
/// A block drop tags the block and keeps the time of day when it already
/// falls inside that block, otherwise it moves to the block's nominal start.
/// A slot drop sets the exact start and clears the tag so the block is
/// derived from the hour again.
pub fn preview_drop(
    event: &TimeEvent,
    target: DropTarget,
    boundaries: &TimeBlockBoundaries,
) -> TimeEvent {
    let mut moved = event.clone();
    match target {
        DropTarget::Block { date, time_block } => {
            let current_time = event.starts_at.time();
            let keeps_time = !event.is_all_day && block_for_time(current_time, boundaries) == time_block;
            let time = if keeps_time {
                current_time
            } else {
                boundaries.nominal_start(time_block)
            };
            moved.starts_at = date.and_time(time);
            moved.time_block = Some(time_block);
        }
        DropTarget::Slot { starts_at } => {
            moved.starts_at = starts_at;
            moved.time_block = None;
        }
    }
    moved.is_all_day = false;
    moved
}

/// Rounds a raw duration to the nearest step (ties round up) and applies
/// the minimum.
pub fn snap_duration(raw_minutes: i64, policy: &ResizePolicy) -> u32 {
    let step = i64::from(policy.step_minutes.max(1));
    let minimum = policy.min_duration_minutes.max(1);
    if raw_minutes <= 0 {
        return minimum;
    }
    let snapped = raw_minutes.saturating_add(step / 2) / step * step;
    u32::try_from(snapped).unwrap_or(u32::MAX).max(minimum)
}

pub fn preview_resize(event: &TimeEvent, raw_minutes: i64, policy: &ResizePolicy) -> TimeEvent {
    let mut resized = event.clone();
    resized.duration_minutes = snap_duration(raw_minutes, policy);
    resized
}

/// A resize gesture in progress.
///
/// Intermediate frames only update the local preview; `finish` hands back
/// the one value worth committing, or `None` when the snapped duration
/// ended where it started.
#[derive(Debug, Clone)]
pub struct ResizeSession {
    original: TimeEvent,
    preview: TimeEvent,
    policy: ResizePolicy,
}

impl ResizeSession {
    pub fn begin(event: TimeEvent, policy: ResizePolicy) -> Self {
        Self {
            preview: event.clone(),
            original: event,
            policy,
        }
    }

    pub fn update(&mut self, raw_minutes: i64) -> &TimeEvent {
        self.preview = preview_resize(&self.original, raw_minutes, &self.policy);
        &self.preview
    }

    pub fn preview(&self) -> &TimeEvent {
        &self.preview
    }

    pub fn original(&self) -> &TimeEvent {
        &self.original
    }

    pub fn finish(self) -> Option<TimeEvent> {
        if self.preview.duration_minutes == self.original.duration_minutes {
            return None;
        }
        Some(self.preview)
    }
}

/// Drag data carried as a JSON string on the drag event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DragPayload {
    pub id: String,
    pub name: String,
    pub level: u8,
}

impl DragPayload {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let payload: Self = serde_json::from_str(raw.trim())
            .map_err(|error| format!("invalid drag payload: {error}"))?;
        if payload.level > MAX_TASK_LEVEL {
            return Err(format!(
                "drag payload level must be <= {MAX_TASK_LEVEL}, got {}",
                payload.level
            ));
        }
        Ok(payload)
    }

    fn is_usable(&self) -> bool {
        !self.name.trim().is_empty() && self.level <= MAX_TASK_LEVEL
    }
}

/// Picks the payload to act on: the decoded one when it parses and names
/// something, otherwise the in-memory reference. Neither is used when it
/// is nested deeper than `MAX_TASK_LEVEL`. `None` means the drop is a no-op.
pub fn resolve_drag_payload(
    raw: Option<&str>,
    fallback: Option<&DragPayload>,
) -> Option<DragPayload> {
    let decoded = raw.and_then(|raw| DragPayload::parse(raw).ok());
    decoded
        .filter(DragPayload::is_usable)
        .or_else(|| fallback.filter(|payload| payload.is_usable()).cloned())
}

/// Request to put an unscheduled entity on the calendar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub entity: EntityRef,
    pub title: String,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub time_block: Option<TimeBlock>,
    pub all_day: bool,
    pub duration_minutes: Option<u32>,
    pub priority: Option<u8>,
    pub recurrence: Option<RecurrenceConfig>,
}

impl ScheduleRequest {
    pub fn new(entity: EntityRef, title: impl Into<String>) -> Self {
        Self {
            entity,
            title: title.into(),
            description: None,
            date: None,
            time: None,
            time_block: None,
            all_day: false,
            duration_minutes: None,
            priority: None,
            recurrence: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn at(mut self, time: NaiveTime) -> Self {
        self.time = Some(time);
        self
    }

    pub fn in_block(mut self, time_block: TimeBlock) -> Self {
        self.time_block = Some(time_block);
        self
    }

    pub fn for_minutes(mut self, duration_minutes: u32) -> Self {
        self.duration_minutes = Some(duration_minutes);
        self
    }

    /// Start instant, explicit block tag and all-day flag for this request.
    ///
    /// A date needs a time, a block or the all-day flag; a time or block
    /// needs a date.
    pub fn resolve_start(
        &self,
        boundaries: &TimeBlockBoundaries,
    ) -> Result<(NaiveDateTime, Option<TimeBlock>, bool), String> {
        let Some(date) = self.date else {
            if self.time.is_some() || self.time_block.is_some() {
                return Err("a time was given without a date".to_string());
            }
            return Err("a date is required to schedule".to_string());
        };

        if self.all_day {
            return Ok((date.and_time(NaiveTime::MIN), None, true));
        }
        match (self.time, self.time_block) {
            (Some(time), block) => Ok((date.and_time(time), block, false)),
            (None, Some(block)) => Ok((date.and_time(boundaries.nominal_start(block)), Some(block), false)),
            (None, None) => Err("a date was given without a time or time block".to_string()),
        }
    }

    pub fn into_event(
        self,
        id: String,
        boundaries: &TimeBlockBoundaries,
        default_duration_minutes: u32,
    ) -> Result<TimeEvent, String> {
        validate_non_empty(&self.title, "title")?;
        let (starts_at, time_block, is_all_day) = self.resolve_start(boundaries)?;
        let event = TimeEvent {
            id,
            entity: self.entity,
            title: self.title.trim().to_string(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned),
            starts_at,
            duration_minutes: self.duration_minutes.unwrap_or(default_duration_minutes),
            time_block,
            status: EventStatus::Scheduled,
            priority: self.priority,
            is_all_day,
            recurrence: self.recurrence,
        };
        event.validate()?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::fixtures::{at, day, event};
    use proptest::prelude::*;

    #[test]
    fn resize_snaps_to_nearest_quarter_hour() {
        let policy = ResizePolicy::default();
        assert_eq!(snap_duration(37, &policy), 30);
        assert_eq!(snap_duration(38, &policy), 45);
        assert_eq!(snap_duration(22, &policy), 15);
        assert_eq!(snap_duration(23, &policy), 30);
        assert_eq!(snap_duration(60, &policy), 60);
    }

    #[test]
    fn resize_clamps_to_minimum_duration() {
        let policy = ResizePolicy::default();
        assert_eq!(snap_duration(5, &policy), 15);
        assert_eq!(snap_duration(0, &policy), 15);
        assert_eq!(snap_duration(-40, &policy), 15);
    }

    #[test]
    fn resize_of_huge_raw_duration_saturates() {
        let policy = ResizePolicy::default();
        assert_eq!(snap_duration(i64::MAX, &policy), u32::MAX);
        assert_eq!(snap_duration(i64::MAX - 3, &policy), u32::MAX);
    }

    #[test]
    fn resize_session_only_yields_committed_change() {
        let original = event("evt-1", "tsk-1", "2026-02-16T09:00", 30);
        let mut session = ResizeSession::begin(original.clone(), ResizePolicy::default());

        assert_eq!(session.update(52).duration_minutes, 45);
        assert_eq!(session.update(37).duration_minutes, 30);
        assert_eq!(session.original(), &original);
        assert!(session.finish().is_none());

        let mut session = ResizeSession::begin(original, ResizePolicy::default());
        session.update(64);
        let committed = session.finish().expect("changed duration");
        assert_eq!(committed.duration_minutes, 60);
    }

    #[test]
    fn block_drop_keeps_time_inside_block() {
        let sample = event("evt-1", "tsk-1", "2026-02-16T10:15", 30);
        let moved = preview_drop(
            &sample,
            DropTarget::Block {
                date: day("2026-02-18"),
                time_block: TimeBlock::Morning,
            },
            &TimeBlockBoundaries::default(),
        );
        assert_eq!(moved.starts_at, at("2026-02-18T10:15"));
        assert_eq!(moved.time_block, Some(TimeBlock::Morning));
    }

    #[test]
    fn block_drop_moves_to_nominal_start_of_other_block() {
        let mut sample = event("evt-1", "tsk-1", "2026-02-16T10:15", 30);
        sample.is_all_day = true;
        let moved = preview_drop(
            &sample,
            DropTarget::Block {
                date: day("2026-02-18"),
                time_block: TimeBlock::Evening,
            },
            &TimeBlockBoundaries::default(),
        );
        assert_eq!(moved.starts_at, at("2026-02-18T17:00"));
        assert_eq!(moved.time_block, Some(TimeBlock::Evening));
        assert!(!moved.is_all_day);
    }

    #[test]
    fn slot_drop_sets_time_and_clears_block() {
        let mut sample = event("evt-1", "tsk-1", "2026-02-16T10:15", 30);
        sample.time_block = Some(TimeBlock::Morning);
        let moved = preview_drop(
            &sample,
            DropTarget::Slot {
                starts_at: at("2026-02-17T14:30"),
            },
            &TimeBlockBoundaries::default(),
        );
        assert_eq!(moved.starts_at, at("2026-02-17T14:30"));
        assert_eq!(moved.time_block, None);
        assert_eq!(sample.starts_at, at("2026-02-16T10:15"));
    }

    #[test]
    fn drag_payload_survives_encoding() {
        let payload = DragPayload {
            id: "tsk-1".to_string(),
            name: "Write report".to_string(),
            level: 1,
        };
        let raw = payload.encode().expect("encode payload");
        assert_eq!(DragPayload::parse(&raw).expect("parse payload"), payload);
    }

    #[test]
    fn drag_payload_rejects_deep_levels() {
        assert!(DragPayload::parse(r#"{"id":"t","name":"n","level":3}"#).is_err());
    }

    #[test]
    fn unreadable_payload_falls_back_to_dragged_reference() {
        let fallback = DragPayload {
            id: "tsk-9".to_string(),
            name: "Fallback".to_string(),
            level: 0,
        };
        let resolved = resolve_drag_payload(Some("{not json"), Some(&fallback));
        assert_eq!(resolved, Some(fallback.clone()));

        let nameless = r#"{"id":"tsk-1","name":"  ","level":0}"#;
        assert_eq!(resolve_drag_payload(Some(nameless), Some(&fallback)), Some(fallback));
        assert_eq!(resolve_drag_payload(Some(nameless), None), None);
        assert_eq!(resolve_drag_payload(None, None), None);
    }

    #[test]
    fn dragged_reference_deeper_than_max_level_is_ignored() {
        let too_deep = DragPayload {
            id: "tsk-9".to_string(),
            name: "Too deep".to_string(),
            level: MAX_TASK_LEVEL + 1,
        };
        assert_eq!(resolve_drag_payload(Some("{not json"), Some(&too_deep)), None);
        assert_eq!(resolve_drag_payload(None, Some(&too_deep)), None);
    }

    #[test]
    fn state_machine_allows_documented_transitions() {
        use PlannerAction as A;
        use PlannerState as S;

        assert_eq!(S::Unscheduled.apply(A::Assign), Ok(S::Scheduled));
        assert_eq!(S::Scheduled.apply(A::Move), Ok(S::Scheduled));
        assert_eq!(S::Scheduled.apply(A::Resize), Ok(S::Scheduled));
        assert_eq!(S::Scheduled.apply(A::ToggleComplete), Ok(S::Completed));
        assert_eq!(S::Completed.apply(A::ToggleComplete), Ok(S::Scheduled));
        assert_eq!(S::Completed.apply(A::Unschedule), Ok(S::Unscheduled));
        assert_eq!(S::Scheduled.apply(A::Delete), Ok(S::Deleted));

        assert!(S::Unscheduled.apply(A::Move).is_err());
        assert!(S::Completed.apply(A::Resize).is_err());
        assert!(S::Deleted.apply(A::Assign).is_err());
        assert!(S::Scheduled.apply(A::Assign).is_err());
    }

    #[test]
    fn schedule_request_rejects_partial_scheduling() {
        let boundaries = TimeBlockBoundaries::default();
        let base = ScheduleRequest::new(EntityRef::task("tsk-1"), "Plan");

        let date_only = base.clone().on(day("2026-02-16"));
        assert!(date_only.resolve_start(&boundaries).is_err());

        let time_only = base.clone().at(NaiveTime::from_hms_opt(9, 0, 0).expect("time"));
        assert!(time_only.resolve_start(&boundaries).is_err());

        assert!(base.resolve_start(&boundaries).is_err());
    }

    #[test]
    fn schedule_request_into_event_uses_block_nominal_start() {
        let boundaries = TimeBlockBoundaries::default();
        let request = ScheduleRequest::new(EntityRef::task("tsk-1"), " Plan ")
            .on(day("2026-02-16"))
            .in_block(TimeBlock::Afternoon);

        let created = request
            .into_event("evt-1".to_string(), &boundaries, 30)
            .expect("valid request");
        assert_eq!(created.starts_at, at("2026-02-16T12:00"));
        assert_eq!(created.time_block, Some(TimeBlock::Afternoon));
        assert_eq!(created.title, "Plan");
        assert_eq!(created.duration_minutes, 30);
        assert_eq!(created.status, EventStatus::Scheduled);
    }

    proptest! {
        #[test]
        fn snapped_duration_is_a_step_multiple_near_the_raw_value(raw in 1i64..2_000) {
            let policy = ResizePolicy::default();
            let snapped = snap_duration(raw, &policy);
            prop_assert_eq!(snapped % policy.step_minutes, 0);
            prop_assert!(snapped >= policy.min_duration_minutes);
            if raw >= 15 {
                prop_assert!((i64::from(snapped) - raw).abs() <= 7);
            }
        }
    }
}
