use crate::domain::conflict::{check_conflicts, Placement};
use crate::domain::models::{DateRange, EntityRef, TimeEvent};
use crate::domain::overdue::{find_overdue, OverdueSet};
use crate::domain::quota::{summarize, summarize_range, DaySummary};
use crate::domain::reassignment::{
    preview_drop, resolve_drag_payload, DragPayload, DropTarget, PlannerAction, PlannerState,
    ResizeSession, ScheduleRequest,
};
use crate::domain::recurrence::next_occurrences;
use crate::domain::task_tree::TaskTree;
use crate::domain::time_block::{bucket_by_block, BlockBuckets};
use crate::infrastructure::config::PlannerConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::occurrence_repository::OccurrenceRepository;
use crate::infrastructure::quota_repository::QuotaRepository;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Persistence(#[from] InfraError),
}

/// A committed placement and the occurrences it collides with.
///
/// Conflicts are warnings: the write has already happened.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Reassignment {
    pub event: TimeEvent,
    pub conflicts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BulkFailure {
    pub event_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConflictWarning {
    pub event_id: String,
    pub conflicts: Vec<String>,
}

/// Result of a sequential batch: a committed prefix, at most one failure,
/// and the untouched rest.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BulkOutcome {
    pub succeeded: Vec<String>,
    pub failed: Option<BulkFailure>,
    pub not_attempted: Vec<String>,
    pub warnings: Vec<ConflictWarning>,
}

impl BulkOutcome {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_none() && self.not_attempted.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DropOutcome {
    Ignored,
    Scheduled(Reassignment),
    Moved(Reassignment),
}

/// Entry point for every planning command.
///
/// Holds the persistence collaborators, the engine settings and the clock
/// that defines "today". Reads always go back to the repositories; the
/// caller's in-memory window is never touched.
pub struct PlannerService<R, Q>
where
    R: OccurrenceRepository,
    Q: QuotaRepository,
{
    occurrences: Arc<R>,
    quotas: Arc<Q>,
    config: PlannerConfig,
    clock: Clock,
}

impl<R, Q> PlannerService<R, Q>
where
    R: OccurrenceRepository,
    Q: QuotaRepository,
{
    pub fn new(occurrences: Arc<R>, quotas: Arc<Q>, config: PlannerConfig) -> Self {
        Self {
            occurrences,
            quotas,
            config,
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)().date()
    }

    pub async fn schedule(&self, request: ScheduleRequest) -> Result<Reassignment, PlannerError> {
        self.schedule_impl(request)
            .await
            .map_err(|error| command_error("schedule", error))
    }

    pub async fn move_occurrence(
        &self,
        event_id: &str,
        target: DropTarget,
    ) -> Result<Reassignment, PlannerError> {
        self.move_occurrence_impl(event_id, target)
            .await
            .map_err(|error| command_error("move_occurrence", error))
    }

    /// Persists the final frame of a resize gesture. Returns `None` without
    /// writing when the snapped duration did not change.
    pub async fn commit_resize(
        &self,
        session: ResizeSession,
    ) -> Result<Option<Reassignment>, PlannerError> {
        self.commit_resize_impl(session)
            .await
            .map_err(|error| command_error("commit_resize", error))
    }

    pub async fn toggle_complete(&self, event_id: &str) -> Result<TimeEvent, PlannerError> {
        self.toggle_complete_impl(event_id)
            .await
            .map_err(|error| command_error("toggle_complete", error))
    }

    /// Detaches the occurrence from the calendar and hands back its owner.
    pub async fn unschedule(&self, event_id: &str) -> Result<EntityRef, PlannerError> {
        self.remove_impl(event_id, PlannerAction::Unschedule)
            .await
            .map_err(|error| command_error("unschedule", error))
    }

    pub async fn delete(&self, event_id: &str) -> Result<EntityRef, PlannerError> {
        self.remove_impl(event_id, PlannerAction::Delete)
            .await
            .map_err(|error| command_error("delete", error))
    }

    /// Unschedules a task and every subtask below it, parent first.
    pub async fn unschedule_subtree(
        &self,
        tree: &TaskTree,
        task_id: &str,
    ) -> Result<BulkOutcome, PlannerError> {
        self.unschedule_subtree_impl(tree, task_id)
            .await
            .map_err(|error| command_error("unschedule_subtree", error))
    }

    /// Applies a drop coming from the UI. An unreadable payload falls back to
    /// `dragged`; when neither names anything the drop is ignored.
    pub async fn handle_drop(
        &self,
        raw_payload: Option<&str>,
        dragged: Option<&DragPayload>,
        target: DropTarget,
    ) -> Result<DropOutcome, PlannerError> {
        self.handle_drop_impl(raw_payload, dragged, target)
            .await
            .map_err(|error| command_error("handle_drop", error))
    }

    pub async fn check_placement(&self, candidate: &TimeEvent) -> Result<Vec<String>, PlannerError> {
        self.conflicts_for(candidate)
            .await
            .map_err(|error| command_error("check_placement", error))
    }

    pub async fn overdue(&self) -> Result<OverdueSet, PlannerError> {
        self.overdue_impl()
            .await
            .map_err(|error| command_error("overdue", error))
    }

    pub async fn reschedule_overdue_one(
        &self,
        event_id: &str,
        target: DropTarget,
    ) -> Result<Reassignment, PlannerError> {
        self.reschedule_overdue_one_impl(event_id, target)
            .await
            .map_err(|error| command_error("reschedule_overdue_one", error))
    }

    /// Moves every overdue occurrence to `target`, one at a time, stopping at
    /// the first failure. Earlier writes stay committed.
    pub async fn reschedule_overdue_all(&self, target: DropTarget) -> Result<BulkOutcome, PlannerError> {
        self.reschedule_overdue_all_impl(target)
            .await
            .map_err(|error| command_error("reschedule_overdue_all", error))
    }

    pub async fn day_summary(&self, date: NaiveDate) -> Result<DaySummary, PlannerError> {
        let summary = async {
            let events = self.occurrences.list_occurrences(DateRange::day(date)).await?;
            let quota = self.quotas.get_daily_quota(date).await?;
            Ok::<_, PlannerError>(summarize(date, &events, quota))
        }
        .await
        .map_err(|error| command_error("day_summary", error))?;
        debug!(
            command = "day_summary",
            %date,
            scheduled = summary.scheduled_minutes,
            quota = summary.quota_minutes,
            "summarized day"
        );
        Ok(summary)
    }

    /// Sunday-to-Saturday summaries for the week containing `date`.
    pub async fn week_summary(&self, date: NaiveDate) -> Result<Vec<DaySummary>, PlannerError> {
        self.week_summary_impl(date)
            .await
            .map_err(|error| command_error("week_summary", error))
    }

    pub async fn day_buckets(&self, date: NaiveDate) -> Result<BlockBuckets, PlannerError> {
        let events = self
            .occurrences
            .list_occurrences(DateRange::day(date))
            .await
            .map_err(|error| command_error("day_buckets", error.into()))?;
        Ok(bucket_by_block(date, &events, &self.config.boundaries))
    }

    /// Start times of the next `count` occurrences bound to `entity`.
    pub async fn upcoming(
        &self,
        entity: &EntityRef,
        count: usize,
    ) -> Result<Vec<NaiveDateTime>, PlannerError> {
        self.upcoming_impl(entity, count)
            .await
            .map_err(|error| command_error("upcoming", error))
    }

    pub async fn set_daily_quota(&self, date: NaiveDate, minutes: u32) -> Result<(), PlannerError> {
        self.quotas
            .set_daily_quota(date, minutes)
            .await
            .map_err(|error| command_error("set_daily_quota", error.into()))?;
        info!(command = "set_daily_quota", %date, minutes, "updated daily quota");
        Ok(())
    }

    pub async fn reset_daily_quota(&self, date: NaiveDate) -> Result<bool, PlannerError> {
        let removed = self
            .quotas
            .clear_daily_quota(date)
            .await
            .map_err(|error| command_error("reset_daily_quota", error.into()))?;
        info!(command = "reset_daily_quota", %date, removed, "cleared daily quota override");
        Ok(removed)
    }

    async fn schedule_impl(&self, request: ScheduleRequest) -> Result<Reassignment, PlannerError> {
        let existing = self.occurrences.get_entity_event(&request.entity).await?;
        PlannerState::of(existing.as_ref())
            .apply(PlannerAction::Assign)
            .map_err(PlannerError::Validation)?;

        let event = request
            .into_event(
                next_id("evt"),
                &self.config.boundaries,
                self.config.default_duration_minutes,
            )
            .map_err(PlannerError::Validation)?;
        let reassignment = self.commit(event).await?;
        info!(
            command = "schedule",
            event_id = %reassignment.event.id,
            entity_id = %reassignment.event.entity.entity_id,
            conflicts = reassignment.conflicts.len(),
            "scheduled occurrence"
        );
        Ok(reassignment)
    }

    async fn move_occurrence_impl(
        &self,
        event_id: &str,
        target: DropTarget,
    ) -> Result<Reassignment, PlannerError> {
        let event = self.load(event_id).await?;
        let reassignment = self.relocate(&event, target).await?;
        info!(
            command = "move_occurrence",
            event_id = %event.id,
            starts_at = %reassignment.event.starts_at,
            conflicts = reassignment.conflicts.len(),
            "moved occurrence"
        );
        Ok(reassignment)
    }

    async fn commit_resize_impl(
        &self,
        session: ResizeSession,
    ) -> Result<Option<Reassignment>, PlannerError> {
        let event_id = session.original().id.clone();
        let Some(resized) = session.finish() else {
            debug!(command = "commit_resize", event_id = %event_id, "resize ended unchanged");
            return Ok(None);
        };

        // Only the duration comes from the gesture; everything else is
        // taken from the latest stored record.
        let mut latest = self.load(&event_id).await?;
        PlannerState::of(Some(&latest))
            .apply(PlannerAction::Resize)
            .map_err(PlannerError::Validation)?;
        latest.duration_minutes = resized.duration_minutes;

        let reassignment = self.commit(latest).await?;
        info!(
            command = "commit_resize",
            event_id = %event_id,
            duration_minutes = reassignment.event.duration_minutes,
            conflicts = reassignment.conflicts.len(),
            "resized occurrence"
        );
        Ok(Some(reassignment))
    }

    async fn toggle_complete_impl(&self, event_id: &str) -> Result<TimeEvent, PlannerError> {
        let mut event = self.load(event_id).await?;
        PlannerState::of(Some(&event))
            .apply(PlannerAction::ToggleComplete)
            .map_err(PlannerError::Validation)?;
        event.status = event.status.toggled();
        self.occurrences.write_occurrence(&event).await?;
        info!(
            command = "toggle_complete",
            event_id = %event.id,
            status = event.status.as_str(),
            "toggled completion"
        );
        Ok(event)
    }

    async fn remove_impl(&self, event_id: &str, action: PlannerAction) -> Result<EntityRef, PlannerError> {
        let event = self.load(event_id).await?;
        PlannerState::of(Some(&event))
            .apply(action)
            .map_err(PlannerError::Validation)?;
        if !self.occurrences.delete_occurrence(&event.id).await? {
            warn!(event_id = %event.id, "occurrence vanished before removal");
        }
        let command = if action == PlannerAction::Delete {
            "delete"
        } else {
            "unschedule"
        };
        info!(
            command,
            event_id = %event.id,
            entity_id = %event.entity.entity_id,
            "removed occurrence"
        );
        Ok(event.entity)
    }

    async fn unschedule_subtree_impl(
        &self,
        tree: &TaskTree,
        task_id: &str,
    ) -> Result<BulkOutcome, PlannerError> {
        let task_ids = tree.subtree(task_id.trim());
        if task_ids.is_empty() {
            return Err(PlannerError::NotFound(format!("task {task_id}")));
        }

        let mut scheduled = Vec::new();
        for task_id in &task_ids {
            if let Some(event) = self
                .occurrences
                .get_entity_event(&EntityRef::task(task_id.as_str()))
                .await?
            {
                scheduled.push(event);
            }
        }

        let mut outcome = BulkOutcome::default();
        let mut remaining = scheduled.into_iter();
        for event in remaining.by_ref() {
            match self.occurrences.delete_occurrence(&event.id).await {
                Ok(_) => outcome.succeeded.push(event.id),
                Err(error) => {
                    outcome.failed = Some(BulkFailure {
                        event_id: event.id,
                        message: error.to_string(),
                    });
                    break;
                }
            }
        }
        outcome.not_attempted = remaining.map(|event| event.id).collect();
        log_bulk("unschedule_subtree", &outcome);
        Ok(outcome)
    }

    async fn handle_drop_impl(
        &self,
        raw_payload: Option<&str>,
        dragged: Option<&DragPayload>,
        target: DropTarget,
    ) -> Result<DropOutcome, PlannerError> {
        let Some(payload) = resolve_drag_payload(raw_payload, dragged) else {
            debug!(command = "handle_drop", "drop without a recoverable payload ignored");
            return Ok(DropOutcome::Ignored);
        };

        let entity = EntityRef::task(payload.id.trim());
        if let Some(existing) = self.occurrences.get_entity_event(&entity).await? {
            let reassignment = self.relocate(&existing, target).await?;
            info!(
                command = "handle_drop",
                event_id = %existing.id,
                level = payload.level,
                conflicts = reassignment.conflicts.len(),
                "moved dropped occurrence"
            );
            return Ok(DropOutcome::Moved(reassignment));
        }

        let request = ScheduleRequest::new(entity, payload.name.trim());
        let request = match target {
            DropTarget::Block { date, time_block } => request.on(date).in_block(time_block),
            DropTarget::Slot { starts_at } => request.on(starts_at.date()).at(starts_at.time()),
        };
        Ok(DropOutcome::Scheduled(self.schedule_impl(request).await?))
    }

    async fn overdue_impl(&self) -> Result<OverdueSet, PlannerError> {
        let today = self.today();
        let past = self.occurrences.list_before(today).await?;
        let overdue = find_overdue(&past, today);
        debug!(
            command = "overdue",
            count = overdue.count,
            total_minutes = overdue.total_minutes,
            "collected overdue occurrences"
        );
        Ok(overdue)
    }

    async fn reschedule_overdue_one_impl(
        &self,
        event_id: &str,
        target: DropTarget,
    ) -> Result<Reassignment, PlannerError> {
        let event = self.load(event_id).await?;
        let today_start = self.today().and_time(NaiveTime::MIN);
        if event.is_completed() || event.starts_at >= today_start {
            return Err(PlannerError::Validation(format!(
                "occurrence {} is not overdue",
                event.id
            )));
        }
        let reassignment = self.relocate(&event, target).await?;
        info!(
            command = "reschedule_overdue_one",
            event_id = %event.id,
            date = %target.date(),
            conflicts = reassignment.conflicts.len(),
            "rescheduled overdue occurrence"
        );
        Ok(reassignment)
    }

    async fn reschedule_overdue_all_impl(&self, target: DropTarget) -> Result<BulkOutcome, PlannerError> {
        let overdue = self.overdue_impl().await?;
        let mut outcome = BulkOutcome::default();
        let mut remaining = overdue.events.into_iter();

        for event in remaining.by_ref() {
            match self.relocate(&event, target).await {
                Ok(reassignment) => {
                    if !reassignment.conflicts.is_empty() {
                        outcome.warnings.push(ConflictWarning {
                            event_id: event.id.clone(),
                            conflicts: reassignment.conflicts,
                        });
                    }
                    outcome.succeeded.push(event.id);
                }
                Err(error) => {
                    outcome.failed = Some(BulkFailure {
                        event_id: event.id,
                        message: error.to_string(),
                    });
                    break;
                }
            }
        }
        outcome.not_attempted = remaining.map(|event| event.id).collect();
        log_bulk("reschedule_overdue_all", &outcome);
        Ok(outcome)
    }

    async fn week_summary_impl(&self, date: NaiveDate) -> Result<Vec<DaySummary>, PlannerError> {
        let range = DateRange::week_of(date);
        let events = self.occurrences.list_occurrences(range).await?;
        let mut quotas = HashMap::new();
        for day in range.days() {
            quotas.insert(day, self.quotas.get_daily_quota(day).await?);
        }
        let default_quota = self.config.daily_quota_minutes;
        Ok(summarize_range(&range, &events, |day| {
            quotas.get(&day).copied().unwrap_or(default_quota)
        }))
    }

    async fn upcoming_impl(
        &self,
        entity: &EntityRef,
        count: usize,
    ) -> Result<Vec<NaiveDateTime>, PlannerError> {
        let event = self
            .occurrences
            .get_entity_event(entity)
            .await?
            .ok_or_else(|| {
                PlannerError::NotFound(format!(
                    "occurrence for {} {}",
                    entity.entity_type.as_str(),
                    entity.entity_id
                ))
            })?;
        Ok(next_occurrences(&event, self.today(), count)
            .into_iter()
            .map(|date| event.occurrence_on(date))
            .collect())
    }

    async fn load(&self, event_id: &str) -> Result<TimeEvent, PlannerError> {
        let event_id = event_id.trim();
        if event_id.is_empty() {
            return Err(PlannerError::Validation(
                "event_id must not be empty".to_string(),
            ));
        }
        self.occurrences
            .get_occurrence(event_id)
            .await?
            .ok_or_else(|| PlannerError::NotFound(format!("occurrence {event_id}")))
    }

    async fn relocate(&self, event: &TimeEvent, target: DropTarget) -> Result<Reassignment, PlannerError> {
        PlannerState::of(Some(event))
            .apply(PlannerAction::Move)
            .map_err(PlannerError::Validation)?;
        let moved = preview_drop(event, target, &self.config.boundaries);
        self.commit(moved).await
    }

    /// Checks conflicts for `event`, then writes it.
    async fn commit(&self, event: TimeEvent) -> Result<Reassignment, PlannerError> {
        event.validate().map_err(PlannerError::Validation)?;
        let conflicts = self.conflicts_for(&event).await?;
        if !conflicts.is_empty() {
            warn!(
                event_id = %event.id,
                conflicts = ?conflicts,
                "placement conflicts with existing occurrences"
            );
        }
        self.occurrences.write_occurrence(&event).await?;
        Ok(Reassignment { event, conflicts })
    }

    /// Every occurrence is checked against the capacity of its block, the
    /// classified one when untagged. Untagged occurrences also report exact
    /// time overlaps. Ids come back once each, in day order.
    async fn conflicts_for(&self, event: &TimeEvent) -> Result<Vec<String>, PlannerError> {
        let Some(block) = Placement::for_block(event, &self.config.boundaries) else {
            return Ok(Vec::new());
        };
        let slot = if event.time_block.is_none() {
            Placement::for_slot(event)
        } else {
            None
        };

        let existing = self
            .occurrences
            .list_occurrences(DateRange::day(event.date()))
            .await?;
        let mut conflicts = Vec::new();
        for placement in std::iter::once(block).chain(slot) {
            for id in check_conflicts(
                &placement,
                &existing,
                &self.config.boundaries,
                &self.config.capacity,
            ) {
                if !conflicts.contains(&id) {
                    conflicts.push(id);
                }
            }
        }
        Ok(conflicts)
    }
}

fn command_error(command: &str, error: PlannerError) -> PlannerError {
    match &error {
        PlannerError::Validation(message) => warn!(command, %message, "command rejected"),
        PlannerError::NotFound(message) => warn!(command, %message, "command target missing"),
        PlannerError::Persistence(source) => error!(command, error = %source, "command failed"),
    }
    error
}

fn log_bulk(command: &str, outcome: &BulkOutcome) {
    match &outcome.failed {
        Some(failure) => error!(
            command,
            succeeded = outcome.success_count(),
            failed = %failure.event_id,
            not_attempted = outcome.not_attempted.len(),
            message = %failure.message,
            "batch stopped at first failure"
        ),
        None => info!(
            command,
            succeeded = outcome.success_count(),
            warnings = outcome.warnings.len(),
            "batch completed"
        ),
    }
}
