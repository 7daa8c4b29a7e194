use crate::domain::models::{BlockCapacity, EntityRef, TimeBlock, TimeBlockBoundaries, TimeEvent};
use crate::domain::time_block::classify;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlacementTarget {
    Block {
        date: NaiveDate,
        time_block: TimeBlock,
    },
    Slot {
        starts_at: NaiveDateTime,
        duration_minutes: u32,
    },
}

/// Where an occurrence is about to be placed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Placement {
    pub event_id: String,
    pub entity: EntityRef,
    pub target: PlacementTarget,
}

impl Placement {
    /// Block placement for `event`, classifying it when no block is tagged.
    /// All-day occurrences are never placed in a block.
    pub fn for_block(event: &TimeEvent, boundaries: &TimeBlockBoundaries) -> Option<Self> {
        let time_block = classify(event, boundaries)?;
        Some(Self {
            event_id: event.id.clone(),
            entity: event.entity.clone(),
            target: PlacementTarget::Block {
                date: event.date(),
                time_block,
            },
        })
    }

    pub fn for_slot(event: &TimeEvent) -> Option<Self> {
        if event.is_all_day {
            return None;
        }
        Some(Self {
            event_id: event.id.clone(),
            entity: event.entity.clone(),
            target: PlacementTarget::Slot {
                starts_at: event.starts_at,
                duration_minutes: event.duration_minutes,
            },
        })
    }
}

/// Ids of existing occurrences the placement collides with.
///
/// Only active (not completed, not all-day) occurrences of a different
/// owner count. A block placement collides when the block has a capacity
/// and the occupants already fill it; the occupants are reported. A slot
/// placement reports every occupant whose time range overlaps. Nothing is
/// rejected here: callers decide what to do with the ids.
pub fn check_conflicts(
    placement: &Placement,
    existing: &[TimeEvent],
    boundaries: &TimeBlockBoundaries,
    capacity: &BlockCapacity,
) -> Vec<String> {
    let competitors = existing.iter().filter(|event| {
        event.id != placement.event_id
            && event.entity != placement.entity
            && !event.is_completed()
            && !event.is_all_day
    });

    match &placement.target {
        PlacementTarget::Block { date, time_block } => {
            let Some(limit) = capacity.limit_for(*time_block) else {
                return Vec::new();
            };
            let occupants = competitors
                .filter(|event| {
                    event.date() == *date && classify(event, boundaries) == Some(*time_block)
                })
                .map(|event| event.id.clone())
                .collect::<Vec<_>>();
            if occupants.len() >= limit as usize {
                occupants
            } else {
                Vec::new()
            }
        }
        PlacementTarget::Slot {
            starts_at,
            duration_minutes,
        } => {
            let ends_at = *starts_at + Duration::minutes(i64::from(*duration_minutes));
            competitors
                .filter(|event| event.starts_at < ends_at && *starts_at < event.ends_at())
                .map(|event| event.id.clone())
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::fixtures::{at, event};
    use crate::domain::models::EventStatus;

    fn capacity_of_one() -> BlockCapacity {
        BlockCapacity {
            morning: Some(1),
            afternoon: Some(2),
            evening: None,
        }
    }

    #[test]
    fn unconstrained_block_never_conflicts() {
        let candidate = event("evt-new", "tsk-new", "2026-02-16T19:00", 30);
        let existing = vec![event("evt-1", "tsk-1", "2026-02-16T18:00", 30)];
        let placement =
            Placement::for_block(&candidate, &TimeBlockBoundaries::default()).expect("placement");

        let conflicts = check_conflicts(
            &placement,
            &existing,
            &TimeBlockBoundaries::default(),
            &capacity_of_one(),
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn full_block_reports_active_occupants() {
        let boundaries = TimeBlockBoundaries::default();
        let candidate = event("evt-new", "tsk-new", "2026-02-16T09:00", 30);
        let mut tagged = event("evt-1", "tsk-1", "2026-02-16T20:00", 30);
        tagged.time_block = Some(TimeBlock::Morning);
        let existing = vec![tagged, event("evt-2", "tsk-2", "2026-02-17T09:00", 30)];
        let placement = Placement::for_block(&candidate, &boundaries).expect("placement");

        let conflicts = check_conflicts(&placement, &existing, &boundaries, &capacity_of_one());
        assert_eq!(conflicts, vec!["evt-1".to_string()]);
    }

    #[test]
    fn block_below_capacity_does_not_conflict() {
        let boundaries = TimeBlockBoundaries::default();
        let candidate = event("evt-new", "tsk-new", "2026-02-16T13:00", 30);
        let existing = vec![event("evt-1", "tsk-1", "2026-02-16T14:00", 30)];
        let placement = Placement::for_block(&candidate, &boundaries).expect("placement");

        assert!(check_conflicts(&placement, &existing, &boundaries, &capacity_of_one()).is_empty());
    }

    #[test]
    fn completed_same_owner_and_self_are_ignored() {
        let boundaries = TimeBlockBoundaries::default();
        let candidate = event("evt-new", "tsk-new", "2026-02-16T09:00", 30);
        let mut done = event("evt-done", "tsk-1", "2026-02-16T09:00", 30);
        done.status = EventStatus::Completed;
        let sibling = event("evt-sibling", "tsk-new", "2026-02-16T09:30", 30);
        let itself = event("evt-new", "tsk-new", "2026-02-16T08:00", 30);
        let existing = vec![done, sibling, itself];
        let placement = Placement::for_block(&candidate, &boundaries).expect("placement");

        assert!(check_conflicts(&placement, &existing, &boundaries, &capacity_of_one()).is_empty());
    }

    #[test]
    fn slot_reports_overlapping_ranges_only() {
        let boundaries = TimeBlockBoundaries::default();
        let candidate = event("evt-new", "tsk-new", "2026-02-16T10:00", 60);
        let existing = vec![
            event("evt-before", "tsk-1", "2026-02-16T09:00", 60),
            event("evt-inside", "tsk-2", "2026-02-16T10:30", 15),
            event("evt-tail", "tsk-3", "2026-02-16T10:45", 60),
            event("evt-after", "tsk-4", "2026-02-16T11:00", 30),
        ];
        let placement = Placement::for_slot(&candidate).expect("placement");

        let conflicts =
            check_conflicts(&placement, &existing, &boundaries, &BlockCapacity::default());
        assert_eq!(conflicts, vec!["evt-inside".to_string(), "evt-tail".to_string()]);
    }

    #[test]
    fn all_day_events_have_no_placement() {
        let mut candidate = event("evt-new", "tsk-new", "2026-02-16T00:00", 60);
        candidate.is_all_day = true;
        assert!(Placement::for_block(&candidate, &TimeBlockBoundaries::default()).is_none());
        assert!(Placement::for_slot(&candidate).is_none());
        assert_eq!(candidate.starts_at, at("2026-02-16T00:00"));
    }
}
