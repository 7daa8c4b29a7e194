use crate::domain::models::{TimeBlock, TimeBlockBoundaries, TimeEvent};
use chrono::{NaiveDate, NaiveTime, Timelike};

/// Block an occurrence belongs to.
///
/// An explicit `time_block` always wins, even when it disagrees with the
/// start hour. All-day occurrences have no block and yield `None`.
pub fn classify(event: &TimeEvent, boundaries: &TimeBlockBoundaries) -> Option<TimeBlock> {
    if event.is_all_day {
        return None;
    }
    if let Some(block) = event.time_block {
        return Some(block);
    }
    Some(block_for_time(event.starts_at.time(), boundaries))
}

pub fn block_for_time(time: NaiveTime, boundaries: &TimeBlockBoundaries) -> TimeBlock {
    let hour = time.hour();
    if hour >= boundaries.evening_start_hour {
        TimeBlock::Evening
    } else if hour >= boundaries.afternoon_start_hour {
        TimeBlock::Afternoon
    } else {
        TimeBlock::Morning
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockBuckets {
    pub morning: Vec<TimeEvent>,
    pub afternoon: Vec<TimeEvent>,
    pub evening: Vec<TimeEvent>,
    pub all_day: Vec<TimeEvent>,
}

impl BlockBuckets {
    pub fn get(&self, block: TimeBlock) -> &[TimeEvent] {
        match block {
            TimeBlock::Morning => &self.morning,
            TimeBlock::Afternoon => &self.afternoon,
            TimeBlock::Evening => &self.evening,
        }
    }

    pub fn minutes_in(&self, block: TimeBlock) -> u32 {
        self.get(block)
            .iter()
            .map(|event| event.duration_minutes)
            .sum()
    }

    fn push(&mut self, block: TimeBlock, event: TimeEvent) {
        match block {
            TimeBlock::Morning => self.morning.push(event),
            TimeBlock::Afternoon => self.afternoon.push(event),
            TimeBlock::Evening => self.evening.push(event),
        }
    }
}

/// Splits the occurrences of `date` into block buckets, all-day ones aside.
///
/// Each bucket is ordered by start time, then priority (1 first), then id.
pub fn bucket_by_block(
    date: NaiveDate,
    events: &[TimeEvent],
    boundaries: &TimeBlockBoundaries,
) -> BlockBuckets {
    let mut ordered = events
        .iter()
        .filter(|event| event.date() == date)
        .cloned()
        .collect::<Vec<_>>();
    ordered.sort_by(|left, right| {
        left.starts_at
            .cmp(&right.starts_at)
            .then_with(|| priority_rank(left).cmp(&priority_rank(right)))
            .then_with(|| left.id.cmp(&right.id))
    });

    let mut buckets = BlockBuckets::default();
    for event in ordered {
        match classify(&event, boundaries) {
            Some(block) => buckets.push(block, event),
            None => buckets.all_day.push(event),
        }
    }
    buckets
}

fn priority_rank(event: &TimeEvent) -> u8 {
    event.priority.unwrap_or(u8::MAX)
}
