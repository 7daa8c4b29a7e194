use crate::domain::models::{
    DateRange, EntityRef, EntityType, EventStatus, RecurrenceConfig, TimeBlock, TimeEvent,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::run_blocking;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
const SELECT_COLUMNS: &str = "id, entity_type, entity_id, title, description, starts_at, \
     duration_minutes, time_block, status, priority, is_all_day, recurrence";

/// Store of occurrence records owned by the surrounding application.
#[async_trait]
pub trait OccurrenceRepository: Send + Sync {
    /// Occurrence currently bound to an entity, earliest first when several exist.
    async fn get_entity_event(&self, entity: &EntityRef) -> Result<Option<TimeEvent>, InfraError>;
    async fn get_occurrence(&self, event_id: &str) -> Result<Option<TimeEvent>, InfraError>;
    async fn list_occurrences(&self, range: DateRange) -> Result<Vec<TimeEvent>, InfraError>;
    /// Occurrences whose start date is strictly before `date`.
    async fn list_before(&self, date: NaiveDate) -> Result<Vec<TimeEvent>, InfraError>;
    async fn write_occurrence(&self, event: &TimeEvent) -> Result<(), InfraError>;
    async fn delete_occurrence(&self, event_id: &str) -> Result<bool, InfraError>;
}

fn sort_events(events: &mut [TimeEvent]) {
    events.sort_by(|left, right| {
        left.starts_at
            .cmp(&right.starts_at)
            .then_with(|| left.id.cmp(&right.id))
    });
}

#[derive(Debug, Default)]
pub struct InMemoryOccurrenceRepository {
    events: Mutex<HashMap<String, TimeEvent>>,
    rejected_writes: Mutex<HashSet<String>>,
}

impl InMemoryOccurrenceRepository {
    pub fn with_events(events: impl IntoIterator<Item = TimeEvent>) -> Self {
        let repository = Self::default();
        if let Ok(mut stored) = repository.events.lock() {
            for event in events {
                stored.insert(event.id.clone(), event);
            }
        }
        repository
    }

    /// Makes every later write of `event_id` fail, as a rejecting backend would.
    pub fn reject_writes_for(&self, event_id: &str) -> Result<(), InfraError> {
        self.rejected_writes
            .lock()
            .map_err(|error| lock_error("rejected writes", error))?
            .insert(event_id.to_string());
        Ok(())
    }

    fn read<T>(&self, read: impl FnOnce(&HashMap<String, TimeEvent>) -> T) -> Result<T, InfraError> {
        let events = self
            .events
            .lock()
            .map_err(|error| lock_error("occurrence store", error))?;
        Ok(read(&events))
    }

    fn filtered(&self, keep: impl Fn(&TimeEvent) -> bool) -> Result<Vec<TimeEvent>, InfraError> {
        let mut events = self.read(|events| {
            events
                .values()
                .filter(|event| keep(event))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        sort_events(&mut events);
        Ok(events)
    }
}

fn lock_error(name: &str, error: impl std::fmt::Display) -> InfraError {
    InfraError::Persistence(format!("{name} lock poisoned: {error}"))
}

#[async_trait]
impl OccurrenceRepository for InMemoryOccurrenceRepository {
    async fn get_entity_event(&self, entity: &EntityRef) -> Result<Option<TimeEvent>, InfraError> {
        Ok(self.filtered(|event| &event.entity == entity)?.into_iter().next())
    }

    async fn get_occurrence(&self, event_id: &str) -> Result<Option<TimeEvent>, InfraError> {
        self.read(|events| events.get(event_id.trim()).cloned())
    }

    async fn list_occurrences(&self, range: DateRange) -> Result<Vec<TimeEvent>, InfraError> {
        self.filtered(|event| range.contains(event.date()))
    }

    async fn list_before(&self, date: NaiveDate) -> Result<Vec<TimeEvent>, InfraError> {
        self.filtered(|event| event.date() < date)
    }

    async fn write_occurrence(&self, event: &TimeEvent) -> Result<(), InfraError> {
        let rejected = self
            .rejected_writes
            .lock()
            .map_err(|error| lock_error("rejected writes", error))?
            .contains(&event.id);
        if rejected {
            return Err(InfraError::Persistence(format!(
                "write rejected for occurrence {}",
                event.id
            )));
        }
        event.validate().map_err(InfraError::Persistence)?;

        let mut events = self
            .events
            .lock()
            .map_err(|error| lock_error("occurrence store", error))?;
        events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn delete_occurrence(&self, event_id: &str) -> Result<bool, InfraError> {
        let mut events = self
            .events
            .lock()
            .map_err(|error| lock_error("occurrence store", error))?;
        Ok(events.remove(event_id.trim()).is_some())
    }
}

#[derive(Debug, Clone)]
pub struct SqliteOccurrenceRepository {
    db_path: PathBuf,
}

impl SqliteOccurrenceRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }
}

struct OccurrenceRow {
    id: String,
    entity_type: String,
    entity_id: String,
    title: String,
    description: Option<String>,
    starts_at: String,
    duration_minutes: i64,
    time_block: Option<String>,
    status: String,
    priority: Option<i64>,
    is_all_day: bool,
    recurrence: Option<String>,
}

impl OccurrenceRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            starts_at: row.get(5)?,
            duration_minutes: row.get(6)?,
            time_block: row.get(7)?,
            status: row.get(8)?,
            priority: row.get(9)?,
            is_all_day: row.get(10)?,
            recurrence: row.get(11)?,
        })
    }

    fn into_event(self) -> Result<TimeEvent, InfraError> {
        let corrupt =
            |field: &str, value: &str| InfraError::Persistence(format!("occurrence {}: invalid {field} '{value}'", self.id));

        let entity_type =
            EntityType::parse(&self.entity_type).ok_or_else(|| corrupt("entity_type", &self.entity_type))?;
        let starts_at = NaiveDateTime::parse_from_str(&self.starts_at, DATETIME_FORMAT)
            .map_err(|_| corrupt("starts_at", &self.starts_at))?;
        let duration_minutes = u32::try_from(self.duration_minutes)
            .map_err(|_| corrupt("duration_minutes", &self.duration_minutes.to_string()))?;
        let time_block = match self.time_block.as_deref() {
            Some(raw) => Some(TimeBlock::parse(raw).ok_or_else(|| corrupt("time_block", raw))?),
            None => None,
        };
        let status = EventStatus::parse(&self.status).ok_or_else(|| corrupt("status", &self.status))?;
        let priority = match self.priority {
            Some(raw) => Some(u8::try_from(raw).map_err(|_| corrupt("priority", &raw.to_string()))?),
            None => None,
        };
        let recurrence = match self.recurrence.as_deref() {
            Some(raw) => Some(serde_json::from_str::<RecurrenceConfig>(raw)?),
            None => None,
        };

        Ok(TimeEvent {
            id: self.id.clone(),
            entity: EntityRef::new(entity_type, self.entity_id.clone()),
            title: self.title.clone(),
            description: self.description.clone(),
            starts_at,
            duration_minutes,
            time_block,
            status,
            priority,
            is_all_day: self.is_all_day,
            recurrence,
        })
    }
}

fn query_events(
    connection: &Connection,
    clause: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<TimeEvent>, InfraError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM occurrences {clause} ORDER BY starts_at, id");
    let mut statement = connection.prepare(&sql)?;
    let rows = statement
        .query_map(params, OccurrenceRow::read)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(OccurrenceRow::into_event).collect()
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[async_trait]
impl OccurrenceRepository for SqliteOccurrenceRepository {
    async fn get_entity_event(&self, entity: &EntityRef) -> Result<Option<TimeEvent>, InfraError> {
        let entity = entity.clone();
        run_blocking(&self.db_path, move |connection| {
            let events = query_events(
                connection,
                "WHERE entity_type = ?1 AND entity_id = ?2",
                params![entity.entity_type.as_str(), entity.entity_id],
            )?;
            Ok(events.into_iter().next())
        })
        .await
    }

    async fn get_occurrence(&self, event_id: &str) -> Result<Option<TimeEvent>, InfraError> {
        let event_id = event_id.trim().to_string();
        run_blocking(&self.db_path, move |connection| {
            let row = connection
                .query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM occurrences WHERE id = ?1"),
                    params![event_id],
                    OccurrenceRow::read,
                )
                .optional()?;
            row.map(OccurrenceRow::into_event).transpose()
        })
        .await
    }

    async fn list_occurrences(&self, range: DateRange) -> Result<Vec<TimeEvent>, InfraError> {
        run_blocking(&self.db_path, move |connection| {
            query_events(
                connection,
                "WHERE start_date BETWEEN ?1 AND ?2",
                params![format_date(range.start), format_date(range.end)],
            )
        })
        .await
    }

    async fn list_before(&self, date: NaiveDate) -> Result<Vec<TimeEvent>, InfraError> {
        run_blocking(&self.db_path, move |connection| {
            query_events(connection, "WHERE start_date < ?1", params![format_date(date)])
        })
        .await
    }

    async fn write_occurrence(&self, event: &TimeEvent) -> Result<(), InfraError> {
        event.validate().map_err(InfraError::Persistence)?;
        let event = event.clone();
        let recurrence = event
            .recurrence
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        run_blocking(&self.db_path, move |connection| {
            connection.execute(
                "INSERT INTO occurrences (
                   id, entity_type, entity_id, title, description, starts_at, start_date,
                   duration_minutes, time_block, status, priority, is_all_day, recurrence
                 )
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(id) DO UPDATE SET
                   entity_type = excluded.entity_type,
                   entity_id = excluded.entity_id,
                   title = excluded.title,
                   description = excluded.description,
                   starts_at = excluded.starts_at,
                   start_date = excluded.start_date,
                   duration_minutes = excluded.duration_minutes,
                   time_block = excluded.time_block,
                   status = excluded.status,
                   priority = excluded.priority,
                   is_all_day = excluded.is_all_day,
                   recurrence = excluded.recurrence",
                params![
                    event.id,
                    event.entity.entity_type.as_str(),
                    event.entity.entity_id,
                    event.title,
                    event.description,
                    event.starts_at.format(DATETIME_FORMAT).to_string(),
                    format_date(event.date()),
                    event.duration_minutes,
                    event.time_block.map(TimeBlock::as_str),
                    event.status.as_str(),
                    event.priority,
                    event.is_all_day,
                    recurrence,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_occurrence(&self, event_id: &str) -> Result<bool, InfraError> {
        let event_id = event_id.trim().to_string();
        run_blocking(&self.db_path, move |connection| {
            let removed = connection.execute("DELETE FROM occurrences WHERE id = ?1", params![event_id])?;
            Ok(removed > 0)
        })
        .await
    }
}
