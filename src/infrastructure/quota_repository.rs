use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::run_blocking;
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Per-day planned capacity. Days without an override use the default.
#[async_trait]
pub trait QuotaRepository: Send + Sync {
    async fn get_daily_quota(&self, date: NaiveDate) -> Result<u32, InfraError>;
    async fn set_daily_quota(&self, date: NaiveDate, minutes: u32) -> Result<(), InfraError>;
    /// Drops the override for `date`; returns whether one existed.
    async fn clear_daily_quota(&self, date: NaiveDate) -> Result<bool, InfraError>;
}

#[derive(Debug)]
pub struct InMemoryQuotaRepository {
    default_minutes: u32,
    overrides: Mutex<HashMap<NaiveDate, u32>>,
}

impl InMemoryQuotaRepository {
    pub fn new(default_minutes: u32) -> Self {
        Self {
            default_minutes,
            overrides: Mutex::new(HashMap::new()),
        }
    }

    fn overrides(&self) -> Result<std::sync::MutexGuard<'_, HashMap<NaiveDate, u32>>, InfraError> {
        self.overrides
            .lock()
            .map_err(|error| InfraError::Persistence(format!("quota store lock poisoned: {error}")))
    }
}

#[async_trait]
impl QuotaRepository for InMemoryQuotaRepository {
    async fn get_daily_quota(&self, date: NaiveDate) -> Result<u32, InfraError> {
        Ok(self
            .overrides()?
            .get(&date)
            .copied()
            .unwrap_or(self.default_minutes))
    }

    async fn set_daily_quota(&self, date: NaiveDate, minutes: u32) -> Result<(), InfraError> {
        self.overrides()?.insert(date, minutes);
        Ok(())
    }

    async fn clear_daily_quota(&self, date: NaiveDate) -> Result<bool, InfraError> {
        Ok(self.overrides()?.remove(&date).is_some())
    }
}

#[derive(Debug, Clone)]
pub struct SqliteQuotaRepository {
    db_path: PathBuf,
    default_minutes: u32,
}

impl SqliteQuotaRepository {
    pub fn new(db_path: impl AsRef<Path>, default_minutes: u32) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            default_minutes,
        }
    }
}

#[async_trait]
impl QuotaRepository for SqliteQuotaRepository {
    async fn get_daily_quota(&self, date: NaiveDate) -> Result<u32, InfraError> {
        let default_minutes = self.default_minutes;
        run_blocking(&self.db_path, move |connection| {
            let minutes: Option<u32> = connection
                .query_row(
                    "SELECT minutes FROM daily_quotas WHERE date = ?1",
                    params![date.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(minutes.unwrap_or(default_minutes))
        })
        .await
    }

    async fn set_daily_quota(&self, date: NaiveDate, minutes: u32) -> Result<(), InfraError> {
        run_blocking(&self.db_path, move |connection| {
            connection.execute(
                "INSERT INTO daily_quotas (date, minutes)
                 VALUES (?1, ?2)
                 ON CONFLICT(date) DO UPDATE SET minutes = excluded.minutes",
                params![date.to_string(), minutes],
            )?;
            Ok(())
        })
        .await
    }

    async fn clear_daily_quota(&self, date: NaiveDate) -> Result<bool, InfraError> {
        run_blocking(&self.db_path, move |connection| {
            let removed = connection.execute(
                "DELETE FROM daily_quotas WHERE date = ?1",
                params![date.to_string()],
            )?;
            Ok(removed > 0)
        })
        .await
    }
}
