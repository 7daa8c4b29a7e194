use crate::infrastructure::error::InfraError;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");
const BUSY_TIMEOUT_MS: u64 = 2_000;

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = open_connection(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

pub fn open_connection(path: &Path) -> Result<Connection, InfraError> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
    Ok(connection)
}

/// Runs a SQLite operation on the blocking pool with a fresh connection.
pub(crate) async fn run_blocking<T, F>(db_path: &Path, operation: F) -> Result<T, InfraError>
where
    F: FnOnce(&Connection) -> Result<T, InfraError> + Send + 'static,
    T: Send + 'static,
{
    let db_path: PathBuf = db_path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let connection = open_connection(&db_path)?;
        operation(&connection)
    })
    .await
    .map_err(|error| InfraError::Persistence(format!("storage task failed: {error}")))?
}
