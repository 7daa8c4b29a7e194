use crate::application::planner::PlannerService;
use crate::infrastructure::config::{
    ensure_default_configs, load_configs, load_planner_config, read_log_level, PlannerConfig,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::logging::init_tracing;
use crate::infrastructure::occurrence_repository::SqliteOccurrenceRepository;
use crate::infrastructure::quota_repository::SqliteQuotaRepository;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const DATABASE_FILE: &str = "planner.sqlite";

pub type SqlitePlanner = PlannerService<SqliteOccurrenceRepository, SqliteQuotaRepository>;

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub database_path: PathBuf,
}

/// Lays out `config/` and `state/` under `workspace_root`, writes default
/// config files that are missing and applies the database schema.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let database_path = state_dir.join(DATABASE_FILE);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;

    ensure_default_configs(&config_dir)?;
    let _ = load_configs(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        database_path,
    })
}

/// Bootstraps the workspace, installs logging at the configured level and
/// returns a planner backed by the workspace database.
pub fn open_planner(workspace_root: &Path) -> Result<SqlitePlanner, InfraError> {
    let bootstrap = bootstrap_workspace(workspace_root)?;
    init_tracing(&read_log_level(&bootstrap.config_dir)?)?;
    let config = load_planner_config(&bootstrap.config_dir)?;
    info!(
        workspace = %bootstrap.workspace_root.display(),
        database = %bootstrap.database_path.display(),
        "planner workspace ready"
    );
    Ok(sqlite_planner(&bootstrap.database_path, config))
}

pub fn sqlite_planner(database_path: &Path, config: PlannerConfig) -> SqlitePlanner {
    let occurrences = Arc::new(SqliteOccurrenceRepository::new(database_path));
    let quotas = Arc::new(SqliteQuotaRepository::new(
        database_path,
        config.daily_quota_minutes,
    ));
    PlannerService::new(occurrences, quotas, config)
}
