use crate::domain::models::{BlockCapacity, ResizePolicy, TimeBlockBoundaries};
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const PLANNER_JSON: &str = "planner.json";
const DEFAULT_LOG_LEVEL: &str = "info";
const SUPPORTED_SCHEMA: u64 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub planner: serde_json::Value,
}

/// Engine settings shared by every planner command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    pub boundaries: TimeBlockBoundaries,
    pub capacity: BlockCapacity,
    pub resize: ResizePolicy,
    pub daily_quota_minutes: u32,
    pub default_duration_minutes: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            boundaries: TimeBlockBoundaries::default(),
            capacity: BlockCapacity::default(),
            resize: ResizePolicy::default(),
            daily_quota_minutes: 480,
            default_duration_minutes: 30,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.boundaries.validate()?;
        self.resize.validate()?;
        if self.default_duration_minutes == 0 {
            return Err("defaultDurationMinutes must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlannerFile {
    time_blocks: TimeBlocksSection,
    daily_quota_minutes: u32,
    #[serde(default = "default_duration_minutes")]
    default_duration_minutes: u32,
    resize: ResizeSection,
    #[serde(default)]
    block_capacity: CapacitySection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeBlocksSection {
    morning_start_hour: u32,
    afternoon_start_hour: u32,
    evening_start_hour: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResizeSection {
    step_minutes: u32,
    min_duration_minutes: u32,
}

#[derive(Debug, Default, Deserialize)]
struct CapacitySection {
    morning: Option<u32>,
    afternoon: Option<u32>,
    evening: Option<u32>,
}

fn default_duration_minutes() -> u32 {
    PlannerConfig::default().default_duration_minutes
}

impl From<PlannerFile> for PlannerConfig {
    fn from(file: PlannerFile) -> Self {
        Self {
            boundaries: TimeBlockBoundaries {
                morning_start_hour: file.time_blocks.morning_start_hour,
                afternoon_start_hour: file.time_blocks.afternoon_start_hour,
                evening_start_hour: file.time_blocks.evening_start_hour,
            },
            capacity: BlockCapacity {
                morning: file.block_capacity.morning,
                afternoon: file.block_capacity.afternoon,
                evening: file.block_capacity.evening,
            },
            resize: ResizePolicy {
                step_minutes: file.resize.step_minutes,
                min_duration_minutes: file.resize.min_duration_minutes,
            },
            daily_quota_minutes: file.daily_quota_minutes,
            default_duration_minutes: file.default_duration_minutes,
        }
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    let defaults = PlannerConfig::default();
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "DayPlan",
                "logLevel": DEFAULT_LOG_LEVEL
            }),
        ),
        (
            PLANNER_JSON,
            serde_json::json!({
                "schema": 1,
                "timeBlocks": {
                    "morningStartHour": defaults.boundaries.morning_start_hour,
                    "afternoonStartHour": defaults.boundaries.afternoon_start_hour,
                    "eveningStartHour": defaults.boundaries.evening_start_hour
                },
                "dailyQuotaMinutes": defaults.daily_quota_minutes,
                "defaultDurationMinutes": defaults.default_duration_minutes,
                "resize": {
                    "stepMinutes": defaults.resize.step_minutes,
                    "minDurationMinutes": defaults.resize.min_duration_minutes
                },
                "blockCapacity": {
                    "morning": null,
                    "afternoon": null,
                    "evening": null
                }
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        planner: read_config(&config_dir.join(PLANNER_JSON))?,
    })
}

pub fn load_planner_config(config_dir: &Path) -> Result<PlannerConfig, InfraError> {
    let path = config_dir.join(PLANNER_JSON);
    let raw = read_config(&path)?;
    let file: PlannerFile = serde_json::from_value(raw).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid {}: {error}", path.display()))
    })?;
    let config = PlannerConfig::from(file);
    config
        .validate()
        .map_err(|message| InfraError::InvalidConfig(format!("{message} in {}", path.display())))?;
    Ok(config)
}

pub fn read_log_level(config_dir: &Path) -> Result<String, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let level = app
        .get("logLevel")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_LOG_LEVEL);
    Ok(level.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_CONFIG_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_CONFIG_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "dayplan-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp config dir");
            Self { path }
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn defaults_are_written_and_loaded() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");

        let config = load_planner_config(&dir.path).expect("load planner config");
        assert_eq!(config, PlannerConfig::default());
        assert_eq!(read_log_level(&dir.path).expect("log level"), "info");
        assert!(load_configs(&dir.path).is_ok());
    }

    #[test]
    fn existing_files_are_not_overwritten() {
        let dir = TempConfigDir::new();
        fs::write(
            dir.path.join(PLANNER_JSON),
            r#"{
                "schema": 1,
                "timeBlocks": {"morningStartHour": 6, "afternoonStartHour": 13, "eveningStartHour": 19},
                "dailyQuotaMinutes": 300,
                "resize": {"stepMinutes": 10, "minDurationMinutes": 20},
                "blockCapacity": {"morning": 2}
            }"#,
        )
        .expect("write planner config");
        ensure_default_configs(&dir.path).expect("write defaults");

        let config = load_planner_config(&dir.path).expect("load planner config");
        assert_eq!(config.boundaries.afternoon_start_hour, 13);
        assert_eq!(config.daily_quota_minutes, 300);
        assert_eq!(config.resize.step_minutes, 10);
        assert_eq!(config.capacity.morning, Some(2));
        assert_eq!(config.capacity.evening, None);
        assert_eq!(config.default_duration_minutes, 30);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = TempConfigDir::new();
        fs::write(dir.path.join(PLANNER_JSON), r#"{"schema": 2}"#).expect("write config");
        match load_planner_config(&dir.path) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("unsupported schema")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn inconsistent_boundaries_are_rejected() {
        let dir = TempConfigDir::new();
        fs::write(
            dir.path.join(PLANNER_JSON),
            r#"{
                "schema": 1,
                "timeBlocks": {"morningStartHour": 8, "afternoonStartHour": 20, "eveningStartHour": 17},
                "dailyQuotaMinutes": 300,
                "resize": {"stepMinutes": 15, "minDurationMinutes": 15}
            }"#,
        )
        .expect("write planner config");
        assert!(matches!(
            load_planner_config(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));
    }
}
