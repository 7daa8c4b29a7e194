use crate::infrastructure::error::InfraError;
use tracing_subscriber::EnvFilter;

const SUPPORTED_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `level`. A subscriber installed earlier
/// (by the host application or a previous call) is left in place.
pub fn init_tracing(level: &str) -> Result<(), InfraError> {
    let level = normalize_level(level)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}

fn normalize_level(level: &str) -> Result<&'static str, InfraError> {
    let normalized = level.trim().to_ascii_lowercase();
    SUPPORTED_LEVELS
        .iter()
        .find(|candidate| **candidate == normalized)
        .copied()
        .ok_or_else(|| InfraError::InvalidConfig(format!("unsupported log level: {level}")))
}
