//! Configuration for the timeout migrator
//!
//! Loaded from an optional TOML file; every field has a default so an empty file
//! (or no file at all) is a valid configuration.
//!
//! ```toml
//! [migration]
//! batch_size = 1000
//! imminent_timeout_window_secs = 14400
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [local]
//! max_staging_operations = 100
//! max_staging_bytes = 4194304
//! max_delay_secs = 31536000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::chunking::ChunkLimits;
use crate::error::{MigrationError, Result};
use crate::preview::DEFAULT_IMMINENT_WINDOW;

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MigratorConfig {
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub local: LocalAdapterConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrationConfig {
    /// Number of timeouts per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Warn about timeouts due within this many seconds during preview
    #[serde(default = "default_imminent_window_secs")]
    pub imminent_timeout_window_secs: u64,
    /// Continue an ongoing migration despite changed run parameters
    #[serde(default)]
    pub force: bool,
}

fn default_batch_size() -> usize {
    1000
}

/// Ten years; anything longer flags every timeout anyway
pub const MAX_IMMINENT_WINDOW_SECS: u64 = 10 * 365 * 24 * 3600;

fn default_imminent_window_secs() -> u64 {
    DEFAULT_IMMINENT_WINDOW.as_secs()
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            imminent_timeout_window_secs: default_imminent_window_secs(),
            force: false,
        }
    }
}

impl MigrationConfig {
    pub fn imminent_window(&self) -> Duration {
        Duration::from_secs(self.imminent_timeout_window_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Settings of the file-backed reference adapters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalAdapterConfig {
    #[serde(default = "default_max_staging_operations")]
    pub max_staging_operations: usize,
    #[serde(default = "default_max_staging_bytes")]
    pub max_staging_bytes: usize,
    /// Longest delay the target accepts, if limited
    #[serde(default)]
    pub max_delay_secs: Option<u64>,
}

fn default_max_staging_operations() -> usize {
    ChunkLimits::DEFAULT_MAX_OPERATIONS
}

fn default_max_staging_bytes() -> usize {
    ChunkLimits::DEFAULT_MAX_BYTES
}

impl Default for LocalAdapterConfig {
    fn default() -> Self {
        Self {
            max_staging_operations: default_max_staging_operations(),
            max_staging_bytes: default_max_staging_bytes(),
            max_delay_secs: None,
        }
    }
}

impl LocalAdapterConfig {
    pub fn chunk_limits(&self) -> ChunkLimits {
        ChunkLimits::new(self.max_staging_operations, self.max_staging_bytes)
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay_secs.map(Duration::from_secs)
    }
}

impl MigratorConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MigratorConfig = toml::from_str(&content).map_err(|e| {
            MigrationError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.migration.batch_size == 0 {
            return Err(MigrationError::Config(
                "migration.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.migration.imminent_timeout_window_secs > MAX_IMMINENT_WINDOW_SECS {
            return Err(MigrationError::Config(format!(
                "migration.imminent_timeout_window_secs must be at most {}",
                MAX_IMMINENT_WINDOW_SECS
            )));
        }
        if self.local.max_staging_operations == 0 || self.local.max_staging_bytes == 0 {
            return Err(MigrationError::Config(
                "local staging limits must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = MigratorConfig::default();
        assert_eq!(config.migration.batch_size, 1000);
        assert_eq!(config.migration.imminent_window(), Duration::from_secs(4 * 3600));
        assert!(!config.migration.force);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.local.chunk_limits(), ChunkLimits::default());
        assert!(config.local.max_delay().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: MigratorConfig = toml::from_str(
            r#"
[migration]
batch_size = 250

[logging]
format = "json"
"#,
        )
        .unwrap();
        assert_eq!(config.migration.batch_size, 250);
        assert_eq!(config.migration.imminent_timeout_window_secs, 14400);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_rejects_zero_batch_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("migrator.toml");
        std::fs::write(&path, "[migration]\nbatch_size = 0\n").unwrap();

        let err = MigratorConfig::load(&path).unwrap_err();
        assert!(matches!(err, MigrationError::Config(_)));
    }

    #[test]
    fn test_rejects_unbounded_imminent_window() {
        let mut config = MigratorConfig::default();
        config.migration.imminent_timeout_window_secs = MAX_IMMINENT_WINDOW_SECS;
        assert!(config.validate().is_ok());

        config.migration.imminent_timeout_window_secs = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("imminent_timeout_window_secs"));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let config = MigratorConfig::load_or_default(None).unwrap();
        assert_eq!(config.migration.batch_size, 1000);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[migration\n").unwrap();

        let err = MigratorConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }
}
