//! Service configuration management
//!
//! Values are layered: built-in defaults, then an optional TOML/JSON/YAML
//! file, then `LEAGUE_COLLECTOR__*` environment variables with `__` between
//! nested keys (`LEAGUE_COLLECTOR__COLLECTOR__LEAGUE_ID=42`).

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use league_collector::CollectorConfig;
use persistence::PersistenceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "LEAGUE_COLLECTOR";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Collector configuration
    pub collector: CollectorConfig,

    /// Persistence configuration
    pub persistence: PersistenceConfig,

    /// Service-level configuration
    pub service: ServiceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Where the run report is written; defaults to `report.json` in the data directory
    pub report_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,

    /// Log file path (if None, logs to stdout)
    pub file: Option<PathBuf>,

    /// Rotate the log file daily
    pub rotation: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string(), file: None, rotation: true }
    }
}

impl ServiceConfig {
    /// Path of the run report
    pub fn report_path(&self) -> PathBuf {
        self.service
            .report_file
            .clone()
            .unwrap_or_else(|| self.persistence.data_dir.join("report.json"))
    }
}

/// Load configuration from `file` (if any) and the environment
pub fn load_config(file: Option<&Path>) -> Result<ServiceConfig> {
    load_with_prefix(file, ENV_PREFIX)
}

fn load_with_prefix(file: Option<&Path>, prefix: &str) -> Result<ServiceConfig> {
    let mut builder = Config::builder();

    if let Some(path) = file {
        if !path.exists() {
            bail!("configuration file {} does not exist", path.display());
        }
        tracing::debug!("Loading configuration from file: {:?}", path);
        builder = builder.add_source(File::from(path));
    }

    builder = builder.add_source(
        Environment::with_prefix(prefix).prefix_separator("__").separator("__").try_parsing(true),
    );

    let mut config: ServiceConfig = builder
        .build()
        .context("Failed to read configuration sources")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    config.collector.apply_env_overrides();
    validate_config(&config)?;

    Ok(config)
}

/// Validate everything except the league, which may still come from the command line
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    config.persistence.validate().map_err(anyhow::Error::msg)?;

    match config.logging.format.as_str() {
        "json" | "pretty" | "compact" => {}
        other => bail!("unsupported log format {other:?}"),
    }

    if config.collector.retry.max_attempts == 0 {
        bail!("collector.retry.max_attempts must be greater than 0");
    }

    if config.collector.sharding.enabled && config.collector.sharding.max_sessions == 0 {
        bail!("collector.sharding.max_sessions must be greater than 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use league_collector::config::AutomationBackend;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_sources() {
        let config = load_with_prefix(None, "LEAGUE_COLLECTOR_TEST_EMPTY").unwrap();
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.collector.retry.max_attempts, 3);
        assert_eq!(config.report_path(), PathBuf::from("./data/report.json"));
    }

    #[test]
    fn test_file_values_are_applied() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("collector.toml");
        std::fs::write(
            &path,
            r#"
[collector]
league_id = "1234567"
seasons = { first = 2015, last = 2019 }

[collector.automation]
backend = "html"

[collector.sharding]
enabled = true
max_sessions = 2

[persistence]
data_dir = "/var/lib/league-collector"

[logging]
format = "json"
"#,
        )
        .unwrap();

        let config = load_with_prefix(Some(&path), "LEAGUE_COLLECTOR_TEST_FILE").unwrap();
        assert_eq!(config.collector.league_id, "1234567");
        assert_eq!(config.collector.seasons.first, Some(2015));
        assert_eq!(config.collector.seasons.last, Some(2019));
        assert_eq!(config.collector.automation.backend, AutomationBackend::Html);
        assert!(config.collector.sharding.enabled);
        assert_eq!(config.report_path(), PathBuf::from("/var/lib/league-collector/report.json"));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_environment_overrides_nested_keys() {
        std::env::set_var("LEAGUE_COLLECTOR_TEST_ENV__COLLECTOR__LEAGUE_ID", "987");
        std::env::set_var("LEAGUE_COLLECTOR_TEST_ENV__COLLECTOR__RETRY__MAX_ATTEMPTS", "5");

        let config = load_with_prefix(None, "LEAGUE_COLLECTOR_TEST_ENV").unwrap();
        assert_eq!(config.collector.league_id, "987");
        assert_eq!(config.collector.retry.max_attempts, 5);
    }

    #[test]
    fn test_example_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("collector.example.toml");
        let config = load_with_prefix(Some(&path), "LEAGUE_COLLECTOR_TEST_EXAMPLE").unwrap();

        assert_eq!(config.collector.league_id, "1234567");
        assert!(config.collector.credentials.is_none());
        assert_eq!(config.collector.retry.max_attempts, 3);
        assert_eq!(config.collector.pacing.min_page_interval_ms, 1_500);
        assert_eq!(config.persistence.journal.compact_after_entries, 2_000);
    }

    #[test]
    fn test_missing_file_and_bad_format_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(load_with_prefix(Some(&dir.path().join("absent.toml")), "LEAGUE_COLLECTOR_TEST_MISSING").is_err());

        let mut config = ServiceConfig::default();
        config.logging.format = "xml".to_string();
        assert!(validate_config(&config).is_err());
    }
}
