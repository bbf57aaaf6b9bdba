//! Service wiring
//!
//! Builds the connector, record store and coordinator from a
//! [`ServiceConfig`], runs one collection pass and writes the report.

use anyhow::{Context, Result};
use league_collector::config::AutomationBackend;
use league_collector::{Connector, Coordinator, HtmlConnector, RunReport, WebDriverConnector};
use persistence::{create_local_store_with_config, RecordSink};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServiceConfig;

/// One collector run built from service configuration
pub struct CollectorService {
    config: ServiceConfig,
    coordinator: Coordinator,
}

impl CollectorService {
    /// Wire the service with the connector for the configured backend
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let connector: Arc<dyn Connector> = match config.collector.automation.backend {
            AutomationBackend::WebDriver => Arc::new(WebDriverConnector),
            AutomationBackend::Html => Arc::new(HtmlConnector),
        };
        Self::with_connector(config, connector)
    }

    /// Wire the service with a given connector
    pub fn with_connector(config: ServiceConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let store = create_local_store_with_config(config.persistence.clone())
            .context("Failed to create record store")?;
        let sink: Arc<dyn RecordSink> = Arc::new(store);

        let coordinator = Coordinator::new(
            config.collector.clone(),
            connector,
            sink,
            config.persistence.clone(),
        )
        .context("Invalid collector configuration")?;

        Ok(Self { config, coordinator })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Token that stops the run at the next target boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.coordinator.cancellation_token()
    }

    /// Run the collector and write the report
    pub async fn run(&self) -> Result<RunReport> {
        info!(
            "Collecting league {} into {}",
            self.config.collector.league_id,
            self.config.persistence.data_dir.display()
        );

        let report = self.coordinator.run().await.context("Collection aborted")?;

        let path = self.config.report_path();
        write_report(&report, &path)?;
        info!(
            "Run finished: {} done ({} collected, {} skipped), {} failed, {} pending; report at {}",
            report.done,
            report.collected,
            report.skipped,
            report.failed.len(),
            report.pending,
            path.display()
        );
        for failed in &report.failed {
            warn!(
                "Failed {} ({:?}) after {} attempt(s): {}",
                failed.target, failed.reason, failed.attempts, failed.message
            );
        }

        Ok(report)
    }
}

/// Write `report` as pretty JSON, replacing any previous report
pub fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(report).context("Failed to serialize run report")?;
    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, json).with_context(|| format!("Failed to write {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path).with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service_config(dir: &TempDir) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.collector.league_id = "42".to_string();
        config.persistence.data_dir = dir.path().join("data");
        config
    }

    #[test]
    fn test_missing_league_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = service_config(&dir);
        config.collector.league_id.clear();

        assert!(CollectorService::new(config).is_err());
    }

    #[test]
    fn test_report_is_written_as_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("report.json");
        let report = RunReport::start().finish();

        write_report(&report, &path).unwrap();

        let written: RunReport = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written.exit_code(), 0);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_unreachable_driver_fails_run() {
        let dir = TempDir::new().unwrap();
        let mut config = service_config(&dir);
        config.collector.automation.endpoint = "http://127.0.0.1:9".to_string();
        config.collector.automation.command_timeout_ms = 2_000;

        let service = CollectorService::new(config).unwrap();
        assert!(service.run().await.is_err());
        assert!(!dir.path().join("data").join("report.json").exists());
    }
}
