//! # League Collector
//!
//! Collects the history of a fantasy football league by driving a browser
//! through the league site: seasons, final and regular standings, team
//! rosters, weekly schedules and full matchup box scores.
//!
//! ## Architecture
//!
//! - **Session**: Exclusive owner of one automation connection
//! - **Pages**: Page adapters that navigate and read raw values
//! - **Extraction**: Raw values to validated records
//! - **Planner**: Depth-first crawl over lazily discovered targets
//! - **Retry**: Classification-driven bounded retry with backoff
//! - **Progress**: Journaled per-target status for resumable runs
//! - **Coordinator**: Single-session or per-season sharded runs
//!
//! ## Usage
//!
//! ```rust,no_run
//! use league_collector::{CollectorConfig, Coordinator, WebDriverConnector};
//! use persistence::{create_local_store, PersistenceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = CollectorConfig::for_league("1234567");
//!     config.apply_env_overrides();
//!
//!     let persistence = PersistenceConfig::new("./data");
//!     let sink = Arc::new(create_local_store("./data")?);
//!     let coordinator =
//!         Coordinator::new(config, Arc::new(WebDriverConnector), sink, persistence)?;
//!
//!     let report = coordinator.run().await?;
//!     std::process::exit(report.exit_code());
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod extraction;
pub mod html;
pub mod pages;
pub mod planner;
pub mod progress;
pub mod report;
pub mod retry;
pub mod session;
pub mod site;
pub mod target;
pub mod types;
pub mod webdriver;
pub mod writer;

#[cfg(test)]
mod test_support;


pub use config::{
    AutomationBackend, AutomationConfig, CollectorConfig, Credentials, PacingConfig, SeasonRange,
    SelectorConfig, ShardingConfig, SiteConfig,
};
pub use coordinator::Coordinator;
pub use error::{
    CollectorError, DriverError, ExtractionError, FailureReason, FatalStepError, FieldKind,
    NavigationError, Result, StepError, ValidationError,
};
pub use html::{HtmlAutomation, HtmlConnector, HttpPageSource, PageSource};
pub use pages::{Page, PageObject, PageShape, RawPageData};
pub use planner::{Expansion, Planner};
pub use progress::{CrawlProgress, Failure, ProgressEntry, TargetStatus};
pub use report::{FailedTarget, KindCounts, RunReport};
pub use retry::{RetryController, RetryPolicy, Step, StepFailure};
pub use session::{with_session, Automation, Connector, ElementHandle, Session, SessionState};
pub use site::SiteMap;
pub use target::{CrawlTarget, TargetKey, TargetKind};
pub use types::DomainRecord;
pub use webdriver::{WebDriverClient, WebDriverConnector};
pub use writer::RecordWriter;
