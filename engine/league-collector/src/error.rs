//! Error taxonomy for the collector
//!
//! Errors are layered the way a crawl step fails: the automation driver,
//! page navigation, raw extraction, and record validation. [`StepError`]
//! joins them for the retry controller, which classifies each variant.

use persistence::PersistenceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for run-level operations
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Errors reported by an automation backend
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    #[error("cannot reach automation endpoint: {0}")]
    Connection(String),

    #[error("driver command timed out: {0}")]
    Timeout(String),

    #[error("no element matches selector {selector:?}")]
    NoSuchElement { selector: String },

    #[error("element handle {0} is stale")]
    StaleElement(String),

    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("operation not supported by this backend: {0}")]
    Unsupported(String),

    #[error("driver protocol error: {0}")]
    Protocol(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for DriverError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// Failure to reach the page a target needs
#[derive(Error, Debug, Clone)]
pub enum NavigationError {
    #[error("page {url} never showed {selector:?}")]
    ElementNotFound { url: String, selector: String },

    #[error("navigation to {url} timed out")]
    Timeout { url: String },

    #[error("driver failed while navigating to {url}: {source}")]
    Driver { url: String, source: DriverError },
}

impl NavigationError {
    pub fn from_driver(url: impl Into<String>, err: DriverError) -> Self {
        let url = url.into();
        match err {
            DriverError::Timeout(_) => Self::Timeout { url },
            DriverError::NoSuchElement { selector } => Self::ElementNotFound { url, selector },
            source => Self::Driver { url, source },
        }
    }
}

/// The page loaded but did not have the structure an adapter expects
#[derive(Error, Debug, Clone)]
pub enum ExtractionError {
    #[error("{page}: container {selector:?} is missing")]
    MissingSelector { page: String, selector: String },

    #[error("{page}: unexpected layout, {detail}")]
    UnexpectedLayout { page: String, detail: String },

    #[error("{page}: driver failed during extraction: {source}")]
    Driver { page: String, source: DriverError },
}

/// Kind of field a validation rule rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    PageShape,
    Identifier,
    Text,
    Score,
    Points,
    Record,
    Rank,
    Place,
    Season,
    Week,
    Matchup,
    Manager,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PageShape => "page shape",
            Self::Identifier => "identifier",
            Self::Text => "text",
            Self::Score => "score",
            Self::Points => "points",
            Self::Record => "record",
            Self::Rank => "rank",
            Self::Place => "place",
            Self::Season => "season",
            Self::Week => "week",
            Self::Matchup => "matchup",
            Self::Manager => "manager",
        };
        f.write_str(name)
    }
}

/// Extracted data that cannot be turned into a valid record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: FieldKind,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: FieldKind, reason: impl Into<String>) -> Self {
        Self { field, reason: reason.into() }
    }
}

/// Any failure of a single navigate/extract/parse/persist step
#[derive(Error, Debug)]
pub enum StepError {
    /// The automation connection is gone; the run cannot continue
    #[error("connection lost: {0}")]
    Connection(String),

    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("attempt exceeded {0:?}")]
    Timeout(std::time::Duration),

    #[error("storage error: {0}")]
    Storage(#[from] PersistenceError),
}

impl StepError {
    /// Lift a navigation error, surfacing a lost connection as run-fatal
    pub fn navigation(err: NavigationError) -> Self {
        match err {
            NavigationError::Driver { source: DriverError::Connection(msg), .. } => {
                Self::Connection(msg)
            }
            other => Self::Navigation(other),
        }
    }

    /// Lift an extraction error, surfacing a lost connection as run-fatal
    pub fn extraction(err: ExtractionError) -> Self {
        match err {
            ExtractionError::Driver { source: DriverError::Connection(msg), .. } => {
                Self::Connection(msg)
            }
            other => Self::Extraction(other),
        }
    }
}

/// Why a target ended up `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    ElementNotFound,
    Driver,
    MissingSelector,
    UnexpectedLayout,
    Validation,
    /// Transient storage failure, retried by later runs
    Storage,
    /// The record could not be stored at all
    StorageRejected,
}

impl FailureReason {
    /// Fatal reasons need human attention and are not retried by later runs
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::MissingSelector | Self::UnexpectedLayout | Self::Validation | Self::StorageRejected
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::ElementNotFound => "element_not_found",
            Self::Driver => "driver",
            Self::MissingSelector => "missing_selector",
            Self::UnexpectedLayout => "unexpected_layout",
            Self::Validation => "validation",
            Self::Storage => "storage",
            Self::StorageRejected => "storage_rejected",
        };
        f.write_str(name)
    }
}

impl From<&StepError> for FailureReason {
    fn from(err: &StepError) -> Self {
        match err {
            StepError::Connection(_) => Self::Driver,
            StepError::Navigation(NavigationError::ElementNotFound { .. }) => Self::ElementNotFound,
            StepError::Navigation(NavigationError::Timeout { .. }) | StepError::Timeout(_) => {
                Self::Timeout
            }
            StepError::Navigation(NavigationError::Driver { .. }) => Self::Driver,
            StepError::Extraction(ExtractionError::MissingSelector { .. }) => Self::MissingSelector,
            StepError::Extraction(ExtractionError::UnexpectedLayout { .. }) => {
                Self::UnexpectedLayout
            }
            StepError::Extraction(ExtractionError::Driver { .. }) => Self::Driver,
            StepError::Validation(_) => Self::Validation,
            StepError::Storage(e) if e.is_transient() => Self::Storage,
            StepError::Storage(_) => Self::StorageRejected,
        }
    }
}

/// A step that the retry controller gave up on
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason} after {attempts} attempt(s): {message}")]
pub struct FatalStepError {
    pub reason: FailureReason,
    pub message: String,
    pub attempts: u32,
}

/// Run-level errors
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Session could not be established or was lost; aborts the run
    #[error("connection error: {0}")]
    Connection(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CollectorError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_timeout_maps_to_navigation_timeout() {
        let err = NavigationError::from_driver("https://x/y", DriverError::Timeout("30s".into()));
        assert!(matches!(err, NavigationError::Timeout { .. }));
        assert_eq!(FailureReason::from(&StepError::navigation(err)), FailureReason::Timeout);
    }

    #[test]
    fn test_lost_connection_is_lifted() {
        let err = NavigationError::from_driver("u", DriverError::Connection("refused".into()));
        assert!(matches!(StepError::navigation(err), StepError::Connection(_)));

        let err = ExtractionError::Driver {
            page: "roster".into(),
            source: DriverError::Connection("reset".into()),
        };
        assert!(matches!(StepError::extraction(err), StepError::Connection(_)));
    }

    #[test]
    fn test_fatal_reasons() {
        assert!(FailureReason::UnexpectedLayout.is_fatal());
        assert!(FailureReason::Validation.is_fatal());
        assert!(!FailureReason::Timeout.is_fatal());
        assert!(!FailureReason::Storage.is_fatal());
        assert!(FailureReason::StorageRejected.is_fatal());
    }

    #[test]
    fn test_storage_reason_follows_transience() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = StepError::Storage(persistence::PersistenceError::from(io));
        assert_eq!(FailureReason::from(&err), FailureReason::Storage);

        let err = StepError::Storage(persistence::PersistenceError::InvalidOperation("not initialized".into()));
        assert_eq!(FailureReason::from(&err), FailureReason::StorageRejected);
        assert!(FailureReason::from(&err).is_fatal());
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new(FieldKind::Score, "negative value -3");
        assert_eq!(err.to_string(), "invalid score: negative value -3");
    }
}
