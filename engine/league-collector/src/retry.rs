//! Retry/backoff controller
//!
//! Every crawl step runs under a [`RetryController`]. Each attempt is bounded
//! by a hard timeout; failures are classified and either retried with
//! exponential backoff plus jitter, escalated, or surfaced immediately.

use crate::error::{
    ExtractionError, FailureReason, FatalStepError, NavigationError, StepError,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum attempts per step, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds
    pub base_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds
    pub max_delay_ms: u64,

    /// Backoff multiplier
    pub multiplier: f64,

    /// Jitter as a fraction of the computed delay (0.2 = ±20%)
    pub jitter: f64,

    /// Hard timeout for a single attempt in milliseconds
    pub attempt_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: 0.2,
            attempt_timeout_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Validate the policy
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if self.multiplier < 1.0 {
            return Err("retry.multiplier must be at least 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("retry.jitter must be within 0.0..=1.0".to_string());
        }
        if self.attempt_timeout_ms == 0 {
            return Err("retry.attempt_timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Get attempt timeout as Duration
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn backoff_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let raw = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);

        let jittered = if self.jitter > 0.0 {
            capped * (1.0 + rng.gen_range(-self.jitter..=self.jitter))
        } else {
            capped
        };

        Duration::from_millis(jittered.clamp(0.0, self.max_delay_ms as f64) as u64)
    }
}

/// How the controller treats a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; retry, and on exhaustion fail with a non-fatal reason
    Retryable,
    /// Possibly transient; retry, and on exhaustion fail with a fatal reason
    Escalating,
    /// Never retried
    Fatal,
    /// Abort the whole run
    Abort,
}

/// Classify a step error
pub fn classify(err: &StepError) -> ErrorClass {
    match err {
        StepError::Connection(_) => ErrorClass::Abort,
        StepError::Navigation(NavigationError::ElementNotFound { .. })
        | StepError::Navigation(NavigationError::Timeout { .. })
        | StepError::Navigation(NavigationError::Driver { .. })
        | StepError::Timeout(_) => ErrorClass::Retryable,
        StepError::Extraction(ExtractionError::MissingSelector { .. })
        | StepError::Extraction(ExtractionError::UnexpectedLayout { .. }) => {
            ErrorClass::Escalating
        }
        StepError::Extraction(ExtractionError::Driver { .. }) => ErrorClass::Retryable,
        StepError::Validation(_) => ErrorClass::Fatal,
        StepError::Storage(e) if e.is_transient() => ErrorClass::Retryable,
        StepError::Storage(_) => ErrorClass::Fatal,
    }
}

/// Final outcome of a step that did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    /// The step gave up; the target is marked `Failed`
    Failed(FatalStepError),
    /// The automation connection is gone; the run must stop
    Aborted(String),
}

/// One retryable unit of work
#[async_trait::async_trait]
pub trait Step: Send {
    type Output: Send;

    /// Run attempt number `attempt` (1-based)
    async fn attempt(&mut self, attempt: u32) -> Result<Self::Output, StepError>;
}

struct FnStep<F>(F);

#[async_trait::async_trait]
impl<T, F, Fut> Step for FnStep<F>
where
    T: Send,
    F: FnMut(u32) -> Fut + Send,
    Fut: Future<Output = Result<T, StepError>> + Send,
{
    type Output = T;

    async fn attempt(&mut self, attempt: u32) -> Result<T, StepError> {
        (self.0)(attempt).await
    }
}

/// Runs steps under a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `step` until it succeeds, fails fatally, or runs out of attempts
    pub async fn execute<S: Step>(&self, label: &str, step: &mut S) -> Result<S::Output, StepFailure> {
        let timeout = self.policy.attempt_timeout();
        let mut attempt = 1;

        loop {
            let result = match tokio::time::timeout(timeout, step.attempt(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(StepError::Timeout(timeout)),
            };

            let err = match result {
                Ok(output) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(output);
                }
                Err(err) => err,
            };

            let class = classify(&err);
            let reason = FailureReason::from(&err);

            match class {
                ErrorClass::Abort => {
                    warn!("{} aborted the run: {}", label, err);
                    return Err(StepFailure::Aborted(err.to_string()));
                }
                ErrorClass::Fatal => {
                    warn!("{} failed without retry: {}", label, err);
                    return Err(StepFailure::Failed(FatalStepError {
                        reason,
                        message: err.to_string(),
                        attempts: attempt,
                    }));
                }
                ErrorClass::Retryable | ErrorClass::Escalating => {
                    if attempt >= self.policy.max_attempts {
                        warn!("{} gave up after {} attempts: {}", label, attempt, err);
                        return Err(StepFailure::Failed(FatalStepError {
                            reason,
                            message: err.to_string(),
                            attempts: attempt,
                        }));
                    }

                    let delay = self.policy.backoff_delay(attempt, &mut rand::thread_rng());
                    warn!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        label, attempt, self.policy.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// [`execute`](Self::execute) for closures that do not borrow mutable state
    pub async fn execute_fn<T, F, Fut>(&self, label: &str, f: F) -> Result<T, StepFailure>
    where
        T: Send,
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = Result<T, StepError>> + Send,
    {
        self.execute(label, &mut FnStep(f)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DriverError, FieldKind, ValidationError};
    use rand::rngs::mock::StepRng;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            jitter: 0.0,
            attempt_timeout_ms: 50,
        }
    }

    fn nav_timeout() -> StepError {
        StepError::Navigation(NavigationError::Timeout { url: "https://site/week/7".to_string() })
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy { jitter: 0.0, ..RetryPolicy::default() };
        let mut rng = StepRng::new(0, 1);

        assert_eq!(policy.backoff_delay(1, &mut rng), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(2, &mut rng), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_delay(3, &mut rng), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_delay(20, &mut rng), Duration::from_millis(10_000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let delay = policy.backoff_delay(2, &mut rng).as_millis();
            assert!((800..=1_200).contains(&delay), "delay {delay} out of bounds");
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify(&nav_timeout()), ErrorClass::Retryable);
        assert_eq!(
            classify(&StepError::Extraction(ExtractionError::UnexpectedLayout {
                page: "roster".into(),
                detail: "no owner".into()
            })),
            ErrorClass::Escalating
        );
        assert_eq!(
            classify(&StepError::Validation(ValidationError::new(FieldKind::Score, "negative"))),
            ErrorClass::Fatal
        );
        assert_eq!(classify(&StepError::Connection("gone".into())), ErrorClass::Abort);
    }

    #[tokio::test]
    async fn test_validation_error_attempted_once() {
        let controller = RetryController::new(fast_policy());
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = controller
            .execute_fn("standings", move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(StepError::Validation(ValidationError::new(FieldKind::Rank, "duplicate rank 3")))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result {
            Err(StepFailure::Failed(err)) => {
                assert_eq!(err.reason, FailureReason::Validation);
                assert_eq!(err.attempts, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_write_fails_once_with_fatal_reason() {
        let controller = RetryController::new(fast_policy());
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = controller
            .execute_fn("team", move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(StepError::Storage(persistence::PersistenceError::InvalidOperation(
                        "store not initialized".into(),
                    )))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result {
            Err(StepFailure::Failed(err)) => {
                assert_eq!(err.reason, FailureReason::StorageRejected);
                assert!(crate::progress::Failure::from(err).fatal);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeouts_then_success() {
        let controller = RetryController::new(fast_policy());

        let result = controller
            .execute_fn("week 7", |attempt| async move {
                if attempt < 3 {
                    Err(nav_timeout())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn test_hung_attempt_hits_hard_timeout() {
        let controller = RetryController::new(fast_policy());

        let result = controller
            .execute_fn("hung", |attempt| async move {
                if attempt == 1 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok(attempt)
            })
            .await;

        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn test_layout_error_escalates_after_exhaustion() {
        let controller = RetryController::new(fast_policy());
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = controller
            .execute_fn("roster 5", move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(StepError::Extraction(ExtractionError::UnexpectedLayout {
                        page: "roster".into(),
                        detail: "owner missing".into(),
                    }))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(StepFailure::Failed(err)) => {
                assert_eq!(err.reason, FailureReason::UnexpectedLayout);
                assert!(err.reason.is_fatal());
                assert_eq!(err.attempts, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_loss_aborts_immediately() {
        let controller = RetryController::new(fast_policy());

        let result: Result<(), _> = controller
            .execute_fn("matchup", |_| async {
                Err(StepError::navigation(NavigationError::from_driver(
                    "https://site",
                    DriverError::Connection("session deleted".into()),
                )))
            })
            .await;

        assert!(matches!(result, Err(StepFailure::Aborted(_))));
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy { max_attempts: 0, ..RetryPolicy::default() }.validate().is_err());
        assert!(RetryPolicy { jitter: 1.5, ..RetryPolicy::default() }.validate().is_err());
    }
}
