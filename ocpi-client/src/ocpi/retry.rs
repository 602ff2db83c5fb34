//! Transmission loop with retransmission classification
//!
//! Runs one logical remote call as up to `max_number_of_retries + 1` sequential
//! attempts. After each attempt the loop stops when:
//! - the attempt succeeded
//! - the failure is not a reason for retransmission
//! - the budget is exhausted
//!
//! Every attempt runs under the call's timeout and races its cancellation
//! token. A panicking attempt is recorded as a failed attempt.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{self, FutureExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::messages::{OcpiError, TransportError};

const DEFAULT_MAX_NUMBER_OF_RETRIES: u32 = 3;

/// HTTP statuses treated as transient by default
const DEFAULT_RETRANSMIT_HTTP_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Delay before attempt `n` (1-based for retries; never called for the first attempt)
pub type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Retransmission policy for one client
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_number_of_retries: u32,
    /// HTTP statuses that warrant another attempt
    pub retransmit_http_statuses: Vec<u16>,
    /// OCPI status codes that warrant another attempt
    pub retransmit_status_codes: Vec<u16>,
    delay: Option<DelayFn>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_number_of_retries: DEFAULT_MAX_NUMBER_OF_RETRIES,
            retransmit_http_statuses: DEFAULT_RETRANSMIT_HTTP_STATUSES.to_vec(),
            retransmit_status_codes: Vec::new(),
            delay: None,
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_number_of_retries", &self.max_number_of_retries)
            .field("retransmit_http_statuses", &self.retransmit_http_statuses)
            .field("retransmit_status_codes", &self.retransmit_status_codes)
            .field("delay", &self.delay.is_some())
            .finish()
    }
}

impl RetryPolicy {
    /// Single attempt, no retransmission
    pub fn no_retry() -> Self {
        Self {
            max_number_of_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_number_of_retries = retries;
        self
    }

    /// Custom delay between attempts
    pub fn with_delay(mut self, delay: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Some(Arc::new(delay));
        self
    }

    /// Exponential backoff: `initial * 2^(n-1)`, capped at `max`
    pub fn with_backoff(self, initial: Duration, max: Duration) -> Self {
        self.with_delay(move |retry| {
            let factor = 1u32 << retry.saturating_sub(1).min(16);
            initial.saturating_mul(factor).min(max)
        })
    }

    pub fn with_retransmit_status_codes(mut self, codes: impl Into<Vec<u16>>) -> Self {
        self.retransmit_status_codes = codes.into();
        self
    }

    pub fn with_retransmit_http_statuses(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.retransmit_http_statuses = statuses.into();
        self
    }

    /// Total number of attempts a call may make
    pub fn max_attempts(&self) -> u32 {
        self.max_number_of_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1 = first retry)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        match &self.delay {
            Some(delay) => delay(retry),
            None => Duration::ZERO,
        }
    }

    /// Whether a failed attempt should be followed by another one
    pub fn is_reason_for_retransmission(&self, error: &OcpiError) -> bool {
        match error {
            OcpiError::Transport(_) | OcpiError::Panicked(_) => true,
            OcpiError::Http { status, .. } => self.retransmit_http_statuses.contains(status),
            OcpiError::Protocol { code, .. } => self.retransmit_status_codes.contains(code),
            OcpiError::Resolution(_)
            | OcpiError::Validation(_)
            | OcpiError::Cancelled
            | OcpiError::Decode(_)
            | OcpiError::MissingData
            | OcpiError::Store(_)
            | OcpiError::Uncommitted { .. }
            | OcpiError::InvalidUrl(_) => false,
        }
    }
}

/// Outcome of a transmission
#[derive(Debug)]
pub enum RetryResult<T> {
    /// An attempt succeeded
    Success { value: T, attempts: u32 },
    /// Stopped on a terminal failure
    Failure { error: OcpiError, attempts: u32 },
    /// Every attempt failed with a retransmittable error
    Exhausted { last_error: OcpiError, attempts: u32 },
}

impl<T> RetryResult<T> {
    pub fn into_result(self) -> Result<T, OcpiError> {
        match self {
            RetryResult::Success { value, .. } => Ok(value),
            RetryResult::Failure { error, .. } => Err(error),
            RetryResult::Exhausted { last_error, .. } => Err(last_error),
        }
    }

    /// Number of attempts actually started
    pub fn attempts(&self) -> u32 {
        match self {
            RetryResult::Success { attempts, .. }
            | RetryResult::Failure { attempts, .. }
            | RetryResult::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success { .. })
    }
}

/// Run `attempt` under `policy`.
///
/// `attempt` receives the zero-based attempt number and is invoked at most
/// `policy.max_attempts()` times, strictly one after another.
pub async fn transmit<T, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    cancel: &CancellationToken,
    mut attempt: F,
) -> RetryResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, OcpiError>>,
{
    let max_attempts = policy.max_attempts();
    let mut number = 0u32;

    loop {
        if cancel.is_cancelled() {
            return RetryResult::Failure {
                error: OcpiError::Cancelled,
                attempts: number,
            };
        }

        if number > 0 {
            let delay = policy.delay_for_retry(number);
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return RetryResult::Failure {
                            error: OcpiError::Cancelled,
                            attempts: number,
                        };
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        // Building the attempt future may panic as well as polling it
        let current = number;
        let build = &mut attempt;
        let guarded = AssertUnwindSafe(future::lazy(move |_| build(current)).flatten()).catch_unwind();
        number += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Attempt {}/{} cancelled", number, max_attempts);
                return RetryResult::Failure {
                    error: OcpiError::Cancelled,
                    attempts: number,
                };
            }
            finished = tokio::time::timeout(timeout, guarded) => match finished {
                Ok(Ok(result)) => result,
                Ok(Err(panic)) => Err(OcpiError::Panicked(panic_message(panic.as_ref()))),
                Err(_) => Err(OcpiError::Transport(TransportError::timeout(timeout))),
            },
        };

        let error = match outcome {
            Ok(value) => {
                return RetryResult::Success {
                    value,
                    attempts: number,
                }
            }
            Err(error) => error,
        };

        if !policy.is_reason_for_retransmission(&error) {
            debug!("Attempt {}/{} failed terminally: {}", number, max_attempts, error);
            return RetryResult::Failure {
                error,
                attempts: number,
            };
        }

        if number >= max_attempts {
            warn!("Giving up after {} attempts: {}", number, error);
            return RetryResult::Exhausted {
                last_error: error,
                attempts: number,
            };
        }

        debug!("Attempt {}/{} failed, retransmitting: {}", number, max_attempts, error);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocpi::messages::{status, TransportErrorKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transport_failure() -> OcpiError {
        OcpiError::Transport(TransportError::new(TransportErrorKind::Connect, "connection reset"))
    }

    #[tokio::test]
    async fn test_retry_bound() {
        let policy = RetryPolicy::default().with_max_retries(4);
        let calls = AtomicU32::new(0);

        let result: RetryResult<()> = transmit(&policy, Duration::from_secs(1), &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transport_failure()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(result.attempts(), 5);
        assert!(matches!(result, RetryResult::Exhausted { .. }));
    }

    #[tokio::test]
    async fn test_no_retry_on_client_error() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: RetryResult<()> = transmit(&policy, Duration::from_secs(1), &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(OcpiError::Protocol {
                    code: status::CLIENT_ERROR,
                    message: "Generic client error".into(),
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result {
            RetryResult::Failure { error, attempts } => {
                assert_eq!(attempts, 1);
                assert_eq!(error.status_code(), Some(2000));
            }
            other => panic!("Expected terminal failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();

        let result = transmit(&policy, Duration::from_secs(1), &CancellationToken::new(), |n| async move {
            if n < 2 {
                Err(OcpiError::Http {
                    status: 503,
                    status_code: None,
                    message: "Service Unavailable".into(),
                })
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.attempts(), 3);
        assert_eq!(result.into_result().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_http_client_error_not_retried() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: RetryResult<()> = transmit(&policy, Duration::from_secs(1), &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(OcpiError::Http {
                    status: 401,
                    status_code: None,
                    message: "Unauthorized".into(),
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_configured_status_code_retried() {
        let policy = RetryPolicy::default()
            .with_max_retries(1)
            .with_retransmit_status_codes(vec![status::SERVER_ERROR]);
        let calls = AtomicU32::new(0);

        let result: RetryResult<()> = transmit(&policy, Duration::from_secs(1), &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(OcpiError::Protocol {
                    code: status::SERVER_ERROR,
                    message: "Generic server error".into(),
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(result, RetryResult::Exhausted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_retried() {
        let policy = RetryPolicy::default().with_max_retries(2);

        let result = transmit(&policy, Duration::from_millis(20), &CancellationToken::new(), |n| async move {
            if n == 0 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(n)
        })
        .await;

        assert_eq!(result.attempts(), 2);
        assert_eq!(result.into_result().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_timeout_surfaces_when_exhausted() {
        let policy = RetryPolicy::no_retry();

        let result: RetryResult<()> = transmit(&policy, Duration::from_millis(10), &CancellationToken::new(), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result.into_result() {
            Err(OcpiError::Transport(e)) => assert_eq!(e.kind, TransportErrorKind::Timeout),
            other => panic!("Expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancellation_not_retried() {
        let policy = RetryPolicy::default().with_max_retries(5);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let trigger = cancel.clone();
        let result: RetryResult<()> = transmit(&policy, Duration::from_secs(10), &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            let trigger = trigger.clone();
            async move {
                trigger.cancel();
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.into_result().unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: RetryResult<()> = transmit(&RetryPolicy::default(), Duration::from_secs(1), &cancel, |_| async {
            Ok(())
        })
        .await;

        assert_eq!(result.attempts(), 0);
        assert!(result.into_result().unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_panic_captured_and_retried() {
        let policy = RetryPolicy::default().with_max_retries(1);

        let result = transmit(&policy, Duration::from_secs(1), &CancellationToken::new(), |n| async move {
            if n == 0 {
                panic!("decoder blew up");
            }
            Ok(n)
        })
        .await;

        assert_eq!(result.attempts(), 2);
        assert_eq!(result.into_result().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_panic_while_building_attempt_captured() {
        let policy = RetryPolicy::default().with_max_retries(1);

        let result = transmit(&policy, Duration::from_secs(1), &CancellationToken::new(), |n| {
            if n == 0 {
                panic!("request builder blew up");
            }
            async move { Ok(n) }
        })
        .await;

        assert_eq!(result.attempts(), 2);
        assert_eq!(result.into_result().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_synchronous_panic_exhausts_budget() {
        let policy = RetryPolicy::default().with_max_retries(1);
        let calls = AtomicU32::new(0);

        let result: RetryResult<()> = transmit(&policy, Duration::from_secs(1), &CancellationToken::new(), |_| {
            if calls.fetch_add(1, Ordering::SeqCst) < 10 {
                panic!("request builder blew up");
            }
            async { Ok(()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match result {
            RetryResult::Exhausted { last_error: OcpiError::Panicked(message), attempts } => {
                assert_eq!(attempts, 2);
                assert!(message.contains("request builder blew up"));
            }
            other => panic!("Expected exhausted panics, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delay_function_called_between_attempts() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let policy = RetryPolicy::default()
            .with_max_retries(2)
            .with_delay(move |retry| {
                recorder.lock().push(retry);
                Duration::from_millis(1)
            });

        let _: RetryResult<()> = transmit(&policy, Duration::from_secs(1), &CancellationToken::new(), |_| async {
            Err(transport_failure())
        })
        .await;

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_millis(100), Duration::from_millis(350));

        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(350));
        assert_eq!(RetryPolicy::default().delay_for_retry(3), Duration::ZERO);
    }
}
