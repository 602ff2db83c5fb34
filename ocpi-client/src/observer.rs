//! Request/response observers and per-client counters
//!
//! Observers are notified synchronously at two points of every remote call:
//! before the first attempt is sent and after the final outcome is known.
//! A failing or panicking observer is logged and skipped; it never changes
//! the result of the call.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::transport::Method;

/// Remote operations the client performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListVersions,
    GetVersionDetail,
    GetCredentials,
    PostCredentials,
    PutCredentials,
    DeleteCredentials,
    Register,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::ListVersions,
        Operation::GetVersionDetail,
        Operation::GetCredentials,
        Operation::PostCredentials,
        Operation::PutCredentials,
        Operation::DeleteCredentials,
        Operation::Register,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Emitted before a call is sent. Carries no credentials.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub operation: Operation,
    pub method: Method,
    pub url: Url,
    pub request_id: String,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Final outcome of a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Success,
    Failure { error: String, status_code: Option<u16> },
}

/// Emitted once the call has finished, after all attempts
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub operation: Operation,
    pub request_id: String,
    pub correlation_id: String,
    pub outcome: ResponseOutcome,
    pub attempts: u32,
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
}

pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Receives request/response notifications
pub trait RequestObserver: Send + Sync {
    fn on_request(&self, _event: &RequestEvent) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_response(&self, _event: &ResponseEvent) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Writes the audit trail to `tracing`
#[derive(Debug, Default)]
pub struct TracingObserver;

impl RequestObserver for TracingObserver {
    fn on_request(&self, event: &RequestEvent) -> Result<(), ObserverError> {
        debug!(
            operation = %event.operation,
            request_id = %event.request_id,
            correlation_id = %event.correlation_id,
            "{} {}",
            event.method,
            event.url
        );
        Ok(())
    }

    fn on_response(&self, event: &ResponseEvent) -> Result<(), ObserverError> {
        match &event.outcome {
            ResponseOutcome::Success => debug!(
                operation = %event.operation,
                request_id = %event.request_id,
                attempts = event.attempts,
                "completed in {:?}",
                event.elapsed
            ),
            ResponseOutcome::Failure { error, .. } => debug!(
                operation = %event.operation,
                request_id = %event.request_id,
                attempts = event.attempts,
                "failed after {:?}: {}",
                event.elapsed,
                error
            ),
        }
        Ok(())
    }
}

/// Observers registered on one client
#[derive(Default)]
pub struct ObserverList {
    observers: RwLock<Vec<Arc<dyn RequestObserver>>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: Arc<dyn RequestObserver>) {
        self.observers.write().push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    pub fn notify_request(&self, event: &RequestEvent) {
        for observer in self.snapshot() {
            isolate("on_request", || observer.on_request(event));
        }
    }

    pub fn notify_response(&self, event: &ResponseEvent) {
        for observer in self.snapshot() {
            isolate("on_response", || observer.on_response(event));
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn RequestObserver>> {
        self.observers.read().clone()
    }
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList").field("len", &self.len()).finish()
    }
}

fn isolate(hook: &str, call: impl FnOnce() -> Result<(), ObserverError>) {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Observer {} failed: {}", hook, e),
        Err(_) => warn!("Observer {} panicked", hook),
    }
}

#[derive(Debug, Default)]
struct OperationCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Outcome tallies for one client instance
#[derive(Debug, Default)]
pub struct ClientCounters {
    operations: [OperationCounters; 7],
    commit_failures: AtomicU64,
}

/// Point-in-time copy of the counters of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationTally {
    pub succeeded: u64,
    pub failed: u64,
}

impl ClientCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, operation: Operation, success: bool) {
        let counters = &self.operations[operation.index()];
        if success {
            counters.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_commit_failure(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tally(&self, operation: Operation) -> OperationTally {
        let counters = &self.operations[operation.index()];
        OperationTally {
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn commit_failures(&self) -> u64 {
        self.commit_failures.load(Ordering::Relaxed)
    }

    /// Tallies of every operation
    pub fn snapshot(&self) -> Vec<(Operation, OperationTally)> {
        Operation::ALL
            .iter()
            .map(|op| (*op, self.tally(*op)))
            .collect()
    }
}
