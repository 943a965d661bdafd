use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receives the outcome of every request attempt made by the fetch layer.
///
/// Implementations must be cheap: they are called inline on the request path.
pub trait RequestObserver: Send + Sync {
    fn report_success(&self, operation: &str);
    fn report_failure(&self, operation: &str, error_type: &str);
}

impl<T: RequestObserver + ?Sized> RequestObserver for Arc<T> {
    fn report_success(&self, operation: &str) {
        (**self).report_success(operation)
    }
    fn report_failure(&self, operation: &str, error_type: &str) {
        (**self).report_failure(operation, error_type)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RequestObserver for NoopObserver {
    fn report_success(&self, _operation: &str) {}
    fn report_failure(&self, _operation: &str, _error_type: &str) {}
}

/// Point-in-time copy of [RequestCounters].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RequestStats {
    pub succeeded: u64,
    pub failed: u64,
    /// Failures since the last success.
    pub consecutive_failures: u64,
}

impl RequestStats {
    pub fn total(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// Share of failed attempts, between 0 and 1.
    pub fn failure_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.failed as f64 / self.total() as f64
        }
    }
}

/// In-process success/failure counters.
#[derive(Debug, Default)]
pub struct RequestCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    consecutive_failures: AtomicU64,
}

impl RequestCounters {
    pub fn snapshot(&self) -> RequestStats {
        RequestStats {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }
}

impl RequestObserver for RequestCounters {
    fn report_success(&self, _operation: &str) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn report_failure(&self, _operation: &str, _error_type: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }
}
