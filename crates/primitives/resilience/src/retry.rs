/// Bounded exponential-backoff retry for request/response style calls.
///
/// Attempt `i` (starting at 0) that fails is followed by a pause of `base_delay * 2^i`, capped at `max_backoff`,
/// before attempt `i + 1`. After `max_attempts` failures the last error is handed back to the caller, which decides
/// whether it is fatal.
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::RequestObserver;

/// Errors returned by a retried operation.
pub trait RetryableError: fmt::Display {
    /// Short label used for logs and metrics.
    fn error_type(&self) -> &'static str;

    /// Whether another attempt at the same operation may succeed. Non-retryable errors end the loop at once.
    fn is_retryable(&self) -> bool {
        true
    }
}

// Use tokio::time::Instant for tests (allows time manipulation)
// Use std::time::Instant for production (more efficient)
#[cfg(not(test))]
type InstantProvider = std::time::Instant;

#[cfg(test)]
type InstantProvider = tokio::time::Instant;

/// Configuration for the backoff strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failure, doubled after each further failure
    pub base_delay: Duration,
    /// Maximum backoff delay (cap for exponential growth)
    pub max_backoff: Duration,
    /// Interval for logging warnings during retries
    pub log_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10 * 60),
            log_interval: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    pub fn max_attempts(self, max_attempts: u32) -> Self {
        Self { max_attempts, ..self }
    }
    pub fn base_delay(self, base_delay: Duration) -> Self {
        Self { base_delay, ..self }
    }
    pub fn max_backoff(self, max_backoff: Duration) -> Self {
        Self { max_backoff, ..self }
    }
    /// A single attempt, no backoff.
    pub fn single_attempt() -> Self {
        Self::default().max_attempts(1)
    }
}

/// State tracker for retry attempts
pub struct RetryState {
    config: RetryConfig,
    last_log_time: Option<InstantProvider>,
    retry_count: usize,
}

impl fmt::Debug for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryState")
            .field("config", &self.config)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}

impl RetryState {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, last_log_time: None, retry_count: 0 }
    }

    /// Delay to wait before the next attempt, given the failures recorded so far.
    pub fn next_delay(&self) -> Duration {
        // cap the exponent well below u32 overflow, max_backoff takes over long before
        let exponent = self.retry_count.min(31) as u32;
        self.config.base_delay.saturating_mul(2_u32.saturating_pow(exponent)).min(self.config.max_backoff)
    }

    /// Check if we should log this retry attempt (throttled logging)
    pub fn should_log(&mut self) -> bool {
        match self.last_log_time {
            Some(last) if last.elapsed() < self.config.log_interval => false,
            _ => {
                self.last_log_time = Some(InstantProvider::now());
                true
            }
        }
    }

    /// Increment retry counter and return current count
    pub fn increment_retry(&mut self) -> usize {
        self.retry_count += 1;
        self.retry_count
    }

    /// Get current retry count
    pub fn get_retry_count(&self) -> usize {
        self.retry_count
    }

    /// Whether the attempt budget has been spent.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.config.max_attempts as usize
    }
}

/// Runs `attempt` until it succeeds or the attempt budget of `config` is spent.
///
/// Every outcome is reported to `observer`, failures labelled with their [RetryableError::error_type]. An error that
/// is not retryable is returned right away. The sleep between attempts is a plain tokio sleep: callers that need to
/// stop early race the returned future against their cancellation signal.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    observer: &dyn RequestObserver,
    mut attempt: F,
) -> Result<T, E>
where
    E: RetryableError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut state = RetryState::new(config.clone());
    loop {
        match attempt().await {
            Ok(res) => {
                observer.report_success(operation);
                if state.get_retry_count() > 0 {
                    tracing::info!("🟢 {operation} succeeded after {} failed attempts", state.get_retry_count());
                }
                return Ok(res);
            }
            Err(err) => {
                observer.report_failure(operation, err.error_type());
                if !err.is_retryable() {
                    tracing::error!("❗ {operation} failed with a non-retryable error: {err}");
                    return Err(err);
                }

                let reason = err.to_string();
                let delay = state.next_delay();
                state.increment_retry();

                if state.is_exhausted() {
                    tracing::error!(
                        "❗ {operation} failed within the maximum retry limit of {}: {reason}",
                        config.max_attempts
                    );
                    return Err(err);
                }

                if state.should_log() {
                    tracing::warn!(
                        "⚠️ {operation} failed (attempt {}/{}): {reason}, retrying in {}s",
                        state.get_retry_count(),
                        config.max_attempts,
                        delay.as_secs_f64()
                    );
                } else {
                    tracing::debug!("{operation} failed: {reason}, retrying in {delay:?}");
                }
                tokio::time::sleep(delay).await;
            }
        }
    }
}
