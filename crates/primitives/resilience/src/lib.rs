/// Resilience primitives shared by every network call of the sync pipeline.
///
/// This crate provides:
///
/// - **Retry Strategy**: bounded exponential backoff (`base_delay * 2^attempt`) with a fixed attempt budget
/// - **Adaptive Logging**: throttled retry warnings so a long outage does not flood the logs
/// - **Request Observation**: an explicit [RequestObserver] capability which counts successes and failures
///
/// # Example
///
/// ```rust,ignore
/// use fp_resilience::{retry_with_backoff, RequestCounters, RetryConfig};
///
/// let counters = RequestCounters::default();
/// let body = retry_with_backoff(&RetryConfig::default(), "GET /block", &counters, || fetch_once(url)).await?;
/// assert_eq!(counters.snapshot().succeeded, 1);
/// ```
pub mod observer;
pub mod retry;

pub use observer::{NoopObserver, RequestCounters, RequestObserver, RequestStats};
pub use retry::{retry_with_backoff, RetryConfig, RetryState, RetryableError};
