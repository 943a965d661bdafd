use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fp_resilience::{retry_with_backoff, RequestCounters, RequestObserver, RetryConfig};
use reqwest::header::USER_AGENT;
use serde::de::DeserializeOwned;
use url::Url;

use crate::FetchError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client identity sent with every request, eg. `fastsync/0.3.0 (linux / x86_64)`.
pub fn user_agent() -> String {
    format!("fastsync/{} ({} / {})", env!("CARGO_PKG_VERSION"), std::env::consts::OS, std::env::consts::ARCH)
}

/// Per-call behavior of [HttpFetcher::fetch].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Accept invalid TLS certificates. Only meant for user-specified endpoints such as a private archival node.
    pub skip_tls_verification: bool,
    /// Retry with exponential backoff. When false, a single attempt is made.
    pub with_backoff: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self { skip_tls_verification: false, with_backoff: true }
    }
}

impl FetchOptions {
    pub fn skip_tls_verification(self, skip_tls_verification: bool) -> Self {
        Self { skip_tls_verification, ..self }
    }
    pub fn with_backoff(self, with_backoff: bool) -> Self {
        Self { with_backoff, ..self }
    }
}

pub struct HttpFetcherBuilder {
    retry: RetryConfig,
    observer: Arc<dyn RequestObserver>,
    timeout: Duration,
}

impl Default for HttpFetcherBuilder {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            observer: Arc::new(RequestCounters::default()),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl HttpFetcherBuilder {
    pub fn retry_config(self, retry: RetryConfig) -> Self {
        Self { retry, ..self }
    }
    pub fn observer(self, observer: Arc<dyn RequestObserver>) -> Self {
        Self { observer, ..self }
    }
    /// Timeout of a single attempt.
    pub fn timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub fn build(self) -> Result<HttpFetcher, FetchError> {
        let client = |skip_tls_verification: bool| {
            reqwest::Client::builder()
                .timeout(self.timeout)
                .danger_accept_invalid_certs(skip_tls_verification)
                .build()
                .map_err(FetchError::ClientBuild)
        };
        Ok(HttpFetcher {
            client: client(false)?,
            insecure_client: client(true)?,
            user_agent: user_agent(),
            retry: self.retry,
            observer: self.observer,
        })
    }
}

/// Resilient HTTP GET shared by the archive and RPC clients.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    insecure_client: reqwest::Client,
    user_agent: String,
    retry: RetryConfig,
    observer: Arc<dyn RequestObserver>,
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher").field("user_agent", &self.user_agent).field("retry", &self.retry).finish()
    }
}

impl HttpFetcher {
    pub fn builder() -> HttpFetcherBuilder {
        HttpFetcherBuilder::default()
    }

    /// GET with exponential backoff. Returns the last error once the attempt budget is spent.
    pub async fn fetch_with_retry(&self, url: &Url) -> Result<Bytes, FetchError> {
        self.fetch("get", url, FetchOptions::default()).await
    }

    /// Single GET attempt, optionally skipping TLS verification.
    pub async fn fetch_once(&self, url: &Url, skip_tls_verification: bool) -> Result<Bytes, FetchError> {
        self.fetch("get", url, FetchOptions { skip_tls_verification, with_backoff: false }).await
    }

    /// GET `url`. `operation` labels the attempts reported to the observer and the retry logs.
    pub async fn fetch(&self, operation: &str, url: &Url, options: FetchOptions) -> Result<Bytes, FetchError> {
        let client = if options.skip_tls_verification { &self.insecure_client } else { &self.client };
        let retry = if options.with_backoff { self.retry.clone() } else { RetryConfig::single_attempt() };

        retry_with_backoff(&retry, operation, self.observer.as_ref(), || self.attempt(client, url)).await
    }

    /// GET with retry, then decode the body as JSON. Decoding errors are not retried.
    pub async fn get_json<T: DeserializeOwned>(&self, operation: &str, url: &Url) -> Result<T, FetchError> {
        let body = self.fetch(operation, url, FetchOptions::default()).await?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode { url: url.clone(), source })
    }

    async fn attempt(&self, client: &reqwest::Client, url: &Url) -> Result<Bytes, FetchError> {
        tracing::debug!(%url, "GET");

        let network_error = |source| FetchError::Network { url: url.clone(), source };
        let response =
            client.get(url.clone()).header(USER_AGENT, &self.user_agent).send().await.map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url: url.clone(), status });
        }
        response.bytes().await.map_err(network_error)
    }
}
