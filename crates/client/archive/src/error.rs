use fp_resilience::RetryableError;
use reqwest::StatusCode;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport errors: connection refused, timeouts, incomplete bodies...
    #[error("Network error while fetching {url}: {source}")]
    Network {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("{url} returned status {status}")]
    Status { url: Url, status: StatusCode },

    #[error("Failed to parse response from {url}: {source}")]
    Decode {
        url: Url,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot build a request URL from {base}: {message}")]
    InvalidUrl { base: String, message: String },

    #[error("No storage endpoint is known for storage provider {0}, set one explicitly")]
    UnknownStorageProvider(u32),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl RetryableError for FetchError {
    fn error_type(&self) -> &'static str {
        match self {
            Self::Network { source, .. } if source.is_timeout() => "timeout",
            Self::Network { source, .. } if source.is_connect() => "connection_failed",
            Self::Network { .. } => "network_error",
            Self::Status { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS => "rate_limited",
            Self::Status { .. } => "status_error",
            Self::Decode { .. } => "parse_error",
            Self::InvalidUrl { .. } => "url_error",
            Self::UnknownStorageProvider(_) => "unknown_storage_provider",
            Self::ClientBuild(_) => "client_error",
        }
    }

    /// Transport failures and non-2xx answers may go away on another attempt.
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Status { .. })
    }
}

impl FetchError {
    pub(crate) fn invalid_url(base: &Url, message: impl Into<String>) -> Self {
        Self::InvalidUrl { base: base.to_string(), message: message.into() }
    }
}
