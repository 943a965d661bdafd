use std::sync::Arc;

use fp_bundle::{DataItem, RpcSource};

use crate::archive::url_with_segments;
use crate::{FetchError, FetchOptions, HttpFetcher};

/// Client of an archival RPC node serving `GET {endpoint}/block?height={h}`.
#[derive(Debug, Clone)]
pub struct RpcClient {
    fetcher: Arc<HttpFetcher>,
    source: RpcSource,
    skip_tls_verification: bool,
}

impl RpcClient {
    pub fn new(fetcher: Arc<HttpFetcher>, source: RpcSource) -> Self {
        Self { fetcher, source, skip_tls_verification: false }
    }

    pub fn skip_tls_verification(self, skip_tls_verification: bool) -> Self {
        Self { skip_tls_verification, ..self }
    }

    pub fn source(&self) -> &RpcSource {
        &self.source
    }

    /// Block at `height`, retried with backoff. The response body is kept opaque.
    pub async fn block(&self, height: u64) -> Result<DataItem, FetchError> {
        self.get_block(height, FetchOptions::default().skip_tls_verification(self.skip_tls_verification)).await
    }

    /// Block at `height`, single attempt.
    pub async fn block_once(&self, height: u64) -> Result<DataItem, FetchError> {
        let options = FetchOptions::default().skip_tls_verification(self.skip_tls_verification).with_backoff(false);
        self.get_block(height, options).await
    }

    async fn get_block(&self, height: u64, options: FetchOptions) -> Result<DataItem, FetchError> {
        tracing::info!("📥 Downloading block {height} from {}", self.source.endpoint);

        let mut url = url_with_segments(&self.source.endpoint, &["block"])?;
        url.query_pairs_mut().append_pair("height", &height.to_string());

        let body = self.fetcher.fetch("rpc_block", &url, options).await?;
        Ok(DataItem::at_height(height, body))
    }
}
