use std::sync::Arc;

use bytes::Bytes;
use fp_bundle::{FinalizedBundleRecord, FinalizedBundlesPage, PaginationCursor, PoolDescriptor, PoolInfo, PoolResponse};
use url::Url;

use crate::{FetchError, FetchOptions, HttpFetcher};

/// Number of finalized bundles requested per listing page.
pub const BUNDLES_PAGE_LIMIT: u64 = 100;

/// Where bundle payloads live when no storage endpoint is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvider {
    Arweave,
    Bundlr,
    Kyve,
}

impl StorageProvider {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Self::Arweave),
            2 => Some(Self::Bundlr),
            3 => Some(Self::Kyve),
            _ => None,
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            // Bundlr uploads settle on Arweave and are served by its gateway.
            Self::Arweave | Self::Bundlr => "https://arweave.net",
            Self::Kyve => "https://storage.kyve.network",
        }
    }
}

/// Client of the bundle archive REST API.
#[derive(Debug, Clone)]
pub struct ArchiveClient {
    fetcher: Arc<HttpFetcher>,
    chain_rest: Url,
    storage_rest: Option<Url>,
}

impl ArchiveClient {
    pub fn new(fetcher: Arc<HttpFetcher>, chain_rest: Url) -> Self {
        Self { fetcher, chain_rest, storage_rest: None }
    }

    /// Fetch every payload from this endpoint instead of the storage provider defaults.
    pub fn with_storage_rest(mut self, storage_rest: Url) -> Self {
        self.storage_rest = Some(storage_rest);
        self
    }

    pub fn chain_rest(&self) -> &Url {
        &self.chain_rest
    }

    /// One page of the finalized bundle listing of `pool`.
    ///
    /// `offset` is only meaningful together with the start cursor: the archive then skips that many records.
    pub async fn finalized_bundles_page(
        &self,
        pool: PoolDescriptor,
        limit: u64,
        offset: Option<u64>,
        cursor: &PaginationCursor,
    ) -> Result<FinalizedBundlesPage, FetchError> {
        let mut url = url_with_segments(&self.chain_rest, &["kyve", "v1", "bundles", &pool.id.to_string()])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pagination.limit", &limit.to_string());
            if let Some(offset) = offset {
                query.append_pair("pagination.offset", &offset.to_string());
            }
            if !cursor.is_start() {
                query.append_pair("pagination.key", cursor.as_str());
            }
        }
        self.fetcher.get_json("finalized_bundles_page", &url).await
    }

    /// The finalized record covering `height`.
    pub async fn finalized_bundle_for_height(
        &self,
        pool: PoolDescriptor,
        height: u64,
    ) -> Result<FinalizedBundleRecord, FetchError> {
        let mut url = url_with_segments(&self.chain_rest, &["kyve", "v1", "bundles", &pool.id.to_string()])?;
        url.query_pairs_mut().append_pair("index", &height.to_string());
        self.fetcher.get_json("finalized_bundle_by_height", &url).await
    }

    pub async fn pool(&self, pool: PoolDescriptor) -> Result<PoolInfo, FetchError> {
        let url = url_with_segments(&self.chain_rest, &["kyve", "query", "v1beta1", "pool", &pool.id.to_string()])?;
        let response: PoolResponse = self.fetcher.get_json("pool", &url).await?;
        Ok(response.pool)
    }

    /// Raw (still compressed) payload of `record`.
    pub async fn bundle_payload(&self, record: &FinalizedBundleRecord) -> Result<Bytes, FetchError> {
        let url = self.payload_url(record)?;
        self.fetcher.fetch("bundle_payload", &url, FetchOptions::default()).await
    }

    pub fn payload_url(&self, record: &FinalizedBundleRecord) -> Result<Url, FetchError> {
        let base = match &self.storage_rest {
            Some(storage_rest) => storage_rest.clone(),
            None => {
                let provider = StorageProvider::from_id(record.storage_provider_id)
                    .ok_or(FetchError::UnknownStorageProvider(record.storage_provider_id))?;
                let endpoint = provider.default_endpoint();
                Url::parse(endpoint)
                    .map_err(|err| FetchError::InvalidUrl { base: endpoint.into(), message: err.to_string() })?
            }
        };
        url_with_segments(&base, &[&record.storage_id])
    }
}

/// Appends path segments to `base`, ignoring a trailing slash on it.
pub(crate) fn url_with_segments(base: &Url, segments: &[&str]) -> Result<Url, FetchError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| FetchError::invalid_url(base, "cannot be used as a base URL"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
