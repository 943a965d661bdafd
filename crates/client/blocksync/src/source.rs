use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fc_archive_client::{ArchiveClient, FetchError, RpcClient};
use fp_bundle::{DataItem, FinalizedBundleRecord, FinalizedBundlesPage, PaginationCursor, PoolDescriptor};

/// Archive operations the collector depends on.
#[async_trait::async_trait]
pub trait BundleArchive: Send + Sync {
    async fn finalized_bundles_page(
        &self,
        pool: PoolDescriptor,
        limit: u64,
        offset: Option<u64>,
        cursor: &PaginationCursor,
    ) -> Result<FinalizedBundlesPage, FetchError>;

    async fn finalized_bundle_for_height(
        &self,
        pool: PoolDescriptor,
        height: u64,
    ) -> Result<FinalizedBundleRecord, FetchError>;

    async fn bundle_payload(&self, record: &FinalizedBundleRecord) -> Result<Bytes, FetchError>;
}

/// Archival RPC operations the collector depends on.
#[async_trait::async_trait]
pub trait BlockRpc: Send + Sync {
    /// Block at `height`, with retries.
    async fn block(&self, height: u64) -> Result<DataItem, FetchError>;
    /// Block at `height`, single attempt.
    async fn block_once(&self, height: u64) -> Result<DataItem, FetchError>;
}

#[async_trait::async_trait]
impl BundleArchive for ArchiveClient {
    async fn finalized_bundles_page(
        &self,
        pool: PoolDescriptor,
        limit: u64,
        offset: Option<u64>,
        cursor: &PaginationCursor,
    ) -> Result<FinalizedBundlesPage, FetchError> {
        ArchiveClient::finalized_bundles_page(self, pool, limit, offset, cursor).await
    }

    async fn finalized_bundle_for_height(
        &self,
        pool: PoolDescriptor,
        height: u64,
    ) -> Result<FinalizedBundleRecord, FetchError> {
        ArchiveClient::finalized_bundle_for_height(self, pool, height).await
    }

    async fn bundle_payload(&self, record: &FinalizedBundleRecord) -> Result<Bytes, FetchError> {
        ArchiveClient::bundle_payload(self, record).await
    }
}

#[async_trait::async_trait]
impl BlockRpc for RpcClient {
    async fn block(&self, height: u64) -> Result<DataItem, FetchError> {
        RpcClient::block(self, height).await
    }

    async fn block_once(&self, height: u64) -> Result<DataItem, FetchError> {
        RpcClient::block_once(self, height).await
    }
}

/// Where blocks come from. Chosen once when the pipeline starts.
#[derive(Clone)]
pub enum BlockSource {
    Bundles { archive: Arc<dyn BundleArchive>, pool: PoolDescriptor },
    Rpc { rpc: Arc<dyn BlockRpc>, request_delay: Duration },
}

impl BlockSource {
    pub fn bundles(archive: impl BundleArchive + 'static, pool: PoolDescriptor) -> Self {
        Self::Bundles { archive: Arc::new(archive), pool }
    }

    /// RPC source paced by the client's per-request timeout.
    pub fn rpc(client: RpcClient) -> Self {
        let request_delay = client.source().per_request_timeout;
        Self::Rpc { rpc: Arc::new(client), request_delay }
    }
}

impl fmt::Debug for BlockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundles { pool, .. } => f.debug_struct("Bundles").field("pool", pool).finish_non_exhaustive(),
            Self::Rpc { request_delay, .. } => {
                f.debug_struct("Rpc").field("request_delay", request_delay).finish_non_exhaustive()
            }
        }
    }
}
