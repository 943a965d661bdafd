use fc_archive_client::FetchError;
use fp_bundle::{BundleError, PaginationCursor};

/// Unrecoverable collector failure. Every variant names the height or archive identifier it happened at.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to look up the finalized bundle covering height {height}")]
    BundleLookup {
        height: u64,
        #[source]
        source: FetchError,
    },
    #[error("Failed to fetch the bundles page at offset {offset} to resume from bundle {bundle_id}")]
    ResumePage {
        bundle_id: u64,
        offset: u64,
        #[source]
        source: FetchError,
    },
    #[error("The bundles page at offset {offset} has no next key, cannot resume from bundle {bundle_id}")]
    MissingResumeCursor { bundle_id: u64, offset: u64 },
    #[error("Failed to fetch the finalized bundles page at cursor {cursor}")]
    BundlesPage {
        cursor: PaginationCursor,
        #[source]
        source: FetchError,
    },
    #[error("Finalized bundle {bundle_id} has an invalid height range")]
    InvalidRecord {
        bundle_id: u64,
        #[source]
        source: BundleError,
    },
    #[error("Failed to download bundle {bundle_id} with storage id {storage_id}")]
    BundleDownload {
        bundle_id: u64,
        storage_id: String,
        #[source]
        source: FetchError,
    },
    #[error("Invalid payload in bundle {bundle_id} with storage id {storage_id}")]
    BundlePayload {
        bundle_id: u64,
        storage_id: String,
        #[source]
        source: BundleError,
    },
    #[error("Block {height} was not found in bundle {bundle_id}")]
    BlockNotFound { height: u64, bundle_id: u64 },
    #[error("Failed to fetch block {height} from rpc")]
    RpcBlock {
        height: u64,
        #[source]
        source: FetchError,
    },
}

impl SyncError {
    /// Data-integrity failures point at a defect of the source rather than at the network.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingResumeCursor { .. }
                | Self::InvalidRecord { .. }
                | Self::BundlePayload { .. }
                | Self::BlockNotFound { .. }
        )
    }
}
