use fp_bundle::{unpack_payload, DataItem};

use crate::{BlockSource, SyncError};

/// Fetches the single item at `height`.
///
/// From the archive, the covering bundle is downloaded and the first item at or above `height` is returned: a bundle
/// does not necessarily start at the requested height. From an RPC node, this is one request without retries.
pub async fn retrieve_block(source: &BlockSource, height: u64) -> Result<DataItem, SyncError> {
    match source {
        BlockSource::Bundles { archive, pool } => {
            let record = archive
                .finalized_bundle_for_height(*pool, height)
                .await
                .map_err(|source| SyncError::BundleLookup { height, source })?;

            let payload = archive.bundle_payload(&record).await.map_err(|source| SyncError::BundleDownload {
                bundle_id: record.id,
                storage_id: record.storage_id.clone(),
                source,
            })?;
            let payload_error = |source| SyncError::BundlePayload {
                bundle_id: record.id,
                storage_id: record.storage_id.clone(),
                source,
            };

            for item in unpack_payload(&record, &payload).map_err(payload_error)? {
                if item.height().map_err(payload_error)? >= height {
                    return Ok(item);
                }
            }
            Err(SyncError::BlockNotFound { height, bundle_id: record.id })
        }
        BlockSource::Rpc { rpc, .. } => {
            rpc.block_once(height).await.map_err(|source| SyncError::RpcBlock { height, source })
        }
    }
}
