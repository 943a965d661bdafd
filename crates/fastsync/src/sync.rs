use std::sync::Arc;

use anyhow::{bail, Context};
use fc_archive_client::{ArchiveClient, HttpFetcher, RpcClient};
use fc_block_sync::{retrieve_block, BlockSource, SyncError};
use fp_bundle::PoolDescriptor;
use fp_common::fmt_option;

use crate::cli::RunCmd;

/// Block source selected on the command line, with the archive kept aside for the pool lookup.
pub struct SyncSource {
    pub blocks: BlockSource,
    pub archive: Option<(ArchiveClient, PoolDescriptor)>,
}

impl SyncSource {
    pub fn from_cmd(run_cmd: &RunCmd, fetcher: Arc<HttpFetcher>) -> anyhow::Result<Self> {
        if let Some(rpc_source) = run_cmd.rpc_source() {
            tracing::info!("🔌 Syncing blocks from rpc {}", rpc_source.endpoint);
            let client = RpcClient::new(fetcher, rpc_source).skip_tls_verification(run_cmd.skip_tls_verification);
            return Ok(Self { blocks: BlockSource::rpc(client), archive: None });
        }

        let Some(pool) = run_cmd.pool() else {
            bail!("No block source configured");
        };
        let mut archive = ArchiveClient::new(fetcher, run_cmd.chain_rest()?);
        if let Some(storage_rest) = &run_cmd.storage_rest {
            archive = archive.with_storage_rest(storage_rest.clone());
        }
        tracing::info!("🗄️  Syncing blocks from {pool} on {}", archive.chain_rest());

        Ok(Self { blocks: BlockSource::bundles(archive.clone(), pool), archive: Some((archive, pool)) })
    }
}

/// Checks that syncing from `continuation_height` can start at all.
pub async fn pre_sync_checks(source: &SyncSource, continuation_height: u64, target_height: u64) -> anyhow::Result<()> {
    if target_height > 0 && target_height < continuation_height {
        bail!(
            "Target height {target_height} is below the continuation height {continuation_height}, the local store is \
             already past it"
        );
    }

    if let Some((archive, pool)) = &source.archive {
        let info = archive.pool(*pool).await.with_context(|| format!("Looking up {pool}"))?;
        tracing::info!(
            "🗄️  Pool {} ({}) holds {} bundles, from key {} to key {}",
            info.id,
            fmt_option((!info.data.runtime.is_empty()).then_some(&info.data.runtime), "unknown runtime"),
            info.data.total_bundles,
            info.data.start_key,
            info.data.current_key
        );
    }

    let item = retrieve_block(&source.blocks, continuation_height)
        .await
        .with_context(|| format!("Source cannot serve block {continuation_height}"))?;
    let first_height = item.height()?;
    if first_height != continuation_height {
        bail!("Source serves block {first_height} instead of block {continuation_height}");
    }
    tracing::debug!("Source serves block {continuation_height}");
    Ok(())
}

/// Whether a failed sync was caused by archive data that did not verify, as opposed to an unreachable source.
pub fn is_integrity_failure(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SyncError>().is_some_and(SyncError::is_integrity_failure)
}
