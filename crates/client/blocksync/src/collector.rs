use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use fp_bundle::{unpack_payload, DataItem, FinalizedBundleRecord, PoolDescriptor};
use fp_common::{fmt_option, ServiceContext};
use tokio::sync::mpsc;

use crate::{resolve_resume_cursor, BlockRpc, BlockSource, BundleArchive, SyncError};

#[derive(Clone, Debug)]
pub struct CollectorConfig {
    /// Number of finalized bundles requested per listing page.
    pub page_limit: u64,
    /// Pause between two listing pages.
    pub inter_page_delay: Duration,
    /// Pause before asking for the tip page again when following the chain.
    pub tip_poll_interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            page_limit: fc_archive_client::BUNDLES_PAGE_LIMIT,
            inter_page_delay: Duration::from_secs(1),
            tip_poll_interval: Duration::from_secs(30),
        }
    }
}

impl CollectorConfig {
    pub fn page_limit(self, page_limit: u64) -> Self {
        Self { page_limit, ..self }
    }
    pub fn inter_page_delay(self, inter_page_delay: Duration) -> Self {
        Self { inter_page_delay, ..self }
    }
    pub fn tip_poll_interval(self, tip_poll_interval: Duration) -> Self {
        Self { tip_poll_interval, ..self }
    }
}

/// Heights to collect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncBounds {
    /// Next height to deliver.
    pub continuation_height: u64,
    /// Inclusive upper bound, 0 means unbounded.
    pub target_height: u64,
    /// Stop at the target height, or at the tip of the archive, instead of following the chain.
    pub must_exit: bool,
}

impl SyncBounds {
    pub fn new(continuation_height: u64, target_height: u64, must_exit: bool) -> Self {
        Self { continuation_height, target_height, must_exit }
    }

    fn target(&self) -> Option<u64> {
        (self.must_exit && self.target_height > 0).then_some(self.target_height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectorExit {
    /// The target height was delivered.
    TargetReached,
    /// The archive has no further page and the collector was asked not to follow the chain.
    TipReached,
    Cancelled,
    /// The item receiver was dropped.
    ConsumerClosed,
    /// An error was sent on the error channel.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectorOutcome {
    pub exit: CollectorExit,
    /// Next height that was not delivered: a safe resume point.
    pub continuation_height: u64,
}

/// Streams items in strictly increasing height order from `source` to `out`, starting at
/// `bounds.continuation_height`.
///
/// On an unrecoverable error, exactly one [SyncError] is sent to `err_out` and the collector stops. Cancelling `ctx`
/// stops the collector at its next network call, sleep or send. The returned continuation height only ever moves
/// past items that were accepted by `out`.
pub async fn collect(
    out: mpsc::Sender<DataItem>,
    err_out: mpsc::Sender<SyncError>,
    source: BlockSource,
    bounds: SyncBounds,
    config: CollectorConfig,
    ctx: ServiceContext,
) -> CollectorOutcome {
    let mut collector = BlockCollector { out, bounds, config, ctx, continuation_height: bounds.continuation_height };

    let res = match &source {
        BlockSource::Bundles { archive, pool } => collector.collect_bundles(archive.as_ref(), *pool).await,
        BlockSource::Rpc { rpc, request_delay } => collector.collect_rpc(rpc.as_ref(), *request_delay).await,
    };
    let halt = match res {
        Ok(never) => match never {},
        Err(halt) => halt,
    };

    let exit = match halt {
        Halt::Exit(exit) => exit,
        Halt::Failed(err) => {
            tracing::debug!("Block collector failed at height {}: {err}", collector.continuation_height);
            // The receiver may already be gone if the consumer stopped on its own.
            let _ = err_out.send(err).await;
            CollectorExit::Failed
        }
    };
    tracing::debug!("Block collector exited with {exit:?} at height {}", collector.continuation_height);

    CollectorOutcome { exit, continuation_height: collector.continuation_height }
}

enum Halt {
    Exit(CollectorExit),
    Failed(SyncError),
}

impl From<SyncError> for Halt {
    fn from(value: SyncError) -> Self {
        Self::Failed(value)
    }
}

type Step<T> = Result<T, Halt>;

struct BlockCollector {
    out: mpsc::Sender<DataItem>,
    bounds: SyncBounds,
    config: CollectorConfig,
    ctx: ServiceContext,
    continuation_height: u64,
}

impl BlockCollector {
    /// Races `fut` against cancellation.
    async fn guard<T>(&self, fut: impl Future<Output = T>) -> Step<T> {
        self.ctx.run_until_cancelled(fut).await.ok_or(Halt::Exit(CollectorExit::Cancelled))
    }

    fn check_target(&self) -> Step<()> {
        match self.bounds.target() {
            Some(target) if self.continuation_height > target => Err(Halt::Exit(CollectorExit::TargetReached)),
            _ => Ok(()),
        }
    }

    /// Hands `item` to the consumer, waiting for it to be accepted, then moves the cursor past it.
    async fn emit(&mut self, item: DataItem, height: u64) -> Step<()> {
        let target = self.bounds.target();
        if target.is_some_and(|target| height > target) {
            return Err(Halt::Exit(CollectorExit::TargetReached));
        }

        if self.guard(self.out.send(item)).await?.is_err() {
            return Err(Halt::Exit(CollectorExit::ConsumerClosed));
        }
        self.continuation_height = height + 1;

        if target.is_some_and(|target| height >= target) {
            tracing::info!("🎯 Reached target height {height}, stopping block collector");
            return Err(Halt::Exit(CollectorExit::TargetReached));
        }
        Ok(())
    }

    async fn collect_bundles(&mut self, archive: &dyn BundleArchive, pool: PoolDescriptor) -> Step<Infallible> {
        self.check_target()?;

        let mut cursor = self.guard(resolve_resume_cursor(archive, pool, self.continuation_height)).await??;
        tracing::info!(
            "⛓️ Collecting blocks from {pool} starting at height {}, target {}",
            self.continuation_height,
            fmt_option(self.bounds.target(), "none")
        );

        loop {
            let page = self
                .guard(archive.finalized_bundles_page(pool, self.config.page_limit, None, &cursor))
                .await?
                .map_err(|source| SyncError::BundlesPage { cursor: cursor.clone(), source })?;

            for record in &page.finalized_bundles {
                self.collect_bundle(archive, record).await?;
            }

            match page.next_cursor() {
                Some(next) => {
                    // pacing only applies between pages that actually carried bundles
                    if !page.finalized_bundles.is_empty() {
                        self.guard(tokio::time::sleep(self.config.inter_page_delay)).await?;
                    }
                    cursor = next;
                }
                None if self.bounds.must_exit => {
                    tracing::info!("🏁 Reached the latest finalized bundle of {pool}, stopping block collector");
                    return Err(Halt::Exit(CollectorExit::TipReached));
                }
                None => {
                    tracing::debug!(
                        "Reached the latest finalized bundle of {pool}, waiting {:?} for new bundles",
                        self.config.tip_poll_interval
                    );
                    self.guard(tokio::time::sleep(self.config.tip_poll_interval)).await?;
                }
            }
        }
    }

    async fn collect_bundle(&mut self, archive: &dyn BundleArchive, record: &FinalizedBundleRecord) -> Step<()> {
        let to_height =
            record.to_height().map_err(|source| SyncError::InvalidRecord { bundle_id: record.id, source })?;
        if to_height < self.continuation_height {
            tracing::debug!("Skipping bundle {} ending at height {to_height}, already delivered", record.id);
            return Ok(());
        }

        tracing::info!("📦 Downloading bundle {} with storage id {}", record.id, record.storage_id);
        let payload = self.guard(archive.bundle_payload(record)).await?.map_err(|source| SyncError::BundleDownload {
            bundle_id: record.id,
            storage_id: record.storage_id.clone(),
            source,
        })?;

        let payload_error =
            |source| SyncError::BundlePayload { bundle_id: record.id, storage_id: record.storage_id.clone(), source };
        let bundle = unpack_payload(record, &payload).map_err(payload_error)?;

        for item in bundle {
            let height = item.height().map_err(payload_error)?;
            if height < self.continuation_height {
                tracing::debug!("Skipping item at height {height} in bundle {}, already delivered", record.id);
                continue;
            }
            self.emit(item, height).await?;
        }
        Ok(())
    }

    async fn collect_rpc(&mut self, rpc: &dyn BlockRpc, request_delay: Duration) -> Step<Infallible> {
        self.check_target()?;
        tracing::info!(
            "⛓️ Collecting blocks from rpc starting at height {}, target {}",
            self.continuation_height,
            fmt_option(self.bounds.target(), "none")
        );

        loop {
            let height = self.continuation_height;
            let item =
                self.guard(rpc.block(height)).await?.map_err(|source| SyncError::RpcBlock { height, source })?;
            self.emit(item, height).await?;

            self.guard(tokio::time::sleep(request_delay)).await?;
        }
    }
}
