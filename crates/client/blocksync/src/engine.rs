use std::time::Duration;

use anyhow::Context;
use fp_bundle::DataItem;
use fp_common::{fmt_option, AbortOnDrop, ServiceContext};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{collect, BlockSource, CollectorConfig, CollectorExit, SyncBounds, SyncError, SyncMetrics};

/// Consumer side of the pipeline: applies items in the order they are delivered.
#[async_trait::async_trait]
pub trait ConsumingEngine: Send {
    fn chain_id(&self) -> anyhow::Result<String>;
    /// Height of the next item this engine expects.
    fn next_height(&self) -> anyhow::Result<u64>;
    async fn apply_item(&mut self, item: DataItem) -> anyhow::Result<()>;
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub collector: CollectorConfig,
    /// Items buffered between the collector and the engine.
    pub channel_capacity: usize,
    pub status_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { collector: CollectorConfig::default(), channel_capacity: 100, status_interval: Duration::from_secs(5) }
    }
}

impl SyncConfig {
    pub fn collector(self, collector: CollectorConfig) -> Self {
        Self { collector, ..self }
    }
    pub fn channel_capacity(self, channel_capacity: usize) -> Self {
        Self { channel_capacity, ..self }
    }
    pub fn status_interval(self, status_interval: Duration) -> Self {
        Self { status_interval, ..self }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncSummary {
    pub applied: u64,
    pub last_height: Option<u64>,
    /// Height to resume from on the next run.
    pub next_height: u64,
    pub exit: CollectorExit,
}

fn collector_failure(err: SyncError, last_height: Option<u64>) -> anyhow::Error {
    anyhow::Error::new(err).context(format!("Block sync stopped after height {}", fmt_option(last_height, "N")))
}

/// Runs a collector on `source` and applies everything it delivers to `engine`.
///
/// Returns an error as soon as the collector reports one, or when the engine fails to apply an item. Cancelling `ctx`
/// stops the collector; the item being applied at that point is finished first.
pub async fn run_block_sync<E: ConsumingEngine>(
    engine: &mut E,
    source: BlockSource,
    bounds: SyncBounds,
    config: SyncConfig,
    ctx: ServiceContext,
) -> anyhow::Result<SyncSummary> {
    let (item_sender, mut item_receiver) = mpsc::channel(config.channel_capacity.max(1));
    let (err_sender, mut err_receiver) = mpsc::channel(1);

    tracing::debug!("Starting block sync from {source:?} with {bounds:?}");
    let producer =
        AbortOnDrop::spawn(collect(item_sender, err_sender, source, bounds, config.collector, ctx.child()));

    let mut metrics = SyncMetrics::register(bounds.continuation_height);
    let mut interval = tokio::time::interval_at(Instant::now() + config.status_interval, config.status_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut applied = 0u64;
    let mut last_height = None;
    let target = (bounds.target_height > 0).then_some(bounds.target_height);

    let show_status = |last_height: Option<u64>, metrics: &SyncMetrics| {
        tracing::info!(
            "🔗 Sync is at {}/{} [{:.2} blocks/s]",
            fmt_option(last_height, "N"),
            fmt_option(target, "?"),
            metrics.counter.get_throughput()
        );
    };

    loop {
        tokio::select! {
            biased;
            Some(err) = err_receiver.recv() => {
                return Err(collector_failure(err, last_height));
            }
            _ = ctx.cancelled() => break,
            item = item_receiver.recv() => {
                let Some(item) = item else { break };
                let height = item.height()?;
                engine.apply_item(item).await.with_context(|| format!("Applying block {height}"))?;

                applied += 1;
                last_height = Some(height);
                metrics.record_applied(height);
            }
            _ = interval.tick() => show_status(last_height, &metrics),
        }
    }
    drop(item_receiver);

    // The error is sent before the item channel closes, check it one last time.
    if let Ok(err) = err_receiver.try_recv() {
        return Err(collector_failure(err, last_height));
    }
    let outcome = producer.await.context("Block collector task")?;

    show_status(last_height, &metrics);
    let next_height = last_height.map_or(bounds.continuation_height, |height| height + 1);
    tracing::info!("🌐 Sync process ended with {:?}, next height is {next_height}", outcome.exit);

    Ok(SyncSummary { applied, last_height, next_height, exit: outcome.exit })
}
