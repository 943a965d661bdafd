//! Ordered block collection for fast sync.
//!
//! The [collector](collect) is the producer side of the pipeline: it streams [DataItem](fp_bundle::DataItem)s in
//! strictly increasing height order from a [BlockSource], either the bundle archive or an archival RPC node, and
//! hands them to a bounded channel. [run_block_sync] wires a collector to a [ConsumingEngine] and watches both the
//! item and the error channels.

mod collector;
mod engine;
mod error;
mod metrics;
mod resume;
mod retrieve;
mod source;

#[cfg(test)]
mod tests;

pub use collector::{collect, CollectorConfig, CollectorExit, CollectorOutcome, SyncBounds};
pub use engine::{run_block_sync, ConsumingEngine, SyncConfig, SyncSummary};
pub use error::SyncError;
pub use metrics::{SyncMetrics, ThroughputCounter};
pub use resume::resolve_resume_cursor;
pub use retrieve::retrieve_block;
pub use source::{BlockRpc, BlockSource, BundleArchive};
