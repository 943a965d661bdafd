//! Data model shared between the archive client and the block collector.
//!
//! The archive publishes *finalized bundles*: immutable, content-addressed batches of consecutive-height
//! [DataItem]s. A [FinalizedBundleRecord] describes one of them (covered heights, storage pointer, checksum,
//! compression) and its payload decodes to a [Bundle].

mod error;
mod height;
mod payload;
mod types;

pub use error::BundleError;
pub use height::parse_height_from_key;
pub use payload::{decode_bundle, decompress, sha256_hex, unpack_payload, verify_checksum, Compression};
pub use types::*;
