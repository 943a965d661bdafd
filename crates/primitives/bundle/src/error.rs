#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("Cannot parse a block height from key {key:?}")]
    InvalidHeightKey { key: String },
    #[error("Checksum mismatch for bundle {bundle_id}: expected {expected}, got {actual}")]
    ChecksumMismatch { bundle_id: u64, expected: String, actual: String },
    #[error("Unsupported compression id {0:?}")]
    UnsupportedCompression(String),
    #[error("Failed to decompress bundle payload: {0:#}")]
    Decompress(#[source] std::io::Error),
    #[error("Failed to parse bundle payload: {0:#}")]
    Decode(#[source] serde_json::Error),
}
