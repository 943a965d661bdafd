use crate::BundleError;

/// Extracts the decimal block height from a data item key.
///
/// Keys are either a bare height (`"1500"`) or a height followed by a `/`-separated suffix (`"1500/block"`).
pub fn parse_height_from_key(key: &str) -> Result<u64, BundleError> {
    let head = key.split('/').next().unwrap_or(key);
    head.parse().map_err(|_| BundleError::InvalidHeightKey { key: key.to_owned() })
}
