use anyhow::anyhow;

use url::Url;

/// Parse a string URL & returns it as [Url].
pub fn parse_url(s: &str) -> Result<Url, url::ParseError> {
    s.parse()
}

/// Parses a block height, also accepting `_` digit separators (`1_000_000`).
pub fn parse_height(s: &str) -> anyhow::Result<u64> {
    let cleaned: String = s.trim().chars().filter(|c| *c != '_').collect();
    cleaned.parse().map_err(|_| anyhow!("Invalid block height: {}", s))
}
