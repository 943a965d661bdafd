use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use url::Url;

use crate::{parse_height_from_key, BundleError};

/// One per-height entry of the stream: a key encoding the height and an opaque payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataItem {
    pub key: String,
    #[serde(with = "fp_common::serde::raw_json_bytes")]
    pub value: Bytes,
}

impl DataItem {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    /// Item for a bare height key, as served by the RPC source.
    pub fn at_height(height: u64, value: impl Into<Bytes>) -> Self {
        Self::new(height.to_string(), value)
    }

    pub fn height(&self) -> Result<u64, BundleError> {
        parse_height_from_key(&self.key)
    }
}

// Payloads can be megabytes large.
impl fmt::Debug for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataItem").field("key", &self.key).field("value_len", &self.value.len()).finish()
    }
}

/// Ordered items decoded from one bundle payload.
pub type Bundle = Vec<DataItem>;

/// Metadata of one finalized, immutable bundle.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedBundleRecord {
    /// Sequential id within the pool, starting at 0.
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub id: u64,
    pub storage_id: String,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    pub storage_provider_id: u32,
    #[serde(default)]
    pub compression_id: String,
    pub from_key: String,
    pub to_key: String,
    #[serde(default)]
    pub data_hash: String,
}

impl FinalizedBundleRecord {
    /// First height covered by this bundle.
    pub fn from_height(&self) -> Result<u64, BundleError> {
        parse_height_from_key(&self.from_key)
    }

    /// Last height covered by this bundle, inclusive.
    pub fn to_height(&self) -> Result<u64, BundleError> {
        parse_height_from_key(&self.to_key)
    }
}

/// Opaque, forward-only token into the finalized bundle listing. The empty cursor is the start of the listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaginationCursor(String);

impl PaginationCursor {
    pub fn start() -> Self {
        Self::default()
    }
    pub fn is_start(&self) -> bool {
        self.0.is_empty()
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PaginationCursor {
    fn from(value: String) -> Self {
        Self(value)
    }
}
impl From<&str> for PaginationCursor {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for PaginationCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_start() {
            write!(f, "<start>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next_key: Option<String>,
}

/// One page of the finalized bundle listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedBundlesPage {
    #[serde(default)]
    pub finalized_bundles: Vec<FinalizedBundleRecord>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl FinalizedBundlesPage {
    /// Cursor of the following page, or [None] at the tip of the listing.
    pub fn next_cursor(&self) -> Option<PaginationCursor> {
        self.pagination.next_key.as_deref().filter(|key| !key.is_empty()).map(PaginationCursor::from)
    }
}

/// Identifies the archive pool (logical stream) to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolDescriptor {
    pub id: u64,
}

impl PoolDescriptor {
    pub fn new(id: u64) -> Self {
        Self { id }
    }
}

impl fmt::Display for PoolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool #{}", self.id)
    }
}

/// Pool state, as returned by the pool lookup endpoint.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub id: u64,
    pub data: PoolData,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolData {
    #[serde(default)]
    pub runtime: String,
    #[serde(default)]
    pub start_key: String,
    #[serde(default)]
    pub current_key: String,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    pub total_bundles: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolResponse {
    pub pool: PoolInfo,
}

/// Archival RPC node used instead of the bundle archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcSource {
    pub endpoint: Url,
    /// Pause between two consecutive block requests.
    pub per_request_timeout: Duration,
}

impl RpcSource {
    pub fn new(endpoint: Url, per_request_timeout: Duration) -> Self {
        Self { endpoint, per_request_timeout }
    }
}
